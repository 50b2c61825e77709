//! Per-connection lifecycle: a writer task draining the entry's frame
//! channel, and a framed read loop feeding the command handler.
//!
//! The read loop runs under a short tick timeout; the fall-through is
//! where periodic work (the idle sweep) happens. Cleanup runs exactly
//! once when the loop ends, whatever ended it.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use common::net::{FrameReader, write_frame};

use crate::handlers::cmd::handle_raw;
use crate::state::ServerState;
use crate::types::{Handle, KillSwitch};

/// Readiness tick: bounds how long the loop waits before running
/// periodic work.
const TICK: Duration = Duration::from_secs(5);

/// Drive one accepted connection to completion. The registry entry for
/// `handle` has already been inserted by the accept loop.
pub async fn handle_connection(
    state: Arc<ServerState>,
    stream: TcpStream,
    handle: Handle,
    rx: UnboundedReceiver<String>,
    kill: Arc<KillSwitch>,
) {
    let (read_half, write_half) = stream.into_split();
    let writer_task = start_writer_task(handle, rx, write_half, kill.clone());

    read_loop(&state, handle, read_half, &kill).await;

    state.registry.lock().unwrap().remove(handle);
    kill.trigger();
    writer_task.abort();
    info!(handle, "client disconnected");
}

/// Own the write half: drain queued frames onto the socket. A write
/// failure trips the kill switch so the read loop stops too.
fn start_writer_task(
    handle: Handle,
    mut rx: UnboundedReceiver<String>,
    mut write_half: OwnedWriteHalf,
    kill: Arc<KillSwitch>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(err) = write_frame(&mut write_half, &frame).await {
                warn!(handle, error = %err, "writer error");
                kill.trigger();
                break;
            }
        }
    })
}

async fn read_loop(
    state: &Arc<ServerState>,
    handle: Handle,
    read_half: OwnedReadHalf,
    kill: &KillSwitch,
) {
    let mut reader = FrameReader::new(read_half);
    loop {
        tokio::select! {
            _ = kill.wait() => break,
            result = timeout(TICK, reader.read_frame()) => match result {
                Err(_elapsed) => {
                    if idle_expired(state, handle) {
                        info!(handle, "closing idle connection");
                        break;
                    }
                }
                Ok(Ok(Some(frame))) => {
                    state.registry.lock().unwrap().touch(handle);
                    handle_raw(state, handle, &frame);
                }
                Ok(Ok(None)) => {
                    info!(handle, "client closed connection");
                    break;
                }
                Ok(Err(err)) => {
                    warn!(handle, error = %err, "read error");
                    break;
                }
            }
        }
    }
}

fn idle_expired(state: &ServerState, handle: Handle) -> bool {
    let limit = state.config.timeout_seconds;
    if limit == 0 {
        return false;
    }
    state
        .registry
        .lock()
        .unwrap()
        .find_by_handle(handle)
        .map(|entry| entry.last_active.elapsed().as_secs() >= limit)
        // An entry that vanished under us means the connection is dead.
        .unwrap_or(true)
}
