//! The accept loop: registers connections, enforces the client cap, and
//! tears everything down on shutdown.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::handlers::client::handle_connection;
use crate::state::ServerState;
use crate::types::{Handle, KillSwitch};

/// Accept connections until `shutdown` resolves, then close every live
/// connection and return.
///
/// Each accepted socket is registered synchronously — so the
/// `max_clients` cap holds exactly — and then driven by its own task.
/// A connection above the cap is dropped immediately with no reply.
pub async fn run_server<F>(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);
    let mut next_handle: Handle = 1;

    info!("event loop started");
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let mut registry = state.registry.lock().unwrap();
                        if registry.count() >= state.config.max_clients {
                            warn!(
                                %peer,
                                max = state.config.max_clients,
                                "maximum clients reached, refusing connection"
                            );
                            drop(registry);
                            drop(stream);
                            continue;
                        }

                        let handle = next_handle;
                        next_handle += 1;
                        let (tx, rx) = mpsc::unbounded_channel();
                        let kill = Arc::new(KillSwitch::default());
                        registry.add(handle, peer.ip(), peer.port(), tx, kill.clone());
                        let total = registry.count();
                        drop(registry);
                        info!(handle, %peer, total, "new client connected");

                        let state = Arc::clone(&state);
                        tokio::spawn(handle_connection(state, stream, handle, rx, kill));
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to accept connection");
                    }
                }
            }
        }
    }

    shutdown_all(&state);
    info!("event loop stopped");
    Ok(())
}

/// Trip every live connection's kill switch; the connection tasks
/// deregister themselves. Leftover entries are dropped for a cold exit.
fn shutdown_all(state: &ServerState) {
    let snapshot = state.registry.lock().unwrap().snapshot();
    for entry in &snapshot {
        entry.kill.trigger();
    }
    let mut registry = state.registry.lock().unwrap();
    for entry in snapshot {
        registry.remove(entry.handle);
    }
}
