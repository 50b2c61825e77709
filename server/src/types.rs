use std::net::IpAddr;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::{Notify, mpsc::UnboundedSender};

/// Opaque identifier of a live connection, issued by the accept loop.
pub type Handle = u64;

/// Lifecycle of a connection in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Connected,
    Authenticated,
    Error,
    Closed,
}

/// Latched close signal shared between a connection's reader and writer
/// tasks and anyone holding its registry entry. Once triggered it stays
/// triggered, so a wakeup cannot be lost between a poll and the next
/// `wait`.
#[derive(Debug, Default)]
pub struct KillSwitch {
    triggered: AtomicBool,
    notify: Notify,
}

impl KillSwitch {
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolves once [`trigger`](Self::trigger) has been called, however
    /// long ago.
    pub async fn wait(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// A live connection as tracked by the registry.
///
/// Status is `Authenticated` exactly when a bound identity is present.
/// Frames reach the peer through `writer`, which feeds the connection's
/// writer task; `kill` tears the connection down from anywhere.
#[derive(Debug, Clone)]
pub struct ClientEntry {
    pub handle: Handle,
    pub client_id: u64,
    pub user_id: Option<u64>,
    pub username: Option<String>,
    pub status: ClientStatus,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
    pub connected_at: Instant,
    pub last_active: Instant,
    pub writer: UnboundedSender<String>,
    pub kill: Arc<KillSwitch>,
}

impl ClientEntry {
    pub fn is_authenticated(&self) -> bool {
        self.status == ClientStatus::Authenticated
    }

    /// Queue a frame for the connection's writer task. False when the
    /// writer is gone, which means the connection is already dying.
    pub fn send_frame(&self, frame: String) -> bool {
        self.writer.send(frame).is_ok()
    }
}
