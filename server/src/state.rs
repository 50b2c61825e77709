//! The server aggregate: configuration plus all shared mutable state,
//! owned for the lifetime of the accept loop. Components lock the
//! registry before the user store when they need both.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::ServerConfig;
use crate::registry::ConnectionRegistry;
use crate::store::UserStore;

#[derive(Debug)]
pub struct ServerState {
    pub config: ServerConfig,
    pub registry: Mutex<ConnectionRegistry>,
    pub users: Mutex<UserStore>,
    pub started_at: Instant,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Arc<ServerState> {
        Arc::new(ServerState {
            config,
            registry: Mutex::new(ConnectionRegistry::new()),
            users: Mutex::new(UserStore::new()),
            started_at: Instant::now(),
        })
    }

    /// Seconds since the aggregate was built, for the status report.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
