//! The connection registry: the single source of truth about who is
//! attached and authenticated.
//!
//! Entries are owned by the registry; every reader gets clones, never a
//! reference into the map. Callers serialize access through the one lock
//! on [`crate::state::ServerState`].

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::types::{ClientEntry, ClientStatus, Handle, KillSwitch};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no connection for handle {0}")]
    UnknownHandle(Handle),

    #[error("user {0} is already authenticated on another connection")]
    NameInUse(String),
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    clients: HashMap<Handle, ClientEntry>,
    next_client_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> ConnectionRegistry {
        ConnectionRegistry {
            clients: HashMap::new(),
            next_client_id: 1,
        }
    }

    /// Insert a fresh entry in status `Connected`. A duplicate handle is
    /// left untouched.
    pub fn add(
        &mut self,
        handle: Handle,
        remote_ip: IpAddr,
        remote_port: u16,
        writer: UnboundedSender<String>,
        kill: Arc<KillSwitch>,
    ) {
        if self.clients.contains_key(&handle) {
            return;
        }
        let now = Instant::now();
        let client_id = self.next_client_id;
        self.next_client_id += 1;
        self.clients.insert(
            handle,
            ClientEntry {
                handle,
                client_id,
                user_id: None,
                username: None,
                status: ClientStatus::Connected,
                remote_ip,
                remote_port,
                connected_at: now,
                last_active: now,
                writer,
                kill,
            },
        );
    }

    /// Drop the entry for `handle`, if any. Safe to call repeatedly.
    pub fn remove(&mut self, handle: Handle) -> Option<ClientEntry> {
        self.clients.remove(&handle)
    }

    pub fn find_by_handle(&self, handle: Handle) -> Option<ClientEntry> {
        self.clients.get(&handle).cloned()
    }

    /// The entry bound to `username`, regardless of current status.
    pub fn find_by_username(&self, username: &str) -> Option<ClientEntry> {
        self.clients
            .values()
            .find(|c| c.username.as_deref() == Some(username))
            .cloned()
    }

    pub fn find_by_user_id(&self, user_id: u64) -> Option<ClientEntry> {
        self.clients
            .values()
            .find(|c| c.user_id == Some(user_id))
            .cloned()
    }

    /// Refresh the entry's last-activity instant.
    pub fn touch(&mut self, handle: Handle) {
        if let Some(entry) = self.clients.get_mut(&handle) {
            entry.last_active = Instant::now();
        }
    }

    /// Bind an authenticated identity to the connection and transition it
    /// to `Authenticated`. At most one authenticated entry may hold a
    /// username at any instant; rebinding the same identity to the same
    /// handle is a no-op success.
    pub fn bind_identity(
        &mut self,
        handle: Handle,
        user_id: u64,
        username: &str,
    ) -> Result<(), RegistryError> {
        let holder = self
            .clients
            .values()
            .find(|c| c.is_authenticated() && c.username.as_deref() == Some(username))
            .map(|c| c.handle);
        if let Some(other) = holder {
            if other != handle {
                return Err(RegistryError::NameInUse(username.to_string()));
            }
        }

        let entry = self
            .clients
            .get_mut(&handle)
            .ok_or(RegistryError::UnknownHandle(handle))?;
        entry.user_id = Some(user_id);
        entry.username = Some(username.to_string());
        entry.status = ClientStatus::Authenticated;
        debug!(handle, username, user_id, "identity bound");
        Ok(())
    }

    /// Clear the bound identity and return to `Connected`.
    pub fn unbind_identity(&mut self, handle: Handle) {
        if let Some(entry) = self.clients.get_mut(&handle) {
            entry.user_id = None;
            entry.username = None;
            entry.status = ClientStatus::Connected;
        }
    }

    pub fn set_status(&mut self, handle: Handle, status: ClientStatus) {
        if let Some(entry) = self.clients.get_mut(&handle) {
            entry.status = status;
        }
    }

    /// Stable clone of every live entry, for broadcast and sweeps.
    pub fn snapshot(&self) -> Vec<ClientEntry> {
        self.clients.values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> ConnectionRegistry {
        ConnectionRegistry::new()
    }
}
