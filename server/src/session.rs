//! Session state machine over registry entries.
//!
//! ```text
//! Connected ── authenticate ok ──▶ Authenticated
//! Connected ── authenticate fails ─▶ Connected (error surfaced)
//! Authenticated ── logout ──▶ Connected
//! any ── transport failure ──▶ Error/Closed (terminal)
//! ```
//!
//! Re-authenticating an already-authenticated handle as the same identity
//! succeeds without rebinding; as a different identity it is rejected.

use thiserror::Error;
use tracing::{info, warn};

use crate::registry::RegistryError;
use crate::state::ServerState;
use crate::types::Handle;

/// Authentication failures, worded as the client-facing reply text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Server internal error")]
    UnknownConnection,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Already logged in as another user")]
    IdentityMismatch,

    #[error("User already logged in")]
    AlreadyOnline,
}

/// Authenticate `handle` as `username` and bind the identity.
pub fn authenticate(
    state: &ServerState,
    handle: Handle,
    username: &str,
    password: &str,
) -> Result<(), SessionError> {
    let mut registry = state.registry.lock().unwrap();

    let entry = registry
        .find_by_handle(handle)
        .ok_or(SessionError::UnknownConnection)?;

    if entry.is_authenticated() {
        return if entry.username.as_deref() == Some(username) {
            info!(handle, username, "already authenticated");
            Ok(())
        } else {
            warn!(handle, username, "authenticated handle asked for a different identity");
            Err(SessionError::IdentityMismatch)
        };
    }

    let user_id = {
        let users = state.users.lock().unwrap();
        if !users.authenticate(username, password) {
            warn!(username, "authentication failed");
            return Err(SessionError::InvalidCredentials);
        }
        users
            .find_by_username(username)
            .map(|u| u.user_id)
            .ok_or(SessionError::InvalidCredentials)?
    };

    match registry.bind_identity(handle, user_id, username) {
        Ok(()) => {
            info!(handle, username, user_id, "user authenticated");
            Ok(())
        }
        Err(RegistryError::NameInUse(_)) => {
            warn!(username, "user already authenticated elsewhere");
            Err(SessionError::AlreadyOnline)
        }
        Err(RegistryError::UnknownHandle(_)) => Err(SessionError::UnknownConnection),
    }
}

/// Drop the bound identity. No-op on an unauthenticated or unknown
/// handle.
pub fn logout(state: &ServerState, handle: Handle) {
    let mut registry = state.registry.lock().unwrap();
    match registry.find_by_handle(handle) {
        Some(entry) if entry.is_authenticated() => {
            info!(handle, username = ?entry.username, "user logging out");
            registry.unbind_identity(handle);
        }
        Some(_) => warn!(handle, "logout on unauthenticated connection"),
        None => warn!(handle, "logout on unknown connection"),
    }
}

pub fn is_authenticated(state: &ServerState, handle: Handle) -> bool {
    state
        .registry
        .lock()
        .unwrap()
        .find_by_handle(handle)
        .map(|e| e.is_authenticated())
        .unwrap_or(false)
}

pub fn bound_username(state: &ServerState, handle: Handle) -> Option<String> {
    state
        .registry
        .lock()
        .unwrap()
        .find_by_handle(handle)
        .filter(|e| e.is_authenticated())
        .and_then(|e| e.username)
}

pub fn bound_user_id(state: &ServerState, handle: Handle) -> Option<u64> {
    state
        .registry
        .lock()
        .unwrap()
        .find_by_handle(handle)
        .filter(|e| e.is_authenticated())
        .and_then(|e| e.user_id)
}

/// True iff some authenticated connection is bound to `username`.
pub fn is_user_online(state: &ServerState, username: &str) -> bool {
    state
        .registry
        .lock()
        .unwrap()
        .find_by_username(username)
        .map(|e| e.is_authenticated())
        .unwrap_or(false)
}

/// Usernames of every authenticated connection, in snapshot order.
pub fn online_users(state: &ServerState) -> Vec<String> {
    state
        .registry
        .lock()
        .unwrap()
        .snapshot()
        .into_iter()
        .filter(|e| e.is_authenticated())
        .filter_map(|e| e.username)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::types::KillSwitch;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn state_with_defaults() -> Arc<ServerState> {
        let state = ServerState::new(ServerConfig::default());
        state.users.lock().unwrap().init_defaults();
        state
    }

    fn attach(state: &ServerState, handle: Handle) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        state.registry.lock().unwrap().add(
            handle,
            "192.168.1.100".parse().unwrap(),
            12345,
            tx,
            Arc::new(KillSwitch::default()),
        );
        rx
    }

    #[test]
    fn successful_authentication_binds_identity() {
        let state = state_with_defaults();
        let _rx = attach(&state, 100);

        authenticate(&state, 100, "alice", "alice123").unwrap();
        assert!(is_authenticated(&state, 100));
        assert_eq!(bound_username(&state, 100).as_deref(), Some("alice"));
        assert!(bound_user_id(&state, 100).is_some());
        assert!(is_user_online(&state, "alice"));
        assert_eq!(state.registry.lock().unwrap().count(), 1);
    }

    #[test]
    fn wrong_password_and_unknown_user_are_rejected() {
        let state = state_with_defaults();
        let _rx = attach(&state, 101);

        assert_eq!(
            authenticate(&state, 101, "bob", "wrongpass"),
            Err(SessionError::InvalidCredentials)
        );
        assert_eq!(
            authenticate(&state, 101, "nonexistent", "pass"),
            Err(SessionError::InvalidCredentials)
        );
        assert!(!is_authenticated(&state, 101));
    }

    #[test]
    fn reauthentication_is_idempotent_for_same_identity() {
        let state = state_with_defaults();
        let _rx = attach(&state, 100);

        authenticate(&state, 100, "alice", "alice123").unwrap();
        authenticate(&state, 100, "alice", "alice123").unwrap();
        assert_eq!(
            authenticate(&state, 100, "bob", "bob123"),
            Err(SessionError::IdentityMismatch)
        );
        assert_eq!(bound_username(&state, 100).as_deref(), Some("alice"));
    }

    #[test]
    fn second_connection_cannot_steal_an_online_identity() {
        let state = state_with_defaults();
        let _rx_a = attach(&state, 100);
        let _rx_b = attach(&state, 101);

        authenticate(&state, 100, "alice", "alice123").unwrap();
        assert_eq!(
            authenticate(&state, 101, "alice", "alice123"),
            Err(SessionError::AlreadyOnline)
        );
        assert!(!is_authenticated(&state, 101));
    }

    #[test]
    fn logout_then_login_as_someone_else() {
        let state = state_with_defaults();
        let _rx = attach(&state, 100);

        authenticate(&state, 100, "alice", "alice123").unwrap();
        logout(&state, 100);
        assert!(!is_authenticated(&state, 100));
        assert!(bound_username(&state, 100).is_none());
        assert!(!is_user_online(&state, "alice"));

        authenticate(&state, 100, "bob", "bob123").unwrap();
        assert_eq!(bound_username(&state, 100).as_deref(), Some("bob"));
    }

    #[test]
    fn logout_is_a_noop_when_not_authenticated() {
        let state = state_with_defaults();
        let _rx = attach(&state, 100);
        logout(&state, 100);
        logout(&state, 999);
        assert!(!is_authenticated(&state, 100));
    }

    #[test]
    fn online_users_lists_authenticated_connections_only() {
        let state = state_with_defaults();
        let _rx_a = attach(&state, 100);
        let _rx_b = attach(&state, 101);
        let _rx_c = attach(&state, 102);

        authenticate(&state, 100, "alice", "alice123").unwrap();
        authenticate(&state, 101, "bob", "bob123").unwrap();

        let mut online = online_users(&state);
        online.sort();
        assert_eq!(online, vec!["alice".to_string(), "bob".to_string()]);
        assert!(!is_user_online(&state, "charlie"));
    }
}
