//! Message routing: turn a verified record into writes on other
//! connections' sockets.
//!
//! The caller has already checked that the record's sender matches the
//! source handle's bound identity; the handle itself is only used to keep
//! broadcasts from echoing to their origin.

use thiserror::Error;
use tracing::{debug, info, warn};

use common::builder::{build_error_msg, build_success_msg};
use common::codec::serialize_message;
use common::{
    ERROR_SERVER_ERROR, ERROR_USER_NOT_FOUND, ERROR_USER_OFFLINE, RESPONSE_SUCCESS, Record,
    RecordKind,
};

use crate::state::ServerState;
use crate::types::{ClientStatus, Handle};

/// Routing failures, worded as the client-facing reply text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("User is offline")]
    UserOffline,

    #[error("User not found")]
    UserNotFound,

    #[error("Failed to send message")]
    DeliveryFailed,

    #[error("Failed to broadcast message")]
    BroadcastFailed,

    #[error("Group feature not implemented yet")]
    GroupNotImplemented,

    #[error("Invalid receiver")]
    InvalidReceiver,
}

impl RouteError {
    pub fn code(&self) -> u32 {
        match self {
            RouteError::UserOffline => ERROR_USER_OFFLINE,
            RouteError::UserNotFound => ERROR_USER_NOT_FOUND,
            RouteError::DeliveryFailed
            | RouteError::BroadcastFailed
            | RouteError::GroupNotImplemented
            | RouteError::InvalidReceiver => ERROR_SERVER_ERROR,
        }
    }
}

/// Dispatch a record by type. Command records (LOGIN/LOGOUT/HISTORY/
/// STATUS) are not routed, and responses from clients are consumed
/// silently.
pub fn route_record(
    state: &ServerState,
    record: &Record,
    source: Handle,
) -> Result<(), RouteError> {
    debug!(
        id = record.message_id,
        kind = %record.kind,
        sender = %record.sender,
        receiver = %record.receiver,
        "routing message"
    );

    match record.kind {
        RecordKind::Msg if record.is_private() => route_private(state, record),
        RecordKind::Msg => Err(RouteError::InvalidReceiver),
        RecordKind::Broadcast => route_broadcast(state, record, source),
        RecordKind::Group => {
            warn!("group message routing not implemented yet");
            Err(RouteError::GroupNotImplemented)
        }
        RecordKind::Login | RecordKind::Logout | RecordKind::History | RecordKind::Status => {
            debug!(kind = %record.kind, "command message, skipping routing");
            Ok(())
        }
        RecordKind::Ok | RecordKind::Error => Ok(()),
    }
}

fn route_private(state: &ServerState, record: &Record) -> Result<(), RouteError> {
    let mut registry = state.registry.lock().unwrap();

    match registry.find_by_username(&record.receiver) {
        Some(entry) if entry.is_authenticated() => {
            let frame = serialize_message(record);
            if entry.send_frame(frame) {
                info!(
                    sender = %record.sender,
                    receiver = %record.receiver,
                    "private message delivered"
                );
                Ok(())
            } else {
                warn!(
                    receiver = %record.receiver,
                    handle = entry.handle,
                    "recipient writer gone, scheduling removal"
                );
                registry.set_status(entry.handle, ClientStatus::Error);
                entry.kill.trigger();
                Err(RouteError::DeliveryFailed)
            }
        }
        _ => {
            drop(registry);
            let known = state
                .users
                .lock()
                .unwrap()
                .find_by_username(&record.receiver)
                .is_some();
            if known {
                warn!(receiver = %record.receiver, "user is not online, cannot deliver");
                Err(RouteError::UserOffline)
            } else {
                warn!(receiver = %record.receiver, "unknown user");
                Err(RouteError::UserNotFound)
            }
        }
    }
}

fn route_broadcast(state: &ServerState, record: &Record, source: Handle) -> Result<(), RouteError> {
    let snapshot = state.registry.lock().unwrap().snapshot();
    let frame = serialize_message(record);

    let mut eligible = 0usize;
    let mut delivered = 0usize;
    for entry in &snapshot {
        if !entry.is_authenticated() || entry.handle == source {
            continue;
        }
        eligible += 1;
        if entry.send_frame(frame.clone()) {
            delivered += 1;
        } else {
            warn!(
                handle = entry.handle,
                username = ?entry.username,
                "broadcast recipient writer gone, scheduling removal"
            );
            let mut registry = state.registry.lock().unwrap();
            registry.set_status(entry.handle, ClientStatus::Error);
            entry.kill.trigger();
        }
    }

    info!(delivered, eligible, sender = %record.sender, "broadcast delivered");
    if delivered > 0 {
        Ok(())
    } else {
        Err(RouteError::BroadcastFailed)
    }
}

/// The single reply path: build a response frame and queue it on the
/// caller's connection. A dead writer schedules the connection for
/// removal; the failure never propagates.
pub fn send_response(state: &ServerState, handle: Handle, code: u32, message: &str) {
    let frame = if code == RESPONSE_SUCCESS {
        build_success_msg(message)
    } else {
        build_error_msg(code, Some(message))
    };

    let mut registry = state.registry.lock().unwrap();
    let Some(entry) = registry.find_by_handle(handle) else {
        warn!(handle, "reply target no longer registered");
        return;
    };
    if !entry.send_frame(frame) {
        warn!(handle, "failed to queue reply, scheduling connection removal");
        registry.set_status(handle, ClientStatus::Error);
        entry.kill.trigger();
    }
}
