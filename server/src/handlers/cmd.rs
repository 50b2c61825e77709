//! Per-frame command handling: parse, check permissions, mutate the
//! session or hand off to the router, and always produce a reply.
//!
//! Every reply flows through [`send_response`]; handlers return the reply
//! code so callers and tests can observe the outcome without a socket.

use tracing::{debug, info, warn};

use common::codec::parse_message;
use common::{
    ERROR_AUTH_FAILED, ERROR_SERVER_ERROR, ProtocolError, RESPONSE_SUCCESS, Record, RecordKind,
};

use crate::router::{route_record, send_response};
use crate::session;
use crate::state::ServerState;
use crate::types::Handle;

/// Entry point for one raw frame from `handle`.
pub fn handle_raw(state: &ServerState, handle: Handle, raw: &str) -> u32 {
    match parse_message(raw) {
        Ok(record) => handle_record(state, handle, &record),
        Err(ProtocolError::UnknownType(tag)) => {
            warn!(handle, tag = %tag, "unknown command type");
            reply(state, handle, ERROR_SERVER_ERROR, "Unknown command type")
        }
        Err(err) => {
            warn!(handle, %err, "failed to parse message");
            reply(state, handle, ERROR_SERVER_ERROR, "Failed to parse message")
        }
    }
}

/// Dispatch a parsed record.
pub fn handle_record(state: &ServerState, handle: Handle, record: &Record) -> u32 {
    debug!(handle, kind = %record.kind, "handling command");
    match record.kind {
        RecordKind::Login => handle_login(state, handle, record),
        RecordKind::Logout => handle_logout(state, handle, record),
        RecordKind::Msg | RecordKind::Broadcast | RecordKind::Group => {
            handle_chat(state, handle, record)
        }
        RecordKind::History => handle_history(state, handle, record),
        RecordKind::Status => handle_status(state, handle),
        RecordKind::Ok | RecordKind::Error => {
            debug!(handle, "response message received, no action needed");
            RESPONSE_SUCCESS
        }
    }
}

fn reply(state: &ServerState, handle: Handle, code: u32, message: &str) -> u32 {
    send_response(state, handle, code, message);
    code
}

fn handle_login(state: &ServerState, handle: Handle, record: &Record) -> u32 {
    let username = record.sender.as_str();
    let password = record.content.as_str();

    if username.is_empty() || password.is_empty() {
        warn!(handle, "missing username or password in login request");
        return reply(
            state,
            handle,
            ERROR_AUTH_FAILED,
            "Missing username or password",
        );
    }

    debug!(handle, username, "processing login request");
    match session::authenticate(state, handle, username, password) {
        Ok(()) => {
            info!(handle, username, "user logged in successfully");
            reply(state, handle, RESPONSE_SUCCESS, "Login successful")
        }
        Err(err) => {
            warn!(handle, username, %err, "login failed");
            reply(state, handle, ERROR_AUTH_FAILED, &err.to_string())
        }
    }
}

fn handle_logout(state: &ServerState, handle: Handle, record: &Record) -> u32 {
    if let Some(code) = require_auth(state, handle) {
        return code;
    }

    debug!(handle, username = %record.sender, "processing logout request");
    session::logout(state, handle);
    info!(handle, username = %record.sender, "user logged out");
    reply(state, handle, RESPONSE_SUCCESS, "Logout successful")
}

fn handle_chat(state: &ServerState, handle: Handle, record: &Record) -> u32 {
    if let Some(code) = require_auth(state, handle) {
        return code;
    }

    // A frame may claim any sender; the bound identity is authoritative.
    if let Some(bound) = session::bound_username(state, handle) {
        if bound != record.sender {
            warn!(
                handle,
                expected = %bound,
                got = %record.sender,
                "message sender mismatch"
            );
            return reply(state, handle, ERROR_AUTH_FAILED, "Sender mismatch");
        }
    }

    match route_record(state, record, handle) {
        Ok(()) => {
            let message = match record.kind {
                RecordKind::Broadcast => "Broadcast sent successfully",
                _ => "Message sent successfully",
            };
            reply(state, handle, RESPONSE_SUCCESS, message)
        }
        Err(err) => reply(state, handle, err.code(), &err.to_string()),
    }
}

fn handle_history(state: &ServerState, handle: Handle, record: &Record) -> u32 {
    if let Some(code) = require_auth(state, handle) {
        return code;
    }

    // CONTENT packs `target|from_ts|to_ts`, empty pieces allowed.
    let mut parts = record.content.splitn(3, '|');
    let target = parts.next().unwrap_or("");
    let from_ts = parts.next().unwrap_or("");
    let to_ts = parts.next().unwrap_or("");
    debug!(
        handle,
        user = %record.sender,
        target,
        from_ts,
        to_ts,
        "history request"
    );

    reply(
        state,
        handle,
        ERROR_SERVER_ERROR,
        "History feature not implemented yet",
    )
}

fn handle_status(state: &ServerState, handle: Handle) -> u32 {
    if let Some(code) = require_auth(state, handle) {
        return code;
    }

    let connected = state.registry.lock().unwrap().count();
    let online = session::online_users(state).len();
    let total_users = state.users.lock().unwrap().count();
    let own_status = if session::is_authenticated(state, handle) {
        "Online"
    } else {
        "Offline"
    };

    let report = format!(
        "Server Status:\n\
         - Uptime: {}s\n\
         - Connected clients: {}\n\
         - Online users: {}\n\
         - Total users: {}\n\
         - Your status: {}",
        state.uptime_secs(),
        connected,
        online,
        total_users,
        own_status,
    );
    reply(state, handle, RESPONSE_SUCCESS, &report)
}

/// The authentication gate shared by every command that needs a session.
/// Replies 1001 and returns the code when the caller must log in first;
/// disabled entirely by the `require_auth` config switch.
fn require_auth(state: &ServerState, handle: Handle) -> Option<u32> {
    if !state.config.require_auth || session::is_authenticated(state, handle) {
        return None;
    }
    warn!(handle, "unauthorized request");
    Some(reply(state, handle, ERROR_AUTH_FAILED, "Please login first"))
}
