//! Constructors for complete wire frames.
//!
//! Request builders are used by the client, response builders by the
//! server's reply path. A response frame packs `code|message` into its
//! CONTENT field; the separator between them is deliberately left
//! unescaped so that the receiving parser folds it back into CONTENT,
//! while the human message itself is escaped to keep multi-line payloads
//! on one wire line.

use tracing::debug;

use crate::codec::escape_field;
use crate::error::ProtocolError;
use crate::time::current_timestamp;
use crate::types::{
    ERROR_AUTH_FAILED, ERROR_GROUP_FULL, ERROR_SERVER_ERROR, ERROR_USER_NOT_FOUND,
    ERROR_USER_OFFLINE, MAX_CONTENT_LEN, MAX_GROUPNAME_LEN, RECEIVER_BROADCAST,
    RECEIVER_GROUP_PREFIX, RECEIVER_SERVER, RecordKind, Response, is_valid_username,
};

fn check_username(name: &str) -> Result<(), ProtocolError> {
    if is_valid_username(name) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidUsername(name.to_string()))
    }
}

fn check_content(content: &str) -> Result<(), ProtocolError> {
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(ProtocolError::FieldTooLong {
            field: "content",
            max: MAX_CONTENT_LEN,
        });
    }
    Ok(())
}

/// `LOGIN|<name>|server|<ts>|<credential>`
pub fn build_login_msg(username: &str, password: &str) -> Result<String, ProtocolError> {
    check_username(username)?;
    Ok(format!(
        "{}|{}|{}|{}|{}\n",
        RecordKind::Login,
        username,
        RECEIVER_SERVER,
        current_timestamp(),
        escape_field(password),
    ))
}

/// `LOGOUT|<name>|server|<ts>|`
pub fn build_logout_msg(username: &str) -> Result<String, ProtocolError> {
    check_username(username)?;
    Ok(format!(
        "{}|{}|{}|{}|\n",
        RecordKind::Logout,
        username,
        RECEIVER_SERVER,
        current_timestamp(),
    ))
}

/// `MSG|<from>|<to>|<ts>|<content>`
pub fn build_text_msg(
    sender: &str,
    receiver: &str,
    content: &str,
) -> Result<String, ProtocolError> {
    check_username(sender)?;
    check_content(content)?;
    let frame = format!(
        "{}|{}|{}|{}|{}\n",
        RecordKind::Msg,
        sender,
        receiver,
        current_timestamp(),
        escape_field(content),
    );
    debug!(sender, receiver, "built text message");
    Ok(frame)
}

/// `BROADCAST|<from>|*|<ts>|<content>`
pub fn build_broadcast_msg(sender: &str, content: &str) -> Result<String, ProtocolError> {
    check_username(sender)?;
    check_content(content)?;
    Ok(format!(
        "{}|{}|{}|{}|{}\n",
        RecordKind::Broadcast,
        sender,
        RECEIVER_BROADCAST,
        current_timestamp(),
        escape_field(content),
    ))
}

/// `GROUP|<from>|group:<name>|<ts>|<content>`
pub fn build_group_msg(
    sender: &str,
    group_name: &str,
    content: &str,
) -> Result<String, ProtocolError> {
    check_username(sender)?;
    if group_name.is_empty() || group_name.chars().count() > MAX_GROUPNAME_LEN {
        return Err(ProtocolError::FieldTooLong {
            field: "group name",
            max: MAX_GROUPNAME_LEN,
        });
    }
    check_content(content)?;
    Ok(format!(
        "{}|{}|{}{}|{}|{}\n",
        RecordKind::Group,
        sender,
        RECEIVER_GROUP_PREFIX,
        group_name,
        current_timestamp(),
        escape_field(content),
    ))
}

/// `HISTORY|<name>|server|<ts>|<target>|<from-ts>|<to-ts>` — the trailing
/// fields are packed into CONTENT with unescaped separators.
pub fn build_history_request(
    username: &str,
    target: &str,
    start_time: Option<&str>,
    end_time: Option<&str>,
) -> Result<String, ProtocolError> {
    check_username(username)?;
    Ok(format!(
        "{}|{}|{}|{}|{}|{}|{}\n",
        RecordKind::History,
        username,
        RECEIVER_SERVER,
        current_timestamp(),
        target,
        start_time.unwrap_or(""),
        end_time.unwrap_or(""),
    ))
}

/// `STATUS|<name>|server|<ts>|`
pub fn build_status_request(username: &str) -> Result<String, ProtocolError> {
    check_username(username)?;
    Ok(format!(
        "{}|{}|{}|{}|\n",
        RecordKind::Status,
        username,
        RECEIVER_SERVER,
        current_timestamp(),
    ))
}

/// `OK|server|client|<ts>|<code>|<message>` or the ERROR equivalent,
/// picked by the code.
pub fn build_response(resp: &Response) -> String {
    format!(
        "{}|server|client|{}|{}|{}\n",
        resp.kind,
        resp.timestamp,
        resp.code,
        escape_field(&resp.message),
    )
}

/// Success response with code 0.
pub fn build_success_msg(message: &str) -> String {
    build_response(&Response::success(message))
}

/// Error response; a `None` message falls back to the code's default text.
pub fn build_error_msg(code: u32, message: Option<&str>) -> String {
    let message = message.unwrap_or_else(|| default_error_message(code));
    build_response(&Response::error(code, message))
}

/// Default human text per error code.
pub fn default_error_message(code: u32) -> &'static str {
    match code {
        ERROR_AUTH_FAILED => "Authentication failed",
        ERROR_USER_NOT_FOUND => "User not found",
        ERROR_USER_OFFLINE => "User is offline",
        ERROR_GROUP_FULL => "Group is full",
        ERROR_SERVER_ERROR => "Server internal error",
        _ => "Unknown error",
    }
}

/// `BROADCAST|server|*|<ts>|<name> is now online`
pub fn build_user_online_msg(username: &str) -> Result<String, ProtocolError> {
    check_username(username)?;
    Ok(format!(
        "{}|server|{}|{}|{} is now online\n",
        RecordKind::Broadcast,
        RECEIVER_BROADCAST,
        current_timestamp(),
        username,
    ))
}

/// `BROADCAST|server|*|<ts>|<name> is now offline`
pub fn build_user_offline_msg(username: &str) -> Result<String, ProtocolError> {
    check_username(username)?;
    Ok(format!(
        "{}|server|{}|{}|{} is now offline\n",
        RecordKind::Broadcast,
        RECEIVER_BROADCAST,
        current_timestamp(),
        username,
    ))
}

/// `BROADCAST|server|*|<ts>|<content>` for server-originated notices.
pub fn build_system_notification(content: &str) -> Result<String, ProtocolError> {
    check_content(content)?;
    Ok(format!(
        "{}|server|{}|{}|{}\n",
        RecordKind::Broadcast,
        RECEIVER_BROADCAST,
        current_timestamp(),
        escape_field(content),
    ))
}
