//! Data model for the pipe-delimited chat protocol.
//!
//! A wire frame is one `\n`-terminated line of exactly five fields:
//! `TYPE|SENDER|RECEIVER|TIMESTAMP|CONTENT`. See [`crate::codec`] for the
//! escape rules and the parser.

/// Maximum username length in characters.
pub const MAX_USERNAME_LEN: usize = 31;
/// Maximum group name length in characters.
pub const MAX_GROUPNAME_LEN: usize = 31;
/// Maximum content length in characters, after unescaping.
pub const MAX_CONTENT_LEN: usize = 255;
/// Maximum receiver length: `group:` prefix plus a group name.
pub const MAX_RECEIVER_LEN: usize = RECEIVER_GROUP_PREFIX.len() + MAX_GROUPNAME_LEN;
/// Minimum size of a frame in bytes, terminator excluded.
pub const MIN_FRAME_LEN: usize = 5;
/// Maximum size of a frame in bytes after escaping, terminator excluded.
pub const MAX_FRAME_LEN: usize = 1024;

/// Receiver marker for broadcast frames.
pub const RECEIVER_BROADCAST: &str = "*";
/// Receiver prefix for group frames.
pub const RECEIVER_GROUP_PREFIX: &str = "group:";
/// Receiver marker for frames addressed to the server itself.
pub const RECEIVER_SERVER: &str = "server";

/// Response code: operation succeeded.
pub const RESPONSE_SUCCESS: u32 = 0;
/// Response code: authentication failed.
pub const ERROR_AUTH_FAILED: u32 = 1001;
/// Response code: user not found.
pub const ERROR_USER_NOT_FOUND: u32 = 1002;
/// Response code: user offline.
pub const ERROR_USER_OFFLINE: u32 = 1003;
/// Response code: group full.
pub const ERROR_GROUP_FULL: u32 = 1004;
/// Response code: server internal error / not implemented.
pub const ERROR_SERVER_ERROR: u32 = 5000;

/// The type tag of a wire frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Login,
    Logout,
    Msg,
    Broadcast,
    Group,
    History,
    Status,
    Ok,
    Error,
}

impl RecordKind {
    /// The wire spelling of the type tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Login => "LOGIN",
            RecordKind::Logout => "LOGOUT",
            RecordKind::Msg => "MSG",
            RecordKind::Broadcast => "BROADCAST",
            RecordKind::Group => "GROUP",
            RecordKind::History => "HISTORY",
            RecordKind::Status => "STATUS",
            RecordKind::Ok => "OK",
            RecordKind::Error => "ERROR",
        }
    }

    /// Parse a wire type tag. Returns `None` for anything outside the
    /// known set.
    pub fn from_tag(tag: &str) -> Option<RecordKind> {
        match tag {
            "LOGIN" => Some(RecordKind::Login),
            "LOGOUT" => Some(RecordKind::Logout),
            "MSG" => Some(RecordKind::Msg),
            "BROADCAST" => Some(RecordKind::Broadcast),
            "GROUP" => Some(RecordKind::Group),
            "HISTORY" => Some(RecordKind::History),
            "STATUS" => Some(RecordKind::Status),
            "OK" => Some(RecordKind::Ok),
            "ERROR" => Some(RecordKind::Error),
            _ => None,
        }
    }

    /// True for the two response tags.
    pub fn is_response(&self) -> bool {
        matches!(self, RecordKind::Ok | RecordKind::Error)
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordKind,
    pub sender: String,
    pub receiver: String,
    /// `YYYY-MM-DD HH:MM:SS`; filled by the parser when the wire field is
    /// empty.
    pub timestamp: String,
    pub content: String,
    /// Unique id assigned at parse time, monotonic from 100.
    pub message_id: u64,
    pub delivered: bool,
    /// True when the parser substituted the server clock for an empty
    /// timestamp field.
    pub timestamp_synthesized: bool,
}

impl Record {
    /// Build a record with a caller-supplied timestamp. The message id is
    /// assigned by the parser, not here; locally built records carry 0
    /// until they cross the codec.
    pub fn new(
        kind: RecordKind,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        timestamp: impl Into<String>,
        content: impl Into<String>,
    ) -> Record {
        Record {
            kind,
            sender: sender.into(),
            receiver: receiver.into(),
            timestamp: timestamp.into(),
            content: content.into(),
            message_id: 0,
            delivered: false,
            timestamp_synthesized: false,
        }
    }

    /// A MSG whose receiver is neither the broadcast marker nor a group
    /// target.
    pub fn is_private(&self) -> bool {
        self.kind == RecordKind::Msg
            && self.receiver != RECEIVER_BROADCAST
            && !self.receiver.starts_with(RECEIVER_GROUP_PREFIX)
    }

    pub fn is_broadcast(&self) -> bool {
        self.kind == RecordKind::Broadcast
    }

    pub fn is_group(&self) -> bool {
        self.kind == RecordKind::Group
    }

    /// The group name of a `group:<name>` receiver, if any.
    pub fn group_name(&self) -> Option<&str> {
        self.receiver.strip_prefix(RECEIVER_GROUP_PREFIX)
    }
}

/// A server reply before serialization. `code == 0` iff `kind` is OK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u32,
    pub kind: RecordKind,
    pub message: String,
    pub timestamp: String,
}

impl Response {
    pub fn success(message: impl Into<String>) -> Response {
        Response {
            code: RESPONSE_SUCCESS,
            kind: RecordKind::Ok,
            message: message.into(),
            timestamp: crate::time::current_timestamp(),
        }
    }

    pub fn error(code: u32, message: impl Into<String>) -> Response {
        Response {
            code,
            kind: RecordKind::Error,
            message: message.into(),
            timestamp: crate::time::current_timestamp(),
        }
    }
}

/// Valid usernames are 1..=31 characters of `[A-Za-z0-9_]`.
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_USERNAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
