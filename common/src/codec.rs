//! Escape-aware codec for the pipe-delimited wire format.
//!
//! A frame is `TYPE|SENDER|RECEIVER|TIMESTAMP|CONTENT` terminated by `\n`.
//! Within a field `|`, `\` and newline are escaped as `\|`, `\\` and `\n`
//! (backslash + letter n). A separator is only a separator when preceded
//! by an even number of backslashes. Only the first four unescaped
//! separators split fields; anything after them, separators included,
//! belongs to CONTENT — response frames rely on this to pack
//! `code|message` into their content field.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::error::ProtocolError;
use crate::time::current_timestamp;
use crate::types::{
    MAX_CONTENT_LEN, MAX_FRAME_LEN, MAX_RECEIVER_LEN, MAX_USERNAME_LEN, MIN_FRAME_LEN, Record,
    RecordKind,
};

const ESCAPE_CHAR: char = '\\';
const FIELD_DELIMITER: char = '|';
const FIELD_COUNT: usize = 5;

/// Monotonic message-id source, starts at 100.
static MESSAGE_ID_COUNTER: AtomicU64 = AtomicU64::new(100);

fn next_message_id() -> u64 {
    MESSAGE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Escape a field value for the wire. Round-trips with [`unescape_field`].
pub fn escape_field(field: &str) -> String {
    let mut escaped = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            FIELD_DELIMITER => escaped.push_str("\\|"),
            ESCAPE_CHAR => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Decode the escape sequences of a field. An unknown sequence decodes to
/// the backslash followed by the literal next character; a lone trailing
/// backslash is kept as-is.
pub fn unescape_field(field: &str) -> String {
    let mut unescaped = String::with_capacity(field.len());
    let mut chars = field.chars().peekable();
    while let Some(c) = chars.next() {
        if c != ESCAPE_CHAR {
            unescaped.push(c);
            continue;
        }
        match chars.peek() {
            Some('|') => {
                unescaped.push('|');
                chars.next();
            }
            Some('\\') => {
                unescaped.push('\\');
                chars.next();
            }
            Some('n') => {
                unescaped.push('\n');
                chars.next();
            }
            // Unknown escape: keep the backslash, leave the next
            // character to the normal path.
            Some(_) | None => unescaped.push(ESCAPE_CHAR),
        }
    }
    unescaped
}

/// Structural validation of a raw frame (terminator excluded): size
/// bounds, at least four unescaped separators, no dangling escape.
pub fn validate_message(raw: &str) -> bool {
    let len = raw.len();
    if len < MIN_FRAME_LEN {
        debug!(len, "message too short");
        return false;
    }
    if len > MAX_FRAME_LEN {
        debug!(len, "message too long");
        return false;
    }

    let mut delimiters = 0usize;
    let mut backslashes = 0usize;
    for &b in raw.as_bytes() {
        if b == b'\\' {
            backslashes += 1;
            continue;
        }
        if b == b'|' && backslashes % 2 == 0 {
            delimiters += 1;
        }
        backslashes = 0;
    }

    if delimiters < FIELD_COUNT - 1 {
        debug!(delimiters, "too few field separators");
        return false;
    }

    // After the loop `backslashes` holds the trailing run length.
    if backslashes % 2 == 1 {
        debug!("message ends with an unescaped backslash");
        return false;
    }

    true
}

/// Split at the first four unescaped separators; the fifth slice keeps
/// everything else, further separators included. Only called on frames
/// that passed [`validate_message`].
fn split_fields(line: &str) -> [&str; FIELD_COUNT] {
    let mut parts = [""; FIELD_COUNT];
    let mut index = 0usize;
    let mut start = 0usize;
    let mut backslashes = 0usize;
    for (i, &b) in line.as_bytes().iter().enumerate() {
        if b == b'\\' {
            backslashes += 1;
            continue;
        }
        if b == b'|' && backslashes % 2 == 0 && index < FIELD_COUNT - 1 {
            parts[index] = &line[start..i];
            index += 1;
            start = i + 1;
        }
        backslashes = 0;
    }
    parts[index] = &line[start..];
    parts
}

/// Parse a raw frame into a [`Record`].
///
/// Assigns a fresh monotonic message id. An empty TIMESTAMP field is
/// replaced with the current wall clock and flagged on the record.
pub fn parse_message(raw: &str) -> Result<Record, ProtocolError> {
    if raw.is_empty() {
        return Err(ProtocolError::Empty);
    }

    let line = raw.strip_suffix('\n').unwrap_or(raw);
    if !validate_message(line) {
        return Err(ProtocolError::Malformed);
    }

    let [tag, sender, receiver, timestamp, content] = split_fields(line).map(unescape_field);

    let kind = RecordKind::from_tag(&tag).ok_or(ProtocolError::UnknownType(tag))?;

    if sender.chars().count() > MAX_USERNAME_LEN {
        return Err(ProtocolError::FieldTooLong {
            field: "sender",
            max: MAX_USERNAME_LEN,
        });
    }
    if receiver.chars().count() > MAX_RECEIVER_LEN {
        return Err(ProtocolError::FieldTooLong {
            field: "receiver",
            max: MAX_RECEIVER_LEN,
        });
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(ProtocolError::FieldTooLong {
            field: "content",
            max: MAX_CONTENT_LEN,
        });
    }

    let timestamp_synthesized = timestamp.is_empty();
    let timestamp = if timestamp_synthesized {
        current_timestamp()
    } else {
        timestamp
    };

    let record = Record {
        kind,
        sender,
        receiver,
        timestamp,
        content,
        message_id: next_message_id(),
        delivered: false,
        timestamp_synthesized,
    };

    debug!(
        id = record.message_id,
        kind = %record.kind,
        sender = %record.sender,
        receiver = %record.receiver,
        "parsed message"
    );
    Ok(record)
}

/// Serialize a [`Record`] into a wire frame, terminator included.
pub fn serialize_message(record: &Record) -> String {
    format!(
        "{}|{}|{}|{}|{}\n",
        escape_field(record.kind.as_str()),
        escape_field(&record.sender),
        escape_field(&record.receiver),
        escape_field(&record.timestamp),
        escape_field(&record.content),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_login() {
        let msg = parse_message("LOGIN|alice|server|2024-01-15 10:30:00|password123\n")
            .expect("login frame should parse");
        assert_eq!(msg.kind, RecordKind::Login);
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.receiver, "server");
        assert_eq!(msg.timestamp, "2024-01-15 10:30:00");
        assert_eq!(msg.content, "password123");
        assert!(msg.message_id >= 100);
        assert!(!msg.timestamp_synthesized);
    }

    #[test]
    fn parse_with_escapes() {
        let msg = parse_message("MSG|bob|alice|2024-01-15 10:35:00|Hello\\|World\\nNew line\n")
            .expect("escaped frame should parse");
        assert_eq!(msg.content, "Hello|World\nNew line");
    }

    #[test]
    fn parse_merges_extra_separators_into_content() {
        let msg = parse_message("OK|server|client|2024-01-15 10:30:00|0|Login successful\n")
            .expect("response frame should parse");
        assert_eq!(msg.kind, RecordKind::Ok);
        assert_eq!(msg.content, "0|Login successful");
    }

    #[test]
    fn parse_rejects_unknown_type() {
        assert_eq!(
            parse_message("NOPE|a|b|c|d\n"),
            Err(ProtocolError::UnknownType("NOPE".into()))
        );
    }

    #[test]
    fn parse_synthesizes_empty_timestamp() {
        let msg = parse_message("STATUS|alice|server||\n").expect("status frame should parse");
        assert!(msg.timestamp_synthesized);
        assert!(!msg.timestamp.is_empty());
    }

    #[test]
    fn parse_assigns_monotonic_ids() {
        let a = parse_message("MSG|alice|bob|t|one\n").unwrap();
        let b = parse_message("MSG|alice|bob|t|two\n").unwrap();
        assert!(b.message_id > a.message_id);
    }

    #[test]
    fn parse_rejects_oversized_content() {
        let frame = format!("MSG|alice|bob|t|{}\n", "x".repeat(256));
        assert_eq!(
            parse_message(&frame),
            Err(ProtocolError::FieldTooLong {
                field: "content",
                max: MAX_CONTENT_LEN
            })
        );
    }

    #[test]
    fn escape_unescape_round_trip() {
        let cases = [
            "Hello|World",
            "Test\\Backslash",
            "Line1\nLine2",
            "Normal",
            "",
            "|||",
            "\\n is not a newline",
            "mixed|\\\ncase",
        ];
        for case in cases {
            let escaped = escape_field(case);
            assert!(!escaped.contains('\n'));
            assert_eq!(unescape_field(&escaped), case, "round trip of {case:?}");
        }
    }

    #[test]
    fn unknown_escape_is_preserved() {
        assert_eq!(unescape_field("a\\xb"), "a\\xb");
        assert_eq!(unescape_field("tail\\"), "tail\\");
    }

    #[test]
    fn validate_boundaries() {
        assert!(!validate_message(""));
        assert!(!validate_message("OK|a"));
        assert!(!validate_message(&format!("MSG|a|b|c|{}", "x".repeat(1100))));
        assert!(!validate_message("TOO|FEW|FIELDS"));
        assert!(!validate_message("MSG|a|b|c|d\\"));
        assert!(validate_message("MSG|a|b|c|d\\\\"));
        assert!(validate_message("MSG|a|b|c|d"));
        assert!(validate_message("MSG||||"));
    }

    #[test]
    fn escaped_separators_do_not_count() {
        // Four real separators are still required once escapes are ignored.
        assert!(!validate_message("MSG\\|a\\|b\\|c\\|d"));
    }

    #[test]
    fn serialize_parse_round_trip() {
        let original = Record::new(
            RecordKind::Msg,
            "alice",
            "bob",
            "2024-01-15 10:30:00",
            "Hello|World\nwith \\ specials",
        );
        let wire = serialize_message(&original);
        assert!(wire.ends_with('\n'));
        assert_eq!(wire.matches('\n').count(), 1);

        let parsed = parse_message(&wire).expect("serialized frame should parse");
        assert_eq!(parsed.kind, original.kind);
        assert_eq!(parsed.sender, original.sender);
        assert_eq!(parsed.receiver, original.receiver);
        assert_eq!(parsed.timestamp, original.timestamp);
        assert_eq!(parsed.content, original.content);
    }

    #[test]
    fn reserialized_form_is_stable() {
        let wire = "MSG|alice|bob|2024-01-15 10:30:00|plain text\n";
        let first = parse_message(wire).unwrap();
        let second = parse_message(&serialize_message(&first)).unwrap();
        assert_eq!(second.sender, first.sender);
        assert_eq!(second.receiver, first.receiver);
        assert_eq!(second.timestamp, first.timestamp);
        assert_eq!(second.content, first.content);
        assert_ne!(second.message_id, first.message_id);
    }
}
