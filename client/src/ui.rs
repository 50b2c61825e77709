//! Terminal rendering of inbound frames and the help text.

use tracing::debug;

use common::codec::parse_message;
use common::{ERROR_AUTH_FAILED, RecordKind};

use crate::session::{ClientState, SharedSession, set_state};

pub fn show_welcome() {
    println!("=== PipeChat Client ===");
    println!("Type 'help' for available commands\n");
}

pub fn print_help() {
    println!("Available commands:");
    println!("  login <user> <pass>    - log in to the server");
    println!("  logout                 - log out from the server");
    println!("  send <user> <msg>      - send a private message");
    println!("  broadcast <msg>        - send a broadcast message");
    println!("  group <name> <msg>     - send a group message");
    println!("  history <target>       - request message history");
    println!("  status                 - query server status");
    println!("  help                   - show this help");
    println!("  quit                   - exit the client");
}

/// Render one inbound frame and apply its effect on the session state.
pub fn render_frame(frame: &str, session: &SharedSession) {
    let record = match parse_message(frame) {
        Ok(record) => record,
        Err(err) => {
            debug!(%err, frame, "dropping unparseable frame");
            return;
        }
    };

    match record.kind {
        RecordKind::Msg => println!("<{}> {}", record.sender, record.content),
        RecordKind::Broadcast if record.sender == "server" => {
            println!("*** {}", record.content);
        }
        RecordKind::Broadcast => {
            println!("[broadcast] <{}> {}", record.sender, record.content);
        }
        RecordKind::Group => {
            println!("[{}] <{}> {}", record.receiver, record.sender, record.content);
        }
        RecordKind::Ok => {
            let (_, message) = split_response_content(&record.content);
            match message {
                "Login successful" => set_state(session, ClientState::Authenticated),
                "Logout successful" => {
                    let mut info = session.lock().unwrap();
                    info.state = ClientState::Connected;
                    info.username = None;
                }
                _ => {}
            }
            println!("*** OK: {message}");
        }
        RecordKind::Error => {
            let (code, message) = split_response_content(&record.content);
            // A failed login leaves the optimistically stored name stale.
            if code == Some(ERROR_AUTH_FAILED) {
                let mut info = session.lock().unwrap();
                if info.state != ClientState::Authenticated {
                    info.username = None;
                }
            }
            match code {
                Some(code) => println!("!!! ERROR {code}: {message}"),
                None => println!("!!! ERROR: {message}"),
            }
        }
        other => debug!(kind = %other, "ignoring unexpected frame kind"),
    }
}

/// Unpack the `code|message` content of a response frame. A content
/// without the code prefix is returned whole.
pub fn split_response_content(content: &str) -> (Option<u32>, &str) {
    match content.split_once('|') {
        Some((code, message)) => match code.parse::<u32>() {
            Ok(code) => (Some(code), message),
            Err(_) => (None, content),
        },
        None => (None, content),
    }
}
