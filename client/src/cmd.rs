//! The stdin command grammar.

/// One parsed terminal command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String, password: String },
    Logout,
    Send { receiver: String, content: String },
    Broadcast { content: String },
    Group { group: String, content: String },
    History { target: String },
    Status,
    Help,
    Quit,
}

/// Parse one input line. The error is the usage line to print.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd {
        "login" => {
            let mut words = rest.split_whitespace();
            match (words.next(), words.next(), words.next()) {
                (Some(username), Some(password), None) => Ok(Command::Login {
                    username: username.to_string(),
                    password: password.to_string(),
                }),
                _ => Err("usage: login <user> <pass>".to_string()),
            }
        }
        "logout" => Ok(Command::Logout),
        "send" => match rest.split_once(char::is_whitespace) {
            Some((receiver, message)) if !message.trim().is_empty() => Ok(Command::Send {
                receiver: receiver.to_string(),
                content: message.trim().to_string(),
            }),
            _ => Err("usage: send <user> <message>".to_string()),
        },
        "broadcast" => {
            if rest.is_empty() {
                Err("usage: broadcast <message>".to_string())
            } else {
                Ok(Command::Broadcast {
                    content: rest.to_string(),
                })
            }
        }
        "group" => match rest.split_once(char::is_whitespace) {
            Some((group, message)) if !message.trim().is_empty() => Ok(Command::Group {
                group: group.to_string(),
                content: message.trim().to_string(),
            }),
            _ => Err("usage: group <name> <message>".to_string()),
        },
        "history" => {
            if rest.is_empty() {
                Err("usage: history <target>".to_string())
            } else {
                Ok(Command::History {
                    target: rest.to_string(),
                })
            }
        }
        "status" => Ok(Command::Status),
        "help" => Ok(Command::Help),
        "quit" => Ok(Command::Quit),
        other => Err(format!(
            "Unknown command: {other} (type 'help' for the command list)"
        )),
    }
}
