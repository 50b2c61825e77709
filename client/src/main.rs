use std::env;
use std::process::ExitCode;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tracing_subscriber::EnvFilter;

use common::builder::{
    build_broadcast_msg, build_group_msg, build_history_request, build_login_msg,
    build_logout_msg, build_status_request, build_text_msg,
};
use common::net::write_frame;

use pipechat_client::cmd::{Command, parse_command};
use pipechat_client::session::{
    ClientState, SharedSession, new_shared, set_state, spawn_reader, state_of, username_of,
};
use pipechat_client::ui;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let host = args.get(1).cloned().unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = match args.get(2).map(|p| p.parse()) {
        Some(Ok(port)) => port,
        Some(Err(_)) => {
            eprintln!("Invalid port: {}", args[2]);
            return ExitCode::FAILURE;
        }
        None => 8080,
    };

    ui::show_welcome();

    let session = new_shared();
    set_state(&session, ClientState::Connecting);

    let stream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("Failed to connect to {host}:{port}: {err}");
            return ExitCode::FAILURE;
        }
    };
    println!("*** connected to {host}:{port}");
    set_state(&session, ClientState::Connected);

    let (read_half, mut write_half) = stream.into_split();
    let reader_task = spawn_reader(read_half, session.clone());

    run_input_loop(&mut write_half, &session).await;

    let _ = write_half.shutdown().await;
    reader_task.abort();
    ExitCode::SUCCESS
}

async fn run_input_loop(writer: &mut OwnedWriteHalf, session: &SharedSession) {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    loop {
        line.clear();
        tokio::select! {
            read = stdin.read_line(&mut line) => {
                match read {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = line.trim();
                        if text.is_empty() {
                            continue;
                        }
                        match parse_command(text) {
                            Ok(Command::Quit) => {
                                println!("*** leaving chat");
                                break;
                            }
                            Ok(Command::Help) => ui::print_help(),
                            Ok(command) => {
                                if !dispatch(writer, command, session).await {
                                    break;
                                }
                            }
                            Err(usage) => println!("{usage}"),
                        }
                    }
                    Err(err) => {
                        eprintln!("!!! stdin error: {err}");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n*** interrupted");
                break;
            }
        }
    }
}

/// Build and send the frame for one command. False stops the input loop.
async fn dispatch(writer: &mut OwnedWriteHalf, command: Command, session: &SharedSession) -> bool {
    let Some(frame) = build_frame(command, session) else {
        return true;
    };

    if let Err(err) = write_frame(writer, &frame).await {
        eprintln!("!!! failed to send: {err}");
        set_state(session, ClientState::Error);
        return false;
    }
    true
}

fn build_frame(command: Command, session: &SharedSession) -> Option<String> {
    let built = match command {
        Command::Login { username, password } => {
            session.lock().unwrap().username = Some(username.clone());
            build_login_msg(&username, &password)
        }
        Command::Logout => build_logout_msg(&require_login(session)?),
        Command::Send { receiver, content } => {
            build_text_msg(&require_login(session)?, &receiver, &content)
        }
        Command::Broadcast { content } => build_broadcast_msg(&require_login(session)?, &content),
        Command::Group { group, content } => {
            build_group_msg(&require_login(session)?, &group, &content)
        }
        Command::History { target } => {
            build_history_request(&require_login(session)?, &target, None, None)
        }
        Command::Status => build_status_request(&require_login(session)?),
        // Handled by the input loop.
        Command::Help | Command::Quit => return None,
    };

    match built {
        Ok(frame) => Some(frame),
        Err(err) => {
            println!("!!! {err}");
            None
        }
    }
}

/// The authenticated username, or a printed nudge to log in first.
fn require_login(session: &SharedSession) -> Option<String> {
    if state_of(session) != ClientState::Authenticated {
        println!("!!! please login first");
        return None;
    }
    match username_of(session) {
        Some(username) => Some(username),
        None => {
            println!("!!! please login first");
            None
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
