use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pipechat_server::{ServerConfig, ServerState, net::run_server};

#[tokio::main]
async fn main() -> ExitCode {
    let mut config = match ServerConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let args: Vec<String> = env::args().collect();
    if let Some(port_arg) = args.get(1) {
        match port_arg.parse::<u16>() {
            Ok(port) => config.port = port,
            Err(_) => {
                eprintln!("Invalid port: {port_arg}");
                return ExitCode::FAILURE;
            }
        }
    }

    init_logging(&config.log_path);
    println!("🔧 Configuration Loaded");
    print_server_info(&config);

    if config.enable_encryption {
        warn!("enable_encryption is set but TLS is not supported in this build");
    }

    let state = ServerState::new(config.clone());
    state.users.lock().unwrap().init_defaults();
    info!("server starting");

    let listener = match TcpListener::bind(config.get_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.get_addr(), error = %e, "failed to bind");
            eprintln!("Failed to bind {}: {e}", config.get_addr());
            return ExitCode::FAILURE;
        }
    };
    println!("🚀 Server listening on {}", config.get_addr());

    if let Err(e) = run_server(listener, state, shutdown_signal()).await {
        error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }

    info!("server stopped");
    ExitCode::SUCCESS
}

fn print_server_info(config: &ServerConfig) {
    println!("=== Message Forward Server ===");
    println!("Port: {}", config.port);
    println!("Max clients: {}", config.max_clients);
    println!("Log file: {}", config.log_path);
    println!("Press Ctrl+C to stop the server\n");
}

/// Log to the configured file (append, no colors) or to stdout when no
/// path is set. `RUST_LOG` overrides the default `info` filter.
fn init_logging(log_path: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_path.is_empty() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
        return;
    }

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .try_init();
        }
        Err(e) => {
            eprintln!("Failed to open log file {log_path}: {e}");
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .try_init();
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to install ctrl-c handler");
                }
                return;
            }
        };
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to install ctrl-c handler");
                }
            }
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install ctrl-c handler");
        }
    }
}
