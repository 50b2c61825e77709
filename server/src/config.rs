use std::{env, error::Error, path::PathBuf};

use config::{Config, File};
use serde::Deserialize;

/// Configuration for the server
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Hostname or IP address to bind
    pub host: String,

    /// Port number for the server
    pub port: u16,

    /// Connection cap; accepts above it are refused
    pub max_clients: usize,

    /// Idle timeout in seconds, 0 disables the sweep
    pub timeout_seconds: u64,

    /// Log file path; empty logs to stdout
    pub log_path: String,

    /// Gate commands behind authentication
    pub require_auth: bool,

    /// Accepted for config compatibility, ignored in this build
    pub enable_encryption: bool,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_clients: 100,
            timeout_seconds: 300,
            log_path: "server.log".to_string(),
            require_auth: true,
            enable_encryption: false,
        }
    }
}

impl ServerConfig {
    /// Load the configuration, layering an optional `Config.toml` in the
    /// working directory over the defaults.
    pub fn load() -> Result<Self, Box<dyn Error>> {
        let root_dir: PathBuf = env::current_dir()?;
        let config_path: PathBuf = root_dir.join("Config.toml");

        if !config_path.exists() {
            return Ok(ServerConfig::default());
        }

        let cfg = Config::builder()
            .add_source(File::from(config_path))
            .build()?;

        let svr_cfg = cfg.try_deserialize::<ServerConfig>()?;
        Ok(svr_cfg)
    }

    /// The server address as a string
    pub fn get_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
