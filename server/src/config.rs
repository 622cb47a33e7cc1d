//! Server configuration: TOML file first, command-line flags on top.

use crate::error::ConfigError;
use clap::Parser;
use serde::Deserialize;
use shared::{DEFAULT_KEEP_ALIVE_SECS, DEFAULT_PORT};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_USER_STORE: &str = "users.json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Folder holding game module artifacts; unset means every built-in
    /// module counts as installed
    pub module_dir: Option<PathBuf>,
    /// Shell command that rebuilds the module artifacts
    pub build_command: Option<String>,
    pub user_store: PathBuf,
    pub keep_alive: bool,
    pub keep_alive_interval_secs: u64,
    pub anonymous_login: bool,
    pub multi_login: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            module_dir: None,
            build_command: None,
            user_store: PathBuf::from(DEFAULT_USER_STORE),
            keep_alive: true,
            keep_alive_interval_secs: DEFAULT_KEEP_ALIVE_SECS,
            anonymous_login: false,
            multi_login: false,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs.max(1))
    }
}

/// Command line arguments
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long)]
    pub host: Option<String>,
    /// Server port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Folder holding game module artifacts
    #[arg(long)]
    pub module_dir: Option<PathBuf>,
    /// Shell command run by the `rebuild` console command
    #[arg(long)]
    pub build_command: Option<String>,
    /// JSON file holding durable users
    #[arg(long)]
    pub user_store: Option<PathBuf>,
    /// Seconds between keep-alive probes
    #[arg(long)]
    pub keep_alive_interval: Option<u64>,
    /// Disable the keep-alive monitor
    #[arg(long)]
    pub no_keep_alive: bool,
    /// Skip credential checks and mint a temporary identity per login
    #[arg(long)]
    pub anonymous_login: bool,
    /// Allow one user to be logged in more than once
    #[arg(long)]
    pub multi_login: bool,
}

impl Args {
    /// Loads the configuration file, if any, and applies the flags on top.
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.module_dir.is_some() {
            config.module_dir = self.module_dir;
        }
        if self.build_command.is_some() {
            config.build_command = self.build_command;
        }
        if let Some(path) = self.user_store {
            config.user_store = path;
        }
        if let Some(secs) = self.keep_alive_interval {
            config.keep_alive_interval_secs = secs;
        }
        if self.no_keep_alive {
            config.keep_alive = false;
        }
        if self.anonymous_login {
            config.anonymous_login = true;
        }
        if self.multi_login {
            config.multi_login = true;
        }
        Ok(config)
    }
}
