// Server configuration: command-line flags with environment fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};

use crate::logging::{LogConfig, LogLevel};

#[derive(Debug, Clone, Parser)]
#[command(name = "ledger-server", about = "Account balance ledger HTTP service")]
pub struct Config {
    /// Address to bind
    #[arg(long, env = "LEDGER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "LEDGER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// SQLite database file (created if missing)
    #[arg(long, env = "LEDGER_DB_PATH", default_value = "ledger.db")]
    pub db_path: PathBuf,

    /// Upper bound on a single store-backed request
    #[arg(long, env = "LEDGER_REQUEST_TIMEOUT_MS", default_value_t = 5000)]
    pub request_timeout_ms: u64,

    /// DEBUG, INFO, WARNING, ERROR or CRITICAL
    #[arg(long, env = "LOG_LEVEL", default_value = "INFO")]
    pub log_level: LogLevel,

    #[arg(long, env = "LOG_CONSOLE", default_value_t = true, action = ArgAction::Set)]
    pub log_console: bool,

    #[arg(long, env = "LOG_FILE", default_value_t = true, action = ArgAction::Set)]
    pub log_file: bool,

    /// Defaults to logs/application.log next to the executable
    #[arg(long, env = "LOG_PATH")]
    pub log_path: Option<PathBuf>,
}

impl Config {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn log_config(&self) -> Result<LogConfig> {
        let file_path = if self.log_file {
            match &self.log_path {
                Some(path) => Some(path.clone()),
                None => Some(default_log_path()?),
            }
        } else {
            None
        };

        Ok(LogConfig {
            level: self.log_level,
            to_console: self.log_console,
            file_path,
        })
    }
}

fn default_log_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to get executable path")?;
    let dir = exe
        .parent()
        .context("Executable path has no parent directory")?;
    Ok(dir.join("logs").join("application.log"))
}
