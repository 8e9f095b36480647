// Operation logging.
//
// Components never reach for a global logger; each one holds an
// `Arc<dyn OperationLog>` handed to it at construction. The process-wide
// `tracing` subscriber is installed once by init() and flushed when the
// returned LogGuard is dropped.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as fmt_layer, EnvFilter};

// ============================================================================
// OPERATION LOG
// ============================================================================

/// Outcome reported for one step of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Start,
    Success,
    Warning,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Start => "start",
            Outcome::Success => "success",
            Outcome::Warning => "warning",
            Outcome::Error => "error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured event sink keyed by operation name and outcome.
///
/// Implementations must not block the caller and must swallow their own
/// failures.
pub trait OperationLog: Send + Sync {
    fn log(&self, operation: &str, outcome: Outcome, fields: Value);
}

pub type SharedLog = Arc<dyn OperationLog>;

/// `OperationLog` backed by the `tracing` subscriber installed at startup.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl TracingLog {
    pub fn shared() -> SharedLog {
        Arc::new(TracingLog)
    }
}

impl OperationLog for TracingLog {
    fn log(&self, operation: &str, outcome: Outcome, fields: Value) {
        let result = outcome.as_str();
        match outcome {
            Outcome::Start => {
                tracing::debug!(operation, result, fields = %fields, "Operation started")
            }
            Outcome::Success => {
                tracing::info!(operation, result, fields = %fields, "Operation completed successfully")
            }
            Outcome::Warning => {
                tracing::warn!(operation, result, fields = %fields, "Operation completed with warnings")
            }
            Outcome::Error => {
                tracing::error!(operation, result, fields = %fields, "Operation failed")
            }
        }
    }
}

// ============================================================================
// SUBSCRIBER SETUP
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`. There is no level above error
    /// in `tracing`, so CRITICAL keeps only error events.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub to_console: bool,
    /// File output is disabled when `None`
    pub file_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            to_console: true,
            file_path: None,
        }
    }
}

/// Keeps the background file writer alive; dropping it flushes pending lines.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the process-wide subscriber. `RUST_LOG` wins over `config.level`.
///
/// Calling this twice fails because a global subscriber is already set.
pub fn init(config: &LogConfig) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));

    let console = config
        .to_console
        .then(|| fmt_layer::layer().with_target(false));

    let mut file_guard = None;
    let file = match &config.file_path {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file_name = path
                .file_name()
                .context("Log path has no file name")?;

            let appender = tracing_appender::rolling::never(&dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            file_guard = Some(guard);
            Some(
                fmt_layer::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuard { _file: file_guard })
}
