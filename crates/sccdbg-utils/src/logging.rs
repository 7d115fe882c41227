//! # Logging Utilities
//!
//! Logging for the `sccdbg` tools using `tracing`.
//!
//! Command output goes to stdout, so every log line is written to stderr
//! (and optionally to a file). This keeps `sccdbg ... > out.txt` clean.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sccdbg_utils::init_logging;
//!
//! // Initialize from the environment (RUST_LOG, SCCDBG_LOG_FORMAT, SCCDBG_LOG_FILE)
//! init_logging()?;
//! sccdbg_utils::info!("inspector started");
//! # Ok::<(), sccdbg_utils::LoggingError>(())
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Log filter (e.g. `RUST_LOG=debug`, `RUST_LOG=sccdbg_core::walk=trace`)
//! - `SCCDBG_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `SCCDBG_LOG_FILE`: Optional log file; a directory gets a dated `sccdbg.log` inside it

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs, io};

use chrono::Utc;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const FORMAT_VAR: &str = "SCCDBG_LOG_FORMAT";
const FILE_VAR: &str = "SCCDBG_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        if s.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else if s.eq_ignore_ascii_case("pretty") || s.eq_ignore_ascii_case("text") {
            Ok(Self::Pretty)
        } else {
            Err(format!("'{s}' is not a log format (expected pretty or json)"))
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Accepts the `tracing` level names plus `err`, `warning` and `dbg`
impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let canonical = match s.to_ascii_lowercase().as_str() {
            "err" => "error".to_string(),
            "warning" => "warn".to_string(),
            "dbg" => "debug".to_string(),
            other => other.to_string(),
        };
        let level = Level::from_str(&canonical).map_err(|_| format!("'{s}' is not a log level (expected error..trace)"))?;
        Ok([Self::Error, Self::Warn, Self::Info, Self::Debug]
            .into_iter()
            .find(|candidate| Level::from(*candidate) == level)
            .unwrap_or(Self::Trace))
    }
}

/// Everything needed to install the subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings
{
    /// Overrides `RUST_LOG` when set
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    /// Extra file output
    pub file: Option<PathBuf>,
}

impl Default for LogSettings
{
    fn default() -> Self
    {
        Self {
            level: None,
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

impl LogSettings
{
    /// Read `SCCDBG_LOG_FORMAT` and `SCCDBG_LOG_FILE`
    ///
    /// ## Errors
    ///
    /// `InvalidFormat` if `SCCDBG_LOG_FORMAT` is set to something unknown.
    pub fn from_env() -> Result<Self, LoggingError>
    {
        Self::from_values(env::var(FORMAT_VAR).ok().as_deref(), env::var(FILE_VAR).ok().as_deref())
    }

    fn from_values(format: Option<&str>, file: Option<&str>) -> Result<Self, LoggingError>
    {
        let format = match format {
            Some(text) if !text.is_empty() => LogFormat::from_str(text).map_err(LoggingError::InvalidFormat)?,
            _ => LogFormat::Pretty,
        };
        let file = file.filter(|f| !f.is_empty()).map(PathBuf::from);
        Ok(Self {
            level: None,
            format,
            file,
        })
    }

    #[must_use]
    pub fn with_level(mut self, level: Option<LogLevel>) -> Self
    {
        self.level = level.or(self.level);
        self
    }

    fn filter(&self) -> EnvFilter
    {
        match self.level {
            Some(level) => EnvFilter::new(Level::from(level).to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::WARN.to_string())),
        }
    }
}

/// Initialize logging from the environment
///
/// Defaults to `warn` so interactive sessions only show problems.
///
/// ## Errors
///
/// Fails when a subscriber is already installed, when `SCCDBG_LOG_FORMAT`
/// names an unknown format, or when the log file cannot be opened.
pub fn init_logging() -> Result<(), LoggingError>
{
    init_logging_with(&LogSettings::from_env()?)
}

/// Initialize logging with an explicit level and format
///
/// ## Errors
///
/// Returns an error if logging is already initialized or file logging fails.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    init_logging_with(&LogSettings {
        level: Some(level),
        format,
        file: None,
    })
}

/// Resolve where file logs go: a directory gets a dated file name
fn log_file_path(path: &Path) -> PathBuf
{
    if path.is_dir() {
        let today = Utc::now().format("%Y-%m-%d");
        path.join(format!("{today}-sccdbg.log"))
    } else {
        path.to_path_buf()
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// One `fmt` layer; `ansi` is only honoured for pretty output
fn build_layer<W>(writer: W, ansi: bool, format: LogFormat, filter: EnvFilter) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_timer(ChronoUtc::rfc_3339())
        .with_target(true)
        .with_file(true)
        .with_line_number(true);
    match format {
        LogFormat::Pretty => base.with_ansi(ansi).with_filter(filter).boxed(),
        LogFormat::Json => base.json().with_current_span(true).with_filter(filter).boxed(),
    }
}

fn file_layer(path: &Path, format: LogFormat, filter: EnvFilter) -> Result<BoxedLayer, LoggingError>
{
    let path = log_file_path(path);
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let file_name = path.file_name().unwrap_or_default();
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    // The writer thread must outlive every event; the subscriber is never torn down.
    std::mem::forget(guard);
    Ok(build_layer(writer, false, format, filter))
}

/// Install the global subscriber described by `settings`
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the log file
/// cannot be created.
pub fn init_logging_with(settings: &LogSettings) -> Result<(), LoggingError>
{
    let mut layers = vec![build_layer(io::stderr, true, settings.format, settings.filter())];
    if let Some(file) = &settings.file {
        layers.push(file_layer(file, settings.format, settings.filter())?);
    }
    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("bad SCCDBG_LOG_FORMAT: {0}")]
    InvalidFormat(String),

    /// A global subscriber is already installed
    #[error("cannot install log subscriber: {0}")]
    InitializationFailed(String),

    #[error("cannot open log file: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("text").unwrap(), LogFormat::Pretty);
        assert!(LogFormat::from_str("xml").is_err());
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("dbg").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(LogLevel::from_str("loud").is_err());
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_settings_from_values()
    {
        let settings = LogSettings::from_values(Some("json"), Some("/tmp/sccdbg.log")).unwrap();
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.file, Some(PathBuf::from("/tmp/sccdbg.log")));

        let defaults = LogSettings::from_values(None, Some("")).unwrap();
        assert_eq!(defaults, LogSettings::default());

        assert!(matches!(
            LogSettings::from_values(Some("yaml"), None),
            Err(LoggingError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_explicit_level_wins()
    {
        let settings = LogSettings::default().with_level(Some(LogLevel::Debug));
        assert_eq!(settings.level, Some(LogLevel::Debug));
        assert_eq!(settings.with_level(None).level, Some(LogLevel::Debug));
    }

    #[test]
    fn test_log_file_path_keeps_plain_files()
    {
        let path = Path::new("/nonexistent-dir/trace.log");
        assert_eq!(log_file_path(path), path.to_path_buf());
    }
}
