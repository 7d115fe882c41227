//! # sccdbg utilities
//!
//! Shared helpers for the `sccdbg` workspace, currently the logging setup
//! built on `tracing`.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with, init_logging_with_level, LogFormat, LogLevel, LogSettings, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
