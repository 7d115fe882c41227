//! # Error Types
//!
//! General error handling for target inspection.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

use crate::types::TargetAddr;

/// Main error type for out-of-process inspection
///
/// Every read of the target can fail: the remote process may have exited,
/// a core file may be truncated, or an address may be garbage taken from a
/// corrupted structure. None of these are bugs in the tool, so they are
/// reported through this enum instead of panicking.
///
/// ## Error Categories
///
/// 1. **Target unreachable**: `TargetUnreachable` (address unmapped, process gone)
/// 2. **Partial read**: `ShortRead` (fewer bytes than requested came back)
/// 3. **Decode failure**: `Decode` (bytes arrived but break a structural rule)
/// 4. **Usage errors**: `Usage` (malformed command arguments, reported before any read)
/// 5. **Caller errors**: `InvalidArgument` (bad API input such as a zero-length read)
/// 6. **I/O errors**: `Io` (opening core files, `/proc` maps, raw images)
///
/// A search that completes without finding anything is *not* an error.
/// Searches return `Ok(None)` for that case so callers can tell a genuine
/// miss apart from a failed read.
#[derive(Error, Debug)]
pub enum SccError
{
    /// The address is not mapped in the target (or the target is gone)
    #[error("Target address {address} is not readable ({len} bytes requested)")]
    TargetUnreachable
    {
        /// Address that could not be read
        address: TargetAddr,
        /// Number of bytes requested
        len: usize,
    },

    /// The target returned fewer bytes than requested
    ///
    /// Typically the read straddled the end of a mapped region or the end of
    /// a truncated core file segment.
    #[error("Short read at {address}: wanted {requested} bytes, got {actual}")]
    ShortRead
    {
        /// Address of the read
        address: TargetAddr,
        /// Bytes requested
        requested: usize,
        /// Bytes actually copied
        actual: usize,
    },

    /// Bytes were read but violate a structural rule
    ///
    /// Examples:
    /// - A record tag outside the known data type enumeration
    /// - A record length of zero or longer than the remaining metadata
    /// - An eyecatcher mismatch or a pool link pointing nowhere
    #[error("Failed to decode {what} at {address}: {reason}")]
    Decode
    {
        /// Name of the structure being decoded
        what: &'static str,
        /// Target address of the structure
        address: TargetAddr,
        /// Description of the violated rule
        reason: String,
    },

    /// Malformed command argument text
    #[error("Usage: {0}")]
    Usage(String),

    /// Invalid argument passed to an API function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error (opening core files, reading `/proc`, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SccError
{
    /// Build a [`SccError::Decode`] error.
    pub fn decode(what: &'static str, address: TargetAddr, reason: impl Into<String>) -> Self
    {
        Self::Decode {
            what,
            address,
            reason: reason.into(),
        }
    }

    /// Whether the failure came from the target boundary (categories a and b).
    #[must_use]
    pub const fn is_read_failure(&self) -> bool
    {
        matches!(self, Self::TargetUnreachable { .. } | Self::ShortRead { .. })
    }

    /// The target address involved in the failure, if any.
    #[must_use]
    pub const fn address(&self) -> Option<TargetAddr>
    {
        match self {
            Self::TargetUnreachable { address, .. } | Self::ShortRead { address, .. } | Self::Decode { address, .. } => {
                Some(*address)
            }
            _ => None,
        }
    }
}

/// Convenience type alias for `Result<T, SccError>`
///
/// ```rust
/// use sccdbg_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, SccError>;
