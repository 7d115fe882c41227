//! # Target Access
//!
//! The boundary between local memory and the inspected address space.
//!
//! [`TargetMemory`] is the single primitive every other layer is built on:
//! "copy N bytes from target address A, or fail". Three backends implement
//! it:
//!
//! - [`MemoryImage`]: sparse in-memory regions (raw cache dumps, tests)
//! - [`CoreFile`]: `PT_LOAD` segments of an ELF core file
//! - [`LiveProcess`]: a running Linux process via `process_vm_readv`
//!
//! On top sits [`Session`], which owns the per-command shadow cache and the
//! typed accessors.

pub mod core;
pub mod image;
#[cfg(target_os = "linux")]
pub mod process;
pub mod session;

pub use self::core::CoreFile;
pub use image::MemoryImage;
#[cfg(target_os = "linux")]
pub use process::LiveProcess;
pub use session::{CommandScope, Session, Shadow, Snapshot};

use crate::error::Result;
use crate::types::{MemoryRegion, TargetAddr};

/// Raw read access to a target address space
///
/// Implementations never interpret the bytes. They must not panic on any
/// address: unmapped memory is reported as
/// [`SccError::TargetUnreachable`](crate::error::SccError::TargetUnreachable).
pub trait TargetMemory
{
    /// Copy bytes starting at `addr` into `buf`
    ///
    /// Returns the number of bytes actually copied, which may be less than
    /// `buf.len()` when the read runs off the end of a mapping.
    ///
    /// ## Errors
    ///
    /// - `TargetUnreachable`: nothing is mapped at `addr`
    /// - `Io`: the backend failed (process exited, permission denied)
    fn read_into(&self, addr: TargetAddr, buf: &mut [u8]) -> Result<usize>;

    /// Known readable regions, lowest address first
    ///
    /// May be empty when the backend cannot enumerate its mappings.
    fn regions(&self) -> Vec<MemoryRegion>;

    /// Human-readable description of the target (for banners and logs)
    fn description(&self) -> String;
}
