//! # Types
//!
//! Target-independent types used throughout the inspector.
//!
//! These types keep target memory and local memory apart: a [`TargetAddr`]
//! can be added to and compared, but only a [`Session`](crate::target::Session)
//! can turn it into bytes.

pub mod address;
pub mod arch;
pub mod region;

// Re-export all public types
pub use address::TargetAddr;
pub use arch::{Endianness, PointerWidth, TargetArch};
pub use region::MemoryRegion;
