//! # sccdbg-core
//!
//! Out-of-process inspection of a JVM's shared class cache.
//!
//! This crate reads a target address space (a live process, an ELF core
//! file, or a raw memory image) without ever dereferencing a target pointer
//! locally. On top of that single primitive it provides:
//! - The cache record codec (`[Item][Wrapper][Data][Pad][ItemHeader]`)
//! - Walkers over cache metadata, `J9Pool` puddles and AVL trees
//! - Readers for VM structures (classes, methods, ROM classes, JIT metadata)
//! - A small command surface for interactive use
//!
//! ## Layering
//!
//! ```text
//! commands ──► readers ──► walk ──► codec
//!                 │          │
//!                 └──► target::Session ──► TargetMemory (image / core / process)
//! ```
//!
//! ## Why unsafe code is needed
//!
//! Reading a live process goes through `process_vm_readv(2)`, a raw system
//! call. That single call is wrapped in a safe API in `target::process`.

#![allow(unsafe_code)] // process_vm_readv for live targets

pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod layout;
pub mod prelude;
pub mod readers;
pub mod target;
pub mod types;
pub mod walk;

// Re-export commonly used types
pub use commands::{CommandContext, CommandRegistry, Console};
pub use config::{LayerPolicy, TargetConfig};
pub use error::{Result, SccError};
pub use target::{Session, TargetMemory};
pub use types::TargetAddr;
