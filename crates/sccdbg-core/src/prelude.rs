//! Common module for library exports

pub use crate::codec::{CacheHeader, CacheRecord, DataType, RecordBody, ShrOffset};
pub use crate::commands::{BufferConsole, CommandContext, CommandRegistry, Console};
pub use crate::config::{LayerPolicy, TargetConfig};
pub use crate::error::{Result, SccError};
pub use crate::readers::{CacheLayer, CacheLocation};
pub use crate::target::{CommandScope, MemoryImage, Session, TargetMemory};
pub use crate::types::{MemoryRegion, TargetAddr, TargetArch};
pub use crate::walk::{MetadataWalker, PoolWalker};
