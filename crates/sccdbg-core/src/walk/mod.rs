//! # Walkers
//!
//! Structure-agnostic traversal of target-resident collections. Walkers
//! hand out target addresses and leave interpretation to the readers.
//!
//! All walkers are bounded: a corrupt or racing target can make them stop
//! early with an error, never loop forever.

pub mod avl;
pub mod metadata;
pub mod pool;

pub use avl::{avl_search, AvlComparator, IdentityComparator, RangeComparator, AVL_BALANCE_MASK, MAX_AVL_DEPTH};
pub use metadata::{MetadataCursor, MetadataEntry, MetadataWalker};
pub use pool::{PoolHeader, PoolLayouts, PoolWalker};
