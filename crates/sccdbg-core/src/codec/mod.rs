//! # Cache Item Codec
//!
//! Pure encode/decode of the shared cache record format. Nothing here reads
//! the target: callers fetch bytes through a [`Session`](crate::target::Session)
//! and hand them in, and address arithmetic comes back out as
//! [`TargetAddr`](crate::types::TargetAddr)s for the caller to fetch.

pub mod header;
pub mod item;
pub mod offset;
pub mod record;

pub use header::{cache_header_layout, CacheHeader};
pub use item::{
    is_stale, item_data, item_end, item_from_header, item_length, mark_stale, pad, previous_item_address,
    validate_item_length, Alignment, DataType, Item, ItemHeader, ITEM_HEADER_SIZE, ITEM_SIZE, MIN_RECORD_LEN,
    TYPE_UNINITIALIZED,
};
pub use offset::ShrOffset;
pub use record::{
    decode_inline_utf8, decode_record, AttachedDataWrapper, ByteDataWrapper, CacheRecord, CacheletWrapper,
    ClasspathKind, ClasspathWrapper, CompiledMethodWrapper, RecordBody, RecordLayouts, RomClassWrapper,
    ATTACHED_DATA_TYPE_JITHINT, ATTACHED_DATA_TYPE_JITPROFILE,
};
