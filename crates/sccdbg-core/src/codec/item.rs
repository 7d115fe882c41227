//! Record framing: item headers, items, data types, padding.
//!
//! A committed record occupies `[Item][Data][Pad][ItemHeader]`. Headers sit
//! at the *end* of their record and the metadata area grows backward from
//! the end of the cache, so walking from the newest header to the oldest
//! only ever needs the header's length field:
//!
//! ```text
//!   lower addresses                                   higher addresses
//!   ... | Item | wrapper | payload | pad | ItemHeader | Item | ... | ItemHeader |
//!         ^ item_from_header(h, len)               h ^
//! ```

use std::fmt;

use crate::error::{Result, SccError};
use crate::types::{TargetAddr, TargetArch};

/// `sizeof(ItemHeader)`: a single `u32` length with the stale flag in bit 0
pub const ITEM_HEADER_SIZE: u64 = 4;

/// `sizeof(Item)`: `dataLen: u32, dataType: u16, jvmId: u16`
pub const ITEM_SIZE: u64 = 8;

/// Smallest valid record: an `Item` plus its trailing `ItemHeader`
pub const MIN_RECORD_LEN: u32 = (ITEM_SIZE + ITEM_HEADER_SIZE) as u32;

const STALE_BIT: u32 = 1;

/// Length of a record, with the stale flag masked off
pub const fn item_length(raw: u32) -> u32
{
    raw & !STALE_BIT
}

/// Whether the stale flag is set
pub const fn is_stale(raw: u32) -> bool
{
    raw & STALE_BIT != 0
}

/// Set the stale flag, leaving the length bits untouched
pub const fn mark_stale(raw: u32) -> u32
{
    raw | STALE_BIT
}

/// Round `bytes` up to a multiple of `alignment`
///
/// Idempotent and monotone: `pad(pad(x, a), a) == pad(x, a)` and
/// `pad(x, a) >= x`.
///
/// ```rust
/// use sccdbg_core::codec::pad;
///
/// assert_eq!(pad(13, 4), 16);
/// assert_eq!(pad(16, 8), 16);
/// ```
pub const fn pad(bytes: u64, alignment: u64) -> u64
{
    if alignment == 0 || bytes % alignment == 0 {
        bytes
    } else {
        bytes + alignment - (bytes % alignment)
    }
}

/// Record payload alignment of the cache build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Alignment
{
    /// 4-byte alignment
    #[default]
    Word,
    /// 8-byte alignment
    Double,
}

impl Alignment
{
    /// Alignment in bytes
    pub const fn bytes(self) -> u64
    {
        match self {
            Self::Word => 4,
            Self::Double => 8,
        }
    }
}

impl std::str::FromStr for Alignment
{
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "4" | "word" => Ok(Self::Word),
            "8" | "double" => Ok(Self::Double),
            _ => Err(format!("Unknown alignment: {s}. Use 'word' (4) or 'double' (8)")),
        }
    }
}

/// Decoded `ItemHeader`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHeader
{
    /// Raw `itemLen` word including the stale bit
    pub raw: u32,
}

impl ItemHeader
{
    /// Decode from the four bytes at the header address
    pub fn decode(arch: &TargetArch, bytes: &[u8]) -> Self
    {
        Self { raw: arch.u32(bytes) }
    }

    /// Full backward span of the record
    pub const fn length(self) -> u32
    {
        item_length(self.raw)
    }

    /// Whether the record has been tombstoned
    pub const fn is_stale(self) -> bool
    {
        is_stale(self.raw)
    }
}

/// Record type tag stored in `Item.dataType`
///
/// Values are persisted in caches shared across VM versions, so the
/// numbering is append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum DataType
{
    RomClass = 1,
    Classpath = 2,
    Orphan = 3,
    CompiledMethod = 4,
    Scope = 5,
    ScopedRomClass = 6,
    CharArray = 7,
    ByteData = 8,
    UnindexedByteData = 9,
    Cachelet = 10,
    InvalidatedCompiledMethod = 11,
    AttachedData = 12,
    PrereqCache = 13,
}

/// Tag value of a never-committed record
pub const TYPE_UNINITIALIZED: u16 = 0;

impl DataType
{
    /// Every known tag in numeric order
    pub const ALL: [DataType; 13] = [
        Self::RomClass,
        Self::Classpath,
        Self::Orphan,
        Self::CompiledMethod,
        Self::Scope,
        Self::ScopedRomClass,
        Self::CharArray,
        Self::ByteData,
        Self::UnindexedByteData,
        Self::Cachelet,
        Self::InvalidatedCompiledMethod,
        Self::AttachedData,
        Self::PrereqCache,
    ];

    /// Display name used in command output
    pub const fn name(self) -> &'static str
    {
        match self {
            Self::RomClass => "ROMCLASS",
            Self::Classpath => "CLASSPATH",
            Self::Orphan => "ORPHAN",
            Self::CompiledMethod => "AOT",
            Self::Scope => "SCOPE",
            Self::ScopedRomClass => "SCOPEDROMCLASS",
            Self::ByteData => "BYTEDATA",
            Self::UnindexedByteData => "UNINDEXEDBYTEDATA",
            Self::CharArray => "CHARARRAY",
            Self::Cachelet => "CACHELET",
            Self::InvalidatedCompiledMethod => "INVALIDATEDAOT",
            Self::AttachedData => "ATTACHEDDATA",
            Self::PrereqCache => "PREREQCACHE",
        }
    }
}

impl TryFrom<u16> for DataType
{
    type Error = u16;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error>
    {
        Self::ALL.iter().copied().find(|t| *t as u16 == value).ok_or(value)
    }
}

impl fmt::Display for DataType
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// Decoded `Item`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item
{
    /// Forward span `Item + Data + Pad`
    pub data_len: u32,
    /// Raw tag (may be outside [`DataType`] for corrupt records)
    pub data_type: u16,
    /// Id of the VM that wrote the record
    pub jvm_id: u16,
}

impl Item
{
    /// Decode from the eight bytes at the item address
    pub fn decode(arch: &TargetArch, bytes: &[u8]) -> Self
    {
        Self {
            data_len: arch.u32(&bytes[0..4]),
            data_type: arch.u16(&bytes[4..6]),
            jvm_id: arch.u16(&bytes[6..8]),
        }
    }

    /// Encode into eight bytes
    pub fn encode(&self, arch: &TargetArch, bytes: &mut [u8])
    {
        arch.put_u32(&mut bytes[0..4], self.data_len);
        arch.put_u16(&mut bytes[4..6], self.data_type);
        arch.put_u16(&mut bytes[6..8], self.jvm_id);
    }

    /// Validated tag
    ///
    /// ## Errors
    ///
    /// `Decode` if the tag is uninitialized or unknown.
    pub fn kind(&self, address: TargetAddr) -> Result<DataType>
    {
        DataType::try_from(self.data_type)
            .map_err(|tag| SccError::decode("ShcItem", address, format!("unknown data type {tag}")))
    }

    /// Usable payload length (`dataLen - sizeof(Item)`)
    pub fn payload_len(&self, address: TargetAddr) -> Result<u32>
    {
        u64::from(self.data_len)
            .checked_sub(ITEM_SIZE)
            .map(|n| n as u32)
            .ok_or_else(|| SccError::decode("ShcItem", address, format!("dataLen {} below item size", self.data_len)))
    }
}

/// Reject record lengths that would stall or overrun a backward walk
///
/// `max_len` is the room left between the header and the lower bound of the
/// metadata area, plus the header itself.
pub fn validate_item_length(header_addr: TargetAddr, length: u32, max_len: u64) -> Result<()>
{
    if length < MIN_RECORD_LEN {
        return Err(SccError::decode(
            "ShcItemHdr",
            header_addr,
            format!("record length {length} below minimum {MIN_RECORD_LEN}"),
        ));
    }
    if u64::from(length) > max_len {
        return Err(SccError::decode(
            "ShcItemHdr",
            header_addr,
            format!("record length {length} exceeds remaining metadata {max_len}"),
        ));
    }
    Ok(())
}

/// `CCITEM`: start of the record (its `Item`) ending at `header_addr`
pub fn item_from_header(header_addr: TargetAddr, length: u32) -> Result<TargetAddr>
{
    if length < MIN_RECORD_LEN {
        return Err(SccError::decode(
            "ShcItemHdr",
            header_addr,
            format!("record length {length} below minimum {MIN_RECORD_LEN}"),
        ));
    }
    header_addr
        .checked_sub(u64::from(length) - ITEM_HEADER_SIZE)
        .ok_or_else(|| SccError::decode("ShcItemHdr", header_addr, "record extends below address zero"))
}

/// `CCITEMNEXT`: header of the previous (older) record
pub fn previous_item_address(header_addr: TargetAddr, length: u32) -> Result<TargetAddr>
{
    item_from_header(header_addr, length)?
        .checked_sub(ITEM_HEADER_SIZE)
        .ok_or_else(|| SccError::decode("ShcItemHdr", header_addr, "record extends below address zero"))
}

/// `ITEMDATA`: first byte after the `Item`
pub fn item_data(item_addr: TargetAddr) -> TargetAddr
{
    item_addr + ITEM_SIZE
}

/// `ITEMEND`: the header address of the record starting at `item_addr`
pub fn item_end(item_addr: TargetAddr, data_len: u32) -> TargetAddr
{
    item_addr + u64::from(data_len)
}
