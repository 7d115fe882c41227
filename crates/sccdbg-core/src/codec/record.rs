//! Validating decode of a whole cache record into a typed sum.
//!
//! Every record kind has a fixed-size wrapper right after its `Item`. The
//! wrappers are described once per ABI in [`RecordLayouts`]; [`decode_record`]
//! picks the wrapper by tag and checks that every length it carries stays
//! inside the record.

use crate::codec::item::{self, DataType, Item, ItemHeader, ITEM_SIZE};
use crate::codec::offset::ShrOffset;
use crate::error::{Result, SccError};
use crate::layout::{Abi, FieldKind, StructLayout, StructView};
use crate::types::TargetAddr;

/// Classpath item kinds stored in `ClasspathItem.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClasspathKind
{
    Classpath,
    Url,
    Token,
}

impl ClasspathKind
{
    fn from_raw(raw: u16) -> Option<Self>
    {
        match raw {
            1 => Some(Self::Classpath),
            2 => Some(Self::Url),
            4 => Some(Self::Token),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str
    {
        match self {
            Self::Classpath => "CLASSPATH",
            Self::Url => "URL",
            Self::Token => "TOKEN",
        }
    }
}

/// Attached data kinds stored in `AttachedDataWrapper.type`
pub const ATTACHED_DATA_TYPE_JITPROFILE: u16 = 1;
pub const ATTACHED_DATA_TYPE_JITHINT: u16 = 2;

/// Wrapper layouts for one ABI
#[derive(Debug, Clone)]
pub struct RecordLayouts
{
    pub abi: Abi,
    pub classpath: StructLayout,
    pub classpath_item: StructLayout,
    pub rom_class: StructLayout,
    pub scoped_rom_class: StructLayout,
    pub orphan: StructLayout,
    pub compiled_method: StructLayout,
    pub byte_data: StructLayout,
    pub cachelet: StructLayout,
    pub attached_data: StructLayout,
}

impl RecordLayouts
{
    pub fn new(abi: Abi) -> Self
    {
        use FieldKind::{ShrOffset as Shr, I16, I32, I64, U16, U32, U8};

        let rom_fields = [("cpOffset", Shr), ("cpeIndex", I16), ("romClassOffset", Shr), ("timestamp", I64)];
        let mut scoped_fields = rom_fields.to_vec();
        scoped_fields.extend([("modContextOffset", Shr), ("partitionOffset", Shr)]);

        Self {
            abi,
            classpath: StructLayout::build("ClasspathWrapper", &abi, &[("staleFromIndex", I16), ("classpathItemSize", U32)]),
            classpath_item: StructLayout::build(
                "ClasspathItem",
                &abi,
                &[("itemsAdded", I16), ("maxItems", I16), ("type", U16), ("flags", U16)],
            ),
            rom_class: StructLayout::build("ROMClassWrapper", &abi, &rom_fields),
            scoped_rom_class: StructLayout::build("ScopedROMClassWrapper", &abi, &scoped_fields),
            orphan: StructLayout::build("OrphanWrapper", &abi, &[("romClassOffset", Shr)]),
            compiled_method: StructLayout::build(
                "CompiledMethodWrapper",
                &abi,
                &[("romMethodOffset", Shr), ("dataLength", U32), ("codeLength", U32)],
            ),
            byte_data: StructLayout::build(
                "ByteDataWrapper",
                &abi,
                &[
                    ("dataLength", U32),
                    ("tokenOffset", Shr),
                    ("externalBlockOffset", Shr),
                    ("dataType", U8),
                    ("inPrivateUse", U8),
                    ("privateOwnerId", U16),
                ],
            ),
            cachelet: StructLayout::build(
                "CacheletWrapper",
                &abi,
                &[
                    ("dataOffset", Shr),
                    ("dataLength", U32),
                    ("numHints", U32),
                    ("numSegments", U32),
                    ("segmentsOffset", Shr),
                ],
            ),
            attached_data: StructLayout::build(
                "AttachedDataWrapper",
                &abi,
                &[
                    ("cacheOffset", Shr),
                    ("dataLength", U32),
                    ("type", U16),
                    ("updateCount", U16),
                    ("corrupt", I32),
                ],
            ),
        }
    }

    /// Wrapper layout for a record kind, `None` for wrapper-less kinds
    pub fn wrapper(&self, kind: DataType) -> Option<&StructLayout>
    {
        match kind {
            DataType::RomClass => Some(&self.rom_class),
            DataType::ScopedRomClass => Some(&self.scoped_rom_class),
            DataType::Orphan => Some(&self.orphan),
            DataType::Classpath => Some(&self.classpath),
            DataType::CompiledMethod | DataType::InvalidatedCompiledMethod => Some(&self.compiled_method),
            DataType::ByteData => Some(&self.byte_data),
            DataType::Cachelet => Some(&self.cachelet),
            DataType::AttachedData => Some(&self.attached_data),
            DataType::Scope | DataType::PrereqCache | DataType::UnindexedByteData | DataType::CharArray => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomClassWrapper
{
    pub cp_offset: ShrOffset,
    pub cpe_index: i16,
    pub rom_class_offset: ShrOffset,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClasspathWrapper
{
    pub stale_from_index: i16,
    pub item_size: u32,
    pub items_added: i16,
    pub max_items: i16,
    pub kind: ClasspathKind,
    pub flags: u16,
    /// Address of the embedded `ClasspathItem`
    pub item_addr: TargetAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledMethodWrapper
{
    pub rom_method_offset: ShrOffset,
    pub data_length: u32,
    pub code_length: u32,
    /// First byte of the method data (right after the wrapper)
    pub data_addr: TargetAddr,
    /// First byte of the code (right after the data)
    pub code_addr: TargetAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteDataWrapper
{
    pub data_length: u32,
    pub token_offset: ShrOffset,
    pub external_block_offset: ShrOffset,
    pub data_type: u8,
    pub in_private_use: bool,
    pub private_owner_id: u16,
    pub data_addr: TargetAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheletWrapper
{
    pub data_offset: ShrOffset,
    pub data_length: u32,
    pub num_hints: u32,
    pub num_segments: u32,
    pub segments_offset: ShrOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachedDataWrapper
{
    pub cache_offset: ShrOffset,
    pub data_length: u32,
    pub data_type: u16,
    pub update_count: u16,
    pub corrupt: i32,
    pub data_addr: TargetAddr,
}

/// Typed payload of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody
{
    RomClass(RomClassWrapper),
    ScopedRomClass
    {
        rom: RomClassWrapper,
        mod_context_offset: ShrOffset,
        partition_offset: ShrOffset,
    },
    Orphan
    {
        rom_class_offset: ShrOffset,
    },
    Classpath(ClasspathWrapper),
    CompiledMethod(CompiledMethodWrapper),
    InvalidatedCompiledMethod(CompiledMethodWrapper),
    Scope(String),
    PrereqCache(String),
    ByteData(ByteDataWrapper),
    UnindexedByteData
    {
        length: u32,
    },
    CharArray
    {
        length: u32,
    },
    Cachelet(CacheletWrapper),
    AttachedData(AttachedDataWrapper),
}

impl RecordBody
{
    pub fn kind(&self) -> DataType
    {
        match self {
            Self::RomClass(_) => DataType::RomClass,
            Self::ScopedRomClass { .. } => DataType::ScopedRomClass,
            Self::Orphan { .. } => DataType::Orphan,
            Self::Classpath(_) => DataType::Classpath,
            Self::CompiledMethod(_) => DataType::CompiledMethod,
            Self::InvalidatedCompiledMethod(_) => DataType::InvalidatedCompiledMethod,
            Self::Scope(_) => DataType::Scope,
            Self::PrereqCache(_) => DataType::PrereqCache,
            Self::ByteData(_) => DataType::ByteData,
            Self::UnindexedByteData { .. } => DataType::UnindexedByteData,
            Self::CharArray { .. } => DataType::CharArray,
            Self::Cachelet(_) => DataType::Cachelet,
            Self::AttachedData(_) => DataType::AttachedData,
        }
    }

    /// Offset of the ROM class this record refers to, if any
    pub fn rom_class_offset(&self) -> Option<ShrOffset>
    {
        match self {
            Self::RomClass(w) | Self::ScopedRomClass { rom: w, .. } => Some(w.rom_class_offset),
            Self::Orphan { rom_class_offset } => Some(*rom_class_offset),
            _ => None,
        }
    }
}

/// A decoded, validated cache record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord
{
    /// Address of the trailing `ItemHeader`
    pub header_addr: TargetAddr,
    /// Address of the `Item`
    pub item_addr: TargetAddr,
    pub header: ItemHeader,
    pub item: Item,
    pub body: RecordBody,
}

impl CacheRecord
{
    pub fn kind(&self) -> DataType
    {
        self.body.kind()
    }

    pub fn is_stale(&self) -> bool
    {
        self.header.is_stale()
    }

    /// First byte after the `Item` (`ITEMDATA`)
    pub fn data_addr(&self) -> TargetAddr
    {
        item::item_data(self.item_addr)
    }
}

/// Decode the record whose header sits at `header_addr`.
///
/// `bytes` holds the forward span of the record starting at its `Item`
/// (`header.length() - sizeof(ItemHeader)` bytes).
///
/// ## Errors
///
/// `Decode` when the tag is unknown or uninitialized, `dataLen` disagrees
/// with the header, a wrapper does not fit in the record, or a length stored
/// in a wrapper runs past the record end.
pub fn decode_record(layouts: &RecordLayouts, header_addr: TargetAddr, header: ItemHeader, bytes: &[u8]) -> Result<CacheRecord>
{
    let abi = layouts.abi;
    let item_addr = item::item_from_header(header_addr, header.length())?;
    let forward = (u64::from(header.length()) - item::ITEM_HEADER_SIZE) as usize;
    if bytes.len() < forward {
        return Err(SccError::decode(
            "ShcItem",
            item_addr,
            format!("buffer holds {} bytes, record spans {forward}", bytes.len()),
        ));
    }

    let item = Item::decode(&abi.arch, bytes);
    if item.data_len as usize != forward {
        return Err(SccError::decode(
            "ShcItem",
            item_addr,
            format!("dataLen {} disagrees with header length {}", item.data_len, header.length()),
        ));
    }
    let kind = item.kind(item_addr)?;
    let payload_len = item.payload_len(item_addr)? as usize;
    let payload = &bytes[ITEM_SIZE as usize..forward];
    let data_addr = item::item_data(item_addr);

    let wrapper = match layouts.wrapper(kind) {
        Some(layout) => Some(StructView::new(layout, abi, data_addr, payload)?),
        None => None,
    };
    // past the wrapper, still inside the payload
    let tail = |used: usize, extra: u64, what: &'static str| -> Result<()> {
        if used as u64 + extra > payload_len as u64 {
            return Err(SccError::decode(
                what,
                data_addr,
                format!("{extra} bytes of data after {used} byte wrapper exceed payload of {payload_len}"),
            ));
        }
        Ok(())
    };

    let body = match (kind, wrapper) {
        (DataType::RomClass, Some(w)) => RecordBody::RomClass(rom_class_wrapper(&w)?),
        (DataType::ScopedRomClass, Some(w)) => RecordBody::ScopedRomClass {
            rom: rom_class_wrapper(&w)?,
            mod_context_offset: w.shr_offset("modContextOffset")?,
            partition_offset: w.shr_offset("partitionOffset")?,
        },
        (DataType::Orphan, Some(w)) => RecordBody::Orphan {
            rom_class_offset: w.shr_offset("romClassOffset")?,
        },
        (DataType::Classpath, Some(w)) => {
            let used = layouts.classpath.size();
            let item_size = w.u32("classpathItemSize")?;
            tail(used, u64::from(item_size), "ClasspathWrapper")?;
            let item_addr = data_addr + used as u64;
            let cpi = StructView::new(&layouts.classpath_item, abi, item_addr, &payload[used..])?;
            let raw_type = cpi.u16("type")?;
            let kind = ClasspathKind::from_raw(raw_type)
                .ok_or_else(|| SccError::decode("ClasspathItem", item_addr, format!("unknown classpath type {raw_type}")))?;
            RecordBody::Classpath(ClasspathWrapper {
                stale_from_index: w.i16("staleFromIndex")?,
                item_size,
                items_added: cpi.i16("itemsAdded")?,
                max_items: cpi.i16("maxItems")?,
                kind,
                flags: cpi.u16("flags")?,
                item_addr,
            })
        }
        (DataType::CompiledMethod | DataType::InvalidatedCompiledMethod, Some(w)) => {
            let used = layouts.compiled_method.size();
            let data_length = w.u32("dataLength")?;
            let code_length = w.u32("codeLength")?;
            tail(used, u64::from(data_length) + u64::from(code_length), "CompiledMethodWrapper")?;
            let wrapper = CompiledMethodWrapper {
                rom_method_offset: w.shr_offset("romMethodOffset")?,
                data_length,
                code_length,
                data_addr: data_addr + used as u64,
                code_addr: data_addr + used as u64 + u64::from(data_length),
            };
            if kind == DataType::CompiledMethod {
                RecordBody::CompiledMethod(wrapper)
            } else {
                RecordBody::InvalidatedCompiledMethod(wrapper)
            }
        }
        (DataType::ByteData, Some(w)) => {
            let used = layouts.byte_data.size();
            let data_length = w.u32("dataLength")?;
            tail(used, u64::from(data_length), "ByteDataWrapper")?;
            RecordBody::ByteData(ByteDataWrapper {
                data_length,
                token_offset: w.shr_offset("tokenOffset")?,
                external_block_offset: w.shr_offset("externalBlockOffset")?,
                data_type: w.u8("dataType")?,
                in_private_use: w.u8("inPrivateUse")? != 0,
                private_owner_id: w.u16("privateOwnerId")?,
                data_addr: data_addr + used as u64,
            })
        }
        (DataType::Cachelet, Some(w)) => RecordBody::Cachelet(CacheletWrapper {
            data_offset: w.shr_offset("dataOffset")?,
            data_length: w.u32("dataLength")?,
            num_hints: w.u32("numHints")?,
            num_segments: w.u32("numSegments")?,
            segments_offset: w.shr_offset("segmentsOffset")?,
        }),
        (DataType::AttachedData, Some(w)) => {
            let used = layouts.attached_data.size();
            let data_length = w.u32("dataLength")?;
            tail(used, u64::from(data_length), "AttachedDataWrapper")?;
            RecordBody::AttachedData(AttachedDataWrapper {
                cache_offset: w.shr_offset("cacheOffset")?,
                data_length,
                data_type: w.u16("type")?,
                update_count: w.u16("updateCount")?,
                corrupt: w.i32("corrupt")?,
                data_addr: data_addr + used as u64,
            })
        }
        (DataType::Scope, None) => RecordBody::Scope(decode_inline_utf8(&abi, data_addr, payload)?),
        (DataType::PrereqCache, None) => RecordBody::PrereqCache(decode_inline_utf8(&abi, data_addr, payload)?),
        (DataType::UnindexedByteData, None) => RecordBody::UnindexedByteData {
            length: payload_len as u32,
        },
        (DataType::CharArray, None) => RecordBody::CharArray {
            length: payload_len as u32,
        },
        (kind, _) => {
            return Err(SccError::decode("ShcItem", item_addr, format!("no wrapper decoder for {kind}")));
        }
    };

    Ok(CacheRecord {
        header_addr,
        item_addr,
        header,
        item,
        body,
    })
}

fn rom_class_wrapper(w: &StructView<'_>) -> Result<RomClassWrapper>
{
    Ok(RomClassWrapper {
        cp_offset: w.shr_offset("cpOffset")?,
        cpe_index: w.i16("cpeIndex")?,
        rom_class_offset: w.shr_offset("romClassOffset")?,
        timestamp: w.i64("timestamp")?,
    })
}

/// Decode a `u16`-length-prefixed UTF8 string held in a local buffer
///
/// A zero length or a length running past the buffer is a decode failure.
pub fn decode_inline_utf8(abi: &Abi, address: TargetAddr, bytes: &[u8]) -> Result<String>
{
    if bytes.len() < 2 {
        return Err(SccError::decode("J9UTF8", address, "no room for length prefix"));
    }
    let len = abi.arch.u16(bytes) as usize;
    if len == 0 {
        return Err(SccError::decode("J9UTF8", address, "zero length"));
    }
    let data = bytes
        .get(2..2 + len)
        .ok_or_else(|| SccError::decode("J9UTF8", address, format!("length {len} exceeds {} available bytes", bytes.len() - 2)))?;
    Ok(String::from_utf8_lossy(data).into_owned())
}
