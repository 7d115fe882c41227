//! Builder for synthetic cache layer images.
//!
//! Lays records out the way the cache allocator does: ROM class payloads
//! grow forward from the read-write boundary, record headers grow backward
//! from the metadata top. The finished bytes are mapped into a
//! `MemoryImage` and walked like a real cache.

use sccdbg_core::codec::{
    cache_header_layout, item, Alignment, ClasspathKind, DataType, Item, RecordLayouts, ShrOffset, ITEM_HEADER_SIZE,
    ITEM_SIZE,
};
use sccdbg_core::error::{Result, SccError};
use sccdbg_core::layout::{FieldKind, StructLayout};
use sccdbg_core::types::TargetAddr;

/// Value for one wrapper field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue
{
    Int(i64),
    Offset(ShrOffset),
}

/// Writes a cache layer image into a local buffer
#[derive(Debug)]
pub struct MetadataWriter
{
    layouts: RecordLayouts,
    alignment: Alignment,
    base: TargetAddr,
    buf: Vec<u8>,
    read_write_bytes: usize,
    /// Next free byte of the ROM class segment
    segment: usize,
    /// Lowest committed record (the update pointer)
    free: usize,
    records: Vec<TargetAddr>,
}

impl MetadataWriter
{
    /// Start an empty layer of `total_bytes` at `base`.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if the read-write area does not fit between the
    /// header and the end of the layer.
    pub fn new(layouts: RecordLayouts, alignment: Alignment, base: TargetAddr, total_bytes: u32, read_write_bytes: u32) -> Result<Self>
    {
        let header_size = cache_header_layout(&layouts.abi).size();
        let total = total_bytes as usize;
        let rw = read_write_bytes as usize;
        if rw < header_size || rw > total {
            return Err(SccError::InvalidArgument(format!(
                "read-write boundary {rw} outside [{header_size}, {total}]"
            )));
        }
        Ok(Self {
            layouts,
            alignment,
            base,
            buf: vec![0; total],
            read_write_bytes: rw,
            segment: rw,
            free: total,
            records: Vec::new(),
        })
    }

    /// Anchor of the layer
    pub fn base(&self) -> TargetAddr
    {
        self.base
    }

    /// Layouts the writer encodes with
    pub fn layouts(&self) -> &RecordLayouts
    {
        &self.layouts
    }

    /// Header addresses of every record written, oldest first
    pub fn records(&self) -> &[TargetAddr]
    {
        &self.records
    }

    /// Offset of `addr` from the anchor, for storing in wrappers
    pub fn offset_of(&self, addr: TargetAddr) -> Result<ShrOffset>
    {
        let delta = addr
            .offset_from(self.base)
            .and_then(|d| i32::try_from(d).ok())
            .ok_or_else(|| SccError::InvalidArgument(format!("{addr} not inside layer at {}", self.base)))?;
        if self.layouts.abi.multi_layer {
            Ok(ShrOffset::in_layer(0, delta))
        } else {
            Ok(ShrOffset::new(delta))
        }
    }

    /// Copy `bytes` into the ROM class segment and return their address
    pub fn alloc_segment(&mut self, bytes: &[u8]) -> Result<TargetAddr>
    {
        let start = item::pad(self.segment as u64, self.alignment.bytes()) as usize;
        let end = start + bytes.len();
        if end > self.free {
            return Err(SccError::InvalidArgument(format!("segment allocation of {} bytes overruns metadata", bytes.len())));
        }
        self.buf[start..end].copy_from_slice(bytes);
        self.segment = end;
        Ok(self.base + start as u64)
    }

    /// Overwrite bytes already placed in the layer
    pub fn patch(&mut self, addr: TargetAddr, bytes: &[u8]) -> Result<()>
    {
        let start = self.local_index(addr)?;
        let dest = self
            .buf
            .get_mut(start..start + bytes.len())
            .ok_or_else(|| SccError::InvalidArgument(format!("patch at {addr} runs past layer end")))?;
        dest.copy_from_slice(bytes);
        Ok(())
    }

    /// Append a record with an already-encoded body (wrapper plus data).
    ///
    /// Returns the address of the record's `ItemHeader`.
    pub fn append(&mut self, kind: DataType, jvm_id: u16, body: &[u8]) -> Result<TargetAddr>
    {
        let forward = item::pad(ITEM_SIZE + body.len() as u64, self.alignment.bytes()) as usize;
        let item_len = forward + ITEM_HEADER_SIZE as usize;
        let header_idx = self
            .free
            .checked_sub(ITEM_HEADER_SIZE as usize)
            .ok_or_else(|| SccError::InvalidArgument("metadata area exhausted".into()))?;
        let item_idx = header_idx
            .checked_sub(forward)
            .filter(|idx| *idx >= self.segment)
            .ok_or_else(|| SccError::InvalidArgument(format!("no room for {item_len} byte record")))?;

        let arch = self.layouts.abi.arch;
        let item = Item {
            data_len: forward as u32,
            data_type: kind as u16,
            jvm_id,
        };
        item.encode(&arch, &mut self.buf[item_idx..item_idx + ITEM_SIZE as usize]);
        let body_idx = item_idx + ITEM_SIZE as usize;
        self.buf[body_idx..body_idx + body.len()].copy_from_slice(body);
        self.buf[body_idx + body.len()..header_idx].fill(0);
        arch.put_u32(&mut self.buf[header_idx..header_idx + 4], item_len as u32);

        self.free = item_idx;
        let header_addr = self.base + header_idx as u64;
        self.records.push(header_addr);
        Ok(header_addr)
    }

    /// Encode a wrapper struct from named field values
    pub fn encode_wrapper(&self, layout: &StructLayout, values: &[(&str, FieldValue)]) -> Result<Vec<u8>>
    {
        let abi = self.layouts.abi;
        let mut out = vec![0u8; layout.size()];
        for (name, value) in values {
            let field = layout.field(name)?;
            let slot = &mut out[field.offset..];
            match (field.kind, value) {
                (FieldKind::ShrOffset, FieldValue::Offset(off)) => off.encode(&abi, slot),
                (FieldKind::U8, FieldValue::Int(v)) => slot[0] = *v as u8,
                (FieldKind::U16 | FieldKind::I16, FieldValue::Int(v)) => abi.arch.put_u16(slot, *v as u16),
                (FieldKind::U32 | FieldKind::I32 | FieldKind::Srp, FieldValue::Int(v)) => abi.arch.put_u32(slot, *v as u32),
                (FieldKind::U64 | FieldKind::I64, FieldValue::Int(v)) => abi.arch.put_u64(slot, *v as u64),
                (FieldKind::Udata | FieldKind::Pointer | FieldKind::Wsrp, FieldValue::Int(v)) => {
                    abi.arch.put_udata(slot, *v as u64);
                }
                (kind, value) => {
                    return Err(SccError::InvalidArgument(format!(
                        "{}.{name} is {kind:?}, cannot hold {value:?}",
                        layout.name()
                    )));
                }
            }
        }
        Ok(out)
    }

    /// ROM class record pointing at `rom_class`
    pub fn append_rom_class(&mut self, rom_class: TargetAddr, cpe_index: i16, timestamp: i64) -> Result<TargetAddr>
    {
        let off = self.offset_of(rom_class)?;
        let body = self.encode_wrapper(
            &self.layouts.rom_class,
            &[
                ("romClassOffset", FieldValue::Offset(off)),
                ("cpeIndex", FieldValue::Int(i64::from(cpe_index))),
                ("timestamp", FieldValue::Int(timestamp)),
            ],
        )?;
        self.append(DataType::RomClass, 1, &body)
    }

    /// Orphan record pointing at `rom_class`
    pub fn append_orphan(&mut self, rom_class: TargetAddr) -> Result<TargetAddr>
    {
        let off = self.offset_of(rom_class)?;
        let body = self.encode_wrapper(&self.layouts.orphan, &[("romClassOffset", FieldValue::Offset(off))])?;
        self.append(DataType::Orphan, 1, &body)
    }

    /// Compiled method record for `rom_method`, followed by data then code
    pub fn append_compiled_method(&mut self, rom_method: TargetAddr, data: &[u8], code: &[u8], invalidated: bool) -> Result<TargetAddr>
    {
        let off = self.offset_of(rom_method)?;
        let mut body = self.encode_wrapper(
            &self.layouts.compiled_method,
            &[
                ("romMethodOffset", FieldValue::Offset(off)),
                ("dataLength", FieldValue::Int(data.len() as i64)),
                ("codeLength", FieldValue::Int(code.len() as i64)),
            ],
        )?;
        body.extend_from_slice(data);
        body.extend_from_slice(code);
        let kind = if invalidated {
            DataType::InvalidatedCompiledMethod
        } else {
            DataType::CompiledMethod
        };
        self.append(kind, 1, &body)
    }

    /// Byte data record of sub-type `data_type`
    pub fn append_byte_data(&mut self, data_type: u8, data: &[u8]) -> Result<TargetAddr>
    {
        let mut body = self.encode_wrapper(
            &self.layouts.byte_data,
            &[
                ("dataLength", FieldValue::Int(data.len() as i64)),
                ("dataType", FieldValue::Int(i64::from(data_type))),
            ],
        )?;
        body.extend_from_slice(data);
        self.append(DataType::ByteData, 1, &body)
    }

    /// Attached data record for `owner` (usually a ROM method)
    pub fn append_attached_data(&mut self, owner: TargetAddr, data_type: u16, data: &[u8]) -> Result<TargetAddr>
    {
        let off = self.offset_of(owner)?;
        let mut body = self.encode_wrapper(
            &self.layouts.attached_data,
            &[
                ("cacheOffset", FieldValue::Offset(off)),
                ("dataLength", FieldValue::Int(data.len() as i64)),
                ("type", FieldValue::Int(i64::from(data_type))),
            ],
        )?;
        body.extend_from_slice(data);
        self.append(DataType::AttachedData, 1, &body)
    }

    /// Classpath record with `entries` path entries
    pub fn append_classpath(&mut self, kind: ClasspathKind, entries: i16) -> Result<TargetAddr>
    {
        let raw_kind = match kind {
            ClasspathKind::Classpath => 1,
            ClasspathKind::Url => 2,
            ClasspathKind::Token => 4,
        };
        let cpi = self.encode_wrapper(
            &self.layouts.classpath_item,
            &[
                ("itemsAdded", FieldValue::Int(i64::from(entries))),
                ("maxItems", FieldValue::Int(i64::from(entries))),
                ("type", FieldValue::Int(raw_kind)),
            ],
        )?;
        let mut body = self.encode_wrapper(
            &self.layouts.classpath,
            &[
                ("staleFromIndex", FieldValue::Int(i64::from(entries))),
                ("classpathItemSize", FieldValue::Int(cpi.len() as i64)),
            ],
        )?;
        body.extend_from_slice(&cpi);
        self.append(DataType::Classpath, 1, &body)
    }

    /// Scope or prerequisite-cache record carrying `name`
    pub fn append_utf8(&mut self, kind: DataType, name: &str) -> Result<TargetAddr>
    {
        let mut body = vec![0u8; 2];
        self.layouts.abi.arch.put_u16(&mut body, name.len() as u16);
        body.extend_from_slice(name.as_bytes());
        self.append(kind, 1, &body)
    }

    /// Set the stale flag of the record whose header is at `header_addr`
    pub fn mark_stale(&mut self, header_addr: TargetAddr) -> Result<()>
    {
        let idx = self.local_index(header_addr)?;
        let arch = self.layouts.abi.arch;
        let slot = self
            .buf
            .get_mut(idx..idx + 4)
            .ok_or_else(|| SccError::InvalidArgument(format!("{header_addr} is not a record header")))?;
        let raw = arch.u32(slot);
        arch.put_u32(slot, item::mark_stale(raw));
        Ok(())
    }

    fn local_index(&self, addr: TargetAddr) -> Result<usize>
    {
        addr.offset_from(self.base)
            .map(|d| d as usize)
            .filter(|d| *d < self.buf.len())
            .ok_or_else(|| SccError::InvalidArgument(format!("{addr} not inside layer at {}", self.base)))
    }

    /// Write the cache header and return the finished layer bytes
    pub fn finish(mut self) -> Result<Vec<u8>>
    {
        let layout = cache_header_layout(&self.layouts.abi);
        let header = self.encode_wrapper(
            &layout,
            &[
                ("totalBytes", FieldValue::Int(self.buf.len() as i64)),
                ("readWriteBytes", FieldValue::Int(self.read_write_bytes as i64)),
                ("updateSRP", FieldValue::Int(self.free as i64)),
                ("segmentSRP", FieldValue::Int(self.segment as i64)),
                ("updateCount", FieldValue::Int(self.records.len() as i64)),
                ("ccInitComplete", FieldValue::Int(1)),
            ],
        )?;
        self.buf[..header.len()].copy_from_slice(&header);
        Ok(self.buf)
    }
}
