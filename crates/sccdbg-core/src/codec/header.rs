//! Cache layer header (`J9SharedCacheHeader`).
//!
//! Every cache layer starts with this header; all `ShrOffset`s of the layer
//! are relative to its first byte. The areas it describes are laid out as:
//!
//! ```text
//! start                                                           start + totalBytes
//! | header | read-write | ROM classes -> ...free... <- metadata | debug region |
//!                       ^ readWriteBytes   ^ segmentSRP   ^ updateSRP
//! ```

use crate::error::{Result, SccError};
use crate::layout::{Abi, FieldKind, StructLayout, StructView};
use crate::types::TargetAddr;

/// Layout of the cache header for one ABI
pub fn cache_header_layout(abi: &Abi) -> StructLayout
{
    use FieldKind::{I32, U16, U32, U8, Udata, Wsrp, Srp};

    StructLayout::build(
        "J9SharedCacheHeader",
        abi,
        &[
            ("totalBytes", U32),
            ("readWriteBytes", U32),
            ("updateSRP", Udata),
            ("readWriteSRP", Udata),
            ("segmentSRP", Udata),
            ("updateCount", Udata),
            ("updateCountPtr", Wsrp),
            ("readerCount", Udata),
            ("unused2", Udata),
            ("writeHash", Udata),
            ("unused3", Udata),
            ("unused4", Udata),
            ("crashCntr", Udata),
            ("aotBytes", Udata),
            ("jitBytes", Udata),
            ("vmCntr", U16),
            ("corruptFlag", U8),
            ("roundedPagesFlag", U8),
            ("minAOT", I32),
            ("maxAOT", I32),
            ("locked", U32),
            ("lockedPtr", Wsrp),
            ("corruptFlagPtr", Wsrp),
            ("sharedStringHead", Srp),
            ("sharedStringTail", Srp),
            ("sharedStringRoot", Srp),
            ("totalSharedStringNodes", U32),
            ("totalSharedStringWeight", U32),
            ("readWriteFlags", U32),
            ("readWriteCrashCntr", Udata),
            ("readWriteRebuildCntr", Udata),
            ("osPageSize", Udata),
            ("ccInitComplete", Udata),
            ("crcValid", Udata),
            ("crcValue", Udata),
            ("containsCachelets", Udata),
            ("cacheFullFlags", Udata),
            ("readWriteVerifyCntr", Udata),
            ("extraFlags", Udata),
            ("debugRegionSize", Udata),
            ("lineNumberTableNextSRP", Udata),
            ("localVariableTableNextSRP", Udata),
            ("minJIT", I32),
            ("maxJIT", I32),
            ("sharedInternTableBytes", Udata),
            ("corruptionCode", Udata),
            ("corruptValue", Udata),
            ("lastMetadataType", Udata),
            ("writerCount", Udata),
            ("unused5", Udata),
            ("unused6", Udata),
            ("softMaxBytes", U32),
            ("unused8", U32),
            ("unused9", U32),
            ("unused10", U32),
        ],
    )
}

/// Decoded cache header with the anchor it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeader
{
    /// Address of the header (the layer's `ShrOffset` anchor)
    pub start: TargetAddr,
    pub total_bytes: u32,
    pub read_write_bytes: u32,
    pub update_srp: u64,
    pub segment_srp: u64,
    pub update_count: u64,
    pub reader_count: u64,
    pub crash_count: u64,
    pub aot_bytes: u64,
    pub jit_bytes: u64,
    pub vm_count: u16,
    pub corrupt_flag: u8,
    pub min_aot: i32,
    pub max_aot: i32,
    pub min_jit: i32,
    pub max_jit: i32,
    pub locked: u32,
    pub init_complete: bool,
    pub cache_full_flags: u64,
    pub extra_flags: u64,
    pub debug_region_size: u64,
    pub soft_max_bytes: u32,
}

impl CacheHeader
{
    /// Decode and validate a header fetched from `start`.
    ///
    /// ## Errors
    ///
    /// `Decode` if the area boundaries are out of order or outside the cache.
    pub fn decode(layout: &StructLayout, abi: Abi, start: TargetAddr, bytes: &[u8]) -> Result<Self>
    {
        let v = StructView::new(layout, abi, start, bytes)?;
        let header = Self {
            start,
            total_bytes: v.u32("totalBytes")?,
            read_write_bytes: v.u32("readWriteBytes")?,
            update_srp: v.udata("updateSRP")?,
            segment_srp: v.udata("segmentSRP")?,
            update_count: v.udata("updateCount")?,
            reader_count: v.udata("readerCount")?,
            crash_count: v.udata("crashCntr")?,
            aot_bytes: v.udata("aotBytes")?,
            jit_bytes: v.udata("jitBytes")?,
            vm_count: v.u16("vmCntr")?,
            corrupt_flag: v.u8("corruptFlag")?,
            min_aot: v.i32("minAOT")?,
            max_aot: v.i32("maxAOT")?,
            min_jit: v.i32("minJIT")?,
            max_jit: v.i32("maxJIT")?,
            locked: v.u32("locked")?,
            init_complete: v.udata("ccInitComplete")? != 0,
            cache_full_flags: v.udata("cacheFullFlags")?,
            extra_flags: v.udata("extraFlags")?,
            debug_region_size: v.udata("debugRegionSize")?,
            soft_max_bytes: v.u32("softMaxBytes")?,
        };
        header.validate(layout.size() as u64)?;
        Ok(header)
    }

    fn validate(&self, header_size: u64) -> Result<()>
    {
        let total = u64::from(self.total_bytes);
        let metadata_top = total.checked_sub(self.debug_region_size);
        let ordered = [
            header_size,
            u64::from(self.read_write_bytes),
            self.segment_srp,
            self.update_srp,
        ];
        let in_order = ordered.windows(2).all(|w| w[0] <= w[1]);
        match metadata_top {
            Some(top) if in_order && self.update_srp <= top => Ok(()),
            _ => Err(SccError::decode(
                "J9SharedCacheHeader",
                self.start,
                format!(
                    "areas out of order: header {header_size}, readWrite {}, segment {}, update {}, total {total}, debug {}",
                    self.read_write_bytes, self.segment_srp, self.update_srp, self.debug_region_size
                ),
            )),
        }
    }

    /// First byte of the ROM class segment
    pub fn rom_class_start(&self) -> TargetAddr
    {
        self.start + u64::from(self.read_write_bytes)
    }

    /// End of the used ROM class segment
    pub fn segment_end(&self) -> TargetAddr
    {
        self.start + self.segment_srp
    }

    /// Lowest metadata record (the backward walk's lower bound)
    pub fn free(&self) -> TargetAddr
    {
        self.start + self.update_srp
    }

    /// End of the metadata area (first header sits just below)
    pub fn metadata_top(&self) -> TargetAddr
    {
        self.start + (u64::from(self.total_bytes) - self.debug_region_size)
    }

    /// End of the whole layer
    pub fn end(&self) -> TargetAddr
    {
        self.start + u64::from(self.total_bytes)
    }

    /// Bytes of metadata in use
    pub fn metadata_bytes(&self) -> u64
    {
        self.metadata_top().value() - self.free().value()
    }

    /// Bytes of ROM classes in use
    pub fn rom_class_bytes(&self) -> u64
    {
        self.segment_srp - u64::from(self.read_write_bytes)
    }

    /// Free bytes between the segment and the metadata
    pub fn free_bytes(&self) -> u64
    {
        self.update_srp - self.segment_srp
    }

    /// Whether `addr` lies inside this layer
    pub fn contains(&self, addr: TargetAddr) -> bool
    {
        addr >= self.start && addr < self.end()
    }
}
