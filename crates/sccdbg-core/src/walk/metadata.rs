//! Backward walk over cache metadata records.
//!
//! The walk starts at the header just below the metadata top and follows
//! each header's length down to the next older one, stopping once the scan
//! pointer reaches the update pointer (`free`). Each record's length is
//! checked against the room left above `free`, so a corrupt length ends the
//! walk instead of sending it outside the cache.

use tracing::{trace, warn};

use crate::codec::{self, CacheRecord, DataType, Item, ItemHeader, ITEM_HEADER_SIZE, ITEM_SIZE};
use crate::error::{Result, SccError};
use crate::target::Session;
use crate::types::TargetAddr;

/// Restartable walk position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataCursor
{
    /// Header the next step will read
    pub header_addr: TargetAddr,
    /// Records stepped over so far (including filtered ones)
    pub steps: usize,
}

/// One record as seen by the walker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataEntry
{
    pub header_addr: TargetAddr,
    pub header: ItemHeader,
    pub item_addr: TargetAddr,
    pub item: Item,
    pub kind: DataType,
    /// First byte after the `Item` (wrapper start)
    pub payload_addr: TargetAddr,
}

impl MetadataEntry
{
    pub fn is_stale(&self) -> bool
    {
        self.header.is_stale()
    }
}

/// Iterator over the records of one cache layer, newest first
///
/// Yields `Err` at most once: after an error the walk is finished.
pub struct MetadataWalker<'s, 't>
{
    session: &'s Session<'t>,
    free: TargetAddr,
    include_stale: bool,
    filter: Option<DataType>,
    cursor: MetadataCursor,
    saved: Option<MetadataCursor>,
    finished: bool,
}

impl<'s, 't> MetadataWalker<'s, 't>
{
    /// Walk the records between `free` and `metadata_top`
    ///
    /// Stale records are skipped unless [`include_stale`](Self::include_stale)
    /// is set.
    pub fn new(session: &'s Session<'t>, metadata_top: TargetAddr, free: TargetAddr) -> Self
    {
        let first = metadata_top.checked_sub(ITEM_HEADER_SIZE);
        Self {
            session,
            free,
            include_stale: false,
            filter: None,
            cursor: MetadataCursor {
                header_addr: first.unwrap_or(TargetAddr::NULL),
                steps: 0,
            },
            saved: None,
            finished: first.is_none(),
        }
    }

    /// Whether stale records are yielded
    #[must_use]
    pub fn include_stale(mut self, include: bool) -> Self
    {
        self.include_stale = include;
        self
    }

    /// Only yield records of `kind`
    #[must_use]
    pub fn filter(mut self, kind: Option<DataType>) -> Self
    {
        self.filter = kind;
        self
    }

    /// Current position
    pub fn cursor(&self) -> MetadataCursor
    {
        self.cursor
    }

    /// Remember the current position for [`restore`](Self::restore)
    pub fn save(&mut self)
    {
        self.saved = Some(self.cursor);
    }

    /// Go back to the saved position (or stay put if nothing was saved)
    pub fn restore(&mut self)
    {
        if let Some(saved) = self.saved {
            self.seek(saved);
        }
    }

    /// Continue from a cursor obtained earlier from this layer
    pub fn seek(&mut self, cursor: MetadataCursor)
    {
        self.cursor = cursor;
        self.finished = false;
    }

    /// Lower bound of the walk
    pub fn free(&self) -> TargetAddr
    {
        self.free
    }

    /// Fetch and decode the full record behind `entry`
    pub fn decode(&self, entry: &MetadataEntry) -> Result<CacheRecord>
    {
        let shadow = self.session.read_bytes(entry.item_addr, entry.item.data_len as usize)?;
        codec::decode_record(self.session.record_layouts(), entry.header_addr, entry.header, &shadow)
    }

    fn step(&mut self) -> Result<Option<MetadataEntry>>
    {
        let header_addr = self.cursor.header_addr;
        if header_addr <= self.free {
            return Ok(None);
        }
        if self.cursor.steps >= self.session.config().walk_limit {
            return Err(SccError::decode(
                "ShcItemHdr",
                header_addr,
                format!("walk limit of {} records reached", self.session.config().walk_limit),
            ));
        }

        let arch = self.session.config().arch;
        let header = ItemHeader::decode(&arch, &self.session.read_bytes(header_addr, ITEM_HEADER_SIZE as usize)?);
        let length = header.length();
        let room = header_addr.value() - self.free.value() + ITEM_HEADER_SIZE;
        codec::validate_item_length(header_addr, length, room)?;

        let item_addr = codec::item_from_header(header_addr, length)?;
        let item = Item::decode(&arch, &self.session.read_bytes(item_addr, ITEM_SIZE as usize)?);
        if u64::from(item.data_len) != u64::from(length) - ITEM_HEADER_SIZE {
            return Err(SccError::decode(
                "ShcItem",
                item_addr,
                format!("dataLen {} disagrees with header length {length}", item.data_len),
            ));
        }
        let kind = item.kind(item_addr)?;

        self.cursor = MetadataCursor {
            header_addr: codec::previous_item_address(header_addr, length)?,
            steps: self.cursor.steps + 1,
        };
        trace!("Record {kind} at {item_addr} ({length} bytes, stale={})", header.is_stale());

        Ok(Some(MetadataEntry {
            header_addr,
            header,
            item_addr,
            item,
            kind,
            payload_addr: codec::item_data(item_addr),
        }))
    }
}

impl Iterator for MetadataWalker<'_, '_>
{
    type Item = Result<MetadataEntry>;

    fn next(&mut self) -> Option<Self::Item>
    {
        while !self.finished {
            match self.step() {
                Ok(Some(entry)) => {
                    if entry.is_stale() && !self.include_stale {
                        continue;
                    }
                    if self.filter.is_some_and(|kind| kind != entry.kind) {
                        continue;
                    }
                    return Some(Ok(entry));
                }
                Ok(None) => self.finished = true,
                Err(err) => {
                    warn!("Metadata walk stopped: {err}");
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
