//! # Session
//!
//! The address translator: the only place target bytes become local bytes.
//!
//! A [`Session`] wraps a [`TargetMemory`] together with the target
//! configuration and a per-command store of fetched segments. Every read
//! goes through the store, so within one command:
//!
//! - a target byte is fetched at most once; reads that fall inside an
//!   earlier fetch are served from it, even if the live target has since
//!   changed
//! - [`Session::map_to_local`] hands out one [`Shadow`] handle per target
//!   address ([`Rc::ptr_eq`] holds), growing it in place when a later call
//!   asks for more bytes
//!
//! The store is emptied by [`Session::release_all`], which
//! [`CommandScope`] calls on drop so that every exit path of a command,
//! including `?` early returns, releases its shadows.
//!
//! ## Example
//!
//! ```rust
//! use sccdbg_core::config::TargetConfig;
//! use sccdbg_core::target::{CommandScope, MemoryImage, Session};
//! use sccdbg_core::types::TargetAddr;
//!
//! let mut image = MemoryImage::new("doc");
//! image.add_region(TargetAddr::from(0x1000), 0xdead_beef_u32.to_le_bytes().to_vec(), None)?;
//! let session = Session::new(&image, TargetConfig::default());
//! {
//!     let scope = CommandScope::new(&session);
//!     assert_eq!(scope.read_u32(TargetAddr::from(0x1000))?, 0xdead_beef);
//! }
//! assert_eq!(session.cached_count(), 0);
//! # Ok::<(), sccdbg_core::error::SccError>(())
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::rc::Rc;

use once_cell::unsync::OnceCell;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::TargetMemory;
use crate::codec::{RecordLayouts, ShrOffset};
use crate::config::{LayerPolicy, TargetConfig};
use crate::error::{Result, SccError};
use crate::layout::{resolve_relative, Abi, StructLayout, StructView};
use crate::readers::VmLayouts;
use crate::types::{MemoryRegion, TargetAddr};

/// Local copy of `[address, address + len)`, sliced out of a fetched segment
#[derive(Debug, Clone)]
pub struct Snapshot
{
    address: TargetAddr,
    segment: Rc<[u8]>,
    offset: usize,
    len: usize,
}

impl Snapshot
{
    /// Target address the bytes were copied from
    pub fn address(&self) -> TargetAddr
    {
        self.address
    }

    pub fn bytes(&self) -> &[u8]
    {
        &self.segment[self.offset..self.offset + self.len]
    }

    /// Whether both snapshots were cut from the same fetch
    pub fn same_fetch(&self, other: &Snapshot) -> bool
    {
        Rc::ptr_eq(&self.segment, &other.segment)
    }

    /// Interpret the snapshot as a structure
    pub fn view<'a>(&'a self, layout: &'a StructLayout, abi: Abi) -> Result<StructView<'a>>
    {
        StructView::new(layout, abi, self.address, self.bytes())
    }
}

impl Deref for Snapshot
{
    type Target = [u8];

    fn deref(&self) -> &Self::Target
    {
        self.bytes()
    }
}

/// Stable local handle for one target address
///
/// Returned by [`Session::map_to_local`]. A larger request for the same
/// address extends the handle's bytes instead of replacing the handle.
#[derive(Debug)]
pub struct Shadow
{
    address: TargetAddr,
    current: RefCell<Snapshot>,
}

impl Shadow
{
    pub fn address(&self) -> TargetAddr
    {
        self.address
    }

    /// Number of bytes held
    pub fn len(&self) -> usize
    {
        self.current.borrow().len
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// Bytes held so far
    pub fn snapshot(&self) -> Snapshot
    {
        self.current.borrow().clone()
    }
}

/// Per-target inspection context
pub struct Session<'t>
{
    target: &'t dyn TargetMemory,
    config: TargetConfig,
    record_layouts: RecordLayouts,
    vm_layouts: VmLayouts,
    /// Cache layer anchors indexed by layer number (0 = oldest)
    layers: RefCell<SmallVec<[TargetAddr; 4]>>,
    /// Fetched bytes keyed by start address; segments never overlap
    segments: RefCell<BTreeMap<TargetAddr, Rc<[u8]>>>,
    handles: RefCell<HashMap<TargetAddr, Rc<Shadow>>>,
    regions: OnceCell<Vec<MemoryRegion>>,
    fetches: Cell<usize>,
}

impl<'t> Session<'t>
{
    /// Create a session over `target`
    pub fn new(target: &'t dyn TargetMemory, config: TargetConfig) -> Self
    {
        let abi = config.abi();
        Self {
            target,
            config,
            record_layouts: RecordLayouts::new(abi),
            vm_layouts: VmLayouts::new(abi),
            layers: RefCell::new(SmallVec::new()),
            segments: RefCell::new(BTreeMap::new()),
            handles: RefCell::new(HashMap::new()),
            regions: OnceCell::new(),
            fetches: Cell::new(0),
        }
    }

    pub fn config(&self) -> &TargetConfig
    {
        &self.config
    }

    pub fn abi(&self) -> Abi
    {
        self.config.abi()
    }

    pub fn pointer_size(&self) -> usize
    {
        self.config.arch.pointer_size()
    }

    /// Layouts of cache record wrappers
    pub fn record_layouts(&self) -> &RecordLayouts
    {
        &self.record_layouts
    }

    /// Layouts of VM structures
    pub fn vm_layouts(&self) -> &VmLayouts
    {
        &self.vm_layouts
    }

    /// Description of the underlying target
    pub fn description(&self) -> String
    {
        self.target.description()
    }

    /// Readable regions of the target, enumerated once per session
    pub fn regions(&self) -> &[MemoryRegion]
    {
        self.regions.get_or_init(|| self.target.regions())
    }

    /// Whether `[addr, addr + len)` lies in a known region
    ///
    /// Targets that cannot enumerate their regions accept every address.
    pub fn is_known_range(&self, addr: TargetAddr, len: u64) -> bool
    {
        let regions = self.regions();
        regions.is_empty() || regions.iter().any(|r| r.contains_range(addr, len))
    }

    /// Copy `size` bytes from the target, or slice them from an earlier fetch
    ///
    /// Only the bytes no earlier fetch covered are read from the target;
    /// overlapping fetches are merged into one segment.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument`: `size` is zero
    /// - `TargetUnreachable`: nothing mapped at `addr`
    /// - `ShortRead`: the target returned fewer than `size` bytes
    pub fn read_bytes(&self, addr: TargetAddr, size: usize) -> Result<Snapshot>
    {
        if size == 0 {
            return Err(SccError::InvalidArgument(format!("zero-length read at {addr}")));
        }
        let Some(end) = addr.checked_add(size as u64) else {
            return Err(SccError::TargetUnreachable { address: addr, len: size });
        };

        let (start, segment) = self.segment_covering(addr, end)?;
        Ok(Snapshot {
            address: addr,
            segment,
            offset: (addr.value() - start.value()) as usize,
            len: size,
        })
    }

    /// Segment holding all of `[addr, end)`, fetching and merging as needed
    fn segment_covering(&self, addr: TargetAddr, end: TargetAddr) -> Result<(TargetAddr, Rc<[u8]>)>
    {
        let segments = self.segments.borrow();
        let before = segments
            .range(..=addr)
            .next_back()
            .filter(|(start, bytes)| addr.value() < start.value() + bytes.len() as u64)
            .map(|(start, bytes)| (*start, Rc::clone(bytes)));
        if let Some((start, bytes)) = &before {
            if end.value() <= start.value() + bytes.len() as u64 {
                trace!("Segment hit at {addr} (segment {start}, {} bytes)", bytes.len());
                return Ok((*start, Rc::clone(bytes)));
            }
        }

        // Stitch the earlier segment, fresh fetches for the gaps and every
        // segment starting inside the request into one buffer.
        let merged_start = before.as_ref().map_or(addr, |(start, _)| *start);
        let mut merged: Vec<u8> = before.as_ref().map(|(_, bytes)| bytes.to_vec()).unwrap_or_default();
        let mut cursor = merged_start + merged.len() as u64;
        let mut absorbed = Vec::new();
        for (start, bytes) in segments.range(cursor..end) {
            if *start > cursor {
                merged.extend_from_slice(&self.fetch(cursor, (start.value() - cursor.value()) as usize)?);
            }
            merged.extend_from_slice(bytes);
            cursor = *start + bytes.len() as u64;
            absorbed.push(*start);
        }
        if cursor < end {
            merged.extend_from_slice(&self.fetch(cursor, (end.value() - cursor.value()) as usize)?);
        }
        drop(segments);

        let merged: Rc<[u8]> = merged.into();
        let mut segments = self.segments.borrow_mut();
        for start in absorbed {
            segments.remove(&start);
        }
        segments.insert(merged_start, Rc::clone(&merged));
        Ok((merged_start, merged))
    }

    /// Copy `size` bytes without keeping a shadow (for bulk scans)
    ///
    /// A short read is not an error here; the returned buffer holds only
    /// the bytes the target supplied.
    pub fn read_uncached(&self, addr: TargetAddr, size: usize) -> Result<Vec<u8>>
    {
        let mut buf = vec![0u8; size];
        self.fetches.set(self.fetches.get() + 1);
        let copied = self.target.read_into(addr, &mut buf)?;
        buf.truncate(copied);
        Ok(buf)
    }

    fn fetch(&self, addr: TargetAddr, size: usize) -> Result<Vec<u8>>
    {
        let mut buf = vec![0u8; size];
        self.fetches.set(self.fetches.get() + 1);
        let copied = self.target.read_into(addr, &mut buf)?;
        debug!("Fetched {copied}/{size} bytes at {addr}");
        if copied < size {
            return Err(SccError::ShortRead {
                address: addr,
                requested: size,
                actual: copied,
            });
        }
        Ok(buf)
    }

    /// Stable handle for `addr`
    ///
    /// A new handle holds `size_hint` bytes, or one pointer without a hint.
    /// An existing handle is returned as is, after growing it in place when
    /// `size_hint` asks for more than it holds.
    pub fn map_to_local(&self, addr: TargetAddr, size_hint: Option<usize>) -> Result<Rc<Shadow>>
    {
        let existing = self.handles.borrow().get(&addr).cloned();
        if let Some(shadow) = existing {
            if let Some(size) = size_hint.filter(|size| *size > shadow.len()) {
                let grown = self.read_bytes(addr, size)?;
                *shadow.current.borrow_mut() = grown;
            }
            return Ok(shadow);
        }
        let snapshot = self.read_bytes(addr, size_hint.unwrap_or(self.pointer_size()))?;
        let shadow = Rc::new(Shadow {
            address: addr,
            current: RefCell::new(snapshot),
        });
        self.handles.borrow_mut().insert(addr, Rc::clone(&shadow));
        Ok(shadow)
    }

    /// Target address a handle stands for
    pub fn map_to_target(&self, shadow: &Shadow) -> TargetAddr
    {
        shadow.address
    }

    /// Fetch a structure as a view-ready snapshot
    pub fn read_struct(&self, addr: TargetAddr, layout: &StructLayout) -> Result<Snapshot>
    {
        if addr.is_null() {
            return Err(SccError::TargetUnreachable {
                address: addr,
                len: layout.size(),
            });
        }
        self.read_bytes(addr, layout.size())
    }

    /// Read an unsigned integer of `width` bytes
    ///
    /// ## Errors
    ///
    /// `Decode` if `width` is not 1, 2, 4 or 8.
    pub fn read_uint(&self, addr: TargetAddr, width: usize) -> Result<u64>
    {
        if !matches!(width, 1 | 2 | 4 | 8) {
            return Err(SccError::decode("scalar", addr, format!("unsupported width {width}")));
        }
        let arch = self.config.arch;
        let shadow = self.read_bytes(addr, width)?;
        let bytes = shadow.bytes();
        Ok(match width {
            1 => u64::from(bytes[0]),
            2 => u64::from(arch.u16(bytes)),
            4 => u64::from(arch.u32(bytes)),
            _ => arch.u64(bytes),
        })
    }

    pub fn read_u8(&self, addr: TargetAddr) -> Result<u8>
    {
        self.read_uint(addr, 1).map(|v| v as u8)
    }

    pub fn read_u16(&self, addr: TargetAddr) -> Result<u16>
    {
        self.read_uint(addr, 2).map(|v| v as u16)
    }

    pub fn read_u32(&self, addr: TargetAddr) -> Result<u32>
    {
        self.read_uint(addr, 4).map(|v| v as u32)
    }

    pub fn read_u64(&self, addr: TargetAddr) -> Result<u64>
    {
        self.read_uint(addr, 8)
    }

    pub fn read_i16(&self, addr: TargetAddr) -> Result<i16>
    {
        self.read_u16(addr).map(|v| v as i16)
    }

    pub fn read_i32(&self, addr: TargetAddr) -> Result<i32>
    {
        self.read_u32(addr).map(|v| v as i32)
    }

    pub fn read_i64(&self, addr: TargetAddr) -> Result<i64>
    {
        self.read_u64(addr).map(|v| v as i64)
    }

    /// Pointer-sized unsigned value
    pub fn read_udata(&self, addr: TargetAddr) -> Result<u64>
    {
        self.read_uint(addr, self.pointer_size())
    }

    /// Pointer-sized signed value
    pub fn read_idata(&self, addr: TargetAddr) -> Result<i64>
    {
        let shadow = self.read_bytes(addr, self.pointer_size())?;
        Ok(self.config.arch.idata(shadow.bytes()))
    }

    /// Absolute target pointer
    pub fn read_pointer(&self, addr: TargetAddr) -> Result<TargetAddr>
    {
        self.read_udata(addr).map(TargetAddr::from)
    }

    /// Replace the known cache layer anchors (index = layer number)
    pub fn set_layers(&self, anchors: &[TargetAddr])
    {
        let mut layers = self.layers.borrow_mut();
        layers.clear();
        layers.extend_from_slice(anchors);
    }

    /// Known cache layer anchors, oldest first
    pub fn layer_anchors(&self) -> SmallVec<[TargetAddr; 4]>
    {
        self.layers.borrow().clone()
    }

    /// Resolve a cache-relative offset against the configured layers
    ///
    /// The null offset resolves to `None`. Layer selection follows the
    /// configured [`LayerPolicy`].
    ///
    /// ## Errors
    ///
    /// `Decode` if no anchor is known, the tagged layer does not exist, or an
    /// untagged offset is resolved under [`LayerPolicy::Explicit`].
    pub fn resolve_self_relative(&self, offset: ShrOffset) -> Result<Option<TargetAddr>>
    {
        if offset.is_null() {
            return Ok(None);
        }
        let layers = self.layers.borrow();
        let anchor = match (offset.layer, self.config.layer_policy) {
            (Some(layer), _) => layers.get(layer as usize).copied(),
            (None, LayerPolicy::NewestWins) => layers.last().copied(),
            (None, LayerPolicy::Explicit) => {
                return Err(SccError::decode(
                    "ShrOffset",
                    TargetAddr::NULL,
                    format!("offset {offset} has no layer tag under the explicit layer policy"),
                ));
            }
        };
        let anchor = anchor.ok_or_else(|| {
            SccError::decode(
                "ShrOffset",
                TargetAddr::NULL,
                format!("no anchor for {offset} ({} layers known)", layers.len()),
            )
        })?;
        Ok(resolve_from_anchor(anchor, offset))
    }

    /// Resolve a 32-bit self-relative pointer stored at `field_addr`
    pub fn resolve_srp(&self, field_addr: TargetAddr, raw: i32) -> Option<TargetAddr>
    {
        resolve_relative(field_addr, i64::from(raw))
    }

    /// Resolve a pointer-sized self-relative pointer stored at `field_addr`
    pub fn resolve_wsrp(&self, field_addr: TargetAddr, raw: i64) -> Option<TargetAddr>
    {
        resolve_relative(field_addr, raw)
    }

    /// Read and resolve the SRP at `field_addr`
    pub fn read_srp(&self, field_addr: TargetAddr) -> Result<Option<TargetAddr>>
    {
        let raw = self.read_i32(field_addr)?;
        Ok(self.resolve_srp(field_addr, raw))
    }

    /// Drop every segment and handle fetched so far
    pub fn release_all(&self)
    {
        let mut segments = self.segments.borrow_mut();
        if !segments.is_empty() {
            debug!("Releasing {} segments", segments.len());
        }
        segments.clear();
        self.handles.borrow_mut().clear();
    }

    /// Number of reads issued against the target
    pub fn fetch_count(&self) -> usize
    {
        self.fetches.get()
    }

    /// Number of fetched segments still held
    pub fn cached_count(&self) -> usize
    {
        self.segments.borrow().len()
    }
}

/// Resolve `offset` against an explicit anchor; the null offset is `None`
pub fn resolve_from_anchor(anchor: TargetAddr, offset: ShrOffset) -> Option<TargetAddr>
{
    if offset.is_null() {
        return None;
    }
    anchor.checked_offset(i64::from(offset.offset))
}

/// RAII guard scoping shadows to one command
///
/// Releases every shadow of the session when dropped, whichever way the
/// command exits.
pub struct CommandScope<'s, 't>
{
    session: &'s Session<'t>,
}

impl<'s, 't> CommandScope<'s, 't>
{
    pub fn new(session: &'s Session<'t>) -> Self
    {
        Self { session }
    }
}

impl<'t> Deref for CommandScope<'_, 't>
{
    type Target = Session<'t>;

    fn deref(&self) -> &Self::Target
    {
        self.session
    }
}

impl Drop for CommandScope<'_, '_>
{
    fn drop(&mut self)
    {
        self.session.release_all();
    }
}
