//! Memory region in the target address space.

use std::fmt;

use super::TargetAddr;

/// Contiguous readable range of the target
///
/// Backends report the regions they know about: `PT_LOAD` segments of a
/// core file, lines of `/proc/<pid>/maps`, or the chunks of a raw image.
/// Walkers use them to reject links that point outside every known range.
///
/// ```
/// use sccdbg_core::types::{MemoryRegion, TargetAddr};
///
/// let heap = MemoryRegion::new(TargetAddr::from(0x2000), TargetAddr::from(0x3000), Some("[heap]".to_string()));
/// assert!(heap.contains(TargetAddr::from(0x2fff)));
/// assert!(!heap.contains(TargetAddr::from(0x3000)));
/// assert_eq!(heap.size(), 0x1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion
{
    /// Start address of the memory region (inclusive)
    pub start: TargetAddr,

    /// End address of the memory region (exclusive)
    pub end: TargetAddr,

    /// Optional name/description of the region
    ///
    /// A mapped file path, `"[heap]"`, or the raw image file name.
    pub name: Option<String>,
}

impl MemoryRegion
{
    /// Create a new memory region
    ///
    /// This does not validate that `end > start`; an inverted region simply
    /// has size 0 and contains nothing.
    pub fn new(start: TargetAddr, end: TargetAddr, name: Option<String>) -> Self
    {
        Self { start, end, name }
    }

    /// Size of the region in bytes
    pub fn size(&self) -> u64
    {
        self.end.value().saturating_sub(self.start.value())
    }

    /// Whether `addr` lies inside the region
    pub fn contains(&self, addr: TargetAddr) -> bool
    {
        addr >= self.start && addr < self.end
    }

    /// Whether `[addr, addr + len)` lies entirely inside the region
    pub fn contains_range(&self, addr: TargetAddr, len: u64) -> bool
    {
        match addr.checked_add(len) {
            Some(end) => addr >= self.start && end <= self.end,
            None => false,
        }
    }
}

impl fmt::Display for MemoryRegion
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}-{}", self.start, self.end)?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        Ok(())
    }
}
