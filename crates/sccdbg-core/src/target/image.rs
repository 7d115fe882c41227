//! Sparse in-memory target.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::TargetMemory;
use crate::error::{Result, SccError};
use crate::types::{MemoryRegion, TargetAddr};

/// A target made of explicitly supplied byte regions
///
/// Regions are kept sorted and may not overlap. Reads that run off the end
/// of one region continue into the next only when the two are adjacent.
///
/// ```rust
/// use sccdbg_core::target::{MemoryImage, TargetMemory};
/// use sccdbg_core::types::TargetAddr;
///
/// let mut image = MemoryImage::new("example");
/// image.add_region(TargetAddr::from(0x1000), vec![1, 2, 3, 4], None).unwrap();
///
/// let mut buf = [0u8; 2];
/// assert_eq!(image.read_into(TargetAddr::from(0x1002), &mut buf).unwrap(), 2);
/// assert_eq!(buf, [3, 4]);
/// ```
#[derive(Debug, Default)]
pub struct MemoryImage
{
    label: String,
    regions: Vec<(MemoryRegion, Vec<u8>)>,
}

impl MemoryImage
{
    /// Create an empty image
    pub fn new(label: impl Into<String>) -> Self
    {
        Self {
            label: label.into(),
            regions: Vec::new(),
        }
    }

    /// Map `bytes` at `base`
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if the region is empty, wraps the address space, or
    /// overlaps an existing region.
    pub fn add_region(&mut self, base: TargetAddr, bytes: Vec<u8>, name: Option<String>) -> Result<()>
    {
        let end = base
            .checked_add(bytes.len() as u64)
            .filter(|_| !bytes.is_empty())
            .ok_or_else(|| SccError::InvalidArgument(format!("region at {base} is empty or wraps")))?;
        let region = MemoryRegion::new(base, end, name);
        if let Some((existing, _)) = self.regions.iter().find(|(r, _)| r.start < end && base < r.end) {
            return Err(SccError::InvalidArgument(format!("region {region} overlaps {existing}")));
        }
        let at = self.regions.partition_point(|(r, _)| r.start < base);
        self.regions.insert(at, (region, bytes));
        Ok(())
    }

    /// Load a raw dump (for example a cache file) so it appears at `base`
    pub fn from_raw_file(path: &Path, base: TargetAddr) -> Result<Self>
    {
        let bytes = fs::read(path)?;
        debug!("Mapped {} ({} bytes) at {base}", path.display(), bytes.len());
        let mut image = Self::new(format!("raw image {}", path.display()));
        image.add_region(base, bytes, Some(path.display().to_string()))?;
        Ok(image)
    }

    fn region_at(&self, addr: TargetAddr) -> Option<&(MemoryRegion, Vec<u8>)>
    {
        let idx = self.regions.partition_point(|(r, _)| r.end <= addr);
        self.regions.get(idx).filter(|(r, _)| r.contains(addr))
    }
}

impl TargetMemory for MemoryImage
{
    fn read_into(&self, addr: TargetAddr, buf: &mut [u8]) -> Result<usize>
    {
        let mut copied = 0usize;
        while copied < buf.len() {
            let cursor = addr + copied as u64;
            let Some((region, bytes)) = self.region_at(cursor) else {
                break;
            };
            let offset = (cursor.value() - region.start.value()) as usize;
            let chunk = (buf.len() - copied).min(bytes.len() - offset);
            buf[copied..copied + chunk].copy_from_slice(&bytes[offset..offset + chunk]);
            copied += chunk;
        }
        if copied == 0 && !buf.is_empty() {
            return Err(SccError::TargetUnreachable {
                address: addr,
                len: buf.len(),
            });
        }
        Ok(copied)
    }

    fn regions(&self) -> Vec<MemoryRegion>
    {
        self.regions.iter().map(|(r, _)| r.clone()).collect()
    }

    fn description(&self) -> String
    {
        format!("{} ({} regions)", self.label, self.regions.len())
    }
}
