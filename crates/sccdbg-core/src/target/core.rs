//! ELF core files.

use std::fs;
use std::path::{Path, PathBuf};

use object::{Object, ObjectSegment};
use tracing::{debug, warn};

use super::{MemoryImage, TargetMemory};
use crate::error::{Result, SccError};
use crate::types::{Endianness, MemoryRegion, PointerWidth, TargetAddr, TargetArch};

/// Post-mortem target backed by the `PT_LOAD` segments of a core file
///
/// Segment contents are copied out of the file once when the core is
/// opened; segments without file-backed bytes (memory the kernel chose not
/// to dump) stay unmapped, so reading them fails as unreachable.
#[derive(Debug)]
pub struct CoreFile
{
    path: PathBuf,
    arch: TargetArch,
    image: MemoryImage,
}

impl CoreFile
{
    /// Parse `path` and map its loadable segments
    ///
    /// ## Errors
    ///
    /// - `Io`: the file could not be read
    /// - `InvalidArgument`: the file is not an object file `object` understands
    pub fn open(path: &Path) -> Result<Self>
    {
        let data = fs::read(path)?;
        let file = object::File::parse(&*data)
            .map_err(|err| SccError::InvalidArgument(format!("failed to parse {}: {err}", path.display())))?;

        let arch = TargetArch::new(
            if file.is_64() { PointerWidth::Bits64 } else { PointerWidth::Bits32 },
            if file.is_little_endian() { Endianness::Little } else { Endianness::Big },
        );

        let mut image = MemoryImage::new(format!("core {}", path.display()));
        for segment in file.segments() {
            let bytes = match segment.data() {
                Ok(bytes) if !bytes.is_empty() => bytes,
                Ok(_) => continue,
                Err(err) => {
                    warn!("Skipping unreadable segment at {:#x}: {err}", segment.address());
                    continue;
                }
            };
            let name = segment.name().ok().flatten().map(str::to_owned);
            if let Err(err) = image.add_region(TargetAddr::from(segment.address()), bytes.to_vec(), name) {
                warn!("Skipping segment at {:#x}: {err}", segment.address());
            }
        }
        debug!("Opened {} as {arch} core: {}", path.display(), image.description());

        Ok(Self {
            path: path.to_path_buf(),
            arch,
            image,
        })
    }

    /// Pointer width and byte order recorded in the ELF header
    pub fn detected_arch(&self) -> TargetArch
    {
        self.arch
    }
}

impl TargetMemory for CoreFile
{
    fn read_into(&self, addr: TargetAddr, buf: &mut [u8]) -> Result<usize>
    {
        self.image.read_into(addr, buf)
    }

    fn regions(&self) -> Vec<MemoryRegion>
    {
        self.image.regions()
    }

    fn description(&self) -> String
    {
        format!("core file {} ({}, {} segments)", self.path.display(), self.arch, self.image.regions().len())
    }
}
