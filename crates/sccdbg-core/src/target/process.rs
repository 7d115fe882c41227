//! Live Linux processes.
//!
//! Memory is copied with `process_vm_readv(2)`, which neither stops nor
//! signals the target. The process keeps running while it is inspected, so
//! everything read here may be torn; the walkers validate what they decode.
//!
//! ## References
//!
//! - [process_vm_readv(2)](https://man7.org/linux/man-pages/man2/process_vm_readv.2.html)
//! - [proc_pid_maps(5)](https://man7.org/linux/man-pages/man5/proc_pid_maps.5.html)

use std::fs;
use std::io;

use libc::{c_void, iovec, pid_t};
use tracing::{debug, trace};

use super::TargetMemory;
use crate::error::{Result, SccError};
use crate::types::{MemoryRegion, TargetAddr};

/// A running process read through `process_vm_readv`
#[derive(Debug)]
pub struct LiveProcess
{
    pid: pid_t,
}

impl LiveProcess
{
    /// Open `pid` for reading
    ///
    /// Checks that `/proc/<pid>/maps` is readable, which fails early for
    /// missing processes and most permission problems.
    pub fn attach(pid: u32) -> Result<Self>
    {
        let pid = pid_t::try_from(pid).map_err(|_| SccError::InvalidArgument(format!("pid {pid} out of range")))?;
        let process = Self { pid };
        let regions = process.read_maps()?;
        debug!("Attached to pid {pid}: {} mappings", regions.len());
        Ok(process)
    }

    fn read_maps(&self) -> Result<Vec<MemoryRegion>>
    {
        let maps = fs::read_to_string(format!("/proc/{}/maps", self.pid))?;
        Ok(maps.lines().filter_map(parse_maps_line).collect())
    }
}

/// Parse one `/proc/<pid>/maps` line, keeping only readable mappings
fn parse_maps_line(line: &str) -> Option<MemoryRegion>
{
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    let perms = fields.next()?;
    if !perms.starts_with('r') {
        return None;
    }
    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    let name = fields.nth(3).map(str::to_owned);
    Some(MemoryRegion::new(TargetAddr::from(start), TargetAddr::from(end), name))
}

impl TargetMemory for LiveProcess
{
    fn read_into(&self, addr: TargetAddr, buf: &mut [u8]) -> Result<usize>
    {
        if buf.is_empty() {
            return Ok(0);
        }
        let local = iovec {
            iov_base: buf.as_mut_ptr().cast::<c_void>(),
            iov_len: buf.len(),
        };
        let remote = iovec {
            iov_base: addr.value() as usize as *mut c_void,
            iov_len: buf.len(),
        };
        // SAFETY: `local` covers exactly `buf`, which stays mutably borrowed
        // for the duration of the call. The remote iovec is never touched in
        // our address space.
        let copied = unsafe { libc::process_vm_readv(self.pid, &local, 1, &remote, 1, 0) };
        if copied < 0 {
            let err = io::Error::last_os_error();
            trace!("process_vm_readv({}, {addr}, {}) failed: {err}", self.pid, buf.len());
            return match err.raw_os_error() {
                Some(libc::EFAULT | libc::EIO) => Err(SccError::TargetUnreachable {
                    address: addr,
                    len: buf.len(),
                }),
                _ => Err(SccError::Io(err)),
            };
        }
        Ok(copied as usize)
    }

    fn regions(&self) -> Vec<MemoryRegion>
    {
        self.read_maps().unwrap_or_default()
    }

    fn description(&self) -> String
    {
        format!("live process {}", self.pid)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_maps_line_readable()
    {
        let region = parse_maps_line("7f0000000000-7f0000100000 r--s 00000000 00:05 1234 /tmp/javasharedresources/C290M11F1A64P_cache_G45")
            .unwrap();
        assert_eq!(region.start, TargetAddr::from(0x7f00_0000_0000));
        assert_eq!(region.size(), 0x10_0000);
        assert!(region.name.unwrap().ends_with("_G45"));
    }

    #[test]
    fn test_parse_maps_line_skips_unreadable()
    {
        assert!(parse_maps_line("7f0000000000-7f0000001000 ---p 00000000 00:00 0").is_none());
        assert!(parse_maps_line("garbage").is_none());
    }

    #[test]
    fn test_parse_maps_line_anonymous()
    {
        let region = parse_maps_line("00400000-00452000 rw-p 00000000 00:00 0").unwrap();
        assert!(region.name.is_none());
    }
}
