//! Target address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Address in the *target* address space
///
/// A `TargetAddr` is only meaningful inside the inspected process or core
/// image. It is never dereferenced locally; every field access goes through
/// [`Session`](crate::target::Session), which copies bytes across the
/// boundary. Keeping this a distinct type means a remote pointer cannot be
/// confused with a local one at compile time.
///
/// ## Example
///
/// ```rust
/// use sccdbg_core::types::TargetAddr;
///
/// let addr = TargetAddr::from(0x1000);
/// let next_addr = addr + 0x100;
/// assert_eq!(next_addr.value(), 0x1100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TargetAddr(u64);

impl TargetAddr
{
    /// Target null
    ///
    /// Used as the "no value" sentinel for pointer fields read from the target.
    pub const NULL: Self = TargetAddr(0);

    /// Wrap a raw target value
    ///
    /// ```rust
    /// use sccdbg_core::types::TargetAddr;
    ///
    /// const CACHE_BASE: TargetAddr = TargetAddr::new(0x7f00_0000_0000);
    /// ```
    pub const fn new(value: u64) -> Self
    {
        TargetAddr(value)
    }

    /// The raw target value
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Whether this is the null address
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// `self + offset`, or `None` past the top of the address space
    ///
    /// ```rust
    /// use sccdbg_core::types::TargetAddr;
    ///
    /// let addr = TargetAddr::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(TargetAddr::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(TargetAddr)
    }

    /// `self - offset`, or `None` below zero
    ///
    /// ```rust
    /// use sccdbg_core::types::TargetAddr;
    ///
    /// let addr = TargetAddr::from(0x1000);
    /// assert_eq!(addr.checked_sub(0x100), Some(TargetAddr::from(0xf00)));
    /// assert_eq!(addr.checked_sub(u64::MAX), None);
    /// ```
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(TargetAddr)
    }

    /// Apply a signed displacement, checking for wrap-around
    ///
    /// Self-relative pointers are signed, so resolving them needs this
    /// rather than plain addition.
    ///
    /// ```rust
    /// use sccdbg_core::types::TargetAddr;
    ///
    /// let addr = TargetAddr::from(0x1000);
    /// assert_eq!(addr.checked_offset(-0x10), Some(TargetAddr::from(0xff0)));
    /// assert_eq!(addr.checked_offset(0x10), Some(TargetAddr::from(0x1010)));
    /// ```
    pub fn checked_offset(self, displacement: i64) -> Option<Self>
    {
        if displacement >= 0 {
            self.checked_add(displacement.unsigned_abs())
        } else {
            self.checked_sub(displacement.unsigned_abs())
        }
    }

    /// Distance from `base` to `self`, or `None` if `self` is below `base`
    pub fn offset_from(self, base: TargetAddr) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }

    /// Whether the address is a multiple of `alignment` (a power of two)
    pub const fn is_aligned(self, alignment: u64) -> bool
    {
        alignment == 0 || self.0 & (alignment - 1) == 0
    }
}

impl From<u64> for TargetAddr
{
    fn from(value: u64) -> Self
    {
        TargetAddr(value)
    }
}

impl From<TargetAddr> for u64
{
    fn from(address: TargetAddr) -> Self
    {
        address.0
    }
}

impl fmt::Display for TargetAddr
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for TargetAddr
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for TargetAddr
{
    type Output = TargetAddr;

    fn add(self, rhs: u64) -> Self::Output
    {
        TargetAddr(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for TargetAddr
{
    type Output = TargetAddr;

    fn sub(self, rhs: u64) -> Self::Output
    {
        TargetAddr(self.0.wrapping_sub(rhs))
    }
}
