//! Target ABI description: pointer width and byte order.
//!
//! The tool may run on a little-endian 64-bit host while inspecting a
//! big-endian or 32-bit target. Nothing in the readers assumes the two
//! agree; every multi-byte value is decoded through [`TargetArch`].

use std::fmt;
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Size of a target pointer / `UDATA`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerWidth
{
    /// 32-bit target
    Bits32,
    /// 64-bit target
    Bits64,
}

impl PointerWidth
{
    /// Width in bytes
    pub const fn bytes(self) -> usize
    {
        match self {
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }
}

impl FromStr for PointerWidth
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "32" | "4" => Ok(Self::Bits32),
            "64" | "8" => Ok(Self::Bits64),
            _ => Err(format!("Unknown pointer width: {s}. Use '32' or '64'")),
        }
    }
}

/// Byte order of the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness
{
    /// Least significant byte first (x86-64, aarch64 Linux)
    Little,
    /// Most significant byte first (z/OS, AIX)
    Big,
}

impl FromStr for Endianness
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "little" | "le" => Ok(Self::Little),
            "big" | "be" => Ok(Self::Big),
            _ => Err(format!("Unknown byte order: {s}. Use 'little' or 'big'")),
        }
    }
}

/// Pointer width and byte order of the inspected target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetArch
{
    /// Pointer / `UDATA` width
    pub pointer_width: PointerWidth,
    /// Byte order
    pub endian: Endianness,
}

impl Default for TargetArch
{
    fn default() -> Self
    {
        Self {
            pointer_width: PointerWidth::Bits64,
            endian: Endianness::Little,
        }
    }
}

impl TargetArch
{
    /// Create a description from its parts
    pub const fn new(pointer_width: PointerWidth, endian: Endianness) -> Self
    {
        Self { pointer_width, endian }
    }

    /// Size of a pointer / `UDATA` in bytes
    pub const fn pointer_size(&self) -> usize
    {
        self.pointer_width.bytes()
    }

    /// Decode a `u16` from the first two bytes of `buf`
    pub fn u16(&self, buf: &[u8]) -> u16
    {
        match self.endian {
            Endianness::Little => LittleEndian::read_u16(buf),
            Endianness::Big => BigEndian::read_u16(buf),
        }
    }

    /// Decode a `u32` from the first four bytes of `buf`
    pub fn u32(&self, buf: &[u8]) -> u32
    {
        match self.endian {
            Endianness::Little => LittleEndian::read_u32(buf),
            Endianness::Big => BigEndian::read_u32(buf),
        }
    }

    /// Decode a `u64` from the first eight bytes of `buf`
    pub fn u64(&self, buf: &[u8]) -> u64
    {
        match self.endian {
            Endianness::Little => LittleEndian::read_u64(buf),
            Endianness::Big => BigEndian::read_u64(buf),
        }
    }

    /// Decode a pointer-sized unsigned value, zero-extended to `u64`
    pub fn udata(&self, buf: &[u8]) -> u64
    {
        match self.pointer_width {
            PointerWidth::Bits32 => u64::from(self.u32(buf)),
            PointerWidth::Bits64 => self.u64(buf),
        }
    }

    /// Decode a pointer-sized signed value, sign-extended to `i64`
    pub fn idata(&self, buf: &[u8]) -> i64
    {
        match self.pointer_width {
            PointerWidth::Bits32 => i64::from(self.u32(buf) as i32),
            PointerWidth::Bits64 => self.u64(buf) as i64,
        }
    }

    /// Encode a `u16` into the first two bytes of `buf`
    pub fn put_u16(&self, buf: &mut [u8], value: u16)
    {
        match self.endian {
            Endianness::Little => LittleEndian::write_u16(buf, value),
            Endianness::Big => BigEndian::write_u16(buf, value),
        }
    }

    /// Encode a `u32` into the first four bytes of `buf`
    pub fn put_u32(&self, buf: &mut [u8], value: u32)
    {
        match self.endian {
            Endianness::Little => LittleEndian::write_u32(buf, value),
            Endianness::Big => BigEndian::write_u32(buf, value),
        }
    }

    /// Encode a `u64` into the first eight bytes of `buf`
    pub fn put_u64(&self, buf: &mut [u8], value: u64)
    {
        match self.endian {
            Endianness::Little => LittleEndian::write_u64(buf, value),
            Endianness::Big => BigEndian::write_u64(buf, value),
        }
    }

    /// Encode a pointer-sized value (truncated on 32-bit targets)
    pub fn put_udata(&self, buf: &mut [u8], value: u64)
    {
        match self.pointer_width {
            PointerWidth::Bits32 => self.put_u32(buf, value as u32),
            PointerWidth::Bits64 => self.put_u64(buf, value),
        }
    }
}

impl fmt::Display for TargetArch
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let bits = self.pointer_size() * 8;
        let order = match self.endian {
            Endianness::Little => "little-endian",
            Endianness::Big => "big-endian",
        };
        write!(f, "{bits}-bit {order}")
    }
}
