//! Cache-relative offsets.

use std::fmt;

use crate::layout::Abi;

/// Displacement from a cache layer's header (`ShrOffset`)
///
/// Offsets stay valid wherever the cache is mapped. Multi-layer builds store
/// the layer index in front of the offset; single-layer builds store only
/// the offset and `layer` decodes as `None`.
///
/// An offset of `0` names the cache header itself, which no record ever
/// points at, so it doubles as the null sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShrOffset
{
    /// Layer index (multi-layer builds only)
    pub layer: Option<u32>,
    /// Signed displacement from the layer's cache header
    pub offset: i32,
}

impl ShrOffset
{
    /// Raw offset value meaning "no value"
    pub const NULL_OFFSET: i32 = 0;

    /// Offset with no layer tag
    pub const fn new(offset: i32) -> Self
    {
        Self { layer: None, offset }
    }

    /// Offset tagged with a layer index
    pub const fn in_layer(layer: u32, offset: i32) -> Self
    {
        Self {
            layer: Some(layer),
            offset,
        }
    }

    /// Whether this is the null sentinel
    pub const fn is_null(&self) -> bool
    {
        self.offset == Self::NULL_OFFSET
    }

    /// Encoded size for the given build
    pub const fn encoded_size(multi_layer: bool) -> usize
    {
        if multi_layer { 8 } else { 4 }
    }

    /// Decode from `bytes` (at least [`ShrOffset::encoded_size`] long)
    pub fn decode(abi: &Abi, bytes: &[u8]) -> Self
    {
        if abi.multi_layer {
            Self {
                layer: Some(abi.arch.u32(&bytes[0..4])),
                offset: abi.arch.u32(&bytes[4..8]) as i32,
            }
        } else {
            Self {
                layer: None,
                offset: abi.arch.u32(&bytes[0..4]) as i32,
            }
        }
    }

    /// Encode into `bytes`
    pub fn encode(&self, abi: &Abi, bytes: &mut [u8])
    {
        if abi.multi_layer {
            abi.arch.put_u32(&mut bytes[0..4], self.layer.unwrap_or(0));
            abi.arch.put_u32(&mut bytes[4..8], self.offset as u32);
        } else {
            abi.arch.put_u32(&mut bytes[0..4], self.offset as u32);
        }
    }
}

impl fmt::Display for ShrOffset
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self.layer {
            Some(layer) => write!(f, "layer {layer} +0x{:x}", self.offset),
            None => write!(f, "+0x{:x}", self.offset),
        }
    }
}
