//! # Struct Layouts
//!
//! Field offsets of target structures, computed for the target ABI.
//!
//! Target structures are never cast locally. Instead each one is described
//! as an ordered list of named fields; [`StructLayout::build`] assigns
//! natural-alignment offsets for the target's pointer width and cache build
//! (single or multi-layer `ShrOffset`), and [`StructView`] decodes individual
//! fields out of a buffer fetched by the session.

use crate::codec::ShrOffset;
use crate::error::{Result, SccError};
use crate::types::{TargetAddr, TargetArch};

/// ABI parameters that change structure layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Abi
{
    /// Pointer width and byte order
    pub arch: TargetArch,
    /// Whether `ShrOffset` carries a cache-layer index
    pub multi_layer: bool,
}

impl Abi
{
    /// Create an ABI description
    pub const fn new(arch: TargetArch, multi_layer: bool) -> Self
    {
        Self { arch, multi_layer }
    }

    /// Size of a pointer / `UDATA`
    pub const fn pointer_size(&self) -> usize
    {
        self.arch.pointer_size()
    }
}

/// Primitive kinds a field can have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind
{
    U8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    /// Pointer-sized unsigned integer
    Udata,
    /// Absolute target pointer
    Pointer,
    /// 32-bit self-relative pointer (relative to the field address)
    Srp,
    /// Pointer-sized self-relative pointer (relative to the field address)
    Wsrp,
    /// Cache-relative offset (relative to the cache header of a layer)
    ShrOffset,
    /// Inline byte array
    Bytes(usize),
}

impl FieldKind
{
    fn size(self, abi: &Abi) -> usize
    {
        match self {
            Self::U8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::Srp => 4,
            Self::U64 | Self::I64 => 8,
            Self::Udata | Self::Pointer | Self::Wsrp => abi.pointer_size(),
            Self::ShrOffset => ShrOffset::encoded_size(abi.multi_layer),
            Self::Bytes(n) => n,
        }
    }

    fn align(self, abi: &Abi) -> usize
    {
        match self {
            Self::ShrOffset => 4,
            Self::Bytes(_) => 1,
            other => other.size(abi),
        }
    }
}

/// A named field at a computed offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field
{
    pub name: &'static str,
    pub kind: FieldKind,
    pub offset: usize,
}

/// Layout of one target structure for one ABI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout
{
    name: &'static str,
    fields: Vec<Field>,
    size: usize,
}

impl StructLayout
{
    /// Lay out `fields` in order with natural alignment.
    ///
    /// The total size is rounded up to the strictest field alignment, the way
    /// a C compiler pads a struct for use in arrays.
    pub fn build(name: &'static str, abi: &Abi, fields: &[(&'static str, FieldKind)]) -> Self
    {
        let mut laid_out = Vec::with_capacity(fields.len());
        let mut cursor = 0usize;
        let mut max_align = 1usize;
        for &(field_name, kind) in fields {
            let align = kind.align(abi).max(1);
            max_align = max_align.max(align);
            cursor = cursor.next_multiple_of(align);
            laid_out.push(Field {
                name: field_name,
                kind,
                offset: cursor,
            });
            cursor += kind.size(abi);
        }
        Self {
            name,
            fields: laid_out,
            size: cursor.next_multiple_of(max_align),
        }
    }

    /// Structure name (used in diagnostics)
    pub fn name(&self) -> &'static str
    {
        self.name
    }

    /// Padded size of the structure
    pub fn size(&self) -> usize
    {
        self.size
    }

    /// Look up a field by name
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if the structure has no such field.
    pub fn field(&self, name: &str) -> Result<Field>
    {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .copied()
            .ok_or_else(|| SccError::InvalidArgument(format!("{} has no field {name}", self.name)))
    }

    /// Offset of a field by name
    pub fn offset(&self, name: &str) -> Result<usize>
    {
        self.field(name).map(|f| f.offset)
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[Field]
    {
        &self.fields
    }
}

/// Read-only view of a fetched structure
///
/// Pairs a local byte buffer with the target address it came from, so
/// self-relative fields can be resolved against their own target location.
#[derive(Debug, Clone, Copy)]
pub struct StructView<'a>
{
    layout: &'a StructLayout,
    abi: Abi,
    base: TargetAddr,
    bytes: &'a [u8],
}

impl<'a> StructView<'a>
{
    /// Wrap `bytes` (fetched from `base`) with `layout`.
    ///
    /// ## Errors
    ///
    /// `Decode` if the buffer is shorter than the structure.
    pub fn new(layout: &'a StructLayout, abi: Abi, base: TargetAddr, bytes: &'a [u8]) -> Result<Self>
    {
        if bytes.len() < layout.size() {
            return Err(SccError::decode(
                layout.name(),
                base,
                format!("buffer holds {} bytes, structure needs {}", bytes.len(), layout.size()),
            ));
        }
        Ok(Self {
            layout,
            abi,
            base,
            bytes,
        })
    }

    /// Target address of the structure
    pub fn base(&self) -> TargetAddr
    {
        self.base
    }

    /// Target address of a field
    pub fn field_addr(&self, name: &str) -> Result<TargetAddr>
    {
        Ok(self.base + self.layout.offset(name)? as u64)
    }

    fn slice(&self, name: &str, expected: &[FieldKind]) -> Result<(Field, &'a [u8])>
    {
        let field = self.layout.field(name)?;
        if !expected.contains(&field.kind) {
            return Err(SccError::InvalidArgument(format!(
                "{}.{name} is {:?}, not {:?}",
                self.layout.name(),
                field.kind,
                expected
            )));
        }
        let size = field.kind.size(&self.abi);
        Ok((field, &self.bytes[field.offset..field.offset + size]))
    }

    pub fn u8(&self, name: &str) -> Result<u8>
    {
        let (_, bytes) = self.slice(name, &[FieldKind::U8])?;
        Ok(bytes[0])
    }

    pub fn u16(&self, name: &str) -> Result<u16>
    {
        let (_, bytes) = self.slice(name, &[FieldKind::U16, FieldKind::I16])?;
        Ok(self.abi.arch.u16(bytes))
    }

    pub fn i16(&self, name: &str) -> Result<i16>
    {
        self.u16(name).map(|v| v as i16)
    }

    pub fn u32(&self, name: &str) -> Result<u32>
    {
        let (_, bytes) = self.slice(name, &[FieldKind::U32, FieldKind::I32, FieldKind::Srp])?;
        Ok(self.abi.arch.u32(bytes))
    }

    pub fn i32(&self, name: &str) -> Result<i32>
    {
        self.u32(name).map(|v| v as i32)
    }

    pub fn u64(&self, name: &str) -> Result<u64>
    {
        let (_, bytes) = self.slice(name, &[FieldKind::U64, FieldKind::I64])?;
        Ok(self.abi.arch.u64(bytes))
    }

    pub fn i64(&self, name: &str) -> Result<i64>
    {
        self.u64(name).map(|v| v as i64)
    }

    /// Pointer-sized unsigned value
    pub fn udata(&self, name: &str) -> Result<u64>
    {
        let (_, bytes) = self.slice(name, &[FieldKind::Udata, FieldKind::Pointer, FieldKind::Wsrp])?;
        Ok(self.abi.arch.udata(bytes))
    }

    /// Absolute pointer field
    pub fn pointer(&self, name: &str) -> Result<TargetAddr>
    {
        let (_, bytes) = self.slice(name, &[FieldKind::Pointer, FieldKind::Udata])?;
        Ok(TargetAddr::from(self.abi.arch.udata(bytes)))
    }

    /// 32-bit self-relative pointer, resolved against the field address
    pub fn srp(&self, name: &str) -> Result<Option<TargetAddr>>
    {
        let (field, bytes) = self.slice(name, &[FieldKind::Srp])?;
        let raw = self.abi.arch.u32(bytes) as i32;
        Ok(resolve_relative(self.base + field.offset as u64, i64::from(raw)))
    }

    /// Pointer-sized self-relative pointer, resolved against the field address
    ///
    /// `mask` clears low tag bits before resolving (AVL links keep balance
    /// flags there); pass `0` for plain WSRPs.
    pub fn wsrp(&self, name: &str, mask: i64) -> Result<Option<TargetAddr>>
    {
        let (field, bytes) = self.slice(name, &[FieldKind::Wsrp])?;
        let raw = self.abi.arch.idata(bytes) & !mask;
        Ok(resolve_relative(self.base + field.offset as u64, raw))
    }

    /// Cache-relative offset field
    pub fn shr_offset(&self, name: &str) -> Result<ShrOffset>
    {
        let (_, bytes) = self.slice(name, &[FieldKind::ShrOffset])?;
        Ok(ShrOffset::decode(&self.abi, bytes))
    }

    /// Inline byte array
    pub fn bytes(&self, name: &str) -> Result<&'a [u8]>
    {
        let field = self.layout.field(name)?;
        match field.kind {
            FieldKind::Bytes(n) => Ok(&self.bytes[field.offset..field.offset + n]),
            other => Err(SccError::InvalidArgument(format!(
                "{}.{name} is {other:?}, not a byte array",
                self.layout.name()
            ))),
        }
    }
}

/// Resolve a self-relative displacement; `0` is the null sentinel.
pub fn resolve_relative(field_addr: TargetAddr, displacement: i64) -> Option<TargetAddr>
{
    if displacement == 0 {
        return None;
    }
    field_addr.checked_offset(displacement)
}
