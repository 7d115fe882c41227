//! ROM classes and ROM methods.
//!
//! ROM structures are immutable and mostly live in the shared cache. All
//! internal references are SRPs, so a ROM class reads the same wherever the
//! cache is mapped.

use tracing::trace;

use super::utf8::{read_utf8, read_utf8_srp};
use crate::codec::pad;
use crate::error::{Result, SccError};
use crate::target::Session;
use crate::types::TargetAddr;

/// Upper bound on per-class counts (methods, interfaces, constant pool)
const MAX_CLASS_COUNT: u32 = u16::MAX as u32;

/// Local snapshot of a `J9ROMClass`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomClass
{
    pub address: TargetAddr,
    pub rom_size: u32,
    pub class_name: String,
    pub superclass_name: Option<String>,
    pub modifiers: u32,
    pub extra_modifiers: u32,
    pub interface_count: u32,
    pub rom_method_count: u32,
    pub rom_methods: Option<TargetAddr>,
    pub rom_field_count: u32,
    pub single_scalar_static_count: u32,
    pub object_static_count: u32,
    pub double_scalar_static_count: u32,
    pub ram_constant_pool_count: u32,
    pub rom_constant_pool_count: u32,
}

impl RomClass
{
    /// End of the ROM class (exclusive)
    pub fn end(&self) -> TargetAddr
    {
        self.address + u64::from(self.rom_size)
    }

    pub fn contains(&self, addr: TargetAddr) -> bool
    {
        addr >= self.address && addr < self.end()
    }
}

/// Read and validate the ROM class at `addr`
pub fn read_rom_class(session: &Session<'_>, addr: TargetAddr) -> Result<RomClass>
{
    let layout = &session.vm_layouts().rom_class;
    let shadow = session.read_struct(addr, layout)?;
    let v = shadow.view(layout, session.abi())?;

    let rom_size = v.u32("romSize")?;
    if (rom_size as usize) < layout.size() {
        return Err(SccError::decode("J9ROMClass", addr, format!("romSize {rom_size} below header size")));
    }
    let counts = [
        ("interfaceCount", v.u32("interfaceCount")?),
        ("romMethodCount", v.u32("romMethodCount")?),
        ("romFieldCount", v.u32("romFieldCount")?),
        ("romConstantPoolCount", v.u32("romConstantPoolCount")?),
    ];
    if let Some((name, count)) = counts.iter().find(|(_, count)| *count > MAX_CLASS_COUNT) {
        return Err(SccError::decode("J9ROMClass", addr, format!("{name} {count} out of range")));
    }
    let ram_constant_pool_count = v.u32("ramConstantPoolCount")?;
    if ram_constant_pool_count > counts[3].1 {
        return Err(SccError::decode(
            "J9ROMClass",
            addr,
            format!("ramConstantPoolCount {ram_constant_pool_count} exceeds romConstantPoolCount {}", counts[3].1),
        ));
    }

    let name_addr = v
        .srp("className")?
        .ok_or_else(|| SccError::decode("J9ROMClass", addr, "null className"))?;
    let rom_methods = v.srp("romMethods")?;
    let end = addr + u64::from(rom_size);
    if counts[1].1 > 0 && !rom_methods.is_some_and(|m| m >= addr && m < end) {
        return Err(SccError::decode("J9ROMClass", addr, "romMethods outside the ROM class"));
    }

    let class = RomClass {
        address: addr,
        rom_size,
        class_name: read_utf8(session, name_addr)?,
        superclass_name: read_utf8_srp(session, v.field_addr("superclassName")?)?,
        modifiers: v.u32("modifiers")?,
        extra_modifiers: v.u32("extraModifiers")?,
        interface_count: counts[0].1,
        rom_method_count: counts[1].1,
        rom_methods,
        rom_field_count: counts[2].1,
        single_scalar_static_count: v.u32("singleScalarStaticCount")?,
        object_static_count: v.u32("objectStaticCount")?,
        double_scalar_static_count: v.u32("doubleScalarStaticCount")?,
        ram_constant_pool_count,
        rom_constant_pool_count: counts[3].1,
    };
    trace!("ROM class {} at {addr}", class.class_name);
    Ok(class)
}

/// Name of the ROM class at `addr`
pub fn class_name_from_rom_class(session: &Session<'_>, addr: TargetAddr) -> Result<String>
{
    let layout = &session.vm_layouts().rom_class;
    let field = addr + layout.offset("className")? as u64;
    read_utf8_srp(session, field)?.ok_or_else(|| SccError::decode("J9ROMClass", addr, "null className"))
}

/// Local snapshot of a `J9ROMMethod`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomMethod
{
    pub address: TargetAddr,
    pub name: String,
    pub signature: String,
    pub modifiers: u32,
    pub max_stack: u16,
    pub bytecode_size: u32,
    pub arg_count: u8,
    pub temp_count: u16,
    /// First bytecode (right after the fixed header)
    pub bytecodes: TargetAddr,
}

impl RomMethod
{
    /// Address of the method that follows this one in its ROM class
    pub fn next(&self) -> TargetAddr
    {
        self.bytecodes + pad(u64::from(self.bytecode_size), 4)
    }

    /// `name` followed by `signature`, as printed in stack traces
    pub fn display_name(&self) -> String
    {
        format!("{}{}", self.name, self.signature)
    }
}

/// Read the ROM method at `addr`
pub fn read_rom_method(session: &Session<'_>, addr: TargetAddr) -> Result<RomMethod>
{
    let layout = &session.vm_layouts().rom_method;
    let shadow = session.read_struct(addr, layout)?;
    let v = shadow.view(layout, session.abi())?;

    let name = read_utf8_srp(session, v.field_addr("nameAndSignature.name")?)?
        .ok_or_else(|| SccError::decode("J9ROMMethod", addr, "null name"))?;
    let signature = read_utf8_srp(session, v.field_addr("nameAndSignature.signature")?)?
        .ok_or_else(|| SccError::decode("J9ROMMethod", addr, "null signature"))?;
    let bytecode_size = u32::from(v.u16("bytecodeSizeLow")?) | (u32::from(v.u8("bytecodeSizeHigh")?) << 16);

    Ok(RomMethod {
        address: addr,
        name,
        signature,
        modifiers: v.u32("modifiers")?,
        max_stack: v.u16("maxStack")?,
        bytecode_size,
        arg_count: v.u8("argCount")?,
        temp_count: v.u16("tempCount")?,
        bytecodes: addr + layout.size() as u64,
    })
}

/// `name` + `signature` of the ROM method at `addr`
pub fn read_name_from_rom_method(session: &Session<'_>, addr: TargetAddr) -> Result<String>
{
    read_rom_method(session, addr).map(|m| m.display_name())
}

/// Every ROM method of `class`, in declaration order
///
/// ## Errors
///
/// `Decode` if a method runs past the end of the ROM class.
pub fn rom_methods(session: &Session<'_>, class: &RomClass) -> Result<Vec<RomMethod>>
{
    let mut methods = Vec::with_capacity(class.rom_method_count as usize);
    let Some(mut cursor) = class.rom_methods else {
        return Ok(methods);
    };
    for _ in 0..class.rom_method_count {
        if !class.contains(cursor) {
            return Err(SccError::decode("J9ROMMethod", cursor, format!("outside ROM class {}", class.class_name)));
        }
        let method = read_rom_method(session, cursor)?;
        cursor = method.next();
        methods.push(method);
    }
    Ok(methods)
}
