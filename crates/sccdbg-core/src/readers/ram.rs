//! RAM structures: classes, methods, constant pools and objects.
//!
//! These live in the VM's own memory (not the cache) and hold absolute
//! pointers, some with flag bits packed into their low bits.

use super::layouts::{CLASS_EYECATCHER, METHOD_CP_FLAGS_MASK, OBJECT_CLASS_FLAGS_MASK};
use super::rom::{class_name_from_rom_class, read_rom_method, RomMethod};
use crate::error::{Result, SccError};
use crate::target::Session;
use crate::types::TargetAddr;

/// Local snapshot of a `J9Class`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamClass
{
    pub address: TargetAddr,
    pub rom_class: TargetAddr,
    pub name: String,
    pub superclasses: TargetAddr,
    pub class_depth: u64,
    pub class_flags: u32,
    pub class_loader: TargetAddr,
    pub class_object: TargetAddr,
    pub initialize_status: u64,
    pub ram_methods: TargetAddr,
    pub ram_statics: TargetAddr,
    pub array_class: TargetAddr,
    pub total_instance_size: u64,
    pub ram_constant_pool: TargetAddr,
}

/// Depth bits of `J9Class.classDepthAndFlags`
const CLASS_DEPTH_MASK: u64 = 0xffff;

/// Read the `J9Class` at `addr`, checking its eyecatcher
pub fn read_class(session: &Session<'_>, addr: TargetAddr) -> Result<RamClass>
{
    let layout = &session.vm_layouts().class;
    let shadow = session.read_struct(addr, layout)?;
    let v = shadow.view(layout, session.abi())?;

    let eyecatcher = v.udata("eyecatcher")?;
    if eyecatcher != CLASS_EYECATCHER {
        return Err(SccError::decode("J9Class", addr, format!("eyecatcher {eyecatcher:#x}")));
    }
    let rom_class = v.pointer("romClass")?;
    if rom_class.is_null() {
        return Err(SccError::decode("J9Class", addr, "null romClass"));
    }

    Ok(RamClass {
        address: addr,
        rom_class,
        name: class_name_from_rom_class(session, rom_class)?,
        superclasses: v.pointer("superclasses")?,
        class_depth: v.udata("classDepthAndFlags")? & CLASS_DEPTH_MASK,
        class_flags: v.u32("classFlags")?,
        class_loader: v.pointer("classLoader")?,
        class_object: v.pointer("classObject")?,
        initialize_status: v.udata("initializeStatus")?,
        ram_methods: v.pointer("ramMethods")?,
        ram_statics: v.pointer("ramStatics")?,
        array_class: v.pointer("arrayClass")?,
        total_instance_size: v.udata("totalInstanceSize")?,
        ram_constant_pool: v.pointer("ramConstantPool")?,
    })
}

/// Local snapshot of a `J9Method`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamMethod
{
    pub address: TargetAddr,
    pub bytecodes: TargetAddr,
    /// Constant pool with flag bits cleared
    pub constant_pool: TargetAddr,
    pub method_run_address: TargetAddr,
    pub extra: u64,
    /// The ROM method header just before the bytecodes
    pub rom_method: RomMethod,
}

/// Read the `J9Method` at `addr` along with its ROM method
pub fn read_method(session: &Session<'_>, addr: TargetAddr) -> Result<RamMethod>
{
    let layouts = session.vm_layouts();
    let shadow = session.read_struct(addr, &layouts.method)?;
    let v = shadow.view(&layouts.method, session.abi())?;

    let bytecodes = v.pointer("bytecodes")?;
    let rom_addr = bytecodes
        .checked_sub(layouts.rom_method.size() as u64)
        .filter(|_| !bytecodes.is_null())
        .ok_or_else(|| SccError::decode("J9Method", addr, format!("bytecodes at {bytecodes}")))?;

    Ok(RamMethod {
        address: addr,
        bytecodes,
        constant_pool: TargetAddr::from(v.udata("constantPool")? & !METHOD_CP_FLAGS_MASK),
        method_run_address: v.pointer("methodRunAddress")?,
        extra: v.udata("extra")?,
        rom_method: read_rom_method(session, rom_addr)?,
    })
}

/// Local snapshot of a RAM constant pool header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool
{
    pub address: TargetAddr,
    pub ram_class: TargetAddr,
    pub rom_constant_pool: TargetAddr,
    /// Owning class, via the ROM class in front of the ROM constant pool
    pub class_name: String,
}

/// Read the constant pool at `addr`
pub fn read_constant_pool(session: &Session<'_>, addr: TargetAddr) -> Result<ConstantPool>
{
    let layouts = session.vm_layouts();
    let shadow = session.read_struct(addr, &layouts.constant_pool)?;
    let v = shadow.view(&layouts.constant_pool, session.abi())?;

    let rom_constant_pool = v.pointer("romConstantPool")?;
    let rom_class = rom_constant_pool
        .checked_sub(layouts.rom_class.size() as u64)
        .filter(|_| !rom_constant_pool.is_null())
        .ok_or_else(|| SccError::decode("J9ConstantPool", addr, format!("romConstantPool at {rom_constant_pool}")))?;

    Ok(ConstantPool {
        address: addr,
        ram_class: v.pointer("ramClass")?,
        rom_constant_pool,
        class_name: class_name_from_rom_class(session, rom_class)?,
    })
}

/// Local snapshot of an object header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaObject
{
    pub address: TargetAddr,
    /// Class pointer with flag bits cleared
    pub clazz: TargetAddr,
    pub class_name: String,
}

/// Read the object header at `addr` and name its class
pub fn read_object(session: &Session<'_>, addr: TargetAddr) -> Result<JavaObject>
{
    let layout = &session.vm_layouts().object;
    let shadow = session.read_struct(addr, layout)?;
    let v = shadow.view(layout, session.abi())?;
    let clazz = TargetAddr::from(v.udata("clazz")? & !OBJECT_CLASS_FLAGS_MASK);
    let class = read_class(session, clazz)?;
    Ok(JavaObject {
        address: addr,
        clazz,
        class_name: class.name,
    })
}

/// Name of the class of the object at `addr`
pub fn class_name_from_object(session: &Session<'_>, addr: TargetAddr) -> Result<String>
{
    read_object(session, addr).map(|o| o.class_name)
}
