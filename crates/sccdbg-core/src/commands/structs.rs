//! Structure dump commands (`j9vm`, `j9class`, `j9x`, ...).

use super::args::{parse_address, parse_number, Args};
use super::{CommandContext, Console};
use crate::error::{Result, SccError};
use crate::readers::{
    find_jit_metadata, read_class, read_constant_pool, read_java_vm, read_method, read_object, read_rom_class,
    read_rom_method, read_shared_class_config, rom_methods, RomMethod,
};
use crate::target::Session;
use crate::types::TargetAddr;
use crate::walk::PoolWalker;

const DEFAULT_DUMP_LEN: u64 = 64;
const MAX_DUMP_LEN: u64 = 64 * 1024;
const DUMP_WIDTH: usize = 16;

/// The single address operand of a command
fn address_operand(args: &Args, usage: &str) -> Result<TargetAddr>
{
    args.check_max(1, usage)?;
    parse_address(args.require(0, usage)?)
}

fn field(console: &mut dyn Console, name: &str, value: impl std::fmt::Display)
{
    console.line(&format!("  {name:<24} {value}"));
}

pub(super) fn j9vm(ctx: &mut CommandContext, session: &Session<'_>, args: &Args, console: &mut dyn Console) -> Result<()>
{
    args.check_max(1, "j9vm [addr]")?;
    let addr = match args.get(0) {
        Some(text) => parse_address(text)?,
        None => ctx.vm(session)?,
    };
    let vm = read_java_vm(session, addr)?;
    console.line(&format!("J9JavaVM at {}", vm.address));
    field(console, "internalVMFunctions", vm.internal_vm_functions);
    field(console, "portLibrary", vm.port_library);
    field(console, "mainThread", vm.main_thread);
    field(console, "classMemorySegments", vm.class_memory_segments);
    field(console, "classLoaderBlocks", vm.class_loader_blocks);
    field(console, "systemClassLoader", vm.system_class_loader);
    field(console, "applicationClassLoader", vm.application_class_loader);
    field(console, "sharedClassConfig", vm.shared_class_config);
    field(console, "jitConfig", vm.jit_config);
    field(console, "runtimeFlags", format!("{:#x}", vm.runtime_flags));
    field(console, "totalThreadCount", vm.total_thread_count);
    if let Some(config) = read_shared_class_config(session, &vm)? {
        console.line(&format!("J9SharedClassConfig at {}", config.address));
        field(console, "sharedClassCache", config.shared_class_cache);
        field(console, "cacheDescriptorList", config.cache_descriptor_list);
        field(console, "runtimeFlags", format!("{:#x}", config.runtime_flags));
        field(console, "verboseFlags", format!("{:#x}", config.verbose_flags));
        field(console, "softMaxBytes", config.soft_max_bytes);
    }
    if ctx.vm.is_none() {
        ctx.vm = Some(addr);
    }
    Ok(())
}

pub(super) fn j9class(_: &mut CommandContext, session: &Session<'_>, args: &Args, console: &mut dyn Console) -> Result<()>
{
    let class = read_class(session, address_operand(args, "j9class <addr>")?)?;
    console.line(&format!("J9Class at {}: {}", class.address, class.name));
    field(console, "romClass", class.rom_class);
    field(console, "superclasses", class.superclasses);
    field(console, "classDepthAndFlags", format!("{} / {:#x}", class.class_depth, class.class_flags));
    field(console, "classLoader", class.class_loader);
    field(console, "classObject", class.class_object);
    field(console, "initializeStatus", class.initialize_status);
    field(console, "ramMethods", class.ram_methods);
    field(console, "ramStatics", class.ram_statics);
    field(console, "arrayClass", class.array_class);
    field(console, "totalInstanceSize", class.total_instance_size);
    field(console, "ramConstantPool", class.ram_constant_pool);
    Ok(())
}

fn print_rom_method(console: &mut dyn Console, method: &RomMethod)
{
    console.line(&format!(
        "  {} {} modifiers {:#x} maxStack {} args {} temps {} bytecodes {} ({} bytes)",
        method.address,
        method.display_name(),
        method.modifiers,
        method.max_stack,
        method.arg_count,
        method.temp_count,
        method.bytecodes,
        method.bytecode_size
    ));
}

pub(super) fn j9romclass(_: &mut CommandContext, session: &Session<'_>, args: &Args, console: &mut dyn Console) -> Result<()>
{
    let class = read_rom_class(session, address_operand(args, "j9romclass <addr>")?)?;
    console.line(&format!("J9ROMClass at {}: {}", class.address, class.class_name));
    field(console, "romSize", class.rom_size);
    field(console, "superclassName", class.superclass_name.as_deref().unwrap_or("<none>"));
    field(console, "modifiers", format!("{:#x} / {:#x}", class.modifiers, class.extra_modifiers));
    field(console, "interfaceCount", class.interface_count);
    field(console, "romFieldCount", class.rom_field_count);
    field(
        console,
        "statics (single/object/double)",
        format!(
            "{} / {} / {}",
            class.single_scalar_static_count, class.object_static_count, class.double_scalar_static_count
        ),
    );
    field(
        console,
        "constant pool (ram/rom)",
        format!("{} / {}", class.ram_constant_pool_count, class.rom_constant_pool_count),
    );
    field(console, "romMethodCount", class.rom_method_count);
    for method in rom_methods(session, &class)? {
        print_rom_method(console, &method);
    }
    Ok(())
}

pub(super) fn j9method(_: &mut CommandContext, session: &Session<'_>, args: &Args, console: &mut dyn Console) -> Result<()>
{
    let method = read_method(session, address_operand(args, "j9method <addr>")?)?;
    console.line(&format!("J9Method at {}: {}", method.address, method.rom_method.display_name()));
    field(console, "bytecodes", method.bytecodes);
    field(console, "constantPool", method.constant_pool);
    field(console, "methodRunAddress", method.method_run_address);
    field(console, "extra", format!("{:#x}", method.extra));
    print_rom_method(console, &method.rom_method);
    Ok(())
}

pub(super) fn j9rommethod(_: &mut CommandContext, session: &Session<'_>, args: &Args, console: &mut dyn Console) -> Result<()>
{
    let method = read_rom_method(session, address_operand(args, "j9rommethod <addr>")?)?;
    console.line(&format!("J9ROMMethod at {}", method.address));
    print_rom_method(console, &method);
    field(console, "next", method.next());
    Ok(())
}

pub(super) fn j9constantpool(
    _: &mut CommandContext,
    session: &Session<'_>,
    args: &Args,
    console: &mut dyn Console,
) -> Result<()>
{
    let pool = read_constant_pool(session, address_operand(args, "j9constantpool <addr>")?)?;
    console.line(&format!("J9ConstantPool at {}: {}", pool.address, pool.class_name));
    field(console, "ramClass", pool.ram_class);
    field(console, "romConstantPool", pool.rom_constant_pool);
    Ok(())
}

pub(super) fn j9object(_: &mut CommandContext, session: &Session<'_>, args: &Args, console: &mut dyn Console) -> Result<()>
{
    let object = read_object(session, address_operand(args, "j9object <addr>")?)?;
    console.line(&format!("J9Object at {}: {}", object.address, object.class_name));
    field(console, "clazz", object.clazz);
    Ok(())
}

/// Format one hex dump line: address, hex bytes, printable ASCII
fn hex_line(addr: TargetAddr, bytes: &[u8]) -> String
{
    let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
    let ascii: String = bytes
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect();
    format!("{addr}: {:<width$}  {ascii}", hex.join(" "), width = DUMP_WIDTH * 3 - 1)
}

pub(super) fn j9x(_: &mut CommandContext, session: &Session<'_>, args: &Args, console: &mut dyn Console) -> Result<()>
{
    const USAGE: &str = "j9x <addr>[,len]";
    args.check_max(2, USAGE)?;
    let addr = parse_address(args.require(0, USAGE)?)?;
    let len = args.get(1).map(parse_number).transpose()?.unwrap_or(DEFAULT_DUMP_LEN);
    if len == 0 || len > MAX_DUMP_LEN {
        return Err(SccError::Usage(format!("length must be 1..={MAX_DUMP_LEN}; {USAGE}")));
    }
    let shadow = session.read_bytes(addr, len as usize)?;
    for (row, chunk) in shadow.chunks(DUMP_WIDTH).enumerate() {
        console.line(&hex_line(addr + (row * DUMP_WIDTH) as u64, chunk));
    }
    Ok(())
}

pub(super) fn walkpool(_: &mut CommandContext, session: &Session<'_>, args: &Args, console: &mut dyn Console) -> Result<()>
{
    let pool = address_operand(args, "walkpool <addr>")?;
    let mut walker = PoolWalker::start(session, pool)?;
    let header = *walker.header();
    console.line(&format!(
        "J9Pool at {pool}: {} byte elements, {} per puddle",
        header.element_size, header.elements_per_puddle
    ));
    for element in walker.by_ref() {
        console.line(&format!("  {}", element?));
    }
    console.line(&format!("{} live element(s)", walker.yielded()));
    Ok(())
}

pub(super) fn jitmetadata(ctx: &mut CommandContext, session: &Session<'_>, args: &Args, console: &mut dyn Console) -> Result<()>
{
    args.check_max(1, "jitmetadata <pc>")?;
    let pc = parse_number(args.require(0, "jitmetadata <pc>")?)?;
    let vm = read_java_vm(session, ctx.vm(session)?)?;
    match find_jit_metadata(session, &vm, pc)? {
        Some(metadata) => {
            console.line(&format!("J9JITExceptionTable at {}: {}", metadata.address, metadata.display_name()));
            field(console, "ramMethod", metadata.ram_method);
            field(console, "constantPool", metadata.constant_pool);
            field(console, "warm", format!("{:#x}..{:#x}", metadata.start_pc, metadata.end_warm_pc));
            if metadata.start_cold_pc != 0 {
                field(console, "cold", format!("{:#x}..{:#x}", metadata.start_cold_pc, metadata.end_pc));
            }
            field(console, "totalFrameSize", metadata.total_frame_size);
            field(console, "size", metadata.size);
        }
        None => console.line(&format!("No JIT metadata covers {pc:#x}")),
    }
    Ok(())
}
