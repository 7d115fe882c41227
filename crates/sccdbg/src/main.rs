use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use clap::{ArgGroup, Parser};
use sccdbg_core::codec::Alignment;
use sccdbg_core::commands::{parse_address, CommandContext, CommandRegistry, WriterConsole};
use sccdbg_core::config::{LayerPolicy, TargetConfig, DEFAULT_WALK_LIMIT};
use sccdbg_core::target::{CoreFile, MemoryImage, Session, TargetMemory};
use sccdbg_core::types::{Endianness, PointerWidth, TargetAddr, TargetArch};
use sccdbg_utils::{info, init_logging_with, LogLevel, LogSettings};

/// Inspect the shared class cache of a JVM without stopping it.
#[derive(Parser, Debug)]
#[command(name = "sccdbg")]
#[command(version)]
#[command(about = "Inspect the shared class cache and VM structures of a JVM process, core dump, or raw cache image", long_about = None)]
#[command(group(ArgGroup::new("target").required(true).args(["core", "pid", "raw"])))]
struct Cli
{
    /// ELF core file to inspect
    #[arg(long, value_name = "FILE")]
    core: Option<PathBuf>,

    /// Running process to read (Linux, process_vm_readv)
    #[arg(long)]
    pid: Option<u32>,

    /// Raw memory image mapped at BASE, e.g. a cache file: cache.bin@0x7f0000000000
    #[arg(long, value_name = "FILE@BASE", value_parser = parse_raw)]
    raw: Option<(PathBuf, TargetAddr)>,

    /// Address of the J9JavaVM (found by scanning for the RAS structure otherwise)
    #[arg(long, value_name = "ADDR", value_parser = parse_addr)]
    vm: Option<TargetAddr>,

    /// Target pointer width in bits (default: from the core file, else 64)
    #[arg(long, value_name = "32|64")]
    pointer_size: Option<PointerWidth>,

    /// Target byte order (default: from the core file, else little)
    #[arg(long, value_name = "little|big")]
    endian: Option<Endianness>,

    /// The target build tags cache offsets with a layer number
    #[arg(long, default_value_t = false)]
    multi_layer: bool,

    /// Record alignment of the cache
    #[arg(long, value_name = "word|double", default_value = "word")]
    align: Alignment,

    /// Anchor used for untagged offsets in a layered cache
    #[arg(long, value_name = "newest|explicit", default_value = "newest")]
    layer_policy: LayerPolicy,

    /// Upper bound on the steps of any single walk
    #[arg(long, default_value_t = DEFAULT_WALK_LIMIT)]
    walk_limit: usize,

    /// Log level (overrides RUST_LOG)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Command to run; without one, commands are read from stdin
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn parse_addr(text: &str) -> Result<TargetAddr, String>
{
    parse_address(text).map_err(|e| e.to_string())
}

fn parse_raw(text: &str) -> Result<(PathBuf, TargetAddr), String>
{
    let (file, base) = text
        .rsplit_once('@')
        .ok_or_else(|| format!("'{text}' is not FILE@BASE"))?;
    Ok((PathBuf::from(file), parse_addr(base)?))
}

fn main()
{
    let cli = Cli::parse();

    let settings = match LogSettings::from_env() {
        Ok(settings) => settings.with_level(cli.log_level),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = init_logging_with(&settings) {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// Open the target named on the command line
///
/// Returns the backend, the architecture it reports (core files only) and
/// the cache header address for raw images.
fn open_target(cli: &Cli) -> Result<(Box<dyn TargetMemory>, Option<TargetArch>, Option<TargetAddr>), Box<dyn std::error::Error>>
{
    if let Some(path) = &cli.core {
        info!("Opening core file {}", path.display());
        let core = CoreFile::open(path)?;
        let arch = core.detected_arch();
        return Ok((Box::new(core), Some(arch), None));
    }
    if let Some((path, base)) = &cli.raw {
        info!("Mapping {} at {base}", path.display());
        return Ok((Box::new(MemoryImage::from_raw_file(path, *base)?), None, Some(*base)));
    }
    if let Some(pid) = cli.pid {
        return attach(pid).map(|live| (live, None, None));
    }
    Err("one of --core, --pid or --raw is required".into())
}

#[cfg(target_os = "linux")]
fn attach(pid: u32) -> Result<Box<dyn TargetMemory>, Box<dyn std::error::Error>>
{
    info!("Attaching to process {pid}");
    Ok(Box::new(sccdbg_core::target::LiveProcess::attach(pid)?))
}

#[cfg(not(target_os = "linux"))]
fn attach(_pid: u32) -> Result<Box<dyn TargetMemory>, Box<dyn std::error::Error>>
{
    Err("reading live processes is only supported on Linux".into())
}

fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>>
{
    let (target, detected, cache_header) = open_target(&cli)?;

    let mut arch = detected.unwrap_or_default();
    if let Some(width) = cli.pointer_size {
        arch.pointer_width = width;
    }
    if let Some(endian) = cli.endian {
        arch.endian = endian;
    }
    let config = TargetConfig::default()
        .with_arch(arch)
        .with_multi_layer(cli.multi_layer)
        .with_alignment(cli.align)
        .with_layer_policy(cli.layer_policy)
        .with_walk_limit(cli.walk_limit);
    info!("Target {}: {config}", target.description());

    let session = Session::new(&*target, config);
    let mut registry = CommandRegistry::new(CommandContext {
        vm: cli.vm,
        cache_header,
    });
    let mut console = WriterConsole::new(io::stdout().lock());

    if !cli.command.is_empty() {
        return Ok(registry.dispatch(&session, &cli.command.join(" "), &mut console));
    }

    let stdin = io::stdin();
    let mut ok = true;
    loop {
        eprint!("sccdbg> ");
        io::stderr().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match line.trim() {
            "quit" | "exit" | "q" => break,
            text => ok &= registry.dispatch(&session, text, &mut console),
        }
    }
    Ok(ok)
}
