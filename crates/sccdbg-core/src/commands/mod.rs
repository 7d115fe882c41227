//! Debugger command surface.
//!
//! Every command is a function taking the free-form argument text after
//! its name. [`CommandRegistry::dispatch`] looks the name up, runs the
//! command inside a [`CommandScope`] so shadow memory is released however
//! the command ends, and turns any error into a single diagnostic line.
//!
//! ```text
//! > shrc stats layer=0
//! > j9romclass 0x7f3a00012340
//! > j9x 0x7f3a00012340,32
//! ```

pub mod args;
mod shrc;
mod structs;

use std::collections::BTreeMap;
use std::io::Write;

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::error::{Result, SccError};
use crate::readers::{find_java_vm, CacheLocation};
use crate::target::{CommandScope, Session};
use crate::types::TargetAddr;

pub use args::{parse_address, parse_number, Args, MatchFlags, Wildcard};

/// Line-oriented output sink
pub trait Console
{
    fn line(&mut self, text: &str);
}

/// Collects output lines in memory
#[derive(Debug, Default, Clone)]
pub struct BufferConsole
{
    pub lines: Vec<String>,
}

impl BufferConsole
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// All output joined with newlines
    pub fn text(&self) -> String
    {
        self.lines.join("\n")
    }
}

impl Console for BufferConsole
{
    fn line(&mut self, text: &str)
    {
        self.lines.push(text.to_string());
    }
}

/// Writes each line to an `io::Write` (stdout in the CLI)
pub struct WriterConsole<W: Write>
{
    out: W,
}

impl<W: Write> WriterConsole<W>
{
    pub fn new(out: W) -> Self
    {
        Self { out }
    }
}

impl<W: Write> Console for WriterConsole<W>
{
    fn line(&mut self, text: &str)
    {
        // A closed stdout is not worth failing a command over.
        let _ = writeln!(self.out, "{text}");
    }
}

/// State kept between commands
///
/// Holds where the VM and the cache were found so later commands do not
/// have to scan again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandContext
{
    /// `J9JavaVM` address, given with `--vm` or found by scanning
    pub vm: Option<TargetAddr>,
    /// Cache header address for raw cache images (`--raw`)
    pub cache_header: Option<TargetAddr>,
}

impl CommandContext
{
    /// The VM address, scanning the target the first time it is needed
    pub fn vm(&mut self, session: &Session<'_>) -> Result<TargetAddr>
    {
        if let Some(vm) = self.vm {
            return Ok(vm);
        }
        let vm = find_java_vm(session)?
            .ok_or_else(|| SccError::InvalidArgument("no J9JavaVM found in the target; pass its address with --vm".into()))?;
        self.vm = Some(vm);
        Ok(vm)
    }

    /// Where the cache layers are loaded from
    pub fn cache_location(&mut self, session: &Session<'_>) -> Result<CacheLocation>
    {
        match self.cache_header {
            Some(header) => Ok(CacheLocation::Header(header)),
            None => self.vm(session).map(CacheLocation::Vm),
        }
    }
}

type Handler = fn(&mut CommandContext, &Session<'_>, &Args, &mut dyn Console) -> Result<()>;

/// A registered command
#[derive(Clone, Copy)]
pub struct Command
{
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    handler: Handler,
}

static COMMANDS: Lazy<BTreeMap<&'static str, Command>> = Lazy::new(|| {
    let mut table = BTreeMap::new();
    let mut add = |name: &'static str, usage: &'static str, text: &'static str, handler: Handler| {
        table.insert(name, Command { name, usage, help: text, handler });
    };
    add("shrc", shrc::USAGE, "shared class cache statistics and searches", shrc::run);
    add("j9vm", "j9vm [addr]", "dump the J9JavaVM (found by scanning when no address is given)", structs::j9vm);
    add("j9class", "j9class <addr>", "dump a RAM class", structs::j9class);
    add("j9romclass", "j9romclass <addr>", "dump a ROM class and its methods", structs::j9romclass);
    add("j9method", "j9method <addr>", "dump a RAM method", structs::j9method);
    add("j9rommethod", "j9rommethod <addr>", "dump a ROM method", structs::j9rommethod);
    add("j9constantpool", "j9constantpool <addr>", "dump a RAM constant pool header", structs::j9constantpool);
    add("j9object", "j9object <addr>", "dump an object header", structs::j9object);
    add("j9x", "j9x <addr>[,len]", "hex dump target memory (default 64 bytes)", structs::j9x);
    add("walkpool", "walkpool <addr>", "list the live elements of a J9Pool", structs::walkpool);
    add("jitmetadata", "jitmetadata <pc>", "find the JIT metadata covering a code address", structs::jitmetadata);
    add("help", "help [command]", "list commands", help);
    table
});

/// Look up a command by name
pub fn command(name: &str) -> Option<&'static Command>
{
    COMMANDS.get(name)
}

/// Every registered command, sorted by name
pub fn commands() -> impl Iterator<Item = &'static Command>
{
    COMMANDS.values()
}

/// Dispatches command lines against one session
#[derive(Debug, Default)]
pub struct CommandRegistry
{
    context: CommandContext,
}

impl CommandRegistry
{
    pub fn new(context: CommandContext) -> Self
    {
        Self { context }
    }

    pub fn context(&self) -> &CommandContext
    {
        &self.context
    }

    /// Run one command line, propagating its error
    ///
    /// Shadow memory fetched by the command is released before this returns.
    pub fn run(&mut self, session: &Session<'_>, line: &str, console: &mut dyn Console) -> Result<()>
    {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let name = name.strip_prefix('!').unwrap_or(name).to_lowercase();
        let command =
            command(&name).ok_or_else(|| SccError::Usage(format!("unknown command '{name}'; try 'help'")))?;
        let args = Args::parse(rest);

        let scope = CommandScope::new(session);
        debug!("Running '{name}' with '{}'", rest.trim());
        (command.handler)(&mut self.context, &scope, &args, console)
    }

    /// Run one command line, reporting any error on the console
    ///
    /// Returns whether the command succeeded. The session stays usable
    /// either way.
    pub fn dispatch(&mut self, session: &Session<'_>, line: &str, console: &mut dyn Console) -> bool
    {
        match self.run(session, line, console) {
            Ok(()) => true,
            Err(err) => {
                let name = line.split_whitespace().next().unwrap_or_default();
                warn!("'{}' failed: {err}", line.trim());
                console.line(&format!("{name}: {err}"));
                false
            }
        }
    }
}

fn help(_: &mut CommandContext, _: &Session<'_>, args: &Args, console: &mut dyn Console) -> Result<()>
{
    args.check_max(1, "help [command]")?;
    if let Some(name) = args.get(0) {
        let found = command(name).ok_or_else(|| SccError::Usage(format!("no command '{name}'")))?;
        console.line(&format!("{}  {}", found.usage, found.help));
        if found.name == "shrc" {
            for (sub, text) in shrc::SUBCOMMANDS {
                console.line(&format!("  {sub:<24} {text}"));
            }
        }
        return Ok(());
    }
    for command in commands() {
        console.line(&format!("{:<28} {}", command.usage, command.help));
    }
    Ok(())
}
