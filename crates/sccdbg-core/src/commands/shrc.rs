//! `shrc`: shared class cache statistics and searches.
//!
//! Every subcommand walks the metadata of one layer (`layer=<n>`) or of all
//! layers newest first, optionally restricted to records whose `Item` lies
//! in `range=<start>..<end>`.

use std::collections::BTreeMap;

use super::args::{parse_address, parse_number, parse_range, Args, Wildcard};
use super::{CommandContext, Console};
use crate::codec::{
    CacheRecord, DataType, RecordBody, ShrOffset, ATTACHED_DATA_TYPE_JITHINT, ATTACHED_DATA_TYPE_JITPROFILE,
};
use crate::error::{Result, SccError};
use crate::readers::{
    class_name_from_rom_class, load_cache_layers, read_name_from_rom_method, read_rom_class, rom_methods, select_layer,
    CacheLayer,
};
use crate::target::Session;
use crate::types::TargetAddr;

pub(super) const USAGE: &str = "shrc <subcommand> [args] [layer=<n>] [range=<start>..<end>]";

pub(super) const SUBCOMMANDS: &[(&str, &str)] = &[
    ("stats", "cache areas and record counts per type"),
    ("allstats", "list every live record"),
    ("rcstats", "list ROM class records"),
    ("cpstats", "list classpath records"),
    ("aotstats", "list AOT compiled method records"),
    ("invaotstats", "list invalidated AOT method records"),
    ("orphanstats", "list orphan ROM class records"),
    ("scopestats", "list scope records"),
    ("bytestats", "list byte data records"),
    ("ubytestats", "list unindexed byte data records"),
    ("clstats", "list cachelet records"),
    ("preqstats", "list prerequisite cache records"),
    ("jitpstats", "list JIT profile attached data"),
    ("jithstats", "list JIT hint attached data"),
    ("stalestats", "list stale records"),
    ("findclass <pattern>", "find ROM classes by name (name, name*, *name, *name*)"),
    ("rcfor <addr>", "find the record for a ROM class"),
    ("aotfor <addr>", "find AOT records for a ROM method"),
    ("method <addr>", "find the ROM method containing an address"),
    ("incache <addr>", "report which cache area holds an address"),
];

/// Record selection for the listing subcommands
#[derive(Debug, Clone, Copy)]
struct Listing
{
    kinds: &'static [DataType],
    attached_type: Option<u16>,
}

impl Listing
{
    const fn of(kinds: &'static [DataType]) -> Self
    {
        Self {
            kinds,
            attached_type: None,
        }
    }

    fn matches(&self, record: &CacheRecord) -> bool
    {
        if !self.kinds.contains(&record.kind()) {
            return false;
        }
        match (&record.body, self.attached_type) {
            (RecordBody::AttachedData(data), Some(wanted)) => data.data_type == wanted,
            _ => true,
        }
    }
}

#[derive(Debug, Clone)]
enum Query
{
    Stats,
    List(Listing),
    All,
    Stale,
    FindClass(Wildcard),
    RcFor(TargetAddr),
    AotFor(TargetAddr),
    Method(TargetAddr),
    InCache(TargetAddr),
}

impl Query
{
    fn parse(sub: &str, args: &Args) -> Result<Self>
    {
        let query = match sub {
            "stats" => Self::Stats,
            "allstats" => Self::All,
            "stalestats" => Self::Stale,
            "rcstats" => Self::List(Listing::of(&[DataType::RomClass, DataType::ScopedRomClass])),
            "cpstats" => Self::List(Listing::of(&[DataType::Classpath])),
            "aotstats" => Self::List(Listing::of(&[DataType::CompiledMethod])),
            "invaotstats" => Self::List(Listing::of(&[DataType::InvalidatedCompiledMethod])),
            "orphanstats" => Self::List(Listing::of(&[DataType::Orphan])),
            "scopestats" => Self::List(Listing::of(&[DataType::Scope])),
            "bytestats" => Self::List(Listing::of(&[DataType::ByteData])),
            "ubytestats" => Self::List(Listing::of(&[DataType::UnindexedByteData])),
            "clstats" => Self::List(Listing::of(&[DataType::Cachelet])),
            "preqstats" => Self::List(Listing::of(&[DataType::PrereqCache])),
            "jitpstats" => Self::List(Listing {
                kinds: &[DataType::AttachedData],
                attached_type: Some(ATTACHED_DATA_TYPE_JITPROFILE),
            }),
            "jithstats" => Self::List(Listing {
                kinds: &[DataType::AttachedData],
                attached_type: Some(ATTACHED_DATA_TYPE_JITHINT),
            }),
            "findclass" => Self::FindClass(Wildcard::parse(operand(args, "shrc findclass <pattern>")?)?),
            "rcfor" => Self::RcFor(parse_address(operand(args, "shrc rcfor <addr>")?)?),
            "aotfor" => Self::AotFor(parse_address(operand(args, "shrc aotfor <addr>")?)?),
            "method" => Self::Method(parse_address(operand(args, "shrc method <addr>")?)?),
            "incache" => Self::InCache(parse_address(operand(args, "shrc incache <addr>")?)?),
            other => return Err(SccError::Usage(format!("unknown shrc subcommand '{other}'; {USAGE}"))),
        };
        if !matches!(
            query,
            Self::FindClass(_) | Self::RcFor(_) | Self::AotFor(_) | Self::Method(_) | Self::InCache(_)
        ) {
            args.check_max(1, USAGE)?;
        }
        Ok(query)
    }
}

/// The single operand of a search subcommand
fn operand<'a>(args: &'a Args, usage: &str) -> Result<&'a str>
{
    args.check_max(2, usage)?;
    args.require(1, usage)
}

#[derive(Debug, Clone, Copy, Default)]
struct Options
{
    layer: Option<usize>,
    range: Option<(TargetAddr, TargetAddr)>,
}

impl Options
{
    fn parse(args: &Args) -> Result<Self>
    {
        args.check_options(&["layer", "range"], USAGE)?;
        let layer = args
            .option("layer")
            .map(|n| {
                parse_number(n)
                    .and_then(|n| usize::try_from(n).map_err(|_| SccError::Usage(format!("layer {n} out of range"))))
            })
            .transpose()?;
        let range = args.option("range").map(parse_range).transpose()?;
        Ok(Self { layer, range })
    }

    fn in_range(&self, addr: TargetAddr) -> bool
    {
        self.range.is_none_or(|(start, end)| addr >= start && addr < end)
    }
}

pub(super) fn run(ctx: &mut CommandContext, session: &Session<'_>, args: &Args, console: &mut dyn Console) -> Result<()>
{
    let sub = args.require(0, USAGE)?.to_lowercase();
    let options = Options::parse(args)?;
    let query = Query::parse(&sub, args)?;

    let location = ctx.cache_location(session)?;
    let layers = load_cache_layers(session, location)?;
    if layers.is_empty() {
        console.line("No shared class cache is attached to this VM");
        return Ok(());
    }
    let selected: Vec<&CacheLayer> = match options.layer {
        Some(n) => vec![select_layer(&layers, Some(n))?],
        None => layers.iter().rev().collect(),
    };

    match query {
        Query::Stats => stats(session, &selected, &options, console),
        Query::InCache(addr) => {
            in_cache(&selected, &options, addr, console);
            Ok(())
        }
        Query::All => list(session, &selected, &options, false, console, |_| true),
        Query::Stale => list(session, &selected, &options, true, console, CacheRecord::is_stale),
        Query::List(listing) => list(session, &selected, &options, false, console, |r| listing.matches(r)),
        Query::FindClass(pattern) => find_class(session, &selected, &options, &pattern, console),
        Query::RcFor(addr) => rc_for(session, &selected, &options, addr, console),
        Query::AotFor(addr) => aot_for(session, &selected, &options, addr, console),
        Query::Method(addr) => method(session, &selected, &options, addr, console),
    }
}

/// Decode every record in `layers` passing the range filter
fn for_each_record(
    session: &Session<'_>,
    layers: &[&CacheLayer],
    options: &Options,
    include_stale: bool,
    mut visit: impl FnMut(&CacheLayer, &CacheRecord) -> Result<()>,
) -> Result<()>
{
    for &layer in layers {
        let mut walker = layer.walker(session).include_stale(include_stale);
        while let Some(entry) = walker.next() {
            let entry = entry?;
            if !options.in_range(entry.item_addr) {
                continue;
            }
            let record = walker.decode(&entry)?;
            visit(layer, &record)?;
        }
    }
    Ok(())
}

fn resolve(session: &Session<'_>, offset: ShrOffset) -> Result<Option<TargetAddr>>
{
    session.resolve_self_relative(offset)
}

/// ROM class address of a ROM class, scoped or orphan record
fn rom_class_of(session: &Session<'_>, record: &CacheRecord) -> Result<Option<TargetAddr>>
{
    match record.body.rom_class_offset() {
        Some(offset) => resolve(session, offset),
        None => Ok(None),
    }
}

fn or_unreadable(name: Result<String>) -> String
{
    name.unwrap_or_else(|err| format!("<{err}>"))
}

/// One-line summary of a record
fn describe(session: &Session<'_>, record: &CacheRecord) -> Result<String>
{
    let detail = match &record.body {
        RecordBody::RomClass(_) | RecordBody::ScopedRomClass { .. } => match rom_class_of(session, record)? {
            Some(rom) => format!("{rom} {}", or_unreadable(class_name_from_rom_class(session, rom))),
            None => "<null ROM class>".to_string(),
        },
        RecordBody::Orphan { .. } => match rom_class_of(session, record)? {
            Some(rom) => format!("{rom}"),
            None => "<null ROM class>".to_string(),
        },
        RecordBody::Classpath(cp) => format!("{} with {} of {} entries", cp.kind.name(), cp.items_added, cp.max_items),
        RecordBody::CompiledMethod(aot) | RecordBody::InvalidatedCompiledMethod(aot) => {
            let name = match resolve(session, aot.rom_method_offset)? {
                Some(rom_method) => format!("{rom_method} {}", or_unreadable(read_name_from_rom_method(session, rom_method))),
                None => "<null ROM method>".to_string(),
            };
            format!("{name} data {} code {} at {}", aot.data_length, aot.code_length, aot.code_addr)
        }
        RecordBody::Scope(text) | RecordBody::PrereqCache(text) => text.clone(),
        RecordBody::ByteData(data) => format!(
            "type {} {} bytes at {}{}",
            data.data_type,
            data.data_length,
            data.data_addr,
            if data.in_private_use { " (private)" } else { "" }
        ),
        RecordBody::UnindexedByteData { length } | RecordBody::CharArray { length } => format!("{length} bytes"),
        RecordBody::Cachelet(cachelet) => format!(
            "{} bytes, {} segments, {} hints",
            cachelet.data_length, cachelet.num_segments, cachelet.num_hints
        ),
        RecordBody::AttachedData(data) => {
            let kind = match data.data_type {
                ATTACHED_DATA_TYPE_JITPROFILE => "JITPROFILE",
                ATTACHED_DATA_TYPE_JITHINT => "JITHINT",
                _ => "UNKNOWN",
            };
            let owner = resolve(session, data.cache_offset)?.unwrap_or(TargetAddr::NULL);
            format!("{kind} for {owner} {} bytes at {}", data.data_length, data.data_addr)
        }
    };
    let stale = if record.is_stale() { " (stale)" } else { "" };
    Ok(format!("{}: {:<20} {detail}{stale}", record.item_addr, record.kind().name()))
}

fn list(
    session: &Session<'_>,
    layers: &[&CacheLayer],
    options: &Options,
    include_stale: bool,
    console: &mut dyn Console,
    keep: impl Fn(&CacheRecord) -> bool,
) -> Result<()>
{
    let mut count = 0usize;
    for_each_record(session, layers, options, include_stale, |_, record| {
        if keep(record) {
            console.line(&describe(session, record)?);
            count += 1;
        }
        Ok(())
    })?;
    console.line(&format!("{count} record(s)"));
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
struct KindTotals
{
    live: usize,
    stale: usize,
    bytes: u64,
}

fn stats(session: &Session<'_>, layers: &[&CacheLayer], options: &Options, console: &mut dyn Console) -> Result<()>
{
    for layer in layers {
        let h = &layer.header;
        console.line(&format!("Cache layer {} at {}", layer.index, h.start));
        console.line(&format!("  total bytes         {}", h.total_bytes));
        console.line(&format!("  ROM class bytes     {}", h.rom_class_bytes()));
        console.line(&format!("  metadata bytes      {}", h.metadata_bytes()));
        console.line(&format!("  free bytes          {}", h.free_bytes()));
        console.line(&format!("  debug region bytes  {}", h.debug_region_size));
        console.line(&format!("  AOT / JIT bytes     {} / {}", h.aot_bytes, h.jit_bytes));
        console.line(&format!("  update count        {}", h.update_count));
        console.line(&format!(
            "  readers {}  VMs {}  crashes {}  corrupt {}  complete {}",
            h.reader_count, h.vm_count, h.crash_count, h.corrupt_flag, h.init_complete
        ));

        let mut totals: BTreeMap<DataType, KindTotals> = BTreeMap::new();
        for entry in layer.walker(session).include_stale(true) {
            let entry = entry?;
            if !options.in_range(entry.item_addr) {
                continue;
            }
            let slot = totals.entry(entry.kind).or_default();
            if entry.is_stale() {
                slot.stale += 1;
            } else {
                slot.live += 1;
            }
            slot.bytes += u64::from(entry.header.length());
        }
        for kind in DataType::ALL {
            if let Some(t) = totals.get(&kind) {
                console.line(&format!(
                    "  {:<26} {:>7} live {:>7} stale {:>10} bytes",
                    kind.name(),
                    t.live,
                    t.stale,
                    t.bytes
                ));
            }
        }
        let records: usize = totals.values().map(|t| t.live + t.stale).sum();
        console.line(&format!("  {records} record(s)"));
    }
    Ok(())
}

fn find_class(
    session: &Session<'_>,
    layers: &[&CacheLayer],
    options: &Options,
    pattern: &Wildcard,
    console: &mut dyn Console,
) -> Result<()>
{
    let mut found = 0usize;
    for_each_record(session, layers, options, false, |_, record| {
        if !matches!(record.kind(), DataType::RomClass | DataType::ScopedRomClass) {
            return Ok(());
        }
        let Some(rom) = rom_class_of(session, record)? else {
            return Ok(());
        };
        let name = class_name_from_rom_class(session, rom)?;
        if pattern.matches(&name) {
            console.line(&format!("{}: ROM class {rom} {name}", record.item_addr));
            found += 1;
        }
        Ok(())
    })?;
    console.line(&format!("Found {found} class(es)"));
    Ok(())
}

fn rc_for(
    session: &Session<'_>,
    layers: &[&CacheLayer],
    options: &Options,
    addr: TargetAddr,
    console: &mut dyn Console,
) -> Result<()>
{
    let mut found = 0usize;
    for_each_record(session, layers, options, true, |layer, record| {
        if rom_class_of(session, record)? == Some(addr) {
            console.line(&format!("layer {} {}", layer.index, describe(session, record)?));
            found += 1;
        }
        Ok(())
    })?;
    if found == 0 {
        console.line(&format!("No record refers to ROM class {addr}"));
    }
    Ok(())
}

fn aot_for(
    session: &Session<'_>,
    layers: &[&CacheLayer],
    options: &Options,
    addr: TargetAddr,
    console: &mut dyn Console,
) -> Result<()>
{
    let mut found = 0usize;
    for_each_record(session, layers, options, true, |layer, record| {
        let (RecordBody::CompiledMethod(aot) | RecordBody::InvalidatedCompiledMethod(aot)) = &record.body else {
            return Ok(());
        };
        if resolve(session, aot.rom_method_offset)? == Some(addr) {
            console.line(&format!("layer {} {}", layer.index, describe(session, record)?));
            found += 1;
        }
        Ok(())
    })?;
    if found == 0 {
        console.line(&format!("No AOT record for ROM method {addr}"));
    }
    Ok(())
}

fn method(
    session: &Session<'_>,
    layers: &[&CacheLayer],
    options: &Options,
    addr: TargetAddr,
    console: &mut dyn Console,
) -> Result<()>
{
    let mut found = false;
    for_each_record(session, layers, options, false, |_, record| {
        if found || !matches!(record.kind(), DataType::RomClass | DataType::ScopedRomClass) {
            return Ok(());
        }
        let Some(rom) = rom_class_of(session, record)? else {
            return Ok(());
        };
        let class = read_rom_class(session, rom)?;
        if !class.contains(addr) {
            return Ok(());
        }
        for method in rom_methods(session, &class)? {
            if addr >= method.address && addr < method.next() {
                console.line(&format!(
                    "{addr} is in ROM method {} {}.{}",
                    method.address,
                    class.class_name,
                    method.display_name()
                ));
                console.line(&format!(
                    "  bytecodes {} ({} bytes), maxStack {}, args {}, temps {}",
                    method.bytecodes, method.bytecode_size, method.max_stack, method.arg_count, method.temp_count
                ));
                found = true;
                return Ok(());
            }
        }
        console.line(&format!("{addr} is inside ROM class {rom} {} but not in a method", class.class_name));
        found = true;
        Ok(())
    })?;
    if !found {
        console.line(&format!("{addr} is not inside any cached ROM class"));
    }
    Ok(())
}

fn in_cache(layers: &[&CacheLayer], options: &Options, addr: TargetAddr, console: &mut dyn Console)
{
    let Some(layer) = layers.iter().find(|l| l.header.contains(addr)) else {
        match options.layer {
            Some(n) => console.line(&format!("{addr} is not in cache layer {n}")),
            None => console.line(&format!("{addr} is not in the shared class cache")),
        }
        return;
    };
    let h = &layer.header;
    let area = if addr < h.rom_class_start() {
        "header / read-write area"
    } else if addr < h.segment_end() {
        "ROM class segment"
    } else if addr < h.free() {
        "free space"
    } else if addr < h.metadata_top() {
        "metadata"
    } else {
        "debug region"
    };
    console.line(&format!(
        "{addr} is in layer {} ({}..{}): {area}",
        layer.index,
        h.start,
        h.end()
    ));
}
