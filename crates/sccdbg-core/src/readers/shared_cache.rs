//! Locating cache layers and walking their metadata.

use tracing::debug;

use super::vm::{read_cache_descriptors, read_cache_header, read_java_vm, read_shared_class_config};
use crate::codec::CacheHeader;
use crate::error::{Result, SccError};
use crate::target::Session;
use crate::types::TargetAddr;
use crate::walk::MetadataWalker;

/// Where the cache layers come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLocation
{
    /// Follow the VM's shared class configuration
    Vm(TargetAddr),
    /// A single cache header at a known address (raw cache images)
    Header(TargetAddr),
}

/// One validated cache layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayer
{
    /// Layer number, 0 for the oldest
    pub index: usize,
    pub header: CacheHeader,
}

impl CacheLayer
{
    /// Walker over this layer's records, newest first
    pub fn walker<'s, 't>(&self, session: &'s Session<'t>) -> MetadataWalker<'s, 't>
    {
        MetadataWalker::new(session, self.header.metadata_top(), self.header.free())
    }
}

/// Read every layer reachable from `location`, oldest first
///
/// Also records the layer anchors in the session so cache-relative offsets
/// resolve. A VM with sharing disabled has no layers.
pub fn load_cache_layers(session: &Session<'_>, location: CacheLocation) -> Result<Vec<CacheLayer>>
{
    let starts = match location {
        CacheLocation::Header(addr) => vec![addr],
        CacheLocation::Vm(vm) => {
            let vm = read_java_vm(session, vm)?;
            let Some(config) = read_shared_class_config(session, &vm)? else {
                debug!("VM at {} has no shared class config", vm.address);
                return Ok(Vec::new());
            };
            let mut starts: Vec<TargetAddr> = read_cache_descriptors(session, config.cache_descriptor_list)?
                .into_iter()
                .map(|d| d.cache_start)
                .collect();
            starts.reverse();
            starts
        }
    };

    let layers = starts
        .into_iter()
        .enumerate()
        .map(|(index, start)| read_cache_header(session, start).map(|header| CacheLayer { index, header }))
        .collect::<Result<Vec<_>>>()?;
    let anchors: Vec<TargetAddr> = layers.iter().map(|l| l.header.start).collect();
    session.set_layers(&anchors);
    debug!("Loaded {} cache layer(s)", layers.len());
    Ok(layers)
}

/// Pick a layer by number, or the newest when `layer` is `None`
pub fn select_layer(layers: &[CacheLayer], layer: Option<usize>) -> Result<&CacheLayer>
{
    match layer {
        Some(n) => layers
            .get(n)
            .ok_or_else(|| SccError::InvalidArgument(format!("no cache layer {n} ({} loaded)", layers.len()))),
        None => layers
            .last()
            .ok_or_else(|| SccError::InvalidArgument("no shared cache is attached".into())),
    }
}

/// Locate the cache of `vm`, validate its header, and walk its metadata
///
/// `layer` picks a layer by number; `None` walks the newest.
pub fn read_shared_cache_metadata<'s, 't>(
    session: &'s Session<'t>,
    vm: TargetAddr,
    layer: Option<usize>,
) -> Result<MetadataWalker<'s, 't>>
{
    let layers = load_cache_layers(session, CacheLocation::Vm(vm))?;
    Ok(select_layer(&layers, layer)?.walker(session))
}
