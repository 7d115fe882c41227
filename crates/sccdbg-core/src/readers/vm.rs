//! VM root discovery and the shared class configuration.

use std::collections::HashSet;

use tracing::{debug, trace};

use super::layouts::{RAS_EYECATCHER, VM_IDENTIFIER};
use crate::codec::CacheHeader;
use crate::error::{Result, SccError};
use crate::target::Session;
use crate::types::TargetAddr;

/// Value of both `J9RAS` bit patterns
const RAS_BITPATTERN: u32 = 0xaa55_aa55;

/// Bytes scanned per read while searching for the RAS structure
const SCAN_CHUNK: usize = 64 * 1024;

/// Local snapshot of the `J9JavaVM` fields the inspector uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaVm
{
    pub address: TargetAddr,
    pub internal_vm_functions: TargetAddr,
    pub port_library: TargetAddr,
    pub main_thread: TargetAddr,
    pub class_memory_segments: TargetAddr,
    pub class_loader_blocks: TargetAddr,
    pub system_class_loader: TargetAddr,
    pub application_class_loader: TargetAddr,
    pub shared_class_config: TargetAddr,
    pub jit_config: TargetAddr,
    pub runtime_flags: u64,
    pub total_thread_count: u64,
}

/// Search every known region for the RAS structure and return its VM
///
/// Returns `Ok(None)` when no region holds a RAS structure pointing at a
/// valid VM. Regions that fail to read are skipped.
pub fn find_java_vm(session: &Session<'_>) -> Result<Option<TargetAddr>>
{
    for region in session.regions() {
        let mut offset = 0u64;
        while offset < region.size() {
            let start = region.start + offset;
            let len = (region.size() - offset).min(SCAN_CHUNK as u64) as usize;
            offset += len as u64;
            let chunk = match session.read_uncached(start, len) {
                Ok(chunk) => chunk,
                Err(err) => {
                    trace!("Skipping rest of {region}: {err}");
                    break;
                }
            };
            for (idx, window) in chunk.chunks_exact(8).enumerate() {
                if window != RAS_EYECATCHER {
                    continue;
                }
                let ras = start + (idx * 8) as u64;
                match vm_from_ras(session, ras) {
                    Ok(vm) => {
                        debug!("Found J9RAS at {ras}, vm {vm}");
                        return Ok(Some(vm));
                    }
                    Err(err) => trace!("Rejected eyecatcher at {ras}: {err}"),
                }
            }
        }
        trace!("No J9RAS in {region}");
    }
    Ok(None)
}

fn vm_from_ras(session: &Session<'_>, ras: TargetAddr) -> Result<TargetAddr>
{
    let layout = &session.vm_layouts().ras;
    let shadow = session.read_struct(ras, layout)?;
    let v = shadow.view(layout, session.abi())?;
    if v.u32("bitpattern1")? != RAS_BITPATTERN || v.u32("bitpattern2")? != RAS_BITPATTERN {
        return Err(SccError::decode("J9RAS", ras, "bit patterns do not match"));
    }
    let vm = v.pointer("vm")?;
    read_java_vm(session, vm)?;
    Ok(vm)
}

/// Read the `J9JavaVM` at `addr`, checking its identifier
pub fn read_java_vm(session: &Session<'_>, addr: TargetAddr) -> Result<JavaVm>
{
    let layout = &session.vm_layouts().java_vm;
    let shadow = session.read_struct(addr, layout)?;
    let v = shadow.view(layout, session.abi())?;
    let identifier = v.udata("reserved1_identifier")?;
    if identifier != VM_IDENTIFIER {
        return Err(SccError::decode("J9JavaVM", addr, format!("identifier {identifier:#x}")));
    }
    Ok(JavaVm {
        address: addr,
        internal_vm_functions: v.pointer("internalVMFunctions")?,
        port_library: v.pointer("portLibrary")?,
        main_thread: v.pointer("mainThread")?,
        class_memory_segments: v.pointer("classMemorySegments")?,
        class_loader_blocks: v.pointer("classLoaderBlocks")?,
        system_class_loader: v.pointer("systemClassLoader")?,
        application_class_loader: v.pointer("applicationClassLoader")?,
        shared_class_config: v.pointer("sharedClassConfig")?,
        jit_config: v.pointer("jitConfig")?,
        runtime_flags: v.udata("runtimeFlags")?,
        total_thread_count: v.udata("totalThreadCount")?,
    })
}

/// Local snapshot of `J9SharedClassConfig`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedClassConfig
{
    pub address: TargetAddr,
    pub shared_class_cache: TargetAddr,
    pub cache_descriptor_list: TargetAddr,
    pub runtime_flags: u64,
    pub verbose_flags: u64,
    pub soft_max_bytes: u64,
}

/// Read the shared class configuration of `vm`, `None` if sharing is off
pub fn read_shared_class_config(session: &Session<'_>, vm: &JavaVm) -> Result<Option<SharedClassConfig>>
{
    if vm.shared_class_config.is_null() {
        return Ok(None);
    }
    let addr = vm.shared_class_config;
    let layout = &session.vm_layouts().shared_class_config;
    let shadow = session.read_struct(addr, layout)?;
    let v = shadow.view(layout, session.abi())?;
    Ok(Some(SharedClassConfig {
        address: addr,
        shared_class_cache: v.pointer("sharedClassCache")?,
        cache_descriptor_list: v.pointer("cacheDescriptorList")?,
        runtime_flags: v.u64("runtimeFlags")?,
        verbose_flags: v.udata("verboseFlags")?,
        soft_max_bytes: v.udata("softMaxBytes")?,
    }))
}

/// One entry of the cache descriptor list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDescriptor
{
    pub address: TargetAddr,
    pub cache_start: TargetAddr,
    pub romclass_start: TargetAddr,
    pub metadata_start: TargetAddr,
    pub cache_size_bytes: u64,
    pub next: TargetAddr,
}

/// Walk the circular descriptor list starting at `head`, newest layer first
pub fn read_cache_descriptors(session: &Session<'_>, head: TargetAddr) -> Result<Vec<CacheDescriptor>>
{
    let layout = &session.vm_layouts().cache_descriptor;
    let mut descriptors = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = head;
    while !cursor.is_null() && seen.insert(cursor) {
        if descriptors.len() >= session.config().walk_limit {
            return Err(SccError::decode("J9SharedClassCacheDescriptor", cursor, "walk limit reached"));
        }
        let shadow = session.read_struct(cursor, layout)?;
        let v = shadow.view(layout, session.abi())?;
        let descriptor = CacheDescriptor {
            address: cursor,
            cache_start: v.pointer("cacheStartAddress")?,
            romclass_start: v.pointer("romclassStartAddress")?,
            metadata_start: v.pointer("metadataStartAddress")?,
            cache_size_bytes: v.udata("cacheSizeBytes")?,
            next: v.pointer("next")?,
        };
        if descriptor.cache_start.is_null() {
            return Err(SccError::decode("J9SharedClassCacheDescriptor", cursor, "null cacheStartAddress"));
        }
        cursor = descriptor.next;
        descriptors.push(descriptor);
    }
    if !cursor.is_null() && cursor != head {
        return Err(SccError::decode(
            "J9SharedClassCacheDescriptor",
            cursor,
            "descriptor list loops back to the middle",
        ));
    }
    Ok(descriptors)
}

/// Read and validate the cache header at `addr`
pub fn read_cache_header(session: &Session<'_>, addr: TargetAddr) -> Result<CacheHeader>
{
    let layout = &session.vm_layouts().cache_header;
    let shadow = session.read_struct(addr, layout)?;
    CacheHeader::decode(layout, session.abi(), addr, &shadow)
}
