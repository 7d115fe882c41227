//! JIT metadata lookup by program counter.
//!
//! `J9JITConfig.translationArtifacts` is an AVL tree of code ranges. The
//! node covering a PC carries a chain of `J9JITExceptionTable` records, one
//! per compiled body in that range.

use std::collections::HashSet;

use tracing::debug;

use super::utf8::read_utf8;
use super::vm::JavaVm;
use crate::error::{Result, SccError};
use crate::target::Session;
use crate::types::TargetAddr;
use crate::walk::{avl_search, RangeComparator};

/// Local snapshot of a `J9JITExceptionTable`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitMetadata
{
    pub address: TargetAddr,
    pub class_name: Option<String>,
    pub method_name: Option<String>,
    pub method_signature: Option<String>,
    pub constant_pool: TargetAddr,
    pub ram_method: TargetAddr,
    pub start_pc: u64,
    pub end_warm_pc: u64,
    pub start_cold_pc: u64,
    pub end_pc: u64,
    pub total_frame_size: u64,
    pub size: i32,
    pub next_method: TargetAddr,
}

impl JitMetadata
{
    /// Whether `pc` falls in the warm or cold body
    pub fn contains(&self, pc: u64) -> bool
    {
        let warm = self.start_pc <= pc && pc < self.end_warm_pc;
        let cold = self.start_cold_pc != 0 && self.start_cold_pc <= pc && pc < self.end_pc;
        warm || cold
    }

    /// `Class.method(signature)` with `?` for missing parts
    pub fn display_name(&self) -> String
    {
        format!(
            "{}.{}{}",
            self.class_name.as_deref().unwrap_or("?"),
            self.method_name.as_deref().unwrap_or("?"),
            self.method_signature.as_deref().unwrap_or("")
        )
    }
}

fn optional_utf8(session: &Session<'_>, addr: TargetAddr) -> Result<Option<String>>
{
    if addr.is_null() {
        return Ok(None);
    }
    read_utf8(session, addr).map(Some)
}

/// Read the `J9JITExceptionTable` at `addr`
pub fn read_jit_metadata(session: &Session<'_>, addr: TargetAddr) -> Result<JitMetadata>
{
    let layout = &session.vm_layouts().jit_metadata;
    let shadow = session.read_struct(addr, layout)?;
    let v = shadow.view(layout, session.abi())?;
    let metadata = JitMetadata {
        address: addr,
        class_name: optional_utf8(session, v.pointer("className")?)?,
        method_name: optional_utf8(session, v.pointer("methodName")?)?,
        method_signature: optional_utf8(session, v.pointer("methodSignature")?)?,
        constant_pool: v.pointer("constantPool")?,
        ram_method: v.pointer("ramMethod")?,
        start_pc: v.udata("startPC")?,
        end_warm_pc: v.udata("endWarmPC")?,
        start_cold_pc: v.udata("startColdPC")?,
        end_pc: v.udata("endPC")?,
        total_frame_size: v.udata("totalFrameSize")?,
        size: v.i32("size")?,
        next_method: v.pointer("nextMethod")?,
    };
    if metadata.start_pc > metadata.end_warm_pc {
        return Err(SccError::decode(
            "J9JITExceptionTable",
            addr,
            format!("startPC {:#x} above endWarmPC {:#x}", metadata.start_pc, metadata.end_warm_pc),
        ));
    }
    Ok(metadata)
}

/// Find the compiled body containing `pc`
///
/// `Ok(None)` when the VM has no JIT, no range covers `pc`, or no body in
/// the covering range contains it.
pub fn find_jit_metadata(session: &Session<'_>, vm: &JavaVm, pc: u64) -> Result<Option<JitMetadata>>
{
    if vm.jit_config.is_null() {
        return Ok(None);
    }
    let layouts = session.vm_layouts();
    let abi = session.abi();

    let config = session.read_struct(vm.jit_config, &layouts.jit_config)?;
    let tree = config.view(&layouts.jit_config, abi)?.pointer("translationArtifacts")?;
    if tree.is_null() {
        return Ok(None);
    }
    let tree_shadow = session.read_struct(tree, &layouts.avl_tree)?;
    let root = tree_shadow.view(&layouts.avl_tree, abi)?.pointer("rootNode")?;

    let comparator = RangeComparator {
        start_offset: layouts.jit_range_node.offset("start")? as u64,
        end_offset: layouts.jit_range_node.offset("end")? as u64,
    };
    let Some(node) = avl_search(session, root, pc, &comparator)? else {
        return Ok(None);
    };
    debug!("PC {pc:#x} falls in JIT range node {node}");

    let node_shadow = session.read_struct(node, &layouts.jit_range_node)?;
    let mut cursor = node_shadow.view(&layouts.jit_range_node, abi)?.pointer("methodList")?;
    let mut seen = HashSet::new();
    while !cursor.is_null() {
        if !seen.insert(cursor) || seen.len() > session.config().walk_limit {
            return Err(SccError::decode("J9JITExceptionTable", cursor, "method chain loops"));
        }
        let metadata = read_jit_metadata(session, cursor)?;
        if metadata.contains(pc) {
            return Ok(Some(metadata));
        }
        cursor = metadata.next_method;
    }
    Ok(None)
}
