//! AVL tree search through the session.
//!
//! Nodes begin with two pointer-sized self-relative links:
//!
//! ```text
//! J9AVLTreeNode { leftChild: WSRP, rightChild: WSRP, ...payload }
//! ```
//!
//! The low two bits of each link hold the node's balance and are masked
//! off before the link is resolved against its own field address.

use std::cmp::Ordering;

use tracing::trace;

use crate::error::{Result, SccError};
use crate::target::Session;
use crate::types::TargetAddr;

/// Balance bits stored in the low bits of child links
pub const AVL_BALANCE_MASK: i64 = 0b11;

/// Deepest descent accepted before the tree is declared corrupt
///
/// An AVL tree of height 96 would hold more nodes than any address space.
pub const MAX_AVL_DEPTH: usize = 96;

/// Orders a search key against a node
pub trait AvlComparator
{
    /// `Less` descends left, `Greater` descends right, `Equal` is a match.
    fn compare(&self, session: &Session<'_>, node: TargetAddr, key: u64) -> Result<Ordering>;
}

/// Matches nodes whose `[start, end)` range contains the key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeComparator
{
    /// Offset of the `start` field within a node
    pub start_offset: u64,
    /// Offset of the `end` field within a node
    pub end_offset: u64,
}

impl AvlComparator for RangeComparator
{
    fn compare(&self, session: &Session<'_>, node: TargetAddr, key: u64) -> Result<Ordering>
    {
        let start = session.read_udata(node + self.start_offset)?;
        let end = session.read_udata(node + self.end_offset)?;
        if start > end {
            return Err(SccError::decode("J9AVLTreeNode", node, format!("range start {start:#x} above end {end:#x}")));
        }
        Ok(if key < start {
            Ordering::Less
        } else if key >= end {
            Ordering::Greater
        } else {
            Ordering::Equal
        })
    }
}

/// Matches nodes whose key field equals the key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityComparator
{
    /// Offset of the key field within a node
    pub key_offset: u64,
}

impl AvlComparator for IdentityComparator
{
    fn compare(&self, session: &Session<'_>, node: TargetAddr, key: u64) -> Result<Ordering>
    {
        let value = session.read_udata(node + self.key_offset)?;
        Ok(key.cmp(&value))
    }
}

/// Find the node matching `key` below `root`
///
/// Returns `Ok(None)` for a miss, including a null root, which is answered
/// without touching the target. Any failed read is an `Err`, never a miss.
pub fn avl_search(session: &Session<'_>, root: TargetAddr, key: u64, comparator: &dyn AvlComparator) -> Result<Option<TargetAddr>>
{
    let mut node = root;
    let link_size = session.pointer_size() as u64;
    for depth in 0..MAX_AVL_DEPTH {
        if node.is_null() {
            return Ok(None);
        }
        let field = match comparator.compare(session, node, key)? {
            Ordering::Equal => {
                trace!("AVL hit for {key:#x} at {node} (depth {depth})");
                return Ok(Some(node));
            }
            Ordering::Less => node,
            Ordering::Greater => node + link_size,
        };
        let raw = session.read_idata(field)? & !AVL_BALANCE_MASK;
        node = session.resolve_wsrp(field, raw).unwrap_or(TargetAddr::NULL);
    }
    Err(SccError::decode(
        "J9AVLTree",
        root,
        format!("search for {key:#x} deeper than {MAX_AVL_DEPTH} levels"),
    ))
}
