//! Pool walker.
//!
//! A pool is a header plus a singly linked chain of puddles. Each puddle
//! holds `elementsPerPuddle` fixed-size slots and an occupancy bitmap; a set
//! bit marks a live element. The walker yields the target address of each
//! live element in puddle order:
//!
//! ```text
//! J9Pool { elementSize, elementsPerPuddle, puddleList } ──► puddle ──► puddle ──► NULL
//!                                                          │ usedElements
//!                                                          │ firstElement ──► [slot0][slot1]...
//!                                                          │ nextPuddle
//!                                                          └ bitmap: u32 words
//! ```

use std::collections::HashSet;

use tracing::{debug, trace, warn};

use crate::error::{Result, SccError};
use crate::layout::{Abi, FieldKind, StructLayout};
use crate::target::Session;
use crate::types::TargetAddr;

/// Largest puddle the walker will accept
const MAX_ELEMENTS_PER_PUDDLE: u64 = 1 << 16;

/// Layouts of the pool header and puddle header
#[derive(Debug, Clone)]
pub struct PoolLayouts
{
    pub pool: StructLayout,
    pub puddle: StructLayout,
}

impl PoolLayouts
{
    pub fn new(abi: &Abi) -> Self
    {
        use FieldKind::{Pointer, Udata};

        Self {
            pool: StructLayout::build(
                "J9Pool",
                abi,
                &[("elementSize", Udata), ("elementsPerPuddle", Udata), ("puddleList", Pointer)],
            ),
            puddle: StructLayout::build(
                "J9PoolPuddle",
                abi,
                &[("usedElements", Udata), ("firstElement", Pointer), ("nextPuddle", Pointer)],
            ),
        }
    }

    /// Number of bitmap words following a puddle header
    pub fn bitmap_words(elements_per_puddle: u64) -> usize
    {
        elements_per_puddle.div_ceil(32) as usize
    }
}

/// Decoded pool header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHeader
{
    pub address: TargetAddr,
    pub element_size: u64,
    pub elements_per_puddle: u64,
    pub puddle_list: TargetAddr,
}

#[derive(Debug, Clone)]
struct Puddle
{
    address: TargetAddr,
    first_element: TargetAddr,
    next: TargetAddr,
    bitmap: Vec<u32>,
}

impl Puddle
{
    fn is_live(&self, index: u64) -> bool
    {
        self.bitmap
            .get((index / 32) as usize)
            .is_some_and(|word| word & (1 << (index % 32)) != 0)
    }
}

#[derive(Debug, Clone)]
enum PoolState
{
    NotStarted,
    InPuddle
    {
        puddle: Puddle,
        index: u64,
    },
    Exhausted,
}

/// Iterator over the live elements of a pool
///
/// After yielding an error the walker is exhausted.
pub struct PoolWalker<'s, 't>
{
    session: &'s Session<'t>,
    layouts: PoolLayouts,
    header: PoolHeader,
    state: PoolState,
    visited: HashSet<TargetAddr>,
    yielded: usize,
}

impl<'s, 't> PoolWalker<'s, 't>
{
    /// Read the pool header at `pool` and position before the first puddle
    ///
    /// ## Errors
    ///
    /// Read failures, or `Decode` if the element geometry is nonsensical.
    pub fn start(session: &'s Session<'t>, pool: TargetAddr) -> Result<Self>
    {
        let abi = session.abi();
        let layouts = PoolLayouts::new(&abi);
        let shadow = session.read_struct(pool, &layouts.pool)?;
        let view = shadow.view(&layouts.pool, abi)?;
        let header = PoolHeader {
            address: pool,
            element_size: view.udata("elementSize")?,
            elements_per_puddle: view.udata("elementsPerPuddle")?,
            puddle_list: view.pointer("puddleList")?,
        };
        if header.element_size == 0 || header.elements_per_puddle == 0 || header.elements_per_puddle > MAX_ELEMENTS_PER_PUDDLE {
            return Err(SccError::decode(
                "J9Pool",
                pool,
                format!(
                    "element size {} with {} elements per puddle",
                    header.element_size, header.elements_per_puddle
                ),
            ));
        }
        debug!(
            "Pool at {pool}: {} byte elements, {} per puddle",
            header.element_size, header.elements_per_puddle
        );
        Ok(Self {
            session,
            layouts,
            header,
            state: PoolState::NotStarted,
            visited: HashSet::new(),
            yielded: 0,
        })
    }

    pub fn header(&self) -> &PoolHeader
    {
        &self.header
    }

    /// Elements yielded so far
    pub fn yielded(&self) -> usize
    {
        self.yielded
    }

    fn load_puddle(&mut self, addr: TargetAddr) -> Result<Puddle>
    {
        let pointer_size = self.session.pointer_size() as u64;
        let words = PoolLayouts::bitmap_words(self.header.elements_per_puddle);
        let total = self.layouts.puddle.size() + words * 4;
        if !addr.is_aligned(pointer_size) {
            return Err(SccError::decode("J9PoolPuddle", addr, "misaligned puddle link"));
        }
        if !self.session.is_known_range(addr, total as u64) {
            return Err(SccError::decode("J9PoolPuddle", addr, "puddle link outside every known region"));
        }
        if !self.visited.insert(addr) {
            return Err(SccError::decode("J9PoolPuddle", addr, "puddle chain loops"));
        }
        if self.visited.len() > self.session.config().walk_limit {
            return Err(SccError::decode("J9PoolPuddle", addr, "walk limit reached"));
        }

        let abi = self.session.abi();
        let shadow = self.session.read_bytes(addr, total)?;
        let view = shadow.view(&self.layouts.puddle, abi)?;
        let used = view.udata("usedElements")?;
        let bitmap_bytes = &shadow[self.layouts.puddle.size()..];
        let bitmap: Vec<u32> = bitmap_bytes.chunks_exact(4).map(|w| abi.arch.u32(w)).collect();
        let puddle = Puddle {
            address: addr,
            first_element: view.pointer("firstElement")?,
            next: view.pointer("nextPuddle")?,
            bitmap,
        };

        let live = (0..self.header.elements_per_puddle).filter(|i| puddle.is_live(*i)).count() as u64;
        if live != used {
            return Err(SccError::decode(
                "J9PoolPuddle",
                addr,
                format!("usedElements {used} but {live} slots marked live"),
            ));
        }
        if used > 0 && puddle.first_element.is_null() {
            return Err(SccError::decode("J9PoolPuddle", addr, "live elements without element storage"));
        }
        trace!("Puddle at {addr}: {used} live, next {}", puddle.next);
        Ok(puddle)
    }

    fn advance(&mut self) -> Result<Option<TargetAddr>>
    {
        loop {
            let state = std::mem::replace(&mut self.state, PoolState::Exhausted);
            match state {
                PoolState::Exhausted => return Ok(None),
                PoolState::NotStarted => {
                    if self.header.puddle_list.is_null() {
                        return Ok(None);
                    }
                    let puddle = self.load_puddle(self.header.puddle_list)?;
                    self.state = PoolState::InPuddle { puddle, index: 0 };
                }
                PoolState::InPuddle { puddle, index } => {
                    let per_puddle = self.header.elements_per_puddle;
                    if let Some(slot) = (index..per_puddle).find(|i| puddle.is_live(*i)) {
                        let element = puddle.first_element + slot * self.header.element_size;
                        self.state = PoolState::InPuddle { puddle, index: slot + 1 };
                        return Ok(Some(element));
                    }
                    if puddle.next.is_null() {
                        return Ok(None);
                    }
                    trace!("Leaving puddle {} for {}", puddle.address, puddle.next);
                    let next = self.load_puddle(puddle.next)?;
                    self.state = PoolState::InPuddle { puddle: next, index: 0 };
                }
            }
        }
    }
}

impl Iterator for PoolWalker<'_, '_>
{
    type Item = Result<TargetAddr>;

    fn next(&mut self) -> Option<Self::Item>
    {
        match self.advance() {
            Ok(Some(element)) => {
                self.yielded += 1;
                Some(Ok(element))
            }
            Ok(None) => None,
            Err(err) => {
                warn!("Pool walk at {} stopped: {err}", self.header.address);
                self.state = PoolState::Exhausted;
                Some(Err(err))
            }
        }
    }
}
