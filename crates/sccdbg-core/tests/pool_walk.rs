//! Tests for the pool puddle walker

mod common;

use common::{addr, encode, Heap, HEAP_BASE};
use sccdbg_core::config::TargetConfig;
use sccdbg_core::error::SccError;
use sccdbg_core::target::{MemoryImage, Session};
use sccdbg_core::types::{TargetAddr, TargetArch};
use sccdbg_core::walk::{PoolLayouts, PoolWalker};

const ELEMENT_SIZE: u64 = 16;
const PER_PUDDLE: u64 = 4;

/// Storage for each puddle sits at a fixed, unmapped address; the walker
/// never reads elements.
fn storage(index: u64) -> u64
{
    0x4000_0000 + index * 0x1000
}

fn puddle(layouts: &PoolLayouts, arch: &TargetArch, used: u64, first: u64, next: u64, bitmap: u32) -> Vec<u8>
{
    let mut bytes = encode(
        &layouts.puddle,
        arch,
        &[("usedElements", used), ("firstElement", first), ("nextPuddle", next)],
    );
    bytes.extend_from_slice(&bitmap.to_le_bytes());
    bytes
}

struct Fixture
{
    image: MemoryImage,
    pool: TargetAddr,
}

/// A pool whose puddles are described by `(usedElements, bitmap)` pairs.
///
/// `link` may rewrite the next pointer of each puddle given the addresses
/// of all puddles.
fn pool_with(puddles: &[(u64, u32)], element_size: u64, link: impl Fn(usize, &[TargetAddr]) -> u64) -> Fixture
{
    let config = TargetConfig::default();
    let abi = config.abi();
    let layouts = PoolLayouts::new(&abi);
    let mut heap = Heap::new(HEAP_BASE);

    let pool = heap.reserve(layouts.pool.size());
    let slots: Vec<TargetAddr> = puddles
        .iter()
        .map(|_| heap.reserve(layouts.puddle.size() + PoolLayouts::bitmap_words(PER_PUDDLE) * 4))
        .collect();
    for (index, (used, bitmap)) in puddles.iter().enumerate() {
        let bytes = puddle(&layouts, &abi.arch, *used, storage(index as u64), link(index, &slots), *bitmap);
        heap.patch(slots[index], &bytes);
    }
    let head = slots.first().map_or(0, |a| a.value());
    heap.patch(
        pool,
        &encode(
            &layouts.pool,
            &abi.arch,
            &[
                ("elementSize", element_size),
                ("elementsPerPuddle", PER_PUDDLE),
                ("puddleList", head),
            ],
        ),
    );

    let mut image = MemoryImage::new("pool");
    heap.map_into(&mut image);
    Fixture { image, pool }
}

fn chained(index: usize, slots: &[TargetAddr]) -> u64
{
    slots.get(index + 1).map_or(0, |a| a.value())
}

#[test]
fn test_walk_yields_live_elements_in_puddle_order()
{
    let fixture = pool_with(&[(2, 0b0101), (3, 0b1011), (1, 0b1000)], ELEMENT_SIZE, chained);
    let session = Session::new(&fixture.image, TargetConfig::default());

    let mut walker = PoolWalker::start(&session, fixture.pool).unwrap();
    assert_eq!(walker.header().element_size, ELEMENT_SIZE);
    assert_eq!(walker.header().elements_per_puddle, PER_PUDDLE);

    let elements: Vec<TargetAddr> = walker.by_ref().map(|e| e.unwrap()).collect();
    let expected: Vec<TargetAddr> = [
        storage(0),
        storage(0) + 2 * ELEMENT_SIZE,
        storage(1),
        storage(1) + ELEMENT_SIZE,
        storage(1) + 3 * ELEMENT_SIZE,
        storage(2) + 3 * ELEMENT_SIZE,
    ]
    .into_iter()
    .map(addr)
    .collect();
    assert_eq!(elements, expected);
    assert_eq!(walker.yielded(), 6);
    assert!(walker.next().is_none());
}

#[test]
fn test_empty_puddles_are_skipped()
{
    let fixture = pool_with(&[(0, 0), (1, 0b0010), (0, 0)], ELEMENT_SIZE, chained);
    let session = Session::new(&fixture.image, TargetConfig::default());
    let elements: Vec<_> = PoolWalker::start(&session, fixture.pool)
        .unwrap()
        .map(|e| e.unwrap())
        .collect();
    assert_eq!(elements, vec![addr(storage(1) + ELEMENT_SIZE)]);
}

#[test]
fn test_pool_without_puddles()
{
    let fixture = pool_with(&[], ELEMENT_SIZE, chained);
    let session = Session::new(&fixture.image, TargetConfig::default());
    let mut walker = PoolWalker::start(&session, fixture.pool).unwrap();
    assert!(walker.next().is_none());
    assert_eq!(walker.yielded(), 0);
}

#[test]
fn test_used_count_must_match_bitmap()
{
    let fixture = pool_with(&[(2, 0b0101), (2, 0b0111)], ELEMENT_SIZE, chained);
    let session = Session::new(&fixture.image, TargetConfig::default());
    let results: Vec<_> = PoolWalker::start(&session, fixture.pool).unwrap().collect();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok() && results[1].is_ok());
    let err = results[2].as_ref().unwrap_err();
    assert!(matches!(err, SccError::Decode { what: "J9PoolPuddle", .. }), "{err}");
    assert!(err.to_string().contains("usedElements 2"));
}

#[test]
fn test_puddle_chain_loop_is_detected()
{
    let fixture = pool_with(&[(1, 0b0001), (1, 0b0001)], ELEMENT_SIZE, |index, slots| {
        slots[(index + 1) % slots.len()].value()
    });
    let session = Session::new(&fixture.image, TargetConfig::default());
    let results: Vec<_> = PoolWalker::start(&session, fixture.pool).unwrap().collect();

    assert_eq!(results.len(), 3);
    let err = results[2].as_ref().unwrap_err();
    assert!(err.to_string().contains("puddle chain loops"), "{err}");
}

#[test]
fn test_link_outside_known_regions_is_rejected()
{
    let fixture = pool_with(&[(1, 0b0001)], ELEMENT_SIZE, |_, _| 0x7777_0000);
    let session = Session::new(&fixture.image, TargetConfig::default());
    let mut walker = PoolWalker::start(&session, fixture.pool).unwrap();

    assert_eq!(walker.next().unwrap().unwrap(), addr(storage(0)));
    let err = walker.next().unwrap().unwrap_err();
    assert!(matches!(err, SccError::Decode { address, .. } if address == addr(0x7777_0000)));
    assert!(walker.next().is_none());
}

#[test]
fn test_misaligned_link_is_rejected()
{
    let fixture = pool_with(&[(1, 0b0001)], ELEMENT_SIZE, |_, slots| slots[0].value() + 3);
    let session = Session::new(&fixture.image, TargetConfig::default());
    let err = PoolWalker::start(&session, fixture.pool)
        .unwrap()
        .find_map(Result::err)
        .unwrap();
    assert!(err.to_string().contains("misaligned"), "{err}");
}

#[test]
fn test_zero_element_size_is_rejected()
{
    let fixture = pool_with(&[(1, 0b0001)], 0, chained);
    let session = Session::new(&fixture.image, TargetConfig::default());
    assert!(matches!(
        PoolWalker::start(&session, fixture.pool),
        Err(SccError::Decode { what: "J9Pool", .. })
    ));
}

#[test]
fn test_unmapped_pool_header()
{
    let image = MemoryImage::new("empty");
    let session = Session::new(&image, TargetConfig::default());
    let err = PoolWalker::start(&session, addr(HEAP_BASE)).err().unwrap();
    assert!(err.is_read_failure());
}
