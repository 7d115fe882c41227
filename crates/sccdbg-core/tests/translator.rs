//! Tests for the session address translator

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::addr;
use sccdbg_core::codec::ShrOffset;
use sccdbg_core::config::{LayerPolicy, TargetConfig};
use sccdbg_core::error::SccError;
use sccdbg_core::readers::VmLayouts;
use sccdbg_core::target::{CommandScope, MemoryImage, Session, TargetMemory};
use sccdbg_core::types::{MemoryRegion, TargetAddr};

fn image() -> MemoryImage
{
    let mut image = MemoryImage::new("translator");
    let bytes: Vec<u8> = (0..=255u8).collect();
    image.add_region(addr(0x1000), bytes, None).unwrap();
    image.add_region(addr(0x1100), vec![0xee; 16], None).unwrap();
    image.add_region(addr(0x9000), vec![0x11; 8], None).unwrap();
    image
}

#[test]
fn test_repeated_reads_share_one_fetch()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default());

    let first = session.read_bytes(addr(0x1010), 16).unwrap();
    let fetched = session.fetch_count();
    let second = session.read_bytes(addr(0x1010), 8).unwrap();
    let inner = session.read_bytes(addr(0x1014), 4).unwrap();

    assert!(first.same_fetch(&second));
    assert!(first.same_fetch(&inner));
    assert_eq!(second.bytes(), &first.bytes()[..8]);
    assert_eq!(inner.bytes(), &[0x14, 0x15, 0x16, 0x17]);
    assert_eq!(session.fetch_count(), fetched);
    assert_eq!(first.bytes()[0], 0x10);
}

#[test]
fn test_map_to_local_returns_one_handle_per_address()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default());

    let small = session.map_to_local(addr(0x1010), Some(4)).unwrap();
    let again = session.map_to_local(addr(0x1010), None).unwrap();
    let grown = session.map_to_local(addr(0x1010), Some(16)).unwrap();

    assert!(Rc::ptr_eq(&small, &again));
    assert!(Rc::ptr_eq(&small, &grown));
    assert_eq!(small.len(), 16);
    assert_eq!(small.snapshot().bytes(), &(0x10..0x20).collect::<Vec<u8>>()[..]);
    assert_eq!(session.map_to_target(&grown), addr(0x1010));
    assert_eq!(session.fetch_count(), 2);
}

/// A live target whose every byte changes between two reads
struct Drifting
{
    generation: Cell<u8>,
}

impl TargetMemory for Drifting
{
    fn read_into(&self, _addr: TargetAddr, buf: &mut [u8]) -> sccdbg_core::Result<usize>
    {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        buf.fill(generation);
        Ok(buf.len())
    }

    fn regions(&self) -> Vec<MemoryRegion>
    {
        Vec::new()
    }

    fn description(&self) -> String
    {
        "drifting".to_string()
    }
}

#[test]
fn test_reads_inside_a_fetch_keep_its_bytes()
{
    let target = Drifting {
        generation: Cell::new(0),
    };
    let session = Session::new(&target, TargetConfig::default());

    let whole = session.read_bytes(addr(0x1000), 8).unwrap();
    assert_eq!(whole.bytes(), &[1; 8]);
    assert_eq!(session.read_u32(addr(0x1004)).unwrap(), 0x0101_0101);
    assert_eq!(session.fetch_count(), 1);

    let straddle = session.read_bytes(addr(0x1006), 6).unwrap();
    assert_eq!(straddle.bytes(), &[1, 1, 2, 2, 2, 2]);
    assert_eq!(session.fetch_count(), 2);
    assert_eq!(whole.bytes(), &[1; 8]);
}

#[test]
fn test_growing_a_handle_keeps_identity_and_bytes()
{
    let target = Drifting {
        generation: Cell::new(0),
    };
    let session = Session::new(&target, TargetConfig::default());

    let first = session.read_bytes(addr(0x1000), 4).unwrap();
    let handle = session.map_to_local(addr(0x1000), Some(4)).unwrap();
    let grown = session.map_to_local(addr(0x1000), Some(16)).unwrap();

    assert!(Rc::ptr_eq(&handle, &grown));
    assert_eq!(&handle.snapshot()[..4], first.bytes());
    assert_eq!(&handle.snapshot()[4..], &[2; 12]);
    assert_eq!(session.fetch_count(), 2);
    assert_eq!(session.cached_count(), 1);
}

#[test]
fn test_spanning_read_merges_earlier_fetches()
{
    let target = Drifting {
        generation: Cell::new(0),
    };
    let session = Session::new(&target, TargetConfig::default());

    session.read_bytes(addr(0x2000), 4).unwrap();
    session.read_bytes(addr(0x2008), 4).unwrap();
    assert_eq!(session.cached_count(), 2);

    let span = session.read_bytes(addr(0x2000), 16).unwrap();
    assert_eq!(span.bytes(), &[1, 1, 1, 1, 3, 3, 3, 3, 2, 2, 2, 2, 4, 4, 4, 4]);
    assert_eq!(session.cached_count(), 1);
    assert_eq!(session.fetch_count(), 4);
}

#[test]
fn test_larger_request_fetches_only_the_tail()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default());

    session.read_bytes(addr(0x1020), 4).unwrap();
    let grown = session.read_bytes(addr(0x1020), 12).unwrap();
    assert_eq!(session.fetch_count(), 2);
    assert_eq!(grown.bytes(), &(0x20..0x2c).collect::<Vec<u8>>()[..]);
    assert_eq!(session.cached_count(), 1);
}

#[test]
fn test_adjacent_regions_read_as_one()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default());
    let shadow = session.read_bytes(addr(0x10fe), 4).unwrap();
    assert_eq!(shadow.bytes(), &[0xfe, 0xff, 0xee, 0xee]);
}

#[test]
fn test_zero_length_read_is_rejected()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default());
    assert!(matches!(session.read_bytes(addr(0x1000), 0), Err(SccError::InvalidArgument(_))));
    assert_eq!(session.fetch_count(), 0);
}

#[test]
fn test_unmapped_read_is_unreachable()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default());
    let err = session.read_bytes(addr(0x5000), 8).unwrap_err();
    assert!(matches!(err, SccError::TargetUnreachable { address, len: 8 } if address == addr(0x5000)));
    assert!(err.is_read_failure());
    assert_eq!(session.cached_count(), 0);
}

#[test]
fn test_read_past_region_end_is_short()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default());
    match session.read_bytes(addr(0x9004), 8) {
        Err(SccError::ShortRead {
            requested, actual, ..
        }) => {
            assert_eq!(requested, 8);
            assert_eq!(actual, 4);
        }
        other => panic!("expected short read, got {other:?}"),
    }
    assert_eq!(session.read_uncached(addr(0x9004), 8).unwrap(), vec![0x11; 4]);
}

#[test]
fn test_wrapping_read_is_unreachable()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default());
    assert!(matches!(
        session.read_bytes(addr(u64::MAX - 2), 8),
        Err(SccError::TargetUnreachable { .. })
    ));
}

#[test]
fn test_read_struct_at_null_is_unreachable()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default());
    let layouts = VmLayouts::new(session.abi());
    assert!(matches!(
        session.read_struct(addr(0), &layouts.object),
        Err(SccError::TargetUnreachable { .. })
    ));
    assert_eq!(session.fetch_count(), 0);
}

#[test]
fn test_scalar_reads_follow_byte_order()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default());
    assert_eq!(session.read_u16(addr(0x1001)).unwrap(), 0x0201);
    assert_eq!(session.read_u32(addr(0x1004)).unwrap(), 0x0706_0504);
    assert_eq!(session.read_pointer(addr(0x1008)).unwrap(), addr(0x0f0e_0d0c_0b0a_0908));
    assert!(matches!(session.read_uint(addr(0x1000), 3), Err(SccError::Decode { .. })));
}

#[test]
fn test_command_scope_releases_shadows()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default());
    {
        let scope = CommandScope::new(&session);
        scope.read_bytes(addr(0x1000), 8).unwrap();
        scope.read_bytes(addr(0x1040), 8).unwrap();
        assert_eq!(session.cached_count(), 2);
    }
    assert_eq!(session.cached_count(), 0);

    let failing = || -> sccdbg_core::Result<()> {
        let scope = CommandScope::new(&session);
        scope.read_bytes(addr(0x1000), 8)?;
        scope.read_bytes(addr(0x7000), 8)?;
        Ok(())
    };
    assert!(failing().is_err());
    assert_eq!(session.cached_count(), 0);
}

#[test]
fn test_srp_resolution()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default());
    assert_eq!(session.resolve_srp(addr(0x1000), 0), None);
    assert_eq!(session.resolve_srp(addr(0x1000), 0x20), Some(addr(0x1020)));
    assert_eq!(session.resolve_srp(addr(0x1000), -0x10), Some(addr(0xff0)));
    assert_eq!(session.resolve_wsrp(addr(0x10), -0x20), None);
}

#[test]
fn test_shr_offset_needs_a_layer()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default());
    assert_eq!(session.resolve_self_relative(ShrOffset::new(0)).unwrap(), None);
    assert!(matches!(
        session.resolve_self_relative(ShrOffset::new(0x40)),
        Err(SccError::Decode { what: "ShrOffset", .. })
    ));
}

#[test]
fn test_newest_layer_wins_for_untagged_offsets()
{
    let target = image();
    let session = Session::new(&target, TargetConfig::default().with_multi_layer(true));
    session.set_layers(&[addr(0x10_0000), addr(0x20_0000), addr(0x30_0000)]);

    assert_eq!(session.resolve_self_relative(ShrOffset::new(0x40)).unwrap(), Some(addr(0x30_0040)));
    assert_eq!(session.resolve_self_relative(ShrOffset::in_layer(0, 0x40)).unwrap(), Some(addr(0x10_0040)));
    assert_eq!(session.resolve_self_relative(ShrOffset::in_layer(1, 0x40)).unwrap(), Some(addr(0x20_0040)));
    assert_eq!(session.resolve_self_relative(ShrOffset::in_layer(1, 0)).unwrap(), None);
    assert!(matches!(
        session.resolve_self_relative(ShrOffset::in_layer(7, 0x40)),
        Err(SccError::Decode { .. })
    ));
}

#[test]
fn test_explicit_policy_rejects_untagged_offsets()
{
    let target = image();
    let config = TargetConfig::default()
        .with_multi_layer(true)
        .with_layer_policy(LayerPolicy::Explicit);
    let session = Session::new(&target, config);
    session.set_layers(&[addr(0x10_0000), addr(0x20_0000)]);

    assert!(session.resolve_self_relative(ShrOffset::new(0x40)).is_err());
    assert_eq!(session.resolve_self_relative(ShrOffset::in_layer(0, 0x40)).unwrap(), Some(addr(0x10_0040)));
    assert_eq!(session.layer_anchors().len(), 2);
}

#[test]
fn test_known_range_uses_target_regions()
{
    let target = image();
    assert_eq!(target.regions().len(), 3);
    let session = Session::new(&target, TargetConfig::default());
    assert!(session.is_known_range(addr(0x1000), 0x100));
    assert!(session.is_known_range(addr(0x9000), 8));
    assert!(!session.is_known_range(addr(0x9000), 9));
    assert!(!session.is_known_range(addr(0x4000), 1));
    assert!(session.description().contains("3 regions"));
}

#[test]
fn test_overlapping_regions_are_rejected()
{
    let mut target = image();
    assert!(matches!(
        target.add_region(addr(0x1080), vec![0; 8], None),
        Err(SccError::InvalidArgument(_))
    ));
    assert!(target.add_region(addr(0x2000), Vec::new(), None).is_err());
}
