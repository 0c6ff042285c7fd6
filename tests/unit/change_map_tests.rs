use std::sync::Arc;
use std::thread;

use pbktrack::map::{
    validate_map_size, BlockId, ChangeMap, ForkNumber, Lsn, RelFileLocator, MAX_MAP_SIZE,
};
use pbktrack::Error;

fn block(rel: u32, blk: u32) -> BlockId {
    BlockId::new(RelFileLocator::new(1663, 5, rel), ForkNumber::Main, blk)
}

#[test]
fn slot_values_never_move_backwards() -> pbktrack::Result<()> {
    let map = ChangeMap::initialize(1 << 20, Lsn(100))?;
    let b = block(16384, 7);

    assert_eq!(map.read(&b), Lsn::INVALID);
    assert_eq!(map.mark(&b, Lsn(200)), Lsn(200));
    assert_eq!(map.mark(&b, Lsn(150)), Lsn(200));
    assert_eq!(map.read(&b), Lsn(200));
    assert_eq!(map.mark(&b, Lsn(300)), Lsn(300));
    // Marking with an invalid position records nothing.
    assert_eq!(map.mark(&b, Lsn::INVALID), Lsn(300));
    assert_eq!(map.used_slots(), 1);
    Ok(())
}

#[test]
fn colliding_blocks_over_report_but_never_under_report() -> pbktrack::Result<()> {
    // A single slot forces every block into the same place.
    let map = ChangeMap::initialize(8, Lsn(1))?;
    assert_eq!(map.slot_count(), 1);

    map.mark(&block(1, 0), Lsn(500));
    map.mark(&block(2, 9), Lsn(400));

    assert_eq!(map.read(&block(1, 0)), Lsn(500));
    assert_eq!(map.read(&block(2, 9)), Lsn(500));
    assert_eq!(map.read(&block(3, 3)), Lsn(500));
    Ok(())
}

#[test]
fn more_blocks_than_slots_still_report_every_change() -> pbktrack::Result<()> {
    let map = ChangeMap::initialize(64, Lsn(1))?;
    assert_eq!(map.slot_count(), 8);

    for blk in 0..100u32 {
        map.mark(&block(16384, blk), Lsn(1000 + u64::from(blk)));
    }
    for blk in 0..100u32 {
        assert!(map.read(&block(16384, blk)) >= Lsn(1000 + u64::from(blk)));
    }
    Ok(())
}

#[test]
fn concurrent_marks_keep_the_maximum() -> pbktrack::Result<()> {
    let map = Arc::new(ChangeMap::initialize(4096, Lsn(1))?);
    let handles: Vec<_> = (0..8u64)
        .map(|worker| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for i in 0..1000u64 {
                    let lsn = Lsn(10 + i * 8 + worker);
                    map.mark(&block(42, (i % 16) as u32), lsn);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for blk in 0..16u64 {
        let last_i = (0..1000u64).filter(|i| i % 16 == blk).max().unwrap();
        assert!(map.read(&block(42, blk as u32)) >= Lsn(10 + last_i * 8 + 7));
    }
    let newest = (0..16u32).map(|blk| map.read(&block(42, blk))).max().unwrap();
    assert_eq!(newest, Lsn(10 + 999 * 8 + 7));
    Ok(())
}

#[test]
fn zero_init_lsn_adopts_first_mark() -> pbktrack::Result<()> {
    let map = ChangeMap::initialize(1024, Lsn::INVALID)?;
    assert_eq!(map.init_lsn(), Lsn::INVALID);

    map.mark(&block(1, 1), Lsn(777));
    map.mark(&block(1, 2), Lsn(900));
    assert_eq!(map.init_lsn(), Lsn(777));

    let started = ChangeMap::initialize(1024, Lsn(50))?;
    started.mark(&block(1, 1), Lsn(777));
    assert_eq!(started.init_lsn(), Lsn(50));
    Ok(())
}

#[test]
fn rejects_out_of_range_sizes() {
    for size in [0, 7, MAX_MAP_SIZE + 1] {
        let err = ChangeMap::initialize(size, Lsn(1)).expect_err("size must be rejected");
        assert!(
            matches!(err.downcast_ref::<Error>(), Some(Error::InvalidMapSize { requested, .. }) if *requested == size),
            "{size}: {err:?}"
        );
    }
    assert_eq!(validate_map_size(8).unwrap(), 1);
    assert_eq!(validate_map_size(1023).unwrap(), 127);
    assert_eq!(validate_map_size(MAX_MAP_SIZE).unwrap(), MAX_MAP_SIZE / 8);
}

#[test]
fn invalidated_map_reports_it() -> pbktrack::Result<()> {
    let map = ChangeMap::initialize(1024, Lsn(1))?;
    assert!(map.is_valid());
    map.invalidate();
    assert!(!map.is_valid());
    Ok(())
}
