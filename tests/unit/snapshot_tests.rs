use pbktrack::map::{BlockId, ChangeMap, ForkNumber, Lsn, RelFileLocator, MAP_HEADER_SIZE};
use pbktrack::Error;

fn sample_map() -> ChangeMap {
    let map = ChangeMap::initialize(1024, Lsn(0x1_0000_0028)).unwrap();
    for blk in 0..20u32 {
        let id = BlockId::new(RelFileLocator::new(1663, 5, 16384), ForkNumber::Main, blk);
        map.mark(&id, Lsn(0x1_0000_0100 + u64::from(blk)));
    }
    map
}

fn encode(map: &ChangeMap) -> Vec<u8> {
    let mut buf = Vec::new();
    map.snapshot(&mut buf).unwrap();
    buf
}

fn assert_corrupt(bytes: &[u8], what: &str) {
    let err = ChangeMap::restore(bytes).expect_err(what);
    assert!(
        matches!(err.downcast_ref::<Error>(), Some(Error::CorruptMap { .. })),
        "{what}: {err:?}"
    );
}

#[test]
fn restored_map_answers_like_the_original() -> pbktrack::Result<()> {
    let map = sample_map();
    let bytes = encode(&map);
    assert_eq!(bytes.len(), MAP_HEADER_SIZE + 1024);
    assert_eq!(&bytes[..8], b"PBKTRMAP");

    let restored = ChangeMap::restore(bytes.as_slice())?;
    assert_eq!(restored.slot_count(), map.slot_count());
    assert_eq!(restored.init_lsn(), map.init_lsn());
    assert_eq!(restored.slot_values(), map.slot_values());
    assert!(restored.is_valid());

    let id = BlockId::new(RelFileLocator::new(1663, 5, 16384), ForkNumber::Main, 19);
    assert!(restored.read(&id) >= Lsn(0x1_0000_0100 + 19));
    Ok(())
}

#[test]
fn any_single_flipped_byte_is_detected() {
    let bytes = encode(&sample_map());
    for idx in 0..bytes.len() {
        let mut damaged = bytes.clone();
        damaged[idx] ^= 0x5a;
        assert_corrupt(&damaged, &format!("flipped byte {idx}"));
    }
}

#[test]
fn truncated_or_extended_images_are_rejected() {
    let bytes = encode(&sample_map());
    assert_corrupt(&[], "empty");
    assert_corrupt(&bytes[..MAP_HEADER_SIZE - 1], "short header");
    assert_corrupt(&bytes[..MAP_HEADER_SIZE], "header only");
    assert_corrupt(&bytes[..bytes.len() - 8], "one slot missing");

    let mut extended = bytes.clone();
    extended.push(0);
    assert_corrupt(&extended, "trailing byte");
}

#[test]
fn huge_declared_slot_count_fails_without_allocating_it() {
    let mut bytes = encode(&sample_map());
    // 2^32 slots declared, 128 present.
    bytes[16..24].copy_from_slice(&(1u64 << 32).to_le_bytes());
    assert_corrupt(&bytes, "oversized slot count");
}
