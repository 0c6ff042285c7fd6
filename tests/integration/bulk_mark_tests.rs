use std::fs;
use std::path::Path;
use std::sync::Arc;

use pbktrack::map::{BlockId, ChangeMap, ForkNumber, Lsn, RelFileLocator};
use pbktrack::tracker::{bulk, SharedLsn, StorageObserver, Tracker, TrackerConfig};
use pbktrack::walk::DEFAULT_TABLESPACE_VERSION_DIR;
use tempfile::tempdir;

const MAP_SIZE: u64 = 1 << 20;

fn write_blocks(path: &Path, nblocks: usize) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, vec![0u8; nblocks * 8192]).unwrap();
}

fn tracker_with_copied_db(data_dir: &Path) -> (Tracker, Arc<SharedLsn>) {
    fs::create_dir_all(data_dir.join("global")).unwrap();
    write_blocks(&data_dir.join("base/7/100"), 10);
    let wal = Arc::new(SharedLsn::new(Lsn(100)));
    let tracker = Tracker::start(TrackerConfig::new(data_dir, MAP_SIZE), wal.clone()).unwrap();
    (tracker, wal)
}

fn changed_since(tracker: &Tracker, baseline: Lsn) -> Vec<(String, Vec<u8>)> {
    tracker
        .pagemapset(baseline)
        .unwrap()
        .map(|bitmap| bitmap.unwrap().into_parts())
        .collect()
}

#[test]
fn marks_every_block_of_copied_files() -> pbktrack::Result<()> {
    let data = tempdir()?;
    write_blocks(&data.path().join("100"), 10);
    write_blocks(&data.path().join("100_fsm"), 2);
    let map = ChangeMap::initialize(MAP_SIZE, Lsn(1))?;

    let stats = bulk::walk_and_mark(
        &map,
        data.path(),
        1663,
        7,
        Lsn(500),
        DEFAULT_TABLESPACE_VERSION_DIR,
    );
    assert_eq!(stats.files_marked, 2);
    assert_eq!(stats.blocks_marked, 12);

    for blk in 0..10u32 {
        let id = BlockId::new(RelFileLocator::new(1663, 7, 100), ForkNumber::Main, blk);
        assert!(map.read(&id) >= Lsn(500), "block {blk}");
    }
    Ok(())
}

#[test]
fn copied_database_is_reported_as_changed() -> pbktrack::Result<()> {
    let data = tempdir()?;
    let (tracker, wal) = tracker_with_copied_db(data.path());

    wal.set(Lsn(500));
    tracker.on_directory_copied(Path::new("base/7"));

    assert_eq!(
        changed_since(&tracker, Lsn(500)),
        vec![("base/7/100".to_string(), vec![0xFF, 0x03])]
    );
    assert!(changed_since(&tracker, Lsn(501)).is_empty());
    Ok(())
}

#[test]
fn absolute_copy_path_is_resolved_against_data_dir() -> pbktrack::Result<()> {
    let data = tempdir()?;
    let (tracker, wal) = tracker_with_copied_db(data.path());

    wal.set(Lsn(700));
    tracker.on_directory_copied(&data.path().join("base/7"));

    assert_eq!(changed_since(&tracker, Lsn(600)).len(), 1);
    Ok(())
}

#[test]
fn exempt_and_unclassifiable_copies_are_not_marked() -> pbktrack::Result<()> {
    let data = tempdir()?;
    let (tracker, wal) = tracker_with_copied_db(data.path());
    let tracker = tracker.with_copy_exemption(|path| path.ends_with("base/7"));

    wal.set(Lsn(500));
    tracker.on_directory_copied(Path::new("base/7"));
    tracker.on_directory_copied(Path::new("pg_wal"));
    tracker.on_directory_copied(Path::new("/somewhere/else/base/7"));

    assert!(changed_since(&tracker, Lsn(1)).is_empty());
    assert!(tracker
        .walk_and_mark(&data.path().join("base/7"), 1663, 7)
        .is_none());
    Ok(())
}
