use std::fs;
use std::path::Path;

use pbktrack::map::ForkNumber;
use pbktrack::walk::{FileEnumerator, Scope, DEFAULT_TABLESPACE_VERSION_DIR};
use tempfile::tempdir;

fn write_file(path: &Path, len: usize) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, vec![0u8; len]).unwrap();
}

#[test]
fn enumerates_relation_files_across_layout() -> pbktrack::Result<()> {
    let data = tempdir()?;
    let spc_target = tempdir()?;
    let d = data.path();

    write_file(&d.join("global/1262"), 8192);
    write_file(&d.join("global/pg_control"), 8192);
    write_file(&d.join("global/pg_filenode.map"), 512);
    write_file(&d.join("base/5/16384"), 3 * 8192);
    write_file(&d.join("base/5/16384_fsm"), 8192);
    write_file(&d.join("base/5/16384.1"), 8192 + 100);
    write_file(&d.join("base/5/t3_16500"), 8192);
    write_file(&d.join("base/5/PG_VERSION"), 3);
    write_file(&d.join("base/pgsql_tmp/16600"), 8192);
    write_file(&d.join("pg_wal/000000010000000000000001"), 8192);
    write_file(
        &spc_target
            .path()
            .join(DEFAULT_TABLESPACE_VERSION_DIR)
            .join("5/16390_vm"),
        8192,
    );
    write_file(&spc_target.path().join("PG_15_202209061/5/16391"), 8192);
    fs::create_dir_all(d.join("pg_tblspc"))?;
    std::os::unix::fs::symlink(spc_target.path(), d.join("pg_tblspc/20000"))?;

    let files: Vec<_> = FileEnumerator::for_data_dir(d, DEFAULT_TABLESPACE_VERSION_DIR).collect();
    let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "global/1262",
            "base/5/16384",
            "base/5/16384.1",
            "base/5/16384_fsm",
            "pg_tblspc/20000/PG_16_202307071/5/16390_vm",
        ]
    );

    let global = &files[0];
    assert_eq!(global.locator.spc_oid, 1664);
    assert_eq!(global.locator.db_oid, 0);

    let seg1 = &files[2];
    assert_eq!(seg1.segno, 1);
    assert_eq!(seg1.nblocks(), 1);
    assert_eq!(seg1.first_block(), 131_072);
    assert_eq!(seg1.block_id(0).block, 131_072);

    let vm = &files[4];
    assert_eq!(vm.locator.spc_oid, 20000);
    assert_eq!(vm.locator.db_oid, 5);
    assert_eq!(vm.fork, ForkNumber::VisibilityMap);
    Ok(())
}

#[test]
fn missing_roots_yield_nothing() {
    let data = tempdir().unwrap();
    let files: Vec<_> =
        FileEnumerator::for_data_dir(data.path(), DEFAULT_TABLESPACE_VERSION_DIR).collect();
    assert!(files.is_empty());
}

#[test]
fn scoped_root_treats_its_files_as_one_database() -> pbktrack::Result<()> {
    let data = tempdir()?;
    write_file(&data.path().join("100"), 2 * 8192);
    write_file(&data.path().join("101_init"), 0);

    let files: Vec<_> = FileEnumerator::new(DEFAULT_TABLESPACE_VERSION_DIR)
        .with_root(data.path(), Scope::new(1663, 7))
        .collect();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].rel_path, "base/7/100");
    assert_eq!(files[0].nblocks(), 2);
    assert_eq!(files[1].fork, ForkNumber::Init);
    assert_eq!(files[1].nblocks(), 0);
    Ok(())
}

#[test]
fn broken_tablespace_does_not_stop_the_walk() -> pbktrack::Result<()> {
    let data = tempdir()?;
    let spc_target = tempdir()?;
    let d = data.path();

    write_file(&d.join("base/5/16384"), 8192);
    write_file(
        &spc_target
            .path()
            .join(DEFAULT_TABLESPACE_VERSION_DIR)
            .join("5/16390"),
        8192,
    );
    fs::create_dir_all(d.join("pg_tblspc"))?;
    std::os::unix::fs::symlink(d.join("no-such-target"), d.join("pg_tblspc/30000"))?;
    std::os::unix::fs::symlink(spc_target.path(), d.join("pg_tblspc/40000"))?;

    let paths: Vec<String> = FileEnumerator::for_data_dir(d, DEFAULT_TABLESPACE_VERSION_DIR)
        .map(|f| f.rel_path)
        .collect();
    assert_eq!(
        paths,
        vec![
            "base/5/16384".to_string(),
            "pg_tblspc/40000/PG_16_202307071/5/16390".to_string(),
        ]
    );
    Ok(())
}
