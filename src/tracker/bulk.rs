//! Marking whole directories that were copied into place without going
//! through per-block writes.

use std::path::Path;

use tracing::debug;

use crate::logging::BulkMarkSnapshot;
use crate::map::{ChangeMap, Lsn, Oid};
use crate::walk::{FileEnumerator, Scope};

/// Mark every complete block of every relation file under `root` as changed
/// at `lsn`. `spc_oid`/`db_oid` give the context `root` lives in, as for
/// [`FileEnumerator`].
pub fn walk_and_mark(
    map: &ChangeMap,
    root: &Path,
    spc_oid: Oid,
    db_oid: Oid,
    lsn: Lsn,
    tablespace_version_dir: &str,
) -> BulkMarkSnapshot {
    let mut stats = BulkMarkSnapshot::default();
    let files =
        FileEnumerator::new(tablespace_version_dir).with_root(root, Scope::new(spc_oid, db_oid));

    for file in files {
        let nblocks = file.nblocks();
        for offset in 0..nblocks {
            map.mark(&file.block_id(offset), lsn);
        }
        debug!(path = %file.rel_path, blocks = nblocks, %lsn, "marked copied file");
        stats.files_marked += 1;
        stats.blocks_marked += u64::from(nblocks);
    }
    stats
}
