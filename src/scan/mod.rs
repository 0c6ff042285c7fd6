//! Pull-based scan of the data directory against the change map.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::logging::{log_scan_metrics, ScanSnapshot};
use crate::map::{ChangeMap, Lsn, RELSEG_SIZE};
use crate::walk::{FileEnumerator, RelationFile};
use crate::{Error, Result};

pub mod bitmap;

pub use bitmap::ChangeBitmap;

/// Lazily yields one [`ChangeBitmap`] per segment file that has at least one
/// block changed at or after the baseline LSN.
///
/// Segments are visited in enumeration order and each is reported at most
/// once. The scan holds no lock on the map; blocks marked while it runs may
/// or may not be reported, which the next backup's baseline covers.
pub struct PagemapScan {
    map: Arc<ChangeMap>,
    baseline: Lsn,
    files: FileEnumerator,
    stats: ScanSnapshot,
    finished: bool,
}

impl PagemapScan {
    pub fn new(map: Arc<ChangeMap>, baseline: Lsn, files: FileEnumerator) -> Self {
        Self {
            map,
            baseline,
            files,
            stats: ScanSnapshot::default(),
            finished: false,
        }
    }

    pub fn baseline(&self) -> Lsn {
        self.baseline
    }

    pub fn stats(&self) -> ScanSnapshot {
        self.stats
    }

    /// Compare every block of one segment against the baseline.
    ///
    /// The range runs one block past the last complete block, capped at the
    /// segment boundary, so a block being appended while the size was taken
    /// is still considered.
    fn scan_file(&mut self, file: &RelationFile) -> ChangeBitmap {
        let mut bitmap = ChangeBitmap::new(file.rel_path.clone());
        let last = file.nblocks().min(RELSEG_SIZE - 1);
        for offset in 0..=last {
            let block = file.block_id(offset);
            let lsn = self.map.read(&block);
            self.stats.blocks_checked += 1;
            // Zero means the slot was never marked: no information.
            if !lsn.is_valid() {
                continue;
            }
            trace!(path = %file.rel_path, block = block.block, %lsn, "tracked block");
            if lsn >= self.baseline {
                bitmap.set(offset);
                self.stats.blocks_changed += 1;
            }
        }
        bitmap
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            log_scan_metrics(self.stats);
        }
    }
}

impl Iterator for PagemapScan {
    type Item = Result<ChangeBitmap>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if !self.map.is_valid() {
                // The map was replaced under us; nothing read from it can be
                // trusted for this baseline any more.
                self.finish();
                return Some(Err(Error::TrackingDisabled.into()));
            }

            let Some(file) = self.files.next() else {
                self.finish();
                return None;
            };
            self.stats.files_scanned += 1;

            let bitmap = self.scan_file(&file);
            if bitmap.is_empty() {
                continue;
            }
            debug!(path = %bitmap.path, changed = bitmap.count(), "emitting pagemap");
            self.stats.pagemaps_emitted += 1;
            self.stats.bitmap_bytes += bitmap.as_bytes().len() as u64;
            return Some(Ok(bitmap));
        }
    }
}
