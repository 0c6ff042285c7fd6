//! Durable copy of the change map.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::logging::CheckpointSnapshot;
use crate::map::{ChangeMap, MAP_HEADER_SIZE};
use crate::Result;

/// Writes the map to a fixed path and reads it back at startup.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the persisted map with a snapshot of `map`.
    ///
    /// The snapshot goes to a temporary file in the same directory, is synced,
    /// and is then renamed over the old copy, so a crash leaves either the old
    /// or the new map, never a torn one.
    pub fn persist(&self, map: &ChangeMap) -> Result<CheckpointSnapshot> {
        let started = Instant::now();
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            map.snapshot(&mut writer)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        if let Ok(dir) = File::open(dir) {
            // Make the rename itself durable; not supported everywhere.
            let _ = dir.sync_all();
        }

        let snapshot = CheckpointSnapshot {
            slots: map.slot_count() as u64,
            used_slots: map.used_slots() as u64,
            bytes_written: MAP_HEADER_SIZE as u64 + map.capacity_bytes(),
            elapsed_us: started.elapsed().as_micros() as u64,
        };
        debug!(path = %self.path.display(), bytes = snapshot.bytes_written, "change map persisted");
        Ok(snapshot)
    }

    /// Read the persisted map. `Ok(None)` if there is none; a damaged file is
    /// an [`crate::Error::CorruptMap`].
    pub fn load(&self) -> Result<Option<ChangeMap>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let map = ChangeMap::restore(BufReader::new(file))?;
        debug!(
            path = %self.path.display(),
            slots = map.slot_count(),
            init_lsn = %map.init_lsn(),
            "change map loaded"
        );
        Ok(Some(map))
    }

    /// Delete the persisted map, if any.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "removed persisted change map");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
