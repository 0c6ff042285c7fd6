//! Process-wide change tracking: owns the change map and wires it to the
//! storage engine's events, checkpoints and the backup query surface.
//!
//! A [`Tracker`] is created once at startup with [`Tracker::start`] and shared
//! (behind an `Arc`) by every worker that reports writes. Marking and scanning
//! only read the current map handle; [`Tracker::reinitialize`] swaps in a new
//! map and invalidates the old one for anyone still holding it.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::logging::{log_bulk_mark_metrics, log_checkpoint_metrics, BulkMarkSnapshot};
use crate::map::{validate_map_size, BlockId, ChangeMap, Lsn, Oid};
use crate::scan::PagemapScan;
use crate::walk::{classify_copy_target, FileEnumerator};
use crate::{Error, Result, PROTOCOL_VERSION};

pub mod bulk;
pub mod checkpoint;
pub mod config;
pub mod events;

pub use checkpoint::Checkpointer;
pub use config::TrackerConfig;
pub use events::{HostEvent, ObserverSet, StorageObserver};

/// Source of the current write-ahead position.
pub trait WalPosition: Send + Sync {
    fn current_lsn(&self) -> Lsn;
}

/// A write position the host advances by hand.
#[derive(Debug, Default)]
pub struct SharedLsn(AtomicU64);

impl SharedLsn {
    pub fn new(lsn: Lsn) -> Self {
        Self(AtomicU64::new(lsn.0))
    }

    pub fn set(&self, lsn: Lsn) {
        self.0.store(lsn.0, Ordering::Release);
    }
}

impl WalPosition for SharedLsn {
    fn current_lsn(&self) -> Lsn {
        Lsn(self.0.load(Ordering::Acquire))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisabledReason {
    /// Map size is 0.
    NotConfigured,
    /// The persisted map failed validation; a reinitialization is required.
    Corrupt(String),
    ShutDown,
}

#[derive(Debug, Clone)]
pub enum TrackingState {
    Active(Arc<ChangeMap>),
    Disabled(DisabledReason),
}

type CopyExemption = Box<dyn Fn(&Path) -> bool + Send + Sync>;

pub struct Tracker {
    config: TrackerConfig,
    wal: Arc<dyn WalPosition>,
    checkpointer: Checkpointer,
    state: RwLock<TrackingState>,
    // Held across "pick the live map" and "write it out" so an older map can
    // never be renamed over a newer one.
    persist_lock: Mutex<()>,
    copy_exemption: Option<CopyExemption>,
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("config", &self.config)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

impl Tracker {
    /// Bring tracking up at process start.
    ///
    /// * map size 0: tracking disabled, a stale persisted map is removed;
    /// * persisted map of the configured size: reused as is;
    /// * missing map or a different size: a fresh map starting at the
    ///   current write position;
    /// * corrupt map: tracking disabled until [`Tracker::reinitialize`].
    pub fn start(config: TrackerConfig, wal: Arc<dyn WalPosition>) -> Result<Self> {
        config.validate()?;
        let checkpointer = Checkpointer::new(config.map_path());

        let state = if !config.enabled() {
            if let Err(err) = checkpointer.remove() {
                warn!(path = %checkpointer.path().display(), error = %err, "could not remove stale change map");
            }
            info!("change tracking disabled");
            TrackingState::Disabled(DisabledReason::NotConfigured)
        } else {
            let slot_count = validate_map_size(config.map_size)?;
            match checkpointer.load() {
                Ok(Some(map)) if map.slot_count() as u64 == slot_count => {
                    info!(
                        slots = map.slot_count(),
                        init_lsn = %map.init_lsn(),
                        "attached persisted change map"
                    );
                    TrackingState::Active(Arc::new(map))
                }
                Ok(loaded) => {
                    if let Some(old) = &loaded {
                        info!(
                            old_slots = old.slot_count(),
                            new_slots = slot_count,
                            "change map size changed, starting a new tracking epoch"
                        );
                    }
                    let init_lsn = next_epoch_start(wal.current_lsn(), loaded.as_ref());
                    let map = Arc::new(ChangeMap::initialize(config.map_size, init_lsn)?);
                    persist_best_effort(&checkpointer, &map);
                    info!(slots = map.slot_count(), init_lsn = %map.init_lsn(), "initialized change map");
                    TrackingState::Active(map)
                }
                Err(err) => {
                    warn!(
                        path = %checkpointer.path().display(),
                        error = %format!("{err:#}"),
                        "change map unusable, tracking disabled until reinitialized"
                    );
                    let reason = match err.downcast_ref::<Error>() {
                        Some(Error::CorruptMap { reason }) => reason.clone(),
                        _ => format!("{err:#}"),
                    };
                    TrackingState::Disabled(DisabledReason::Corrupt(reason))
                }
            }
        };

        Ok(Self {
            config,
            wal,
            checkpointer,
            state: RwLock::new(state),
            persist_lock: Mutex::new(()),
            copy_exemption: None,
        })
    }

    /// Skip bulk marking for copied directories matching `exempt` (e.g.
    /// compressed tablespaces whose blocks are not addressable).
    pub fn with_copy_exemption<F>(mut self, exempt: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.copy_exemption = Some(Box::new(exempt));
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> TrackingState {
        self.state.read().clone()
    }

    /// Handle on the live map, `None` while tracking is disabled.
    pub fn attach(&self) -> Option<Arc<ChangeMap>> {
        match &*self.state.read() {
            TrackingState::Active(map) => Some(Arc::clone(map)),
            TrackingState::Disabled(_) => None,
        }
    }

    /// Replace the map with a fresh one of `capacity_bytes`.
    ///
    /// Every slot starts at zero and the new epoch begins strictly after the
    /// previous one, so any baseline taken against the old map is detectably
    /// stale. An invalid size is rejected and the current map stays in place.
    pub fn reinitialize(&self, capacity_bytes: u64) -> Result<Lsn> {
        validate_map_size(capacity_bytes)?;

        let _persist = self.persist_lock.lock();
        let map = {
            let mut state = self.state.write();
            let previous = match &*state {
                TrackingState::Active(old) => Some(old.as_ref()),
                TrackingState::Disabled(_) => None,
            };
            let init_lsn = next_epoch_start(self.wal.current_lsn(), previous);
            let map = Arc::new(ChangeMap::initialize(capacity_bytes, init_lsn)?);
            if let TrackingState::Active(old) = &*state {
                old.invalidate();
            }
            *state = TrackingState::Active(Arc::clone(&map));
            map
        };

        persist_best_effort(&self.checkpointer, &map);
        info!(slots = map.slot_count(), init_lsn = %map.init_lsn(), "reinitialized change map");
        Ok(map.init_lsn())
    }

    /// Record that `block` changed at `lsn`. No-op while tracking is disabled.
    pub fn mark_block(&self, block: BlockId, lsn: Lsn) {
        if let TrackingState::Active(map) = &*self.state.read() {
            map.mark(&block, lsn);
        }
    }

    /// Mark every block below `root` as changed at the current write
    /// position. Returns `None` when nothing was marked because tracking is
    /// disabled or the path is exempt.
    pub fn walk_and_mark(&self, root: &Path, spc_oid: Oid, db_oid: Oid) -> Option<BulkMarkSnapshot> {
        if let Some(exempt) = &self.copy_exemption {
            if exempt(root) {
                debug!(path = %root.display(), "copied directory exempt from tracking");
                return None;
            }
        }
        loop {
            let map = self.attach()?;
            // Never below the epoch start, or a fresh map would not report them.
            let lsn = self.wal.current_lsn().max(map.init_lsn());
            let stats = bulk::walk_and_mark(
                &map,
                root,
                spc_oid,
                db_oid,
                lsn,
                &self.config.tablespace_version_dir,
            );
            if map.is_valid() {
                log_bulk_mark_metrics(stats);
                return Some(stats);
            }
            debug!(path = %root.display(), "change map replaced during bulk mark, marking again");
        }
    }

    /// Persist the current map. Nothing to do while disabled.
    pub fn checkpoint(&self) -> Result<()> {
        let _persist = self.persist_lock.lock();
        let Some(map) = self.attach() else {
            return Ok(());
        };
        match self.checkpointer.persist(&map) {
            Ok(snapshot) => {
                log_checkpoint_metrics(snapshot, false);
                Ok(())
            }
            Err(err) => {
                log_checkpoint_metrics(
                    crate::logging::CheckpointSnapshot {
                        slots: map.slot_count() as u64,
                        used_slots: map.used_slots() as u64,
                        ..Default::default()
                    },
                    true,
                );
                Err(err)
            }
        }
    }

    /// Final checkpoint, then stop tracking.
    pub fn shutdown(&self) {
        if let Err(err) = self.checkpoint() {
            warn!(error = %format!("{err:#}"), "final change map checkpoint failed");
        }
        let mut state = self.state.write();
        if let TrackingState::Active(map) = &*state {
            map.invalidate();
        }
        *state = TrackingState::Disabled(DisabledReason::ShutDown);
        info!("change tracking shut down");
    }

    pub fn version(&self) -> &'static str {
        PROTOCOL_VERSION
    }

    /// Start of the current tracking epoch, `None` while disabled.
    pub fn init_lsn(&self) -> Option<Lsn> {
        match self.attach() {
            Some(map) => Some(map.init_lsn()),
            None => {
                warn!("change tracking is disabled");
                None
            }
        }
    }

    /// True when the map can answer for `baseline`: tracking is on and its
    /// epoch started no later than the baseline. Otherwise a full backup is
    /// needed.
    pub fn covers(&self, baseline: Lsn) -> bool {
        self.attach()
            .map(|map| map.init_lsn() <= baseline)
            .unwrap_or(false)
    }

    /// Changed blocks since `baseline`, one bitmap per segment file.
    pub fn pagemapset(&self, baseline: Lsn) -> Result<PagemapScan> {
        let map = self.attach().ok_or(Error::TrackingDisabled)?;
        let files =
            FileEnumerator::for_data_dir(&self.config.data_dir, &self.config.tablespace_version_dir);
        Ok(PagemapScan::new(map, baseline, files))
    }

    fn on_copy(&self, path: &Path) {
        let rel = if path.is_absolute() {
            match path.strip_prefix(&self.config.data_dir) {
                Ok(rel) => rel,
                Err(_) => {
                    warn!(path = %path.display(), "copied directory outside data directory, not tracked");
                    return;
                }
            }
        } else {
            path
        };
        let Some((spc_oid, db_oid)) =
            classify_copy_target(rel, &self.config.tablespace_version_dir)
        else {
            warn!(path = %path.display(), "cannot classify copied directory, not tracked");
            return;
        };
        debug!(path = %path.display(), spc_oid, db_oid, "directory copied");
        self.walk_and_mark(&self.config.data_dir.join(rel), spc_oid, db_oid);
    }
}

/// Start of a new epoch: the current write position, but strictly after the
/// map being replaced.
fn next_epoch_start(wal: Lsn, previous: Option<&ChangeMap>) -> Lsn {
    match previous {
        Some(old) => wal.max(Lsn(old.init_lsn().0.saturating_add(1))),
        None => wal,
    }
}

fn persist_best_effort(checkpointer: &Checkpointer, map: &ChangeMap) {
    if let Err(err) = checkpointer.persist(map) {
        warn!(
            path = %checkpointer.path().display(),
            error = %format!("{err:#}"),
            "could not persist change map"
        );
    }
}

impl StorageObserver for Tracker {
    fn on_block_written(&self, block: BlockId, lsn: Lsn) {
        self.mark_block(block, lsn);
    }

    fn on_block_extended(&self, block: BlockId, lsn: Lsn) {
        self.mark_block(block, lsn);
    }

    fn on_directory_copied(&self, path: &Path) {
        self.on_copy(path);
    }

    fn on_checkpoint(&self) {
        if let Err(err) = self.checkpoint() {
            warn!(error = %format!("{err:#}"), "change map checkpoint failed, in-memory map still in use");
        }
    }
}
