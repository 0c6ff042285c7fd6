//! Notifications a storage engine delivers to change tracking.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::map::{BlockId, Lsn};

/// Receiver of storage engine events. Handlers must return quickly and must
/// never fail the caller's I/O path: problems are logged, not returned.
pub trait StorageObserver: Send + Sync {
    /// A block was written out.
    fn on_block_written(&self, block: BlockId, lsn: Lsn);
    /// A relation was extended by one block.
    fn on_block_extended(&self, block: BlockId, lsn: Lsn);
    /// A directory was physically copied into place (e.g. a database created
    /// from a template); no per-block writes will follow for its contents.
    fn on_directory_copied(&self, path: &Path);
    /// A checkpoint (sync of all dirty data) completed.
    fn on_checkpoint(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    BlockWritten { block: BlockId, lsn: Lsn },
    BlockExtended { block: BlockId, lsn: Lsn },
    DirectoryCopied { path: PathBuf },
    Checkpoint,
}

/// The host side list of observers; every event goes to each of them in
/// registration order.
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn StorageObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn StorageObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn notify(&self, event: &HostEvent) {
        for observer in &self.observers {
            match event {
                HostEvent::BlockWritten { block, lsn } => observer.on_block_written(*block, *lsn),
                HostEvent::BlockExtended { block, lsn } => observer.on_block_extended(*block, *lsn),
                HostEvent::DirectoryCopied { path } => observer.on_directory_copied(path),
                HostEvent::Checkpoint => observer.on_checkpoint(),
            }
        }
    }
}
