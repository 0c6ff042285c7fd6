use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::map::block::{BlockId, Lsn};
use crate::{Error, Result};

/// Bytes per slot (one atomic `u64` LSN).
pub const SLOT_SIZE: u64 = 8;
/// Upper bound for the configured map size (32 GiB).
pub const MAX_MAP_SIZE: u64 = 32 * 1024 * 1024 * 1024;
/// Highest slot count a map (or a persisted snapshot) may declare.
pub const MAX_SLOTS: u64 = MAX_MAP_SIZE / SLOT_SIZE;

/// Fixed-size, hash-indexed array of "last changed at" LSNs.
///
/// Every slot is either zero (never observed) or an LSN that only ever moves
/// forward. Distinct blocks may share a slot; the slot then holds the newest
/// change among them, which can over-report but never under-report.
#[derive(Debug)]
pub struct ChangeMap {
    init_lsn: AtomicU64,
    valid: AtomicBool,
    slots: Box<[AtomicU64]>,
}

/// Check a requested map size in bytes. Zero means "disabled" and is rejected
/// here; callers decide what disabled means for them.
pub fn validate_map_size(capacity_bytes: u64) -> Result<u64> {
    if !(SLOT_SIZE..=MAX_MAP_SIZE).contains(&capacity_bytes) {
        return Err(Error::InvalidMapSize {
            requested: capacity_bytes,
            min: SLOT_SIZE,
            max: MAX_MAP_SIZE,
        }
        .into());
    }
    Ok(capacity_bytes / SLOT_SIZE)
}

impl ChangeMap {
    /// Allocate a zeroed map of `capacity_bytes / SLOT_SIZE` slots whose
    /// tracking epoch starts at `init_lsn`.
    pub fn initialize(capacity_bytes: u64, init_lsn: Lsn) -> Result<Self> {
        let slot_count = validate_map_size(capacity_bytes)?;
        Ok(Self::with_slot_count(slot_count as usize, init_lsn))
    }

    pub(crate) fn with_slot_count(slot_count: usize, init_lsn: Lsn) -> Self {
        let slots = (0..slot_count).map(|_| AtomicU64::new(0)).collect();
        Self {
            init_lsn: AtomicU64::new(init_lsn.0),
            valid: AtomicBool::new(true),
            slots,
        }
    }

    pub(crate) fn from_parts(slots: Vec<u64>, init_lsn: Lsn) -> Self {
        Self {
            init_lsn: AtomicU64::new(init_lsn.0),
            valid: AtomicBool::new(true),
            slots: slots.into_iter().map(AtomicU64::new).collect(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.slots.len() as u64 * SLOT_SIZE
    }

    pub fn slot_index(&self, block: &BlockId) -> usize {
        (block.slot_hash() % self.slots.len() as u64) as usize
    }

    /// Raise the block's slot to `lsn` unless it already holds a newer value.
    /// Returns the slot value after the update.
    pub fn mark(&self, block: &BlockId, lsn: Lsn) -> Lsn {
        if !lsn.is_valid() {
            return self.read(block);
        }

        // A map created before the write position was known adopts the first
        // marked LSN as the start of its epoch.
        if self.init_lsn.load(Ordering::Acquire) == 0 {
            let _ = self.init_lsn.compare_exchange(0, lsn.0, Ordering::AcqRel, Ordering::Acquire);
        }

        let slot = &self.slots[self.slot_index(block)];
        match slot.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            (current < lsn.0).then_some(lsn.0)
        }) {
            Ok(_) => lsn,
            Err(newer) => Lsn(newer),
        }
    }

    /// Last-changed LSN recorded for the block's slot, `Lsn::INVALID` if the
    /// slot was never marked.
    pub fn read(&self, block: &BlockId) -> Lsn {
        Lsn(self.slots[self.slot_index(block)].load(Ordering::Acquire))
    }

    pub fn init_lsn(&self) -> Lsn {
        Lsn(self.init_lsn.load(Ordering::Acquire))
    }

    /// False once the map has been replaced by a reinitialization; holders of
    /// a stale handle must stop trusting it.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    /// Point-in-time copy of every slot. Slots are read one by one, so values
    /// may be newer than the moment the copy started but never older.
    pub fn slot_values(&self) -> Vec<u64> {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .collect()
    }

    /// Number of slots that were ever marked.
    pub fn used_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.load(Ordering::Relaxed) != 0)
            .count()
    }
}
