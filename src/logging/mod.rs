//! Logging initialization using `tracing` and `tracing-subscriber`.

use tracing::{info, warn};
use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Counters collected over one pagemap scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanSnapshot {
    pub files_scanned: u64,
    pub blocks_checked: u64,
    pub blocks_changed: u64,
    pub pagemaps_emitted: u64,
    pub bitmap_bytes: u64,
}

/// Counters collected over one bulk mark of a copied directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkMarkSnapshot {
    pub files_marked: u64,
    pub blocks_marked: u64,
}

/// Outcome of one checkpoint of the change map.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointSnapshot {
    pub slots: u64,
    pub used_slots: u64,
    pub bytes_written: u64,
    pub elapsed_us: u64,
}

/// Initialize global tracing subscriber. Safe to call multiple times; subsequent
/// calls will no-op. Output goes to stderr so query results on stdout stay clean.
pub fn init_logging(format: LogFormat) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Human => {
            let _ = builder.finish().try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().finish().try_init();
        }
    };

    Ok(())
}

pub fn log_scan_metrics(snapshot: ScanSnapshot) {
    info!(
        target = "pbktrack::scan",
        files_scanned = snapshot.files_scanned,
        blocks_checked = snapshot.blocks_checked,
        blocks_changed = snapshot.blocks_changed,
        pagemaps_emitted = snapshot.pagemaps_emitted,
        bitmap_bytes = snapshot.bitmap_bytes,
        "pagemap_scan_finished"
    );
}

pub fn log_bulk_mark_metrics(snapshot: BulkMarkSnapshot) {
    info!(
        target = "pbktrack::bulk",
        files_marked = snapshot.files_marked,
        blocks_marked = snapshot.blocks_marked,
        "bulk_mark_finished"
    );
}

/// A failed checkpoint leaves the in-memory map serving, so it is reported as
/// a durability warning rather than an error.
pub fn log_checkpoint_metrics(snapshot: CheckpointSnapshot, failed: bool) {
    if failed {
        warn!(
            target = "pbktrack::checkpoint",
            slots = snapshot.slots,
            used_slots = snapshot.used_slots,
            elapsed_us = snapshot.elapsed_us,
            "change_map_checkpoint_failed"
        );
    } else {
        info!(
            target = "pbktrack::checkpoint",
            slots = snapshot.slots,
            used_slots = snapshot.used_slots,
            bytes_written = snapshot.bytes_written,
            elapsed_us = snapshot.elapsed_us,
            "change_map_checkpoint"
        );
    }
}
