//! Implementation of `pbktrack pagemap` subcommand.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use serde::Serialize;

use crate::map::Lsn;
use crate::scan::{ChangeBitmap, PagemapScan};
use crate::tracker::TrackerConfig;
use crate::walk::FileEnumerator;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum PagemapFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Args, Default)]
pub struct PagemapArgs {
    /// Data directory to scan
    #[arg(short = 'D', long = "pgdata")]
    pub pgdata: Option<PathBuf>,

    /// Baseline LSN (`X/X` or decimal); blocks changed at or after it are listed
    #[arg(long = "lsn")]
    pub lsn: Option<String>,

    /// Persisted map location when it is not `<pgdata>/global/pbktrack.map`
    #[arg(long = "map-file")]
    pub map_file: Option<PathBuf>,

    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: PagemapFormat,

    /// Name of the per-version directory inside tablespaces
    #[arg(long = "tablespace-version-dir")]
    pub tablespace_version_dir: Option<String>,
}

#[derive(Debug, Serialize)]
struct PagemapRecord<'a> {
    path: &'a str,
    pagemap: String,
    blocks: usize,
}

pub fn execute(args: PagemapArgs) -> Result<()> {
    let format = args.format;
    let bitmaps = collect(args)?;
    let out = render(&bitmaps, format)?;
    if !out.is_empty() {
        println!("{out}");
    }
    Ok(())
}

/// Format bitmaps for stdout: `path<TAB>hex` lines, or a JSON array.
pub fn render(bitmaps: &[ChangeBitmap], format: PagemapFormat) -> Result<String> {
    match format {
        PagemapFormat::Text => Ok(bitmaps
            .iter()
            .map(|bitmap| format!("{}\t{}", bitmap.path, hex::encode(bitmap.as_bytes())))
            .collect::<Vec<_>>()
            .join("\n")),
        PagemapFormat::Json => {
            let records: Vec<PagemapRecord<'_>> = bitmaps
                .iter()
                .map(|bitmap| PagemapRecord {
                    path: &bitmap.path,
                    pagemap: hex::encode(bitmap.as_bytes()),
                    blocks: bitmap.count(),
                })
                .collect();
            Ok(serde_json::to_string_pretty(&records)?)
        }
    }
}

/// Run the scan and gather every bitmap.
pub fn collect(args: PagemapArgs) -> Result<Vec<ChangeBitmap>> {
    let pgdata = args
        .pgdata
        .ok_or_else(|| Error::Cli("pgdata is required".into()))?;
    let baseline: Lsn = args
        .lsn
        .ok_or_else(|| Error::Cli("lsn is required".into()))?
        .parse()?;
    let mut config = TrackerConfig::new(pgdata, 0);
    config.map_file = args.map_file;
    if let Some(version_dir) = args.tablespace_version_dir {
        config.tablespace_version_dir = version_dir;
    }
    config.validate()?;
    let map = super::open_map(&config.map_path())?;

    if map.init_lsn() > baseline {
        tracing::warn!(
            init_lsn = %map.init_lsn(),
            %baseline,
            "change map started after the baseline, a full backup is required"
        );
    }

    let files = FileEnumerator::for_data_dir(&config.data_dir, &config.tablespace_version_dir);
    PagemapScan::new(Arc::new(map), baseline, files).collect()
}
