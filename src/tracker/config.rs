use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::map::validate_map_size;
use crate::walk::DEFAULT_TABLESPACE_VERSION_DIR;
use crate::{Error, Result};

/// File name of the persisted map inside `<data_dir>/global`.
pub const DEFAULT_MAP_FILE: &str = "pbktrack.map";

fn default_version_dir() -> String {
    DEFAULT_TABLESPACE_VERSION_DIR.to_string()
}

/// Start-time settings of the tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Root of the storage layout (`global/`, `base/`, `pg_tblspc/`).
    pub data_dir: PathBuf,
    /// Change map size in bytes; 0 disables tracking.
    #[serde(default)]
    pub map_size: u64,
    #[serde(default = "default_version_dir")]
    pub tablespace_version_dir: String,
    /// Where the map is persisted; defaults to `<data_dir>/global/pbktrack.map`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_file: Option<PathBuf>,
}

impl TrackerConfig {
    pub fn new(data_dir: impl Into<PathBuf>, map_size: u64) -> Self {
        Self {
            data_dir: data_dir.into(),
            map_size,
            tablespace_version_dir: default_version_dir(),
            map_file: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.map_size > 0
    }

    pub fn map_path(&self) -> PathBuf {
        self.map_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("global").join(DEFAULT_MAP_FILE))
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("data_dir must not be empty".into()).into());
        }
        if self.tablespace_version_dir.is_empty() || self.tablespace_version_dir.contains('/') {
            return Err(Error::InvalidConfig(format!(
                "invalid tablespace_version_dir: {:?}",
                self.tablespace_version_dir
            ))
            .into());
        }
        if self.enabled() {
            validate_map_size(self.map_size)?;
        }
        Ok(())
    }

    /// Load settings from a JSON document such as
    /// `{"data_dir": "/var/lib/pgsql/data", "map_size": 67108864}`.
    pub fn load_from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(config = %path.display(), "loading tracker configuration");
        let contents = std::fs::read(path)?;
        let config: TrackerConfig = serde_json::from_slice(&contents).map_err(Error::Serde)?;
        config.validate()?;
        Ok(config)
    }
}
