//! Block identity and the handful of storage-layout constants the tracker
//! depends on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// PostgreSQL page size (`BLCKSZ`, 8 KiB).
pub const BLCKSZ: u64 = 8192;
/// Blocks per segment file (`RELSEG_SIZE`, 1 GiB segments).
pub const RELSEG_SIZE: u32 = 131_072;

pub type Oid = u32;

pub const INVALID_OID: Oid = 0;
/// `pg_default`, relations under `base/<db>/`.
pub const DEFAULT_TABLESPACE_OID: Oid = 1663;
/// `pg_global`, shared relations under `global/`.
pub const GLOBAL_TABLESPACE_OID: Oid = 1664;

/// A write-ahead log position (`XLogRecPtr`).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const INVALID: Lsn = Lsn(0);

    pub fn is_valid(self) -> bool {
        self != Lsn::INVALID
    }
}

impl From<u64> for Lsn {
    fn from(n: u64) -> Self {
        Lsn(n)
    }
}

impl From<Lsn> for u64 {
    fn from(lsn: Lsn) -> u64 {
        lsn.0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xffff_ffff)
    }
}

impl fmt::Debug for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for Lsn {
    type Err = anyhow::Error;

    /// Parse `HI/LO` (hex halves, as printed by PostgreSQL) or a plain decimal.
    fn from_str(s: &str) -> crate::Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidLsn(s.to_string());
        match s.split_once('/') {
            Some((hi, lo)) => {
                let hi = u32::from_str_radix(hi, 16).map_err(|_| invalid())?;
                let lo = u32::from_str_radix(lo, 16).map_err(|_| invalid())?;
                Ok(Lsn((u64::from(hi) << 32) | u64::from(lo)))
            }
            None => Ok(Lsn(s.parse::<u64>().map_err(|_| invalid())?)),
        }
    }
}

impl Serialize for Lsn {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Lsn {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid LSN: {raw}")))
    }
}

/// Relation fork, from `relpath.h`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ForkNumber {
    Main = 0,
    Fsm = 1,
    #[serde(rename = "vm")]
    VisibilityMap = 2,
    Init = 3,
}

impl ForkNumber {
    /// Map a file name fork suffix to its fork. "main" is implicit (no suffix).
    pub fn from_suffix(suffix: Option<&str>) -> Option<Self> {
        match suffix {
            None => Some(Self::Main),
            Some("fsm") => Some(Self::Fsm),
            Some("vm") => Some(Self::VisibilityMap),
            Some("init") => Some(Self::Init),
            Some(_) => None,
        }
    }

    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Self::Main => None,
            Self::Fsm => Some("fsm"),
            Self::VisibilityMap => Some("vm"),
            Self::Init => Some("init"),
        }
    }
}

/// Physical identity of a relation: tablespace, database, relfilenode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelFileLocator {
    pub spc_oid: Oid,
    pub db_oid: Oid,
    pub rel_number: Oid,
}

impl RelFileLocator {
    pub fn new(spc_oid: Oid, db_oid: Oid, rel_number: Oid) -> Self {
        Self {
            spc_oid,
            db_oid,
            rel_number,
        }
    }
}

/// One block of one relation fork. `block` is absolute across segments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId {
    pub locator: RelFileLocator,
    pub fork: ForkNumber,
    pub block: u32,
}

impl BlockId {
    pub fn new(locator: RelFileLocator, fork: ForkNumber, block: u32) -> Self {
        Self {
            locator,
            fork,
            block,
        }
    }

    /// Stable 64-bit hash of the full block identity.
    ///
    /// Slot positions are persisted with the map, so this must not depend on
    /// process-local state (no `RandomState`, no `DefaultHasher`).
    pub fn slot_hash(&self) -> u64 {
        let l = &self.locator;
        let mut h = mix64(u64::from(l.spc_oid) | (u64::from(l.db_oid) << 32));
        h = mix64(h ^ (u64::from(l.rel_number) | ((self.fork as u64) << 32)));
        mix64(h ^ u64::from(self.block))
    }
}

// splitmix64 finalizer
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
