//! The shared change map and the value types it is indexed by.

pub mod block;
pub mod change_map;
pub mod snapshot;

pub use block::{
    BlockId, ForkNumber, Lsn, Oid, RelFileLocator, BLCKSZ, DEFAULT_TABLESPACE_OID,
    GLOBAL_TABLESPACE_OID, INVALID_OID, RELSEG_SIZE,
};
pub use change_map::{validate_map_size, ChangeMap, MAX_MAP_SIZE, SLOT_SIZE};
pub use snapshot::MAP_HEADER_SIZE;
