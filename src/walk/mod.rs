//! Lazy enumeration of relation data files under a data directory.
//!
//! The walk is depth-first and one directory level at a time, so only the
//! directories on the current path are held open. Entries inside a directory
//! are visited in file name order, which makes repeated walks over an
//! unchanged tree produce the same sequence.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::map::{
    BlockId, ForkNumber, Oid, RelFileLocator, BLCKSZ, DEFAULT_TABLESPACE_OID,
    GLOBAL_TABLESPACE_OID, INVALID_OID, RELSEG_SIZE,
};

pub mod relpath;

pub use relpath::{
    classify_copy_target, looks_like_temp_rel_name, parse_relation_file_name, relation_path,
};

/// Default name of the per-version directory inside a tablespace.
pub const DEFAULT_TABLESPACE_VERSION_DIR: &str = "PG_16_202307071";

/// Tablespace/database context a directory is being walked in.
/// `INVALID_OID` means "not yet known".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub spc_oid: Oid,
    pub db_oid: Oid,
}

impl Scope {
    pub const UNSCOPED: Scope = Scope {
        spc_oid: INVALID_OID,
        db_oid: INVALID_OID,
    };

    pub fn new(spc_oid: Oid, db_oid: Oid) -> Self {
        Self { spc_oid, db_oid }
    }

    fn holds_relations(&self) -> bool {
        self.db_oid != INVALID_OID || self.spc_oid == GLOBAL_TABLESPACE_OID
    }
}

/// One segment file of one relation fork, as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationFile {
    pub locator: RelFileLocator,
    pub fork: ForkNumber,
    pub segno: u32,
    /// Location on disk.
    pub path: PathBuf,
    /// Path relative to the data directory, e.g. `base/5/16384.1`.
    pub rel_path: String,
    /// Size in bytes when the file was visited.
    pub size: u64,
}

impl RelationFile {
    /// Complete blocks in this segment; a partial trailing block is dropped.
    pub fn nblocks(&self) -> u32 {
        (self.size / BLCKSZ).min(u64::from(RELSEG_SIZE)) as u32
    }

    /// Absolute block number of the first block in this segment.
    pub fn first_block(&self) -> u32 {
        self.segno.saturating_mul(RELSEG_SIZE)
    }

    /// Identity of the block at a segment-relative offset.
    pub fn block_id(&self, offset: u32) -> BlockId {
        BlockId::new(self.locator, self.fork, self.first_block().saturating_add(offset))
    }
}

struct DirFrame {
    entries: walkdir::IntoIter,
    scope: Scope,
}

/// One-shot iterator over the relation files below a set of roots.
pub struct FileEnumerator {
    version_dir: String,
    roots: VecDeque<(PathBuf, Scope)>,
    stack: Vec<DirFrame>,
}

impl FileEnumerator {
    pub fn new(tablespace_version_dir: impl Into<String>) -> Self {
        Self {
            version_dir: tablespace_version_dir.into(),
            roots: VecDeque::new(),
            stack: Vec::new(),
        }
    }

    /// Queue another directory to walk after the ones already queued.
    pub fn with_root(mut self, root: impl Into<PathBuf>, scope: Scope) -> Self {
        self.roots.push_back((root.into(), scope));
        self
    }

    /// Every relation file of a data directory: shared relations first, then
    /// `base/`, then each tablespace.
    pub fn for_data_dir(data_dir: &Path, tablespace_version_dir: impl Into<String>) -> Self {
        Self::new(tablespace_version_dir)
            .with_root(
                data_dir.join("global"),
                Scope::new(GLOBAL_TABLESPACE_OID, INVALID_OID),
            )
            .with_root(data_dir.join("base"), Scope::UNSCOPED)
            .with_root(data_dir.join("pg_tblspc"), Scope::UNSCOPED)
    }

    fn push_dir(&mut self, dir: &Path, scope: Scope) {
        trace!(dir = %dir.display(), spc = scope.spc_oid, db = scope.db_oid, "descending");
        let entries = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        self.stack.push(DirFrame { entries, scope });
    }

    /// Decide what a directory entry is: a relation file to emit, a
    /// directory to descend into, or something to skip.
    fn visit(&mut self, entry: walkdir::DirEntry, scope: Scope) -> Option<RelationFile> {
        let name = entry.file_name().to_str()?.to_string();
        if looks_like_temp_rel_name(&name) {
            return None;
        }

        let file_type = entry.file_type();
        if file_type.is_file() {
            if !scope.holds_relations() {
                return None;
            }
            let (rel_number, fork, segno) = parse_relation_file_name(&name)?;
            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "could not stat file, skipping");
                    return None;
                }
            };
            let spc_oid = if scope.spc_oid == INVALID_OID {
                DEFAULT_TABLESPACE_OID
            } else {
                scope.spc_oid
            };
            let locator = RelFileLocator::new(spc_oid, scope.db_oid, rel_number);
            let file = RelationFile {
                rel_path: relation_path(&locator, fork, segno, &self.version_dir),
                locator,
                fork,
                segno,
                path: entry.into_path(),
                size,
            };
            trace!(path = %file.rel_path, size = file.size, "found relation file");
            return Some(file);
        }

        if file_type.is_dir() {
            if scope.db_oid == INVALID_OID {
                if let Some(db_oid) = relpath::parse_oid(&name) {
                    self.push_dir(entry.path(), Scope::new(scope.spc_oid, db_oid));
                    return None;
                }
            }
            if scope.spc_oid != INVALID_OID && name == self.version_dir {
                self.push_dir(entry.path(), Scope::new(scope.spc_oid, INVALID_OID));
            }
            return None;
        }

        // Tablespaces are symlinks named after their OID.
        if file_type.is_symlink() && scope == Scope::UNSCOPED {
            if let Some(spc_oid) = relpath::parse_oid(&name) {
                self.push_dir(entry.path(), Scope::new(spc_oid, INVALID_OID));
            }
        }
        None
    }
}

impl Iterator for FileEnumerator {
    type Item = RelationFile;

    fn next(&mut self) -> Option<RelationFile> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                let (root, scope) = self.roots.pop_front()?;
                if root.exists() {
                    self.push_dir(&root, scope);
                } else {
                    debug!(root = %root.display(), "walk root does not exist, skipping");
                }
                continue;
            };

            let scope = frame.scope;
            match frame.entries.next() {
                None => {
                    self.stack.pop();
                }
                Some(Ok(entry)) => {
                    if let Some(file) = self.visit(entry, scope) {
                        return Some(file);
                    }
                }
                Some(Err(err)) => {
                    // An unreadable directory ends its own frame only.
                    warn!(
                        path = %err.path().map(|p| p.display().to_string()).unwrap_or_default(),
                        error = %err,
                        "could not read directory entry, skipping"
                    );
                }
            }
        }
    }
}
