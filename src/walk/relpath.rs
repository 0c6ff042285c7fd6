//! Naming rules for relation data files inside a data directory.
//!
//! Formats:
//! `<oid>`, `<oid>_<fork>`, `<oid>.<segno>`, `<oid>_<fork>.<segno>`;
//! temporary relations carry a `t<backend>_` prefix and are never tracked.

use std::path::{Component, Path};

use crate::map::{
    ForkNumber, Oid, RelFileLocator, DEFAULT_TABLESPACE_OID, GLOBAL_TABLESPACE_OID, INVALID_OID,
};

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a name made only of digits into an OID.
pub fn parse_oid(name: &str) -> Option<Oid> {
    if !is_digits(name) {
        return None;
    }
    name.parse().ok()
}

/// Split `<body>[_<fork>][.<segno>]` into its parts.
fn split_fork_and_segment(name: &str) -> Option<(&str, ForkNumber, u32)> {
    let (stem, segno) = match name.split_once('.') {
        Some((stem, seg)) => (stem, parse_oid(seg)?),
        None => (name, 0),
    };
    let (body, fork) = match stem.split_once('_') {
        Some((body, fork)) => (body, ForkNumber::from_suffix(Some(fork))?),
        None => (stem, ForkNumber::Main),
    };
    Some((body, fork, segno))
}

/// Parse a permanent relation file name. Returns (relfilenode, fork, segno).
pub fn parse_relation_file_name(name: &str) -> Option<(Oid, ForkNumber, u32)> {
    let (body, fork, segno) = split_fork_and_segment(name)?;
    Some((parse_oid(body)?, fork, segno))
}

/// True for `t<backend>_<relfilenode>[_fork][.segno]`.
pub fn looks_like_temp_rel_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix('t') else {
        return false;
    };
    let Some((backend, relation)) = rest.split_once('_') else {
        return false;
    };
    if !is_digits(backend) {
        return false;
    }
    match split_fork_and_segment(relation) {
        Some((body, _, _)) => is_digits(body),
        None => false,
    }
}

/// Path of a relation segment relative to the data directory.
pub fn relation_path(
    locator: &RelFileLocator,
    fork: ForkNumber,
    segno: u32,
    tablespace_version_dir: &str,
) -> String {
    let mut path = match locator.spc_oid {
        GLOBAL_TABLESPACE_OID => format!("global/{}", locator.rel_number),
        DEFAULT_TABLESPACE_OID => format!("base/{}/{}", locator.db_oid, locator.rel_number),
        spc => format!(
            "pg_tblspc/{spc}/{tablespace_version_dir}/{}/{}",
            locator.db_oid, locator.rel_number
        ),
    };
    if let Some(suffix) = fork.suffix() {
        path.push('_');
        path.push_str(suffix);
    }
    if segno > 0 {
        path.push_str(&format!(".{segno}"));
    }
    path
}

/// Work out (tablespace, database) for a directory that was copied into
/// place, given its path relative to the data directory:
///
/// * `global/...` → (global tablespace, no database)
/// * `base/<db>` → (default tablespace, db)
/// * `pg_tblspc/<spc>/<version dir>/<db>` → (spc, db)
pub fn classify_copy_target(rel: &Path, tablespace_version_dir: &str) -> Option<(Oid, Oid)> {
    let parts: Vec<&str> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();

    match parts.as_slice() {
        ["global", ..] => Some((GLOBAL_TABLESPACE_OID, INVALID_OID)),
        ["base", db, ..] => Some((DEFAULT_TABLESPACE_OID, parse_oid(db)?)),
        ["pg_tblspc", spc, version, db, ..] if *version == tablespace_version_dir => {
            Some((parse_oid(spc)?, parse_oid(db)?))
        }
        _ => None,
    }
}
