// Buildfs: virtual filesystem trees for incremental build pipelines.
// Copyright 2019-2026 the buildfs authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

//! Tree-relative paths and sorted-entry lookups.
//!
//! Paths inside a tree are:
//!
//!  * Case-sensitive UTF-8, components separated by `/`.
//!  * Free of `.`, `..`, and empty components.
//!  * Without leading or trailing separators; the empty string names the
//!    tree root itself.
//!
//! Entry arrays are sorted ascending by these paths with unique members, so
//! all lookups are binary searches.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lazy_static::lazy_static;

use crate::entry::Entry;
use crate::errors::{Error, Result};

lazy_static! {
    /// Process-wide, append-only memo of successful normalizations.
    static ref NORMALIZE_CACHE: Mutex<HashMap<String, String>> = Mutex::new(HashMap::new());
}

/// Normalize a tree-relative path.
///
/// Splits on the platform separators, folds away `.` and empty components,
/// and collapses `..` against the preceding component. A `..` that would
/// escape the tree root is an error.
pub fn normalize(path: &str) -> Result<String> {
    if path.is_empty() {
        return Ok(String::new());
    }
    if let Some(hit) = NORMALIZE_CACHE.lock().unwrap().get(path) {
        return Ok(hit.clone());
    }
    let mut components: Vec<&str> = Vec::new();
    for component in path.split(std::path::is_separator) {
        match component {
            "" | "." => continue,
            ".." => {
                if components.pop().is_none() {
                    return Err(Error::invalid_path(path, "path escapes the tree root"));
                }
            }
            c if c.contains('\0') => {
                return Err(Error::invalid_path(path, "path contains a NUL byte"));
            }
            c => components.push(c),
        }
    }
    let normalized = components.join("/");
    NORMALIZE_CACHE
        .lock()
        .unwrap()
        .insert(path.to_owned(), normalized.clone());
    Ok(normalized)
}

/// True if this is a well-formed, already-normalized entry path.
pub fn is_valid(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    path.split('/')
        .all(|c| !c.is_empty() && c != "." && c != ".." && !c.contains('\0'))
}

/// The directory containing `path`: `""` for top-level names, None for the
/// root itself.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rfind('/').map(|i| &path[..i]).unwrap_or(""))
}

/// The final component of `path`.
pub fn basename(path: &str) -> &str {
    path.rfind('/').map(|i| &path[i + 1..]).unwrap_or(path)
}

/// Join two tree-relative paths; either side may be the root.
pub fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_owned()
    } else if name.is_empty() {
        base.to_owned()
    } else {
        format!("{base}/{name}")
    }
}

/// Proper ancestors of `path`, nearest first: `a/b/c` yields `a/b`, `a`.
///
/// The root is not yielded.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.char_indices()
        .rev()
        .filter(|(_, c)| *c == '/')
        .map(move |(i, _)| &path[..i])
}

/// True if `ancestor` strictly contains `path`. The root contains everything
/// but itself.
pub fn is_ancestor_of(ancestor: &str, path: &str) -> bool {
    if ancestor.is_empty() {
        return !path.is_empty();
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// Longest common directory prefix of two paths, possibly the root.
pub fn common_prefix(a: &str, b: &str) -> String {
    let mut shared: Vec<&str> = Vec::new();
    for (ca, cb) in a.split('/').zip(b.split('/')) {
        if ca != cb {
            break;
        }
        shared.push(ca);
    }
    shared.join("/")
}

/// Validate a tree root: absolute, existing directory, trailing separator
/// stripped.
pub(crate) fn validate_root(root: &Path) -> Result<PathBuf> {
    if root.as_os_str().is_empty() {
        return Err(Error::invalid_path("", "tree root must not be empty"));
    }
    if !root.is_absolute() {
        return Err(Error::invalid_path(
            root.display().to_string(),
            "tree root must be absolute",
        ));
    }
    let metadata = fs::metadata(root).map_err(|e| Error::io(root, e))?;
    if !metadata.is_dir() {
        return Err(Error::NotDir {
            path: root.display().to_string(),
        });
    }
    Ok(root.components().collect())
}

/// Binary search for `path` in a sorted entry array.
pub(crate) fn find_entry(entries: &[Entry], path: &str) -> std::result::Result<usize, usize> {
    entries.binary_search_by(|e| e.relative_path.as_str().cmp(path))
}

pub(crate) fn lookup<'a>(entries: &'a [Entry], path: &str) -> Option<&'a Entry> {
    find_entry(entries, path).ok().map(|i| &entries[i])
}

/// Insert an entry preserving sort order, replacing any entry at the same
/// path.
pub(crate) fn insert_entry(entries: &mut Vec<Entry>, entry: Entry) {
    match find_entry(entries, &entry.relative_path) {
        Ok(i) => entries[i] = entry,
        Err(i) => entries.insert(i, entry),
    }
}

pub(crate) fn remove_entry(entries: &mut Vec<Entry>, path: &str) -> Option<Entry> {
    find_entry(entries, path).ok().map(|i| entries.remove(i))
}

/// The contiguous index range of entries strictly under directory `dir`.
pub(crate) fn range_under(entries: &[Entry], dir: &str) -> std::ops::Range<usize> {
    let prefix = if dir.is_empty() {
        return 0..entries.len();
    } else {
        format!("{dir}/")
    };
    let start = match entries.binary_search_by(|e| e.relative_path.as_str().cmp(&prefix)) {
        Ok(i) | Err(i) => i,
    };
    let mut end = start;
    while end < entries.len() && entries[end].relative_path.starts_with(&prefix) {
        end += 1;
    }
    start..end
}

/// Immediate children of directory `dir`, in path order.
pub(crate) fn immediate_children<'a>(entries: &'a [Entry], dir: &str) -> Vec<&'a Entry> {
    let skip = if dir.is_empty() { 0 } else { dir.len() + 1 };
    entries[range_under(entries, dir)]
        .iter()
        .filter(|e| !e.relative_path[skip..].contains('/'))
        .collect()
}
