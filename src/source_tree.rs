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

//! Read-only disk trees with lazy per-directory scanning.
//!
//! A source tree scans one directory at a time, on demand, and caches the
//! result until the next `reread`. Scanning stats through symlinks, so a
//! symlink to a directory is a directory entry carrying an external link
//! descriptor; broken symlinks are discarded.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::diff::{default_equals, diff_entries};
use crate::entry::{Entry, Link};
use crate::errors::{Error, Result};
use crate::patch::Patch;
use crate::paths;
use crate::tree::Tree;

pub(crate) struct SourceState {
    root: PathBuf,
    entries: Vec<Entry>,
    /// Directories already scanned in this cycle, by relative path; the
    /// root is the empty string.
    scanned: HashSet<String>,
    /// Entries as they stood at the last reread barrier.
    previous: Vec<Entry>,
}

impl SourceState {
    pub(crate) fn open(root: &Path) -> Result<SourceState> {
        Ok(SourceState {
            root: paths::validate_root(root)?,
            entries: Vec::new(),
            scanned: HashSet::new(),
            previous: Vec::new(),
        })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }
}

/// List one directory level on disk.
///
/// Returns entries sorted by path, with stat metadata taken through
/// symlinks and a link descriptor recorded for symlinked children. Broken
/// symlinks and undecodable names are skipped; a missing directory scans
/// to an empty list.
pub(crate) fn scan_directory(disk_dir: &Path, rel_dir: &str) -> Result<Vec<Entry>> {
    let mut found = Vec::new();
    let dirents = match fs::read_dir(disk_dir) {
        Ok(dirents) => dirents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(Error::io(disk_dir, e)),
    };
    for dirent in dirents {
        let dirent = dirent.map_err(|e| Error::io(disk_dir, e))?;
        let name = match dirent.file_name().into_string() {
            Ok(name) => name,
            Err(name) => {
                debug!(?name, "skipping entry with undecodable name");
                continue;
            }
        };
        let child_disk = dirent.path();
        let metadata = match fs::metadata(&child_disk) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %child_disk.display(), "skipping broken symlink");
                continue;
            }
            Err(e) => return Err(Error::io(&child_disk, e)),
        };
        let link = read_link_descriptor(&child_disk, disk_dir);
        found.push(Entry::from_metadata(
            paths::join(rel_dir, &name),
            &metadata,
            link,
        ));
    }
    found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(found)
}

fn read_link_descriptor(path: &Path, parent_disk: &Path) -> Option<Link> {
    // Failure here means "not a symlink" (EINVAL) and is swallowed.
    match fs::read_link(path) {
        Ok(target) if target.is_absolute() => Some(Link::External(target)),
        Ok(target) => Some(Link::External(parent_disk.join(target))),
        Err(_) => None,
    }
}

/// Scan `dir` if it has not been scanned this cycle; idempotent.
fn ensure_dir(state: &mut SourceState, dir: &str) -> Result<()> {
    if state.scanned.contains(dir) {
        return Ok(());
    }
    let disk = if dir.is_empty() {
        state.root.clone()
    } else {
        state.root.join(dir)
    };
    let found = scan_directory(&disk, dir)?;
    debug!(dir, count = found.len(), "scanned source directory");
    for entry in found {
        paths::insert_entry(&mut state.entries, entry);
    }
    state.scanned.insert(dir.to_owned());
    Ok(())
}

/// Scan `dir` and every directory below it.
fn ensure_subtree(state: &mut SourceState, dir: &str) -> Result<()> {
    let mut queue = vec![dir.to_owned()];
    while let Some(d) = queue.pop() {
        ensure_dir(state, &d)?;
        let subdirs: Vec<String> = paths::immediate_children(&state.entries, &d)
            .iter()
            .filter(|e| e.is_dir())
            .map(|e| e.relative_path.clone())
            .collect();
        queue.extend(subdirs);
    }
    Ok(())
}

/// Scan every ancestor directory of `path`, outermost first, failing if an
/// ancestor is missing or not a directory.
fn ensure_ancestors(state: &mut SourceState, path: &str) -> Result<()> {
    ensure_dir(state, "")?;
    let mut ancestors: Vec<&str> = paths::ancestors(path).collect();
    ancestors.reverse();
    for ancestor in ancestors {
        match paths::lookup(&state.entries, ancestor) {
            None => return Err(Error::no_entry(path)),
            Some(e) if !e.is_dir() => {
                return Err(Error::NotDir {
                    path: ancestor.to_owned(),
                })
            }
            Some(_) => ensure_dir(state, ancestor)?,
        }
    }
    Ok(())
}

pub(crate) fn entries(tree: &Tree) -> Result<Vec<Entry>> {
    tree.with_source(|state| {
        ensure_subtree(state, "")?;
        Ok(state.entries.clone())
    })
}

/// `path` is normalized and non-empty.
pub(crate) fn stat(tree: &Tree, path: &str) -> Result<Entry> {
    tree.with_source(|state| {
        ensure_ancestors(state, path)?;
        paths::lookup(&state.entries, path)
            .cloned()
            .ok_or_else(|| Error::no_entry(path))
    })
}

pub(crate) fn exists(tree: &Tree, path: &str) -> Result<bool> {
    tree.with_source(|state| {
        let parent = paths::parent(path).unwrap_or("");
        if state.scanned.contains(parent) {
            return Ok(paths::lookup(&state.entries, path).is_some());
        }
        // The parent has not been scanned; answer from the filesystem
        // rather than forcing a scan.
        Ok(fs::metadata(state.root.join(path)).is_ok())
    })
}

pub(crate) fn readdir_entries(tree: &Tree, dir: &str) -> Result<Vec<Entry>> {
    tree.with_source(|state| {
        if !dir.is_empty() {
            ensure_ancestors(state, dir)?;
            match paths::lookup(&state.entries, dir) {
                None => return Err(Error::no_entry(dir)),
                Some(e) if !e.is_dir() => {
                    return Err(Error::NotDir {
                        path: dir.to_owned(),
                    })
                }
                Some(_) => {}
            }
        }
        ensure_dir(state, dir)?;
        Ok(paths::immediate_children(&state.entries, dir)
            .into_iter()
            .cloned()
            .collect())
    })
}

pub(crate) fn read_file(tree: &Tree, path: &str) -> Result<Vec<u8>> {
    let entry = stat(tree, path)?;
    if entry.is_dir() {
        return Err(Error::IsDir {
            path: path.to_owned(),
        });
    }
    let disk = tree.with_source(|state| state.root.join(path));
    fs::read(&disk).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::no_entry(path),
        _ => Error::io(&disk, e),
    })
}

pub(crate) fn changes(tree: &Tree) -> Result<Patch> {
    let current = entries(tree)?;
    let previous = tree.with_source(|state| state.previous.clone());
    Ok(diff_entries(&previous, &current, &default_equals))
}

/// The reread barrier: stash the exposed view, drop the scan cache, and
/// optionally move to a new root.
pub(crate) fn invalidate(tree: &Tree, new_root: Option<&Path>) -> Result<()> {
    tree.with_source(|state| {
        state.previous = mem::take(&mut state.entries);
        state.scanned.clear();
        if let Some(root) = new_root {
            state.root = paths::validate_root(root)?;
        }
        debug!(root = %state.root.display(), "source tree invalidated");
        Ok(())
    })
}
