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

//! Filtered, non-owning views over a parent tree.
//!
//! A projection scopes a parent tree to a `cwd` and filters it with either
//! an explicit file list or include/exclude matchers (never both). Entries
//! are produced by a recursive descent that lists the parent one directory
//! at a time, keeps a stack of not-yet-emitted ancestor directories, and
//! surfaces an ancestor only once a matching descendant appears, so empty
//! directories are not reported.

use crate::diff::{default_equals, diff_entries};
use crate::entry::Entry;
use crate::errors::{Error, Result};
use crate::matcher::Matcher;
use crate::patch::Patch;
use crate::paths;
use crate::tree::Tree;

/// Filter configuration for [crate::Tree::filtered].
///
/// `files` is mutually exclusive with `include`/`exclude`; `cwd` composes
/// with either.
#[derive(Clone, Debug, Default)]
pub struct FilterOptions {
    pub cwd: Option<String>,
    pub files: Option<Vec<String>>,
    pub include: Vec<Matcher>,
    pub exclude: Vec<Matcher>,
}

pub(crate) struct ProjectionState {
    parent: Tree,
    cwd: String,
    /// Normalized and sorted when set.
    files: Option<Vec<String>>,
    include: Vec<Matcher>,
    exclude: Vec<Matcher>,
    /// View as of the last reread barrier.
    previous: Vec<Entry>,
}

impl ProjectionState {
    pub(crate) fn parent(&self) -> &Tree {
        &self.parent
    }

    pub(crate) fn cwd(&self) -> &str {
        &self.cwd
    }
}

/// Build and validate projection state; the cwd must name an existing
/// directory of the parent.
pub(crate) fn new_state(parent: Tree, options: FilterOptions) -> Result<ProjectionState> {
    if options.files.is_some() && (!options.include.is_empty() || !options.exclude.is_empty()) {
        return Err(Error::IncompatibleFilters);
    }
    let cwd = paths::normalize(options.cwd.as_deref().unwrap_or(""))?;
    if !cwd.is_empty() {
        let entry = parent.stat(&cwd)?;
        if !entry.is_dir() {
            return Err(Error::NotDir { path: cwd });
        }
    }
    Ok(ProjectionState {
        parent,
        cwd,
        files: normalize_files(options.files)?,
        include: options.include,
        exclude: options.exclude,
        previous: Vec::new(),
    })
}

fn normalize_files(files: Option<Vec<String>>) -> Result<Option<Vec<String>>> {
    match files {
        None => Ok(None),
        Some(files) => {
            let mut normalized = files
                .iter()
                .map(|f| paths::normalize(f))
                .collect::<Result<Vec<String>>>()?;
            normalized.sort();
            normalized.dedup();
            Ok(Some(normalized))
        }
    }
}

// ----------------------------------------------------------------------
// Filter setters; each re-validates the mutual exclusion so later
// `changes` calls re-emit against the new view.

pub(crate) fn set_files(tree: &Tree, files: Option<Vec<String>>) -> Result<()> {
    let files = normalize_files(files)?;
    tree.try_projection("set_files", |state| {
        if files.is_some() && (!state.include.is_empty() || !state.exclude.is_empty()) {
            return Err(Error::IncompatibleFilters);
        }
        state.files = files;
        Ok(())
    })
}

pub(crate) fn set_include(tree: &Tree, include: Vec<Matcher>) -> Result<()> {
    tree.try_projection("set_include", |state| {
        if state.files.is_some() && !include.is_empty() {
            return Err(Error::IncompatibleFilters);
        }
        state.include = include;
        Ok(())
    })
}

pub(crate) fn set_exclude(tree: &Tree, exclude: Vec<Matcher>) -> Result<()> {
    tree.try_projection("set_exclude", |state| {
        if state.files.is_some() && !exclude.is_empty() {
            return Err(Error::IncompatibleFilters);
        }
        state.exclude = exclude;
        Ok(())
    })
}

// ----------------------------------------------------------------------
// Filter evaluation.

#[derive(Clone)]
struct Filters {
    files: Option<Vec<String>>,
    include: Vec<Matcher>,
    exclude: Vec<Matcher>,
}

impl Filters {
    /// Matching rules for a path already scoped under the cwd.
    fn matches(&self, path: &str) -> bool {
        if let Some(files) = &self.files {
            return files.binary_search_by(|f| f.as_str().cmp(path)).is_ok();
        }
        for ancestor in paths::ancestors(path) {
            if self.exclude.iter().any(|m| m.is_match(ancestor)) {
                return false;
            }
        }
        if self.exclude.iter().any(|m| m.is_match(path)) {
            return false;
        }
        if !self.include.is_empty() && !self.include.iter().any(|m| m.is_match(path)) {
            return false;
        }
        true
    }

    fn excluded(&self, path: &str) -> bool {
        self.files.is_none() && self.exclude.iter().any(|m| m.is_match(path))
    }

    /// Whether descent into a non-matching directory could still surface
    /// matches.
    fn could_descend(&self, dir: &str) -> bool {
        if let Some(files) = &self.files {
            let prefix = format!("{dir}/");
            return match files.binary_search_by(|f| f.as_str().cmp(&prefix)) {
                Ok(_) => true,
                Err(i) => files.get(i).is_some_and(|f| f.starts_with(&prefix)),
            };
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|m| m.could_match_under(dir))
    }
}

fn snapshot_filters(tree: &Tree) -> (Tree, String, Filters) {
    tree.with_projection(|state| {
        (
            state.parent.clone(),
            state.cwd.clone(),
            Filters {
                files: state.files.clone(),
                include: state.include.clone(),
                exclude: state.exclude.clone(),
            },
        )
    })
}

/// The projection's entries: a pruned recursive descent over the parent,
/// rewritten relative to the cwd and sorted.
pub(crate) fn entries(tree: &Tree) -> Result<Vec<Entry>> {
    let (parent, cwd, filters) = snapshot_filters(tree);
    let mut out = Vec::new();
    let mut pending: Vec<Entry> = Vec::new();
    descend(&parent, &cwd, "", &filters, &mut pending, &mut out)?;
    out.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(out)
}

fn descend(
    parent: &Tree,
    cwd: &str,
    dir: &str,
    filters: &Filters,
    pending: &mut Vec<Entry>,
    out: &mut Vec<Entry>,
) -> Result<()> {
    let listing = parent.readdir_entries(&paths::join(cwd, dir))?;
    for entry in listing {
        let name = paths::basename(&entry.relative_path).to_owned();
        let scoped_path = paths::join(dir, &name);
        let scoped = entry.with_path(scoped_path.clone());
        if scoped.is_dir() {
            if filters.excluded(&scoped_path) {
                continue;
            }
            if filters.matches(&scoped_path) {
                flush(pending, out);
                out.push(scoped);
                descend(parent, cwd, &scoped_path, filters, pending, out)?;
            } else if filters.could_descend(&scoped_path) {
                pending.push(scoped);
                let depth = pending.len();
                descend(parent, cwd, &scoped_path, filters, pending, out)?;
                // Still unflushed: nothing below matched, drop it again.
                if pending.len() >= depth {
                    pending.truncate(depth - 1);
                }
            }
        } else if filters.matches(&scoped_path) {
            flush(pending, out);
            out.push(scoped);
        }
    }
    Ok(())
}

fn flush(pending: &mut Vec<Entry>, out: &mut Vec<Entry>) {
    out.append(pending);
}

/// `path` is normalized and non-empty, relative to the cwd.
pub(crate) fn stat(tree: &Tree, path: &str) -> Result<Entry> {
    let (parent, cwd, filters) = snapshot_filters(tree);
    let entry = parent.stat(&paths::join(&cwd, path))?;
    let visible = if entry.is_dir() {
        !filters.excluded(path)
            && !paths::ancestors(path).any(|a| filters.excluded(a))
            && (filters.files.is_none() || filters.could_descend(path) || filters.matches(path))
    } else {
        filters.matches(path)
    };
    if !visible {
        return Err(Error::no_entry(path));
    }
    Ok(entry.with_path(path))
}

pub(crate) fn read_file(tree: &Tree, path: &str) -> Result<Vec<u8>> {
    let entry = stat(tree, path)?;
    if entry.is_dir() {
        return Err(Error::IsDir {
            path: path.to_owned(),
        });
    }
    let (parent, cwd, _) = snapshot_filters(tree);
    parent.read_file(&paths::join(&cwd, path))
}

/// Immediate children visible at `dir`: directories that are not excluded
/// and could contain matches, and files that match.
pub(crate) fn readdir_entries(tree: &Tree, dir: &str) -> Result<Vec<Entry>> {
    let (parent, cwd, filters) = snapshot_filters(tree);
    let listing = parent.readdir_entries(&paths::join(&cwd, dir))?;
    let mut out = Vec::new();
    for entry in listing {
        let name = paths::basename(&entry.relative_path).to_owned();
        let scoped_path = paths::join(dir, &name);
        let scoped = entry.with_path(scoped_path.clone());
        if scoped.is_dir() {
            if !filters.excluded(&scoped_path)
                && (filters.matches(&scoped_path) || filters.could_descend(&scoped_path))
            {
                out.push(scoped);
            }
        } else if filters.matches(&scoped_path) {
            out.push(scoped);
        }
    }
    Ok(out)
}

pub(crate) fn changes(tree: &Tree) -> Result<Patch> {
    let current = entries(tree)?;
    let previous = tree.with_projection(|state| state.previous.clone());
    Ok(diff_entries(&previous, &current, &default_equals))
}

/// The reread barrier: materialize the current view as the snapshot that
/// later `changes` calls diff against.
pub(crate) fn take_snapshot(tree: &Tree) -> Result<()> {
    let current = entries(tree)?;
    tree.with_projection(|state| state.previous = current);
    Ok(())
}
