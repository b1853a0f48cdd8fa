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

//! Trees backed only by an in-memory entry array.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::Path;

use crate::apply::{self, ApplyDelegate};
use crate::diff::{default_equals, diff_entries, EqualsFn};
use crate::entry::Entry;
use crate::errors::{Error, Result};
use crate::patch::Patch;
use crate::paths;

/// A flat sorted entry array with no root and no disk binding; the
/// substrate of the diff engine.
#[derive(Debug, Default, Clone)]
pub struct ManualTree {
    entries: Vec<Entry>,
}

impl ManualTree {
    pub fn new() -> ManualTree {
        ManualTree::default()
    }

    /// Build from entries, which must be sorted ascending by path with
    /// unique, well-formed paths.
    pub fn from_entries(entries: Vec<Entry>) -> Result<ManualTree> {
        for entry in &entries {
            if !paths::is_valid(&entry.relative_path) {
                return Err(Error::invalid_path(
                    entry.relative_path.clone(),
                    "malformed entry path",
                ));
            }
        }
        for window in entries.windows(2) {
            match window[0].relative_path.cmp(&window[1].relative_path) {
                Ordering::Less => {}
                Ordering::Equal => {
                    return Err(Error::invalid_path(
                        window[1].relative_path.clone(),
                        "duplicate entry path",
                    ))
                }
                Ordering::Greater => {
                    return Err(Error::invalid_path(
                        window[1].relative_path.clone(),
                        "entries out of order",
                    ))
                }
            }
        }
        Ok(ManualTree { entries })
    }

    /// Build from bare path strings.
    ///
    /// A trailing separator marks a directory; missing parent directories
    /// are synthesized.
    pub fn from_paths(raw_paths: &[&str]) -> Result<ManualTree> {
        let mut dirs: BTreeSet<String> = BTreeSet::new();
        let mut files: BTreeSet<String> = BTreeSet::new();
        for raw in raw_paths {
            let is_dir = raw.ends_with(|c| std::path::is_separator(c));
            let normalized = paths::normalize(raw)?;
            if normalized.is_empty() {
                continue;
            }
            for ancestor in paths::ancestors(&normalized) {
                dirs.insert(ancestor.to_owned());
            }
            if is_dir {
                dirs.insert(normalized);
            } else {
                files.insert(normalized);
            }
        }
        if let Some(clash) = files.iter().find(|f| dirs.contains(*f)) {
            return Err(Error::invalid_path(
                clash.clone(),
                "path is both a file and a directory",
            ));
        }
        let mut entries: Vec<Entry> = dirs
            .into_iter()
            .map(Entry::dir)
            .chain(files.into_iter().map(Entry::file))
            .collect();
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        ManualTree::from_entries(entries)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ordered patch that turns `self` into `other`, using the default
    /// metadata equality.
    pub fn diff(&self, other: &ManualTree) -> Patch {
        diff_entries(&self.entries, &other.entries, &default_equals)
    }

    /// Like [ManualTree::diff] with a caller-supplied equality.
    pub fn diff_with(&self, other: &ManualTree, equals: &EqualsFn) -> Patch {
        diff_entries(&self.entries, &other.entries, equals)
    }

    /// Apply a patch by invoking the delegate's callbacks; see
    /// [crate::apply::apply].
    pub fn apply(
        patch: &Patch,
        input_dir: &Path,
        output_dir: &Path,
        delegate: &mut ApplyDelegate<'_>,
    ) -> Result<()> {
        apply::apply(patch, input_dir, output_dir, delegate)
    }
}
