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

//! N-way tree overlays with deterministic precedence.
//!
//! The merge walks its inputs one directory level at a time, so lazily
//! scanned sources are only listed where the merge actually descends. Files
//! take the entry from the last input containing them (later inputs win
//! when overwriting is allowed); a directory present in exactly one input
//! is marked `link_dir` and grafted as a symlink instead of recursed into;
//! directories present in several inputs recurse with only those inputs.

use std::collections::HashMap;
use std::mem;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use tracing::{debug, trace};

use crate::diff::{default_equals, diff_entries};
use crate::entry::{Entry, Kind};
use crate::errors::{Error, Result};
use crate::flags::can_symlink;
use crate::patch::Patch;
use crate::paths;
use crate::tree::Tree;

/// Options for [crate::Tree::merge].
#[derive(Clone, Copy, Debug, Default)]
pub struct MergeOptions {
    /// Allow later inputs to overwrite files present in earlier ones.
    pub overwrite: bool,
}

/// One input of a merge: a directory path (scanned as an owned source
/// tree) or an existing tree (referenced, not owned).
pub enum MergeInput {
    Path(PathBuf),
    Tree(Tree),
}

impl From<&str> for MergeInput {
    fn from(path: &str) -> MergeInput {
        MergeInput::Path(PathBuf::from(path))
    }
}

impl From<String> for MergeInput {
    fn from(path: String) -> MergeInput {
        MergeInput::Path(PathBuf::from(path))
    }
}

impl From<&Path> for MergeInput {
    fn from(path: &Path) -> MergeInput {
        MergeInput::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for MergeInput {
    fn from(path: PathBuf) -> MergeInput {
        MergeInput::Path(path)
    }
}

impl From<Tree> for MergeInput {
    fn from(tree: Tree) -> MergeInput {
        MergeInput::Tree(tree)
    }
}

pub(crate) struct MergeState {
    inputs: Vec<Tree>,
    owned: Vec<bool>,
    overwrite: bool,
    /// Merged entries produced by the previous `changes` call.
    previous: Vec<Entry>,
}

impl MergeState {
    pub(crate) fn new(inputs: Vec<Tree>, owned: Vec<bool>, options: MergeOptions) -> MergeState {
        MergeState {
            inputs,
            owned,
            overwrite: options.overwrite,
            previous: Vec::new(),
        }
    }
}

fn snapshot(tree: &Tree) -> (Vec<Tree>, bool) {
    tree.with_merge(|state| (state.inputs.clone(), state.overwrite))
}

/// One name at one directory level, with the inputs that contain it.
struct LevelItem {
    name: String,
    occurrences: Vec<(usize, Entry)>,
}

/// Collect and conflict-check one directory level across `indices`.
///
/// Names are returned sorted. Two distinct names from different inputs
/// folding to the same lower-case form fail regardless of the overwrite
/// option; so does a kind disagreement between inputs.
fn level_items(inputs: &[Tree], base_dir: &str, indices: &[usize]) -> Result<Vec<LevelItem>> {
    let mut by_name: HashMap<String, Vec<(usize, Entry)>> = HashMap::new();
    let mut folded: HashMap<String, (String, usize)> = HashMap::new();
    for &index in indices {
        for entry in inputs[index].readdir_entries(base_dir)? {
            let name = paths::basename(&entry.relative_path).to_owned();
            let lower = name.to_lowercase();
            match folded.get(&lower) {
                None => {
                    folded.insert(lower, (name.clone(), index));
                }
                Some((prior_name, prior_index)) => {
                    if *prior_name != name && *prior_index != index {
                        return Err(Error::ConflictingCapitalization {
                            a: paths::join(base_dir, prior_name),
                            b: paths::join(base_dir, &name),
                        });
                    }
                }
            }
            by_name.entry(name).or_default().push((index, entry));
        }
    }
    let mut items: Vec<LevelItem> = by_name
        .into_iter()
        .map(|(name, occurrences)| LevelItem { name, occurrences })
        .sorted_by(|a, b| a.name.cmp(&b.name))
        .collect();
    for item in &items {
        let kind = item.occurrences[0].1.kind();
        if item.occurrences.iter().any(|(_, e)| e.kind() != kind) {
            return Err(Error::ConflictingFileType {
                path: paths::join(base_dir, &item.name),
            });
        }
    }
    Ok(items)
}

/// Merge the level at `base_dir` and every level below it.
fn merge_level(
    inputs: &[Tree],
    overwrite: bool,
    base_dir: &str,
    indices: &[usize],
    out: &mut Vec<Entry>,
) -> Result<()> {
    for item in level_items(inputs, base_dir, indices)? {
        let rel = paths::join(base_dir, &item.name);
        let kind = item.occurrences[0].1.kind();
        if kind == Kind::File {
            if item.occurrences.len() > 1 && !overwrite {
                return Err(Error::OverwriteRefused { path: rel });
            }
            if item.occurrences.len() > 1 {
                trace!(path = %rel, "later input overwrites file");
            }
            let (_, entry) = item.occurrences.last().expect("file occurs somewhere");
            out.push(entry.clone().with_path(rel));
        } else if item.occurrences.len() == 1 && can_symlink() {
            // Sole owner of this directory: graft it instead of recursing.
            let (_, entry) = &item.occurrences[0];
            let mut linked = entry.clone().with_path(rel);
            linked.link_dir = true;
            out.push(linked);
        } else {
            let (_, entry) = &item.occurrences[0];
            out.push(entry.clone().with_path(rel.clone()));
            let sub_indices: Vec<usize> = item.occurrences.iter().map(|(i, _)| *i).collect();
            merge_level(inputs, overwrite, &rel, &sub_indices, out)?;
        }
    }
    Ok(())
}

pub(crate) fn entries(tree: &Tree) -> Result<Vec<Entry>> {
    let (inputs, overwrite) = snapshot(tree);
    let indices: Vec<usize> = (0..inputs.len()).collect();
    let mut merged = Vec::new();
    merge_level(&inputs, overwrite, "", &indices, &mut merged)?;
    merged.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(merged)
}

/// `path` is normalized and non-empty.
pub(crate) fn stat(tree: &Tree, path: &str) -> Result<Entry> {
    let merged = entries(tree)?;
    paths::lookup(&merged, path)
        .cloned()
        .ok_or_else(|| Error::no_entry(path))
}

pub(crate) fn readdir_entries(tree: &Tree, dir: &str) -> Result<Vec<Entry>> {
    let (inputs, _) = snapshot(tree);
    let indices: Vec<usize> = if dir.is_empty() {
        (0..inputs.len()).collect()
    } else {
        let mut containing = Vec::new();
        for (index, input) in inputs.iter().enumerate() {
            if input.exists(dir)? {
                if !input.stat(dir)?.is_dir() {
                    return Err(Error::NotDir {
                        path: dir.to_owned(),
                    });
                }
                containing.push(index);
            }
        }
        if containing.is_empty() {
            return Err(Error::no_entry(dir));
        }
        containing
    };
    let mut out = Vec::new();
    for item in level_items(&inputs, dir, &indices)? {
        let rel = paths::join(dir, &item.name);
        let last = item.occurrences.last().expect("name occurs somewhere");
        let first = &item.occurrences[0];
        let source = if first.1.is_dir() { first } else { last };
        out.push(source.1.clone().with_path(rel));
    }
    Ok(out)
}

pub(crate) fn read_file(tree: &Tree, path: &str) -> Result<Vec<u8>> {
    let (inputs, _) = snapshot(tree);
    // Later inputs win, so search back to front.
    for input in inputs.iter().rev() {
        if input.exists(path)? {
            return input.read_file(path);
        }
    }
    Err(Error::no_entry(path))
}

/// Diff the merged entries against the previous call's result.
///
/// The equality also compares `link_dir`, so a directory transitioning
/// between symlink-through and recursive modes is surfaced as a change.
pub(crate) fn changes(tree: &Tree) -> Result<Patch> {
    let current = entries(tree)?;
    let previous = tree.with_merge(|state| mem::replace(&mut state.previous, current.clone()));
    let equals =
        |a: &Entry, b: &Entry| -> bool { a.link_dir == b.link_dir && default_equals(a, b) };
    Ok(diff_entries(&previous, &current, &equals))
}

/// Reread the inputs this merge owns (those built from path strings); the
/// cascade skips this merge itself, whose children were already notified.
pub(crate) fn reread_owned_inputs(tree: &Tree) -> Result<()> {
    let owned: Vec<Tree> = tree.with_merge(|state| {
        state
            .inputs
            .iter()
            .zip(&state.owned)
            .filter(|(_, owned)| **owned)
            .map(|(input, _)| input.clone())
            .collect()
    });
    for input in owned {
        debug!("rereading merge-owned input");
        input.reread_skipping(tree)?;
    }
    Ok(())
}
