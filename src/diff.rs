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

//! Ordered diffs between two sorted entry sequences.

use std::cmp::Ordering;

use crate::entry::{Entry, Kind};
use crate::patch::{Change, Op, Patch};

/// Equality predicate over two entries at the same path.
pub type EqualsFn<'a> = dyn Fn(&Entry, &Entry) -> bool + 'a;

/// The default metadata equality: directories always compare equal; files
/// must agree on size, integer mtime, and mode.
pub fn default_equals(a: &Entry, b: &Entry) -> bool {
    if a.kind() == Kind::Dir && b.kind() == Kind::Dir {
        return true;
    }
    a.size == b.size && a.mtime == b.mtime && a.mode == b.mode
}

/// Compute an ordered patch turning `ours` into `theirs`.
///
/// Both inputs must be sorted ascending by `relative_path` with unique
/// paths. The result lists all removals first, in reverse encounter order,
/// then additions and updates in encounter order, which makes it directly
/// applicable: a directory is never removed before its contents nor created
/// after its children, and a kind switch at one path becomes a valid
/// remove-then-add pair.
pub fn diff_entries(ours: &[Entry], theirs: &[Entry], equals: &EqualsFn) -> Patch {
    let mut removes: Patch = Vec::new();
    let mut additions: Patch = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < ours.len() && j < theirs.len() {
        let a = &ours[i];
        let b = &theirs[j];
        match a.relative_path.cmp(&b.relative_path) {
            Ordering::Less => {
                removes.push(remove_change(a));
                i += 1;
            }
            Ordering::Greater => {
                additions.push(add_change(b));
                j += 1;
            }
            Ordering::Equal => {
                if equals(a, b) {
                    // no change
                } else if a.kind() == b.kind() {
                    additions.push(Change::new(Op::Change, b.clone()));
                } else {
                    removes.push(remove_change(a));
                    additions.push(add_change(b));
                }
                i += 1;
                j += 1;
            }
        }
    }
    removes.extend(ours[i..].iter().map(remove_change));
    additions.extend(theirs[j..].iter().map(add_change));
    removes.reverse();
    removes.append(&mut additions);
    removes
}

fn add_change(entry: &Entry) -> Change {
    let op = if entry.is_dir() { Op::Mkdir } else { Op::Create };
    Change::new(op, entry.clone())
}

fn remove_change(entry: &Entry) -> Change {
    let op = if entry.is_dir() { Op::Rmdir } else { Op::Unlink };
    Change::new(op, entry.clone())
}
