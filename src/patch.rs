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

//! Changes and patches: the externally observable structured data.
//!
//! A change serializes as `[op, relative_path, entry]`; consumers may ignore
//! the entry, which carries enough metadata for delegates to replicate side
//! effects.

use std::cmp::Ordering;
use std::fmt;

use serde::ser::{Serialize, SerializeTuple, Serializer};

use crate::entry::Entry;

/// Patch operation names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Mkdir,
    Create,
    Change,
    Rmdir,
    Unlink,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Mkdir => "mkdir",
            Op::Create => "create",
            Op::Change => "change",
            Op::Rmdir => "rmdir",
            Op::Unlink => "unlink",
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Op::Rmdir | Op::Unlink)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a patch: an operation, a path, and the post-state entry.
#[derive(Clone, PartialEq)]
pub struct Change {
    pub op: Op,
    pub entry: Entry,
}

impl Change {
    pub fn new(op: Op, entry: Entry) -> Change {
        Change { op, entry }
    }

    pub fn path(&self) -> &str {
        &self.entry.relative_path
    }
}

impl fmt::Debug for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.path())
    }
}

impl Serialize for Change {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(self.op.as_str())?;
        tuple.serialize_element(self.path())?;
        tuple.serialize_element(&self.entry.listing_json())?;
        tuple.end()
    }
}

/// An ordered sequence of changes.
pub type Patch = Vec<Change>;

/// Sort a patch into canonical apply order: removals first in descending
/// path order, then additions and updates ascending.
///
/// This order is what makes a patch applicable: no directory is removed
/// before its contents, and none is created after its children.
pub fn sort_canonical(patch: &mut Patch) {
    patch.sort_by(|a, b| match (a.op.is_removal(), b.op.is_removal()) {
        (true, true) => b.path().cmp(a.path()),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.path().cmp(b.path()),
    });
}
