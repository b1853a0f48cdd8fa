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

//! Virtual filesystem trees for incremental build pipelines.
//!
//! Build plugins consume and produce file hierarchies; this crate gives
//! them uniform, efficiently diffable, symlink-composable views over those
//! hierarchies so that downstream stages apply minimal patches instead of
//! recopying directories.
//!
//! The [Tree] handle has four variants behind one read interface:
//!
//!  * manual trees hold a caller-supplied sorted entry array and carry the
//!    diff engine ([ManualTree]);
//!  * source trees are read-only views of a disk directory, scanned lazily
//!    one directory at a time;
//!  * writable trees own a disk directory, mutate it through the write
//!    capability set, and accumulate collapsed change lists;
//!  * projections filter any tree by cwd, include/exclude matchers, or an
//!    explicit file list; merges overlay several trees with deterministic
//!    conflict rules.
//!
//! A writable tree whose root is symlinked over another tree transiently
//! delegates its reads to that tree until [Tree::undo_root_symlink].

pub mod apply;
pub mod checksum;
pub mod diff;
pub mod entry;
pub mod errors;
pub mod flags;
pub mod io;
pub mod manual;
pub mod matcher;
pub mod merge;
pub mod patch;
pub mod paths;
pub mod projection;
mod source_tree;
pub mod test_fixtures;
mod tracker;
pub mod tree;
mod writable_tree;

pub use crate::apply::{apply, ApplyDelegate, OpCallback};
pub use crate::checksum::ContentHash;
pub use crate::diff::{default_equals, diff_entries, EqualsFn};
pub use crate::entry::{Entry, Kind, Link};
pub use crate::errors::{Error, Result};
pub use crate::flags::{can_symlink, set_can_symlink, SYMLINKS_SUPPORTED};
pub use crate::manual::ManualTree;
pub use crate::matcher::Matcher;
pub use crate::merge::{MergeInput, MergeOptions};
pub use crate::patch::{sort_canonical, Change, Op, Patch};
pub use crate::paths::normalize;
pub use crate::projection::FilterOptions;
pub use crate::tree::Tree;
