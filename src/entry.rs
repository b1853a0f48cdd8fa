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

//! An entry describing one path in a tree.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::checksum::ContentHash;
use crate::tree::Tree;

pub(crate) const S_IFMT: u32 = 0o170_000;
pub(crate) const S_IFDIR: u32 = 0o040_000;
pub(crate) const S_IFREG: u32 = 0o100_000;
#[allow(dead_code)] // exercised by tests
pub(crate) const S_IFLNK: u32 = 0o120_000;

/// Kind of node an entry describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    File,
    Dir,
}

impl From<fs::FileType> for Kind {
    fn from(ft: fs::FileType) -> Kind {
        if ft.is_dir() {
            Kind::Dir
        } else {
            Kind::File
        }
    }
}

/// Where a symlink entry points.
#[derive(Clone)]
pub enum Link {
    /// An absolute path outside any tree; reads fall through to the OS.
    External(PathBuf),
    /// A graft of another tree; reads recurse through it.
    Internal { tree: Tree, path: String },
}

impl PartialEq for Link {
    fn eq(&self, other: &Link) -> bool {
        match (self, other) {
            (Link::External(a), Link::External(b)) => a == b,
            (
                Link::Internal { tree: ta, path: pa },
                Link::Internal { tree: tb, path: pb },
            ) => Tree::ptr_eq(ta, tb) && pa == pb,
            _ => false,
        }
    }
}

// The Internal variant holds a live tree handle; printing the whole tree
// would recurse through the graft, so render only the target path.
impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::External(target) => write!(f, "External({target:?})"),
            Link::Internal { path, .. } => write!(f, "Internal({path:?})"),
        }
    }
}

/// One path in a tree: kind and permissions from the mode bits, optional
/// size/mtime/checksum metadata, and an optional link descriptor for
/// symlink entries.
///
/// Entries are immutable once published to a tree; mutation replaces them
/// by position in the owning array.
#[derive(Clone, PartialEq)]
pub struct Entry {
    /// Separator-normalized path, with no leading or trailing separator.
    /// Empty only for the root sentinel, which is never stored in an array.
    pub relative_path: String,

    /// Permission and type bits as returned by the OS.
    pub mode: u32,

    /// File size; absent for directories and synthesized entries.
    pub size: Option<u64>,

    /// Modification time in whole seconds past the Unix epoch.
    pub mtime: Option<i64>,

    /// Content hash, populated by writable trees on write.
    pub checksum: Option<ContentHash>,

    /// Link descriptor for symlink entries.
    pub link: Option<Link>,

    /// Merge marker: this directory's content comes from exactly one input
    /// and may be grafted as a single symlink instead of recursed into.
    pub link_dir: bool,
}

impl Entry {
    /// A synthesized directory entry with default permissions and no
    /// metadata.
    pub fn dir(relative_path: impl Into<String>) -> Entry {
        Entry {
            relative_path: relative_path.into(),
            mode: S_IFDIR | 0o755,
            size: None,
            mtime: None,
            checksum: None,
            link: None,
            link_dir: false,
        }
    }

    /// A synthesized file entry with default permissions and no metadata.
    pub fn file(relative_path: impl Into<String>) -> Entry {
        Entry {
            relative_path: relative_path.into(),
            mode: S_IFREG | 0o644,
            size: None,
            mtime: None,
            checksum: None,
            link: None,
            link_dir: false,
        }
    }

    /// The sentinel for a tree's own root.
    pub fn root() -> Entry {
        Entry::dir("")
    }

    /// Build an entry from stat results.
    pub(crate) fn from_metadata(
        relative_path: impl Into<String>,
        metadata: &fs::Metadata,
        link: Option<Link>,
    ) -> Entry {
        Entry {
            relative_path: relative_path.into(),
            mode: mode_of(metadata),
            size: if metadata.is_file() {
                Some(metadata.len())
            } else {
                None
            },
            mtime: unix_mtime(metadata),
            checksum: None,
            link,
            link_dir: false,
        }
    }

    pub fn kind(&self) -> Kind {
        if self.mode & S_IFMT == S_IFDIR {
            Kind::Dir
        } else {
            Kind::File
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == Kind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind() == Kind::File
    }

    pub fn is_link(&self) -> bool {
        self.link.is_some()
    }

    /// The grafted view behind this entry, if it is an internal directory
    /// symlink.
    pub(crate) fn internal_dir_link(&self) -> Option<(&Tree, &str)> {
        match &self.link {
            Some(Link::Internal { tree, path }) if self.is_dir() => Some((tree, path)),
            _ => None,
        }
    }

    /// Clone with a different path, preserving the link descriptor and all
    /// metadata.
    pub fn with_path(mut self, relative_path: impl Into<String>) -> Entry {
        self.relative_path = relative_path.into();
        self
    }

    /// JSON rendering used by the serialized change format.
    pub fn listing_json(&self) -> serde_json::Value {
        let mut val = json!({
            "path": self.relative_path,
            "kind": self.kind(),
            "mode": self.mode,
        });
        if let Some(size) = self.size {
            val["size"] = json!(size);
        }
        if let Some(mtime) = self.mtime {
            val["mtime"] = json!(mtime);
        }
        if let Some(checksum) = &self.checksum {
            val["checksum"] = json!(checksum.hex());
        }
        match &self.link {
            None => {}
            Some(Link::External(target)) => {
                val["link"] = json!({ "external": target.to_string_lossy() });
            }
            Some(Link::Internal { path, .. }) => {
                val["link"] = json!({ "internal": path });
            }
        }
        if self.link_dir {
            val["link_dir"] = json!(true);
        }
        val
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Entry");
        d.field("path", &self.relative_path)
            .field("mode", &unix_mode::to_string(self.mode));
        if let Some(size) = self.size {
            d.field("size", &size);
        }
        if let Some(mtime) = self.mtime {
            d.field("mtime", &mtime);
        }
        if let Some(link) = &self.link {
            d.field("link", link);
        }
        if self.link_dir {
            d.field("link_dir", &true);
        }
        d.finish()
    }
}

#[cfg(unix)]
pub(crate) fn mode_of(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode()
}

#[cfg(not(unix))]
pub(crate) fn mode_of(metadata: &fs::Metadata) -> u32 {
    let type_bits = if metadata.is_dir() { S_IFDIR } else { S_IFREG };
    let permissions = if metadata.permissions().readonly() {
        0o555
    } else {
        0o755
    };
    type_bits | permissions
}

pub(crate) fn unix_mtime(metadata: &fs::Metadata) -> Option<i64> {
    metadata
        .modified()
        .ok()
        .and_then(|t| unix_secs(t))
}

pub(crate) fn unix_secs(t: SystemTime) -> Option<i64> {
    t.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs() as i64)
}
