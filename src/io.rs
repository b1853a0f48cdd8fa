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

//! Filesystem plumbing shared by trees and apply delegates.

use std::fs;
use std::path::Path;

use crate::errors::{Error, Result};
use crate::flags::can_symlink;

/// Create a symlink to `target` at `link` on capable platforms, or copy the
/// target there otherwise.
pub fn symlink_or_copy(target: &Path, link: &Path) -> Result<()> {
    if can_symlink() {
        #[cfg(unix)]
        return std::os::unix::fs::symlink(target, link).map_err(|e| Error::io(link, e));
    }
    copy_recursive(target, link)
}

/// Copy a file, or a directory with its whole subtree.
pub fn copy_recursive(src: &Path, dst: &Path) -> Result<()> {
    let metadata = fs::metadata(src).map_err(|e| Error::io(src, e))?;
    if metadata.is_dir() {
        fs::create_dir(dst).map_err(|e| Error::io(dst, e))?;
        for dirent in fs::read_dir(src).map_err(|e| Error::io(src, e))? {
            let dirent = dirent.map_err(|e| Error::io(src, e))?;
            copy_recursive(&dirent.path(), &dst.join(dirent.file_name()))?;
        }
    } else {
        fs::copy(src, dst).map_err(|e| Error::io(dst, e))?;
    }
    Ok(())
}

/// Remove whatever sits at `path`: a symlink, an empty directory, or a
/// directory copy left behind when symlinks are unavailable.
pub fn remove_dir_or_link(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path).map_err(|e| Error::io(path, e))?;
    if metadata.file_type().is_symlink() {
        fs::remove_file(path).map_err(|e| Error::io(path, e))
    } else if metadata.is_dir() {
        fs::remove_dir_all(path).map_err(|e| Error::io(path, e))
    } else {
        fs::remove_file(path).map_err(|e| Error::io(path, e))
    }
}
