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

//! Process-level capability flags.

use std::sync::atomic::{AtomicBool, Ordering};

/// Whether this platform is expected to support symlinks at all.
pub const SYMLINKS_SUPPORTED: bool = cfg!(unix);

static CAN_SYMLINK: AtomicBool = AtomicBool::new(SYMLINKS_SUPPORTED);

/// True if symlinks may be used for grafting and for the merge
/// symlink-through optimization.
///
/// When false, directory-link entries are materialized as copies by the
/// apply delegates and merges recurse instead of linking.
pub fn can_symlink() -> bool {
    CAN_SYMLINK.load(Ordering::Relaxed)
}

/// Override the symlink capability, mainly to exercise copy fallbacks.
///
/// The flag is process-wide: tests that flip it must not share a process
/// with tests that rely on the platform default.
pub fn set_can_symlink(value: bool) {
    CAN_SYMLINK.store(value, Ordering::Relaxed);
}
