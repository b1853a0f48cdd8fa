// Buildfs: virtual filesystem trees for incremental build pipelines.
// Copyright 2019-2026 the buildfs authors.

//! Utilities to set up test environments.
//!
//! Fixtures that create directories are automatically deleted when the
//! object is dropped.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::tree::Tree;

/// A temporary tree for running a test.
///
/// Created in a temporary directory and automatically disposed when done.
pub struct TreeFixture {
    pub root: PathBuf,
    _tempdir: tempfile::TempDir, // held only for cleanup
}

impl TreeFixture {
    pub fn new() -> TreeFixture {
        let tempdir = tempfile::TempDir::new().unwrap();
        let root = tempdir.path().to_path_buf();
        TreeFixture {
            _tempdir: tempdir,
            root,
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn create_file(&self, relative_path: &str) {
        self.create_file_with_contents(relative_path, b"contents");
    }

    pub fn create_file_with_contents(&self, relative_path: &str, contents: &[u8]) {
        let full_path = self.root.join(relative_path);
        let mut f = fs::File::create(full_path).unwrap();
        f.write_all(contents).unwrap();
    }

    pub fn create_dir(&self, relative_path: &str) {
        fs::create_dir(self.root.join(relative_path)).unwrap();
    }

    #[cfg(unix)]
    pub fn create_symlink(&self, relative_path: &str, target: &str) {
        use std::os::unix::fs as unix_fs;

        unix_fs::symlink(target, self.root.join(relative_path)).unwrap();
    }

    /// Symlinks are just not present on Windows.
    #[cfg(windows)]
    pub fn create_symlink(&self, _relative_path: &str, _target: &str) {}

    /// Pin a file's mtime, for tests that depend on metadata diffs.
    pub fn set_mtime(&self, relative_path: &str, unix_seconds: i64) {
        filetime::set_file_mtime(
            self.root.join(relative_path),
            FileTime::from_unix_time(unix_seconds, 0),
        )
        .unwrap();
    }

    pub fn source_tree(&self) -> Tree {
        Tree::source(self.path()).unwrap()
    }

    pub fn writable_tree(&self) -> Tree {
        Tree::writable(self.path()).unwrap()
    }
}

impl Default for TreeFixture {
    fn default() -> Self {
        Self::new()
    }
}
