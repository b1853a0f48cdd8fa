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

//! Buildfs error types.
//!
//! Filesystem-shaped failures keep the POSIX prefixes (`ENOENT:`, `EEXIST:`,
//! ...) in their Display strings: build plugins regex-match error text and the
//! prefixes are part of the compatibility contract.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Buildfs specific error.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("EINVAL: invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("ENOENT: {path:?} does not exist")]
    NoEntry { path: String },

    #[error("EEXIST: {path:?} already exists")]
    Exists { path: String },

    #[error("ENOTDIR: {path:?} is not a directory")]
    NotDir { path: String },

    #[error("EISDIR: {path:?} is a directory")]
    IsDir { path: String },

    #[error("ENOTEMPTY: {path:?} is not empty")]
    NotEmpty { path: String },

    #[error("EPERM: cannot unlink directory {path:?}")]
    Eperm { path: String },

    #[error("tree is stopped; writes are not allowed")]
    Stopped,

    #[error("EPERM: {path:?} crosses a symlink boundary")]
    SymlinkCross { path: String },

    #[error("the files filter cannot be combined with include or exclude")]
    IncompatibleFilters,

    #[error("conflicting capitalization between {a:?} and {b:?}")]
    ConflictingCapitalization { a: String, b: String },

    #[error("conflicting file types for {path:?}")]
    ConflictingFileType { path: String },

    #[error("EEXIST: refusing to overwrite {path:?}")]
    OverwriteRefused { path: String },

    #[error("unknown operation {op:?}: apply delegate has no {field:?} callback")]
    UnknownOperation { op: String, field: String },

    #[error("invalid glob pattern {pattern:?}")]
    InvalidGlob { pattern: String, source: globset::Error },

    #[error("tree has no disk root")]
    NoDiskRoot,

    #[error("{operation} requires a {required} tree")]
    WrongTreeKind {
        operation: &'static str,
        required: &'static str,
    },

    #[error("file {path:?} is not valid UTF-8")]
    NotUtf8 { path: String },

    #[error("IO error on {path:?}")]
    Io { path: PathBuf, source: io::Error },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Error {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn no_entry(path: impl Into<String>) -> Error {
        Error::NoEntry { path: path.into() }
    }

    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Error {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
