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

//! Applying patches through caller-supplied IO callbacks.

use std::fs;
use std::path::Path;

use crate::entry::{Entry, Link};
use crate::errors::{Error, Result};
use crate::io::{remove_dir_or_link, symlink_or_copy};
use crate::patch::{Op, Patch};

/// One apply callback: `(input_path, output_path, entry)`.
pub type OpCallback<'a> = Box<dyn FnMut(&Path, &Path, &Entry) -> Result<()> + 'a>;

/// Callbacks invoked by [apply], keyed by operation name.
///
/// Every field is optional; an op in the patch with no matching callback
/// fails the apply with an error naming the op and the missing field.
#[derive(Default)]
pub struct ApplyDelegate<'a> {
    pub mkdir: Option<OpCallback<'a>>,
    pub create: Option<OpCallback<'a>>,
    pub change: Option<OpCallback<'a>>,
    pub rmdir: Option<OpCallback<'a>>,
    pub unlink: Option<OpCallback<'a>>,
}

impl ApplyDelegate<'static> {
    /// A delegate that replays a patch against the real filesystem.
    ///
    /// `create` and `change` copy content from the input side; link entries
    /// become symlinks where the platform allows and copies elsewhere.
    pub fn filesystem() -> ApplyDelegate<'static> {
        ApplyDelegate {
            mkdir: Some(Box::new(materialize)),
            create: Some(Box::new(materialize)),
            change: Some(Box::new(|input, output, entry| {
                if fs::symlink_metadata(output).is_ok() {
                    remove_dir_or_link(output)?;
                }
                materialize(input, output, entry)
            })),
            rmdir: Some(Box::new(|_input, output, _entry| {
                remove_dir_or_link(output)
            })),
            unlink: Some(Box::new(|_input, output, _entry| {
                fs::remove_file(output).map_err(|e| Error::io(output, e))
            })),
        }
    }
}

/// Produce `entry` at `output`: a directory, a symlink (or copy) for link
/// entries, or a copy of the input-side file.
fn materialize(input: &Path, output: &Path, entry: &Entry) -> Result<()> {
    if let Some(Link::External(target)) = &entry.link {
        return symlink_or_copy(target, output);
    }
    if entry.is_dir() {
        if entry.link_dir || entry.link.is_some() {
            return symlink_or_copy(input, output);
        }
        return fs::create_dir(output).map_err(|e| Error::io(output, e));
    }
    if entry.link.is_some() {
        return symlink_or_copy(input, output);
    }
    fs::copy(input, output)
        .map(|_| ())
        .map_err(|e| Error::io(output, e))
}

/// Apply a patch in the order supplied, invoking
/// `delegate.op(input_dir/path, output_dir/path, entry)` for each change.
///
/// Canonically ordered patches (see [crate::patch::sort_canonical]) are
/// guaranteed to be applicable; other orders are the caller's
/// responsibility.
pub fn apply(
    patch: &Patch,
    input_dir: &Path,
    output_dir: &Path,
    delegate: &mut ApplyDelegate<'_>,
) -> Result<()> {
    for change in patch {
        let callback = match change.op {
            Op::Mkdir => &mut delegate.mkdir,
            Op::Create => &mut delegate.create,
            Op::Change => &mut delegate.change,
            Op::Rmdir => &mut delegate.rmdir,
            Op::Unlink => &mut delegate.unlink,
        };
        match callback {
            Some(callback) => callback(
                &input_dir.join(change.path()),
                &output_dir.join(change.path()),
                &change.entry,
            )?,
            None => {
                return Err(Error::UnknownOperation {
                    op: change.op.as_str().to_owned(),
                    field: change.op.as_str().to_owned(),
                })
            }
        }
    }
    Ok(())
}
