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

//! Trees that own a disk directory and accept writes.
//!
//! Every mutating operation updates the disk and the in-memory entry array
//! together, and records a change in the live tracker. A writable tree whose
//! root has been symlinked over another tree runs in delegating mode: reads
//! forward to the delegate view, writes keep operating on this tree's own
//! state.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::checksum::ContentHash;
use crate::diff::{default_equals, diff_entries};
use crate::entry::{Entry, Link};
use crate::errors::{Error, Result};
use crate::io as fsio;
use crate::patch::{Op, Patch};
use crate::paths;
use crate::source_tree::scan_directory;
use crate::tracker::ChangeTracker;
use crate::tree::Tree;

pub(crate) enum WritableMode {
    Writable,
    Delegating { view: Tree },
}

pub(crate) struct WritableState {
    root: PathBuf,
    entries: Vec<Entry>,
    tracker: ChangeTracker,
    started: bool,
    mode: WritableMode,
}

impl WritableState {
    /// Open a writable tree over an existing directory, eagerly scanning
    /// its contents to seed the entry array.
    pub(crate) fn open(root: &Path) -> Result<WritableState> {
        let root = paths::validate_root(root)?;
        let mut entries: Vec<Entry> = Vec::new();
        let mut queue = vec![String::new()];
        while let Some(dir) = queue.pop() {
            let disk = if dir.is_empty() {
                root.clone()
            } else {
                root.join(&dir)
            };
            for entry in scan_directory(&disk, &dir)? {
                if entry.is_dir() && !entry.is_link() {
                    queue.push(entry.relative_path.clone());
                }
                paths::insert_entry(&mut entries, entry);
            }
        }
        Ok(WritableState {
            root,
            entries,
            tracker: ChangeTracker::new(),
            started: true,
            mode: WritableMode::Writable,
        })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn delegate(&self) -> Option<&Tree> {
        match &self.mode {
            WritableMode::Delegating { view } => Some(view),
            WritableMode::Writable => None,
        }
    }
}

/// The common pre-write checks, in order: the tree must be started, the
/// path must not be the root unless allowed, no ancestor may be a symlink,
/// the parent must exist as a directory, and the target itself must not be
/// a symlink unless allowed.
fn check_write(
    state: &WritableState,
    path: &str,
    allow_root: bool,
    allow_symlinks: bool,
) -> Result<()> {
    if !state.started {
        return Err(Error::Stopped);
    }
    if path.is_empty() {
        if allow_root {
            return Ok(());
        }
        return Err(Error::invalid_path(
            "",
            "operation not allowed on the tree root",
        ));
    }
    for ancestor in paths::ancestors(path) {
        if let Some(e) = paths::lookup(&state.entries, ancestor) {
            if e.is_link() {
                return Err(Error::SymlinkCross {
                    path: path.to_owned(),
                });
            }
        }
    }
    let parent = paths::parent(path).expect("non-root path has a parent");
    if !parent.is_empty() {
        match paths::lookup(&state.entries, parent) {
            None => return Err(Error::no_entry(parent)),
            Some(e) if !e.is_dir() => {
                return Err(Error::NotDir {
                    path: parent.to_owned(),
                })
            }
            Some(_) => {}
        }
    }
    if !allow_symlinks {
        if let Some(e) = paths::lookup(&state.entries, path) {
            if e.is_link() {
                return Err(Error::SymlinkCross {
                    path: path.to_owned(),
                });
            }
        }
    }
    Ok(())
}

fn io_to_tree_error(disk: &Path, path: &str, e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::NotFound => Error::no_entry(path),
        io::ErrorKind::AlreadyExists => Error::Exists {
            path: path.to_owned(),
        },
        _ => Error::io(disk, e),
    }
}

// ----------------------------------------------------------------------
// Write capability set.

pub(crate) fn start(tree: &Tree) -> Result<()> {
    tree.try_writable("start", |state| {
        state.tracker.clear();
        state.started = true;
        Ok(())
    })
}

pub(crate) fn stop(tree: &Tree) -> Result<()> {
    tree.try_writable("stop", |state| {
        state.started = false;
        Ok(())
    })
}

pub(crate) fn mkdir(tree: &Tree, path: &str) -> Result<()> {
    let path = paths::normalize(path)?;
    tree.try_writable("mkdir", |state| {
        check_write(state, &path, false, false)?;
        if paths::lookup(&state.entries, &path).is_some() {
            return Err(Error::Exists { path: path.clone() });
        }
        let disk = state.root.join(&path);
        fs::create_dir(&disk).map_err(|e| io_to_tree_error(&disk, &path, e))?;
        let metadata = fs::metadata(&disk).map_err(|e| Error::io(&disk, e))?;
        let entry = Entry::from_metadata(path.clone(), &metadata, None);
        paths::insert_entry(&mut state.entries, entry.clone());
        state.tracker.track(Op::Mkdir, entry);
        trace!(%path, "mkdir");
        Ok(())
    })
}

pub(crate) fn mkdirp(tree: &Tree, path: &str) -> Result<()> {
    let path = paths::normalize(path)?;
    if path.is_empty() {
        return Ok(());
    }
    tree.try_writable("mkdirp", |state| {
        if !state.started {
            return Err(Error::Stopped);
        }
        let mut chain: Vec<String> = paths::ancestors(&path).map(str::to_owned).collect();
        chain.reverse();
        chain.push(path.clone());
        for component in chain {
            match paths::lookup(&state.entries, &component) {
                Some(e) if e.is_dir() && e.is_link() => {
                    return Err(Error::SymlinkCross { path: component })
                }
                Some(e) if e.is_dir() => continue,
                Some(_) => return Err(Error::NotDir { path: component }),
                None => {
                    let disk = state.root.join(&component);
                    fs::create_dir(&disk).map_err(|e| io_to_tree_error(&disk, &component, e))?;
                    let metadata = fs::metadata(&disk).map_err(|e| Error::io(&disk, e))?;
                    let entry = Entry::from_metadata(component.clone(), &metadata, None);
                    paths::insert_entry(&mut state.entries, entry.clone());
                    state.tracker.track(Op::Mkdir, entry);
                }
            }
        }
        trace!(%path, "mkdirp");
        Ok(())
    })
}

pub(crate) fn rmdir(tree: &Tree, path: &str) -> Result<()> {
    let path = paths::normalize(path)?;
    tree.try_writable("rmdir", |state| {
        check_write(state, &path, false, true)?;
        let Some(entry) = paths::lookup(&state.entries, &path).cloned() else {
            return Err(Error::no_entry(path.clone()));
        };
        if !entry.is_dir() {
            return Err(Error::NotDir { path: path.clone() });
        }
        if entry.is_link() {
            return Err(Error::SymlinkCross { path: path.clone() });
        }
        if !paths::range_under(&state.entries, &path).is_empty() {
            return Err(Error::NotEmpty { path: path.clone() });
        }
        let disk = state.root.join(&path);
        fs::remove_dir(&disk).map_err(|e| Error::io(&disk, e))?;
        paths::remove_entry(&mut state.entries, &path);
        state.tracker.track(Op::Rmdir, entry);
        trace!(%path, "rmdir");
        Ok(())
    })
}

pub(crate) fn unlink(tree: &Tree, path: &str) -> Result<()> {
    let path = paths::normalize(path)?;
    tree.try_writable("unlink", |state| {
        check_write(state, &path, false, true)?;
        let Some(entry) = paths::lookup(&state.entries, &path).cloned() else {
            return Err(Error::no_entry(path.clone()));
        };
        let disk = state.root.join(&path);
        if entry.is_dir() {
            if !entry.is_link() {
                return Err(Error::Eperm { path: path.clone() });
            }
            // Removing a directory symlink also drops the grafted view held
            // by its link descriptor.
            fsio::remove_dir_or_link(&disk)?;
            paths::remove_entry(&mut state.entries, &path);
            state.tracker.track(Op::Rmdir, entry);
        } else {
            fs::remove_file(&disk).map_err(|e| io_to_tree_error(&disk, &path, e))?;
            paths::remove_entry(&mut state.entries, &path);
            state.tracker.track(Op::Unlink, entry);
        }
        trace!(%path, "unlink");
        Ok(())
    })
}

pub(crate) fn remove(tree: &Tree, path: &str) -> Result<()> {
    let path = paths::normalize(path)?;
    let kind = tree.try_writable("remove", |state| {
        Ok(paths::lookup(&state.entries, &path).map(|e| e.is_dir() && !e.is_link()))
    })?;
    match kind {
        None => Err(Error::no_entry(path)),
        Some(true) => rmdir(tree, &path),
        Some(false) => unlink(tree, &path),
    }
}

pub(crate) fn empty(tree: &Tree, path: &str) -> Result<()> {
    let path = paths::normalize(path)?;
    tree.try_writable("empty", |state| {
        check_write(state, &path, true, false)?;
        if !path.is_empty() {
            let Some(entry) = paths::lookup(&state.entries, &path) else {
                return Err(Error::no_entry(path.clone()));
            };
            if !entry.is_dir() {
                return Err(Error::NotDir { path: path.clone() });
            }
        }
        let range = paths::range_under(&state.entries, &path);
        let doomed: Vec<Entry> = state.entries.drain(range).collect();
        for entry in doomed.iter().rev() {
            let disk = state.root.join(&entry.relative_path);
            if entry.is_dir() {
                if entry.is_link() {
                    fsio::remove_dir_or_link(&disk)?;
                } else {
                    fs::remove_dir(&disk).map_err(|e| Error::io(&disk, e))?;
                }
                state.tracker.track(Op::Rmdir, entry.clone());
            } else {
                fs::remove_file(&disk).map_err(|e| Error::io(&disk, e))?;
                state.tracker.track(Op::Unlink, entry.clone());
            }
        }
        debug!(%path, removed = doomed.len(), "emptied directory");
        Ok(())
    })
}

pub(crate) fn write_file(tree: &Tree, path: &str, bytes: &[u8]) -> Result<()> {
    let path = paths::normalize(path)?;
    tree.try_writable("write_file", |state| {
        check_write(state, &path, false, true)?;
        let existing = paths::lookup(&state.entries, &path).cloned();
        if let Some(e) = &existing {
            if e.is_dir() {
                return Err(Error::IsDir { path: path.clone() });
            }
            if matches!(e.link, Some(Link::Internal { .. })) {
                return Err(Error::SymlinkCross { path: path.clone() });
            }
        }
        let checksum = ContentHash::of_bytes(bytes);
        if let Some(e) = &existing {
            if e.checksum.as_ref() == Some(&checksum) {
                trace!(%path, "write skipped, content unchanged");
                return Ok(());
            }
        }
        // An external file link writes through to the link target, and the
        // tracked entry is refreshed from the target's metadata.
        let disk = match existing.as_ref().and_then(|e| e.link.clone()) {
            Some(Link::External(target)) => target,
            _ => state.root.join(&path),
        };
        fs::write(&disk, bytes).map_err(|e| io_to_tree_error(&disk, &path, e))?;
        #[cfg(unix)]
        if let Some(e) = &existing {
            if e.link.is_none() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&disk, fs::Permissions::from_mode(e.mode & 0o7777))
                    .map_err(|err| Error::io(&disk, err))?;
            }
        }
        let metadata = fs::metadata(&disk).map_err(|e| Error::io(&disk, e))?;
        let mut entry = Entry::from_metadata(
            path.clone(),
            &metadata,
            existing.as_ref().and_then(|e| e.link.clone()),
        );
        entry.checksum = Some(checksum);
        paths::insert_entry(&mut state.entries, entry.clone());
        if existing.is_some() {
            state.tracker.track(Op::Change, entry);
        } else {
            state.tracker.track(Op::Create, entry);
        }
        trace!(%path, bytes = bytes.len(), "wrote file");
        Ok(())
    })
}

pub(crate) fn symlink(tree: &Tree, target: &Path, path: &str) -> Result<()> {
    let path = paths::normalize(path)?;
    if !target.is_absolute() {
        return Err(Error::invalid_path(
            target.display().to_string(),
            "external symlink target must be absolute",
        ));
    }
    tree.try_writable("symlink", |state| {
        check_write(state, &path, false, false)?;
        if paths::lookup(&state.entries, &path).is_some() {
            return Err(Error::Exists { path: path.clone() });
        }
        let disk = state.root.join(&path);
        fsio::symlink_or_copy(target, &disk)?;
        let metadata = fs::symlink_metadata(&disk).map_err(|e| Error::io(&disk, e))?;
        let entry = Entry::from_metadata(
            path.clone(),
            &metadata,
            Some(Link::External(target.to_path_buf())),
        );
        paths::insert_entry(&mut state.entries, entry.clone());
        state.tracker.track(Op::Create, entry);
        trace!(%path, link_target = %target.display(), "external symlink");
        Ok(())
    })
}

pub(crate) fn symlink_to_facade(
    tree: &Tree,
    target: &Tree,
    target_path: &str,
    local: &str,
) -> Result<()> {
    let target_path = paths::normalize(target_path)?;
    let local = paths::normalize(local)?;
    if local.is_empty() {
        return enter_delegator(tree, target, &target_path);
    }
    // Resolve everything on the target side before touching our own state.
    let target_entry = target.stat(&target_path)?;
    let mut target_disk = target.disk_root().ok_or(Error::NoDiskRoot)?;
    if !target_path.is_empty() {
        target_disk = target_disk.join(&target_path);
    }
    if target_entry.is_dir() {
        let view = target.chdir(&target_path)?;
        tree.try_writable("symlink_to_facade", |state| {
            check_write(state, &local, false, false)?;
            if paths::lookup(&state.entries, &local).is_some() {
                return Err(Error::Exists {
                    path: local.clone(),
                });
            }
            let disk = state.root.join(&local);
            fsio::symlink_or_copy(&target_disk, &disk)?;
            let mut entry = Entry::dir(local.clone());
            entry.link = Some(Link::Internal {
                tree: view.clone(),
                path: String::new(),
            });
            paths::insert_entry(&mut state.entries, entry.clone());
            state.tracker.track(Op::Mkdir, entry);
            trace!(local = %local, "directory graft");
            Ok(())
        })
    } else {
        tree.try_writable("symlink_to_facade", |state| {
            check_write(state, &local, false, false)?;
            if paths::lookup(&state.entries, &local).is_some() {
                return Err(Error::Exists {
                    path: local.clone(),
                });
            }
            let disk = state.root.join(&local);
            fsio::symlink_or_copy(&target_disk, &disk)?;
            let metadata = fs::symlink_metadata(&disk).map_err(|e| Error::io(&disk, e))?;
            let entry = Entry::from_metadata(
                local.clone(),
                &metadata,
                Some(Link::Internal {
                    tree: target.clone(),
                    path: target_path.clone(),
                }),
            );
            paths::insert_entry(&mut state.entries, entry.clone());
            state.tracker.track(Op::Create, entry);
            trace!(local = %local, "file graft");
            Ok(())
        })
    }
}

/// Symlink this tree's root over the target and enter delegating mode.
fn enter_delegator(tree: &Tree, target: &Tree, target_path: &str) -> Result<()> {
    if !target_path.is_empty() {
        let target_entry = target.stat(target_path)?;
        if !target_entry.is_dir() {
            return Err(Error::NotDir {
                path: target_path.to_owned(),
            });
        }
    }
    let mut target_disk = target.disk_root().ok_or(Error::NoDiskRoot)?;
    if !target_path.is_empty() {
        target_disk = target_disk.join(target_path);
    }
    let view = target.chdir(target_path)?;
    let root = tree.try_writable("symlink_to_facade", |state| {
        if !state.started {
            return Err(Error::Stopped);
        }
        if state.delegate().is_some() {
            return Err(Error::invalid_path("", "tree root is already a symlink"));
        }
        if !state.entries.is_empty() {
            return Err(Error::NotEmpty {
                path: "".to_owned(),
            });
        }
        Ok(state.root.clone())
    })?;
    fs::remove_dir(&root).map_err(|e| Error::io(&root, e))?;
    fsio::symlink_or_copy(&target_disk, &root)?;
    tree.with_writable_state(|state| {
        state.mode = WritableMode::Delegating { view: view.clone() };
    });
    // Registering as the view's child keeps the reread cascade flowing
    // delegate -> view -> this tree -> its own children.
    view.register_child(tree);
    debug!(link_target = %target_disk.display(), "entered delegating mode");
    Ok(())
}

/// Leave delegating mode.
///
/// The delegate's pending changes plus a remove-everything diff of its
/// entries are re-integrated into this tree's tracker through the collapse
/// rules, the root symlink is replaced by an empty directory, and the tree
/// becomes a plain writable tree again.
pub(crate) fn undo_root_symlink(tree: &Tree) -> Result<()> {
    let (root, view) = tree.try_writable("undo_root_symlink", |state| match state.delegate() {
        Some(view) => Ok((state.root.clone(), view.clone())),
        None => Err(Error::WrongTreeKind {
            operation: "undo_root_symlink",
            required: "delegating",
        }),
    })?;
    let mut patch = view.changes()?;
    let delegate_entries = view.entries()?;
    patch.extend(diff_entries(&delegate_entries, &[], &default_equals));
    fsio::remove_dir_or_link(&root)?;
    fs::create_dir(&root).map_err(|e| Error::io(&root, e))?;
    tree.with_writable_state(|state| {
        for change in patch {
            state.tracker.track(change.op, change.entry);
        }
        state.mode = WritableMode::Writable;
    });
    view.unregister_child(tree);
    debug!("left delegating mode");
    Ok(())
}

// ----------------------------------------------------------------------
// Read capability set.

pub(crate) fn delegate_view(tree: &Tree) -> Option<Tree> {
    tree.with_writable_state(|state| state.delegate().cloned())
}

pub(crate) fn is_delegating(tree: &Tree) -> bool {
    delegate_view(tree).is_some()
}

/// A reread never changes a writable tree's state; a root change is
/// rejected.
pub(crate) fn on_reread(tree: &Tree, new_root: Option<&Path>) -> Result<()> {
    let _ = tree;
    if let Some(root) = new_root {
        return Err(Error::invalid_path(
            root.display().to_string(),
            "root changes are rejected on writable trees",
        ));
    }
    Ok(())
}

/// Own entries plus, for every directory graft, the grafted subtree's
/// entries rebased under the graft path, resorted.
pub(crate) fn entries(tree: &Tree) -> Result<Vec<Entry>> {
    if let Some(view) = delegate_view(tree) {
        return view.entries();
    }
    let (own, grafts) = tree.with_writable_state(|state| {
        let grafts: Vec<(String, Tree)> = state
            .entries
            .iter()
            .filter_map(|e| {
                e.internal_dir_link()
                    .map(|(t, _)| (e.relative_path.clone(), t.clone()))
            })
            .collect();
        (state.entries.clone(), grafts)
    });
    let mut all = own;
    for (prefix, sub) in grafts {
        for entry in sub.entries()? {
            let rebased = paths::join(&prefix, &entry.relative_path);
            all.push(entry.with_path(rebased));
        }
    }
    all.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(all)
}

enum Resolved {
    Entry(Entry),
    Delegate(Tree, String),
    Missing,
}

/// Find `path` in this tree, resolving the nearest ancestor graft.
fn resolve(tree: &Tree, path: &str) -> (PathBuf, Resolved) {
    tree.with_writable_state(|state| {
        let root = state.root.clone();
        if let Some(view) = state.delegate() {
            return (root, Resolved::Delegate(view.clone(), path.to_owned()));
        }
        if let Some(e) = paths::lookup(&state.entries, path) {
            return (root, Resolved::Entry(e.clone()));
        }
        for ancestor in paths::ancestors(path) {
            if let Some(e) = paths::lookup(&state.entries, ancestor) {
                if let Some((sub, sub_root)) = e.internal_dir_link() {
                    let rest = &path[ancestor.len() + 1..];
                    return (
                        root,
                        Resolved::Delegate(sub.clone(), paths::join(sub_root, rest)),
                    );
                }
                // The nearest existing ancestor is plain: the path is
                // genuinely absent.
                break;
            }
        }
        (root, Resolved::Missing)
    })
}

/// `path` is normalized and non-empty.
pub(crate) fn stat(tree: &Tree, path: &str) -> Result<Entry> {
    match resolve(tree, path) {
        (_, Resolved::Entry(entry)) => Ok(entry),
        (_, Resolved::Delegate(sub, rest)) => sub.stat(&rest),
        (_, Resolved::Missing) => Err(Error::no_entry(path)),
    }
}

pub(crate) fn read_file(tree: &Tree, path: &str) -> Result<Vec<u8>> {
    match resolve(tree, path) {
        (root, Resolved::Entry(entry)) => {
            if entry.is_dir() {
                return Err(Error::IsDir {
                    path: path.to_owned(),
                });
            }
            match entry.link {
                Some(Link::Internal {
                    tree: sub,
                    path: sub_path,
                }) => sub.read_file(&sub_path),
                Some(Link::External(target)) => {
                    fs::read(&target).map_err(|e| Error::io(&target, e))
                }
                None => {
                    let disk = root.join(path);
                    fs::read(&disk).map_err(|e| Error::io(&disk, e))
                }
            }
        }
        (_, Resolved::Delegate(sub, rest)) => sub.read_file(&rest),
        (_, Resolved::Missing) => Err(Error::no_entry(path)),
    }
}

pub(crate) fn readdir_entries(tree: &Tree, dir: &str) -> Result<Vec<Entry>> {
    if dir.is_empty() {
        if let Some(view) = delegate_view(tree) {
            return view.readdir_entries("");
        }
        return Ok(tree.with_writable_state(|state| {
            paths::immediate_children(&state.entries, "")
                .into_iter()
                .cloned()
                .collect()
        }));
    }
    match resolve(tree, dir) {
        (_, Resolved::Entry(entry)) => {
            if !entry.is_dir() {
                return Err(Error::NotDir {
                    path: dir.to_owned(),
                });
            }
            if let Some((sub, sub_root)) = entry.internal_dir_link() {
                let (sub, sub_root) = (sub.clone(), sub_root.to_owned());
                return sub.readdir_entries(&sub_root);
            }
            Ok(tree.with_writable_state(|state| {
                paths::immediate_children(&state.entries, dir)
                    .into_iter()
                    .cloned()
                    .collect()
            }))
        }
        (_, Resolved::Delegate(sub, rest)) => sub.readdir_entries(&rest),
        (_, Resolved::Missing) => Err(Error::no_entry(dir)),
    }
}

pub(crate) fn changes(tree: &Tree) -> Result<Patch> {
    if let Some(view) = delegate_view(tree) {
        return view.changes();
    }
    Ok(tree.with_writable_state(|state| state.tracker.changes()))
}
