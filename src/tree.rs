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

//! The polymorphic tree handle and the shared read capability set.
//!
//! Every tree variant sits behind the same cloneable [Tree] handle; reads
//! dispatch by variant, writes are only accepted by writable trees, and
//! parents keep weak references to their children so that a `reread` can
//! cascade snapshots down the DAG before caches are invalidated.

use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::entry::Entry;
use crate::errors::{Error, Result};
use crate::manual::ManualTree;
use crate::matcher::Matcher;
use crate::merge::{self, MergeInput, MergeOptions, MergeState};
use crate::patch::Patch;
use crate::paths;
use crate::projection::{self, FilterOptions, ProjectionState};
use crate::source_tree::{self, SourceState};
use crate::writable_tree::{self, WritableState};

/// A handle to one tree in the build DAG.
///
/// Handles are cheap to clone and share ownership of the underlying tree
/// state; the graph formed by projections, grafts, and merges is a strict
/// DAG, so shared ownership cannot cycle.
#[derive(Clone)]
pub struct Tree {
    inner: Rc<RefCell<TreeState>>,
}

pub(crate) struct TreeState {
    /// Weak back-references to children, notified on reread.
    children: Vec<Weak<RefCell<TreeState>>>,
    pub(crate) kind: TreeKind,
}

pub(crate) enum TreeKind {
    Manual(ManualTree),
    Source(SourceState),
    Writable(WritableState),
    Projection(ProjectionState),
    Merge(MergeState),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Variant {
    Manual,
    Source,
    Writable,
    Projection,
    Merge,
}

impl Tree {
    // ------------------------------------------------------------------
    // Constructors.

    /// Wrap a flat entry array as a tree.
    pub fn manual(manual: ManualTree) -> Tree {
        Tree::from_kind(TreeKind::Manual(manual))
    }

    /// A read-only view of a directory on disk, scanned lazily.
    pub fn source(root: impl AsRef<Path>) -> Result<Tree> {
        Ok(Tree::from_kind(TreeKind::Source(SourceState::open(
            root.as_ref(),
        )?)))
    }

    /// A mutable tree owning the directory at `root`.
    ///
    /// Existing contents are scanned to seed the entry array; the tree
    /// starts in the started state with an empty change tracker.
    pub fn writable(root: impl AsRef<Path>) -> Result<Tree> {
        Ok(Tree::from_kind(TreeKind::Writable(WritableState::open(
            root.as_ref(),
        )?)))
    }

    /// Overlay several trees into one logical tree.
    ///
    /// Path inputs become source trees owned by the merge; tree inputs are
    /// referenced but not owned.
    pub fn merge(inputs: Vec<MergeInput>, options: MergeOptions) -> Result<Tree> {
        let mut trees = Vec::with_capacity(inputs.len());
        let mut owned = Vec::with_capacity(inputs.len());
        for input in inputs {
            match input {
                MergeInput::Path(p) => {
                    trees.push(Tree::source(p)?);
                    owned.push(true);
                }
                MergeInput::Tree(t) => {
                    trees.push(t);
                    owned.push(false);
                }
            }
        }
        let merged = Tree::from_kind(TreeKind::Merge(MergeState::new(
            trees.clone(),
            owned,
            options,
        )));
        for input in &trees {
            input.register_child(&merged);
        }
        Ok(merged)
    }

    fn from_kind(kind: TreeKind) -> Tree {
        Tree {
            inner: Rc::new(RefCell::new(TreeState {
                children: Vec::new(),
                kind,
            })),
        }
    }

    // ------------------------------------------------------------------
    // Read capability set.

    /// All entries of the tree, sorted ascending by path.
    ///
    /// Directory grafts are expanded: the grafted subtree's entries appear
    /// prefixed with the graft's path.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        match self.variant() {
            Variant::Manual => self.with_manual(|m| Ok(m.entries().to_vec())),
            Variant::Source => source_tree::entries(self),
            Variant::Writable => writable_tree::entries(self),
            Variant::Projection => projection::entries(self),
            Variant::Merge => merge::entries(self),
        }
    }

    /// The paths of [Tree::entries].
    pub fn paths(&self) -> Result<Vec<String>> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|e| e.relative_path)
            .collect())
    }

    /// The entry at `path`, resolving through grafts.
    ///
    /// The empty path names the tree root and always yields the root
    /// sentinel entry.
    pub fn stat(&self, path: &str) -> Result<Entry> {
        let path = paths::normalize(path)?;
        if path.is_empty() {
            return Ok(Entry::root());
        }
        match self.variant() {
            Variant::Manual => self.with_manual(|m| {
                paths::lookup(m.entries(), &path)
                    .cloned()
                    .ok_or_else(|| Error::no_entry(path.clone()))
            }),
            Variant::Source => source_tree::stat(self, &path),
            Variant::Writable => writable_tree::stat(self, &path),
            Variant::Projection => projection::stat(self, &path),
            Variant::Merge => merge::stat(self, &path),
        }
    }

    /// True if `path` exists in the tree.
    ///
    /// On a source tree whose parent directory has not been scanned this
    /// falls back to a direct filesystem stat, so asking about existence
    /// never forces a scan.
    pub fn exists(&self, path: &str) -> Result<bool> {
        let path = paths::normalize(path)?;
        if path.is_empty() {
            return Ok(true);
        }
        if self.variant() == Variant::Source {
            return source_tree::exists(self, &path);
        }
        match self.stat(&path) {
            Ok(_) => Ok(true),
            Err(Error::NoEntry { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read a file's bytes, following external links to the host
    /// filesystem and internal links into the grafted tree.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let path = paths::normalize(path)?;
        if path.is_empty() {
            return Err(Error::IsDir { path });
        }
        match self.variant() {
            Variant::Manual => Err(Error::NoDiskRoot),
            Variant::Source => source_tree::read_file(self, &path),
            Variant::Writable => writable_tree::read_file(self, &path),
            Variant::Projection => projection::read_file(self, &path),
            Variant::Merge => merge::read_file(self, &path),
        }
    }

    /// [Tree::read_file], decoded as UTF-8.
    pub fn read_file_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read_file(path)?;
        String::from_utf8(bytes).map_err(|_| Error::NotUtf8 {
            path: path.to_owned(),
        })
    }

    /// Names of the immediate children of directory `path`, sorted.
    pub fn readdir(&self, path: &str) -> Result<Vec<String>> {
        Ok(self
            .readdir_entries(path)?
            .iter()
            .map(|e| paths::basename(&e.relative_path).to_owned())
            .collect())
    }

    /// Entries for the immediate children of directory `path`.
    pub(crate) fn readdir_entries(&self, path: &str) -> Result<Vec<Entry>> {
        let path = paths::normalize(path)?;
        match self.variant() {
            Variant::Manual => self.with_manual(|m| {
                require_dir(m.entries(), &path)?;
                Ok(paths::immediate_children(m.entries(), &path)
                    .into_iter()
                    .cloned()
                    .collect())
            }),
            Variant::Source => source_tree::readdir_entries(self, &path),
            Variant::Writable => writable_tree::readdir_entries(self, &path),
            Variant::Projection => projection::readdir_entries(self, &path),
            Variant::Merge => merge::readdir_entries(self, &path),
        }
    }

    /// A view of the subtree rooted at `path`.
    pub fn chdir(&self, path: &str) -> Result<Tree> {
        self.filtered(FilterOptions {
            cwd: Some(path.to_owned()),
            ..FilterOptions::default()
        })
    }

    /// A filtered, non-owning view of this tree.
    pub fn filtered(&self, options: FilterOptions) -> Result<Tree> {
        let state = projection::new_state(self.clone(), options)?;
        let child = Tree::from_kind(TreeKind::Projection(state));
        self.register_child(&child);
        Ok(child)
    }

    /// The changes since the last barrier, in canonical order.
    ///
    /// Writable trees report their collapsed tracker; source trees and
    /// projections diff against their previous snapshot; merges diff
    /// against the result of the previous `changes` call.
    pub fn changes(&self) -> Result<Patch> {
        match self.variant() {
            Variant::Manual => Ok(Patch::new()),
            Variant::Source => source_tree::changes(self),
            Variant::Writable => writable_tree::changes(self),
            Variant::Projection => projection::changes(self),
            Variant::Merge => merge::changes(self),
        }
    }

    /// The reread barrier: children snapshot their previous view, then this
    /// tree invalidates its own caches.
    ///
    /// On a tree in delegating mode this is a no-op; the delegate is reread
    /// by its own owner.
    pub fn reread(&self) -> Result<()> {
        self.reread_impl(None, true, None)
    }

    /// [Tree::reread], additionally moving the tree to a new root.
    ///
    /// Root changes are allowed on source trees and rejected elsewhere.
    pub fn reread_with_root(&self, new_root: impl AsRef<Path>) -> Result<()> {
        self.reread_impl(Some(new_root.as_ref()), true, None)
    }

    pub(crate) fn reread_cascaded(&self) -> Result<()> {
        self.reread_impl(None, false, None)
    }

    pub(crate) fn reread_skipping(&self, skip: &Tree) -> Result<()> {
        self.reread_impl(None, true, Some(skip))
    }

    fn reread_impl(&self, new_root: Option<&Path>, public: bool, skip: Option<&Tree>) -> Result<()> {
        let variant = self.variant();
        if public && variant == Variant::Writable && writable_tree::is_delegating(self) {
            return Ok(());
        }
        // Children snapshot against our still-valid state before we
        // invalidate anything.
        for child in self.live_children() {
            if let Some(skip) = skip {
                if Tree::ptr_eq(&child, skip) {
                    continue;
                }
            }
            child.reread_cascaded()?;
        }
        match variant {
            Variant::Manual => {}
            Variant::Source => source_tree::invalidate(self, new_root)?,
            Variant::Writable => writable_tree::on_reread(self, new_root)?,
            Variant::Projection => projection::take_snapshot(self)?,
            Variant::Merge => {}
        }
        if public && variant == Variant::Merge {
            merge::reread_owned_inputs(self)?;
        }
        debug!(?variant, "reread barrier");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Write capability set; accepted by writable trees only.

    pub fn start(&self) -> Result<()> {
        writable_tree::start(self)
    }

    pub fn stop(&self) -> Result<()> {
        writable_tree::stop(self)
    }

    pub fn mkdir(&self, path: &str) -> Result<()> {
        writable_tree::mkdir(self, path)
    }

    pub fn mkdirp(&self, path: &str) -> Result<()> {
        writable_tree::mkdirp(self, path)
    }

    pub fn rmdir(&self, path: &str) -> Result<()> {
        writable_tree::rmdir(self, path)
    }

    pub fn unlink(&self, path: &str) -> Result<()> {
        writable_tree::unlink(self, path)
    }

    /// Remove `path`, dispatching to `unlink` for files and symlinks and to
    /// `rmdir` for directories.
    pub fn remove(&self, path: &str) -> Result<()> {
        writable_tree::remove(self, path)
    }

    /// Recursively remove the contents of directory `path`, but not the
    /// directory itself. Allowed on the root.
    pub fn empty(&self, path: &str) -> Result<()> {
        writable_tree::empty(self, path)
    }

    pub fn write_file(&self, path: &str, bytes: &[u8]) -> Result<()> {
        writable_tree::write_file(self, path, bytes)
    }

    /// Record a symlink to an external absolute path.
    pub fn symlink(&self, external_target: impl AsRef<Path>, path: &str) -> Result<()> {
        writable_tree::symlink(self, external_target.as_ref(), path)
    }

    /// Graft `target.chdir(target_path)` at `local`.
    ///
    /// With an empty `local` the tree's own root is symlinked over and the
    /// tree enters delegating mode; see [Tree::undo_root_symlink].
    pub fn symlink_to_facade(&self, target: &Tree, target_path: &str, local: &str) -> Result<()> {
        writable_tree::symlink_to_facade(self, target, target_path, local)
    }

    /// Leave delegating mode: re-integrate the delegate's changes into this
    /// tree's tracker and restore an empty root directory.
    pub fn undo_root_symlink(&self) -> Result<()> {
        writable_tree::undo_root_symlink(self)
    }

    // ------------------------------------------------------------------
    // Projection filter setters.

    pub fn set_files(&self, files: Option<Vec<String>>) -> Result<()> {
        projection::set_files(self, files)
    }

    pub fn set_include(&self, include: Vec<Matcher>) -> Result<()> {
        projection::set_include(self, include)
    }

    pub fn set_exclude(&self, exclude: Vec<Matcher>) -> Result<()> {
        projection::set_exclude(self, exclude)
    }

    // ------------------------------------------------------------------
    // Accessors.

    /// The on-disk root for source and writable trees.
    pub fn root(&self) -> Option<PathBuf> {
        let state = self.inner.borrow();
        match &state.kind {
            TreeKind::Source(s) => Some(s.root().to_path_buf()),
            TreeKind::Writable(w) => Some(w.root().to_path_buf()),
            _ => None,
        }
    }

    /// The disk directory this tree's contents live under, resolving
    /// through projections and delegation.
    pub(crate) fn disk_root(&self) -> Option<PathBuf> {
        let (variant_root, through): (Option<PathBuf>, Option<(Tree, String)>) = {
            let state = self.inner.borrow();
            match &state.kind {
                TreeKind::Source(s) => (Some(s.root().to_path_buf()), None),
                TreeKind::Writable(w) => match w.delegate() {
                    Some(view) => (None, Some((view.clone(), String::new()))),
                    None => (Some(w.root().to_path_buf()), None),
                },
                TreeKind::Projection(p) => (None, Some((p.parent().clone(), p.cwd().to_owned()))),
                _ => (None, None),
            }
        };
        if let Some(root) = variant_root {
            return Some(root);
        }
        let (parent, cwd) = through?;
        let base = parent.disk_root()?;
        if cwd.is_empty() {
            Some(base)
        } else {
            Some(base.join(cwd))
        }
    }

    // ------------------------------------------------------------------
    // Internal plumbing.

    pub(crate) fn variant(&self) -> Variant {
        match &self.inner.borrow().kind {
            TreeKind::Manual(_) => Variant::Manual,
            TreeKind::Source(_) => Variant::Source,
            TreeKind::Writable(_) => Variant::Writable,
            TreeKind::Projection(_) => Variant::Projection,
            TreeKind::Merge(_) => Variant::Merge,
        }
    }

    pub(crate) fn ptr_eq(a: &Tree, b: &Tree) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn register_child(&self, child: &Tree) {
        let mut state = self.inner.borrow_mut();
        state.children.retain(|w| w.upgrade().is_some());
        state.children.push(Rc::downgrade(&child.inner));
    }

    pub(crate) fn unregister_child(&self, child: &Tree) {
        let mut state = self.inner.borrow_mut();
        state.children.retain(|w| match w.upgrade() {
            Some(live) => !Rc::ptr_eq(&live, &child.inner),
            None => false,
        });
    }

    pub(crate) fn live_children(&self) -> Vec<Tree> {
        self.inner
            .borrow()
            .children
            .iter()
            .filter_map(|w| w.upgrade())
            .map(|inner| Tree { inner })
            .collect()
    }

    pub(crate) fn with_manual<R>(&self, f: impl FnOnce(&mut ManualTree) -> R) -> R {
        let mut state = self.inner.borrow_mut();
        match &mut state.kind {
            TreeKind::Manual(m) => f(m),
            _ => unreachable!("expected a manual tree"),
        }
    }

    pub(crate) fn with_source<R>(&self, f: impl FnOnce(&mut SourceState) -> R) -> R {
        let mut state = self.inner.borrow_mut();
        match &mut state.kind {
            TreeKind::Source(s) => f(s),
            _ => unreachable!("expected a source tree"),
        }
    }

    pub(crate) fn with_writable_state<R>(&self, f: impl FnOnce(&mut WritableState) -> R) -> R {
        let mut state = self.inner.borrow_mut();
        match &mut state.kind {
            TreeKind::Writable(w) => f(w),
            _ => unreachable!("expected a writable tree"),
        }
    }

    pub(crate) fn with_projection<R>(&self, f: impl FnOnce(&mut ProjectionState) -> R) -> R {
        let mut state = self.inner.borrow_mut();
        match &mut state.kind {
            TreeKind::Projection(p) => f(p),
            _ => unreachable!("expected a projection"),
        }
    }

    pub(crate) fn with_merge<R>(&self, f: impl FnOnce(&mut MergeState) -> R) -> R {
        let mut state = self.inner.borrow_mut();
        match &mut state.kind {
            TreeKind::Merge(m) => f(m),
            _ => unreachable!("expected a merge tree"),
        }
    }

    /// Like [Tree::with_writable_state] but surfaces a caller error on
    /// other variants.
    pub(crate) fn try_writable<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut WritableState) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.inner.borrow_mut();
        match &mut state.kind {
            TreeKind::Writable(w) => f(w),
            _ => Err(Error::WrongTreeKind {
                operation,
                required: "writable",
            }),
        }
    }

    pub(crate) fn try_projection<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut ProjectionState) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.inner.borrow_mut();
        match &mut state.kind {
            TreeKind::Projection(p) => f(p),
            _ => Err(Error::WrongTreeKind {
                operation,
                required: "projection",
            }),
        }
    }

}

fn require_dir(entries: &[Entry], path: &str) -> Result<()> {
    if path.is_empty() {
        return Ok(());
    }
    match paths::lookup(entries, path) {
        None => Err(Error::no_entry(path)),
        Some(e) if !e.is_dir() => Err(Error::NotDir {
            path: path.to_owned(),
        }),
        Some(_) => Ok(()),
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        match &state.kind {
            TreeKind::Manual(m) => f
                .debug_struct("ManualTree")
                .field("entries", &m.entries().len())
                .finish(),
            TreeKind::Source(s) => f
                .debug_struct("SourceTree")
                .field("root", &s.root())
                .finish(),
            TreeKind::Writable(w) => {
                let mut d = f.debug_struct("WritableTree");
                d.field("root", &w.root());
                if w.delegate().is_some() {
                    d.field("delegating", &true);
                }
                d.finish()
            }
            TreeKind::Projection(p) => f
                .debug_struct("Projection")
                .field("cwd", &p.cwd())
                .finish(),
            TreeKind::Merge(_) => f.debug_struct("MergeTree").finish(),
        }
    }
}
