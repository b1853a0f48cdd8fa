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

//! Live change tracking for writable trees.
//!
//! Changes are nodes of a doubly-linked list held in an arena with stable
//! indices, plus an `(op, path)` map for O(1) collapse lookups. Each new
//! operation is collapsed against its algebraic inverse at track time, so
//! the accumulated list approximates what a snapshot diff would produce.

use std::collections::HashMap;

use tracing::trace;

use crate::entry::Entry;
use crate::patch::{sort_canonical, Change, Op, Patch};

#[derive(Debug)]
struct Node {
    op: Op,
    entry: Entry,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Accumulates the operations applied to a writable tree since `start`.
#[derive(Default)]
pub struct ChangeTracker {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    index: HashMap<(Op, String), usize>,
    len: usize,
}

impl ChangeTracker {
    pub fn new() -> ChangeTracker {
        ChangeTracker::default()
    }

    pub fn clear(&mut self) {
        *self = ChangeTracker::default();
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Record one operation, applying the collapsing rules.
    ///
    /// The rewrites are exactly those that remain sound under any further
    /// operation:
    ///
    /// | prior  | new    | result                      |
    /// |--------|--------|-----------------------------|
    /// | unlink | create | change                      |
    /// | change | change | change                      |
    /// | create | change | create (carrying new entry) |
    /// | rmdir  | mkdir  | nothing                     |
    /// | mkdir  | rmdir  | nothing                     |
    /// | change | unlink | unlink                      |
    /// | create | unlink | nothing                     |
    pub fn track(&mut self, op: Op, entry: Entry) {
        let path = entry.relative_path.clone();
        match op {
            Op::Create => {
                if self.remove_node(Op::Unlink, &path) {
                    trace!(%path, "unlink then create collapses to change");
                    self.push(Op::Change, entry);
                    return;
                }
            }
            Op::Change => {
                if self.remove_node(Op::Change, &path) {
                    self.push(Op::Change, entry);
                    return;
                }
                if self.remove_node(Op::Create, &path) {
                    trace!(%path, "create then change collapses to create");
                    self.push(Op::Create, entry);
                    return;
                }
            }
            Op::Mkdir => {
                if self.remove_node(Op::Rmdir, &path) {
                    trace!(%path, "rmdir then mkdir cancels out");
                    return;
                }
            }
            Op::Rmdir => {
                if self.remove_node(Op::Mkdir, &path) {
                    trace!(%path, "mkdir then rmdir cancels out");
                    return;
                }
            }
            Op::Unlink => {
                if self.remove_node(Op::Change, &path) {
                    trace!(%path, "change then unlink collapses to unlink");
                    self.push(Op::Unlink, entry);
                    return;
                }
                if self.remove_node(Op::Create, &path) {
                    trace!(%path, "create then unlink cancels out");
                    return;
                }
            }
        }
        self.push(op, entry);
    }

    /// The tracked changes in canonical patch order.
    pub fn changes(&self) -> Patch {
        let mut patch = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(ix) = cursor {
            let node = self.nodes[ix].as_ref().expect("cursor points at live node");
            patch.push(Change::new(node.op, node.entry.clone()));
            cursor = node.next;
        }
        sort_canonical(&mut patch);
        patch
    }

    fn push(&mut self, op: Op, entry: Entry) {
        let path = entry.relative_path.clone();
        let node = Node {
            op,
            entry,
            prev: self.tail,
            next: None,
        };
        let ix = match self.free.pop() {
            Some(ix) => {
                self.nodes[ix] = Some(node);
                ix
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        match self.tail {
            Some(tail) => self.nodes[tail].as_mut().expect("tail is live").next = Some(ix),
            None => self.head = Some(ix),
        }
        self.tail = Some(ix);
        self.index.insert((op, path), ix);
        self.len += 1;
    }

    /// Unlink and discard the node for `(op, path)`; true if one existed.
    fn remove_node(&mut self, op: Op, path: &str) -> bool {
        let Some(ix) = self.index.remove(&(op, path.to_owned())) else {
            return false;
        };
        let node = self.nodes[ix].take().expect("indexed node is live");
        match node.prev {
            Some(prev) => self.nodes[prev].as_mut().expect("prev is live").next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes[next].as_mut().expect("next is live").prev = node.prev,
            None => self.tail = node.prev,
        }
        self.free.push(ix);
        self.len -= 1;
        true
    }
}
