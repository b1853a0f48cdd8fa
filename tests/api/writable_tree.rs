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

use assert_matches::assert_matches;
use buildfs::test_fixtures::TreeFixture;
use buildfs::Error;
use pretty_assertions::assert_eq;

fn rendered(patch: &buildfs::Patch) -> Vec<String> {
    patch.iter().map(|c| format!("{c:?}")).collect()
}

/// The standard fixture used throughout: one file, one directory.
fn fixture() -> TreeFixture {
    let tf = TreeFixture::new();
    tf.create_file("hello.txt");
    tf.create_dir("my-directory");
    tf
}

#[test]
fn construction_scans_existing_contents() {
    let tf = fixture();
    let tree = tf.writable_tree();
    assert_eq!(tree.paths().unwrap(), ["hello.txt", "my-directory"]);
    assert!(tree.changes().unwrap().is_empty());
}

#[test]
fn mkdir_then_rmdir_tracks_nothing() {
    let tf = fixture();
    let tree = tf.writable_tree();
    tree.mkdir("foo").unwrap();
    tree.rmdir("foo").unwrap();
    assert!(tree.changes().unwrap().is_empty());
    assert_eq!(tree.paths().unwrap(), ["hello.txt", "my-directory"]);
    assert!(!tf.path().join("foo").exists());
}

#[test]
fn unlink_then_write_tracks_a_single_change() {
    let tf = fixture();
    let tree = tf.writable_tree();
    tree.unlink("hello.txt").unwrap();
    tree.write_file("hello.txt", b"new").unwrap();
    assert_eq!(rendered(&tree.changes().unwrap()), ["change hello.txt"]);
    assert_eq!(tree.read_file("hello.txt").unwrap(), b"new");
}

#[test]
fn rewriting_identical_content_is_a_no_op() {
    let tf = fixture();
    let tree = tf.writable_tree();
    tree.write_file("fresh.txt", b"same bytes").unwrap();
    let first = tree.stat("fresh.txt").unwrap();
    tree.write_file("fresh.txt", b"same bytes").unwrap();
    let second = tree.stat("fresh.txt").unwrap();
    assert_eq!(first.mtime, second.mtime);
    assert_eq!(first.size, second.size);
    assert_eq!(rendered(&tree.changes().unwrap()), ["create fresh.txt"]);
}

#[test]
fn write_preserves_prior_mode() {
    let tf = fixture();
    let tree = tf.writable_tree();
    let before = tree.stat("hello.txt").unwrap();
    tree.write_file("hello.txt", b"different").unwrap();
    let after = tree.stat("hello.txt").unwrap();
    assert_eq!(before.mode, after.mode);
    assert!(after.checksum.is_some());
}

#[test]
fn mkdirp_creates_the_whole_chain_once() {
    let tf = fixture();
    let tree = tf.writable_tree();
    tree.mkdirp("a/b/c").unwrap();
    assert_eq!(
        rendered(&tree.changes().unwrap()),
        ["mkdir a", "mkdir a/b", "mkdir a/b/c"]
    );
    // Idempotent on an existing directory.
    tree.mkdirp("a/b/c").unwrap();
    assert_eq!(tree.changes().unwrap().len(), 3);
    assert_matches!(tree.mkdirp("hello.txt/sub").unwrap_err(), Error::NotDir { .. });
}

#[test]
fn write_errors() {
    let tf = fixture();
    let tree = tf.writable_tree();
    assert_matches!(tree.mkdir("my-directory").unwrap_err(), Error::Exists { .. });
    assert_matches!(tree.mkdir("ghost/sub").unwrap_err(), Error::NoEntry { .. });
    assert_matches!(tree.rmdir("ghost").unwrap_err(), Error::NoEntry { .. });
    assert_matches!(tree.rmdir("hello.txt").unwrap_err(), Error::NotDir { .. });
    assert_matches!(tree.unlink("ghost").unwrap_err(), Error::NoEntry { .. });
    assert_matches!(tree.unlink("my-directory").unwrap_err(), Error::Eperm { .. });
    assert_matches!(tree.mkdir("").unwrap_err(), Error::InvalidPath { .. });
    assert_matches!(tree.mkdir("../escape").unwrap_err(), Error::InvalidPath { .. });

    tree.mkdir("full").unwrap();
    tree.write_file("full/inner", b"x").unwrap();
    assert_matches!(tree.rmdir("full").unwrap_err(), Error::NotEmpty { .. });

    let eperm = tree.unlink("my-directory").unwrap_err().to_string();
    assert!(eperm.starts_with("EPERM:"), "{eperm}");
}

#[test]
fn writes_on_non_writable_trees_are_rejected() {
    let tf = fixture();
    let tree = tf.source_tree();
    assert_matches!(tree.mkdir("x").unwrap_err(), Error::WrongTreeKind { .. });
    assert_matches!(
        tree.write_file("x", b"y").unwrap_err(),
        Error::WrongTreeKind { .. }
    );
}

#[test]
fn stop_rejects_writes_but_allows_reads() {
    let tf = fixture();
    let tree = tf.writable_tree();
    tree.write_file("before.txt", b"x").unwrap();
    tree.stop().unwrap();
    assert_matches!(tree.mkdir("nope").unwrap_err(), Error::Stopped);
    assert_matches!(tree.write_file("nope", b"x").unwrap_err(), Error::Stopped);
    assert_eq!(
        tree.paths().unwrap(),
        ["before.txt", "hello.txt", "my-directory"]
    );
    // A fresh start clears the tracker.
    tree.start().unwrap();
    assert!(tree.changes().unwrap().is_empty());
    tree.mkdir("again").unwrap();
    assert_eq!(rendered(&tree.changes().unwrap()), ["mkdir again"]);
}

#[test]
fn remove_dispatches_by_kind() {
    let tf = fixture();
    let tree = tf.writable_tree();
    tree.remove("hello.txt").unwrap();
    tree.remove("my-directory").unwrap();
    assert!(tree.paths().unwrap().is_empty());
    assert_matches!(tree.remove("ghost").unwrap_err(), Error::NoEntry { .. });
}

#[test]
fn empty_removes_contents_but_not_the_directory() {
    let tf = TreeFixture::new();
    tf.create_dir("keep");
    tf.create_file("keep/one");
    tf.create_dir("keep/sub");
    tf.create_file("keep/sub/two");
    tf.create_file("outside");
    let tree = tf.writable_tree();
    tree.empty("keep").unwrap();
    assert_eq!(tree.paths().unwrap(), ["keep", "outside"]);
    assert!(tf.path().join("keep").is_dir());
    assert_eq!(
        rendered(&tree.changes().unwrap()),
        ["unlink keep/sub/two", "rmdir keep/sub", "unlink keep/one"]
    );
}

#[test]
fn empty_is_allowed_on_the_root() {
    let tf = fixture();
    let tree = tf.writable_tree();
    tree.empty("").unwrap();
    assert!(tree.paths().unwrap().is_empty());
    assert!(tf.path().is_dir());
    assert_eq!(tree.changes().unwrap().len(), 2);
}

#[test]
fn entries_stay_sorted_through_mutation() {
    let tf = fixture();
    let tree = tf.writable_tree();
    tree.mkdir("zebra").unwrap();
    tree.write_file("apple", b"a").unwrap();
    tree.mkdirp("mid/way").unwrap();
    tree.write_file("mid/way/file", b"f").unwrap();
    tree.unlink("hello.txt").unwrap();
    let entries = tree.entries().unwrap();
    assert!(entries.windows(2).all(|w| w[0].relative_path < w[1].relative_path));
}

#[cfg(unix)]
#[test]
fn external_symlink_reads_through_to_the_target() {
    let other = TreeFixture::new();
    other.create_file_with_contents("payload", b"external bytes");
    let tf = fixture();
    let tree = tf.writable_tree();
    tree.symlink(other.path().join("payload"), "ln").unwrap();
    let entry = tree.stat("ln").unwrap();
    assert!(entry.is_file());
    assert!(entry.is_link());
    assert_eq!(tree.read_file("ln").unwrap(), b"external bytes");
    assert_eq!(rendered(&tree.changes().unwrap()), ["create ln"]);
    tree.unlink("ln").unwrap();
    assert!(tree.changes().unwrap().is_empty());
    // The link target is untouched.
    assert_eq!(other.source_tree().paths().unwrap(), ["payload"]);
}

#[test]
fn writes_into_subdirectories() {
    let tf = fixture();
    let tree = tf.writable_tree();
    tree.write_file("my-directory/note.txt", b"nested").unwrap();
    assert_eq!(tree.read_file("my-directory/note.txt").unwrap(), b"nested");
    assert_eq!(tree.readdir("my-directory").unwrap(), ["note.txt"]);
    assert_eq!(
        rendered(&tree.changes().unwrap()),
        ["create my-directory/note.txt"]
    );
}

#[test]
fn mixed_operations_emit_a_canonical_patch() {
    let tf = fixture();
    let tree = tf.writable_tree();
    tree.mkdirp("out/assets").unwrap();
    tree.write_file("out/assets/app.js", b"code").unwrap();
    tree.unlink("hello.txt").unwrap();
    tree.write_file("out/index.html", b"<html>").unwrap();
    assert_eq!(
        rendered(&tree.changes().unwrap()),
        [
            "unlink hello.txt",
            "mkdir out",
            "mkdir out/assets",
            "create out/assets/app.js",
            "create out/index.html",
        ]
    );
}

#[test]
fn mkdirp_reuses_existing_prefixes() {
    let tf = fixture();
    let tree = tf.writable_tree();
    tree.mkdirp("my-directory/deep/deeper").unwrap();
    assert_eq!(
        rendered(&tree.changes().unwrap()),
        ["mkdir my-directory/deep", "mkdir my-directory/deep/deeper"]
    );
}

#[test]
fn reread_rejects_root_changes() {
    let tf = fixture();
    let tree = tf.writable_tree();
    tree.reread().unwrap();
    let other = TreeFixture::new();
    assert_matches!(
        tree.reread_with_root(other.path()).unwrap_err(),
        Error::InvalidPath { .. }
    );
}
