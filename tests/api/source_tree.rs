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
use buildfs::{Error, Tree};
use pretty_assertions::assert_eq;

#[test]
fn entries_are_sorted_and_complete() {
    let tf = TreeFixture::new();
    tf.create_file("bba");
    tf.create_file("aaa");
    tf.create_dir("jam");
    tf.create_file("jam/apricot");
    tf.create_dir("jelly");
    let tree = tf.source_tree();
    assert_eq!(
        tree.paths().unwrap(),
        ["aaa", "bba", "jam", "jam/apricot", "jelly"]
    );
    let entries = tree.entries().unwrap();
    assert!(entries.windows(2).all(|w| w[0].relative_path < w[1].relative_path));
}

#[test]
fn stat_and_readdir() {
    let tf = TreeFixture::new();
    tf.create_dir("sub");
    tf.create_file_with_contents("sub/file.txt", b"body");
    let tree = tf.source_tree();

    let entry = tree.stat("sub/file.txt").unwrap();
    assert!(entry.is_file());
    assert_eq!(entry.size, Some(4));

    assert_eq!(tree.readdir("").unwrap(), ["sub"]);
    assert_eq!(tree.readdir("sub").unwrap(), ["file.txt"]);
    assert_matches!(tree.readdir("ghost").unwrap_err(), Error::NoEntry { .. });
    assert_matches!(
        tree.readdir("sub/file.txt").unwrap_err(),
        Error::NotDir { .. }
    );
    assert_eq!(tree.read_file("sub/file.txt").unwrap(), b"body");
    assert_matches!(tree.read_file("sub").unwrap_err(), Error::IsDir { .. });
}

#[test]
fn exists_does_not_force_a_scan() {
    let tf = TreeFixture::new();
    tf.create_dir("deep");
    tf.create_file("deep/present");
    let tree = tf.source_tree();
    // Nothing has been scanned yet; existence is answered from the disk.
    assert!(tree.exists("deep/present").unwrap());
    assert!(!tree.exists("deep/absent").unwrap());
    assert!(tree.exists("").unwrap());
}

#[cfg(unix)]
#[test]
fn broken_symlinks_are_discarded() {
    let tf = TreeFixture::new();
    tf.create_file("real");
    tf.create_symlink("dangling", "nowhere-at-all");
    let tree = tf.source_tree();
    assert_eq!(tree.paths().unwrap(), ["real"]);
}

#[cfg(unix)]
#[test]
fn symlinked_file_carries_external_link() {
    let other = TreeFixture::new();
    other.create_file_with_contents("target.txt", b"linked body");
    let tf = TreeFixture::new();
    tf.create_symlink("ln", other.path().join("target.txt").to_str().unwrap());
    let tree = tf.source_tree();
    let entry = tree.stat("ln").unwrap();
    assert!(entry.is_file());
    assert!(entry.is_link());
    assert_eq!(tree.read_file("ln").unwrap(), b"linked body");
}

#[test]
fn first_changes_reports_everything_as_added() {
    let tf = TreeFixture::new();
    tf.create_dir("d");
    tf.create_file("d/f");
    let tree = tf.source_tree();
    let rendered: Vec<String> = tree
        .changes()
        .unwrap()
        .iter()
        .map(|c| format!("{c:?}"))
        .collect();
    assert_eq!(rendered, ["mkdir d", "create d/f"]);
}

#[test]
fn reread_surfaces_modifications() {
    let tf = TreeFixture::new();
    tf.create_file("hello.txt");
    tf.create_file("stable.txt");
    tf.set_mtime("hello.txt", 1_600_000_000);
    tf.set_mtime("stable.txt", 1_600_000_000);
    let tree = tf.source_tree();
    tree.entries().unwrap();
    tree.changes().unwrap();

    tree.reread().unwrap();
    tf.set_mtime("hello.txt", 1_700_000_000);
    tf.create_file("new.txt");

    let rendered: Vec<String> = tree
        .changes()
        .unwrap()
        .iter()
        .map(|c| format!("{c:?}"))
        .collect();
    assert_eq!(rendered, ["change hello.txt", "create new.txt"]);
}

#[test]
fn reread_can_move_the_root() {
    let before = TreeFixture::new();
    before.create_file("old.txt");
    let after = TreeFixture::new();
    after.create_file("new.txt");
    let tree = Tree::source(before.path()).unwrap();
    tree.entries().unwrap();
    tree.changes().unwrap();

    tree.reread_with_root(after.path()).unwrap();
    let rendered: Vec<String> = tree
        .changes()
        .unwrap()
        .iter()
        .map(|c| format!("{c:?}"))
        .collect();
    assert_eq!(rendered, ["unlink old.txt", "create new.txt"]);
}

#[test]
fn roots_must_be_absolute_existing_directories() {
    assert_matches!(
        Tree::source("relative/path").unwrap_err(),
        Error::InvalidPath { .. }
    );
    let tf = TreeFixture::new();
    tf.create_file("plain");
    assert_matches!(
        Tree::source(tf.path().join("missing")).unwrap_err(),
        Error::Io { .. }
    );
    assert_matches!(
        Tree::source(tf.path().join("plain")).unwrap_err(),
        Error::NotDir { .. }
    );
}
