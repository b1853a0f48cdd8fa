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
use buildfs::{Error, MergeOptions, Tree};
use pretty_assertions::assert_eq;

fn overlapping_fixtures() -> (TreeFixture, TreeFixture) {
    let a = TreeFixture::new();
    a.create_dir("bar");
    a.create_file("bar/baz");
    a.create_file_with_contents("qux", b"from a");
    let b = TreeFixture::new();
    b.create_dir("c");
    b.create_file("c/d");
    b.create_file_with_contents("qux", b"from b");
    (a, b)
}

#[test]
fn overlapping_files_refuse_overwrite_by_default() {
    let (a, b) = overlapping_fixtures();
    let merged = Tree::merge(
        vec![a.path().into(), b.path().into()],
        MergeOptions::default(),
    )
    .unwrap();
    assert_matches!(
        merged.entries().unwrap_err(),
        Error::OverwriteRefused { ref path } if path == "qux"
    );
}

#[test]
fn later_inputs_win_when_overwrite_is_allowed() {
    let (a, b) = overlapping_fixtures();
    let merged = Tree::merge(
        vec![a.path().into(), b.path().into()],
        MergeOptions { overwrite: true },
    )
    .unwrap();
    let entries = merged.entries().unwrap();
    let paths: Vec<&str> = entries.iter().map(|e| e.relative_path.as_str()).collect();
    if buildfs::can_symlink() {
        // Directories owned by a single input are grafted, not recursed.
        assert_eq!(paths, ["bar", "c", "qux"]);
        assert!(entries[0].link_dir);
        assert!(entries[1].link_dir);
    } else {
        assert_eq!(paths, ["bar", "bar/baz", "c", "c/d", "qux"]);
    }
    assert_eq!(merged.read_file("qux").unwrap(), b"from b");
}

#[test]
fn directories_present_in_several_inputs_recurse() {
    let a = TreeFixture::new();
    a.create_dir("shared");
    a.create_file("shared/from-a");
    let b = TreeFixture::new();
    b.create_dir("shared");
    b.create_file("shared/from-b");
    let merged = Tree::merge(
        vec![a.path().into(), b.path().into()],
        MergeOptions::default(),
    )
    .unwrap();
    let paths = merged.paths().unwrap();
    assert_eq!(paths, ["shared", "shared/from-a", "shared/from-b"]);
    assert_eq!(merged.readdir("shared").unwrap(), ["from-a", "from-b"]);
}

#[test]
fn capitalization_conflicts_fail_regardless_of_overwrite() {
    let a = TreeFixture::new();
    a.create_file("File.txt");
    let b = TreeFixture::new();
    b.create_file("file.txt");
    for overwrite in [false, true] {
        let merged = Tree::merge(
            vec![a.path().into(), b.path().into()],
            MergeOptions { overwrite },
        )
        .unwrap();
        assert_matches!(
            merged.entries().unwrap_err(),
            Error::ConflictingCapitalization { .. }
        );
    }
}

#[test]
fn kind_conflicts_fail() {
    let a = TreeFixture::new();
    a.create_file("x");
    let b = TreeFixture::new();
    b.create_dir("x");
    let merged = Tree::merge(
        vec![a.path().into(), b.path().into()],
        MergeOptions { overwrite: true },
    )
    .unwrap();
    assert_matches!(
        merged.entries().unwrap_err(),
        Error::ConflictingFileType { ref path } if path == "x"
    );
}

#[test]
fn existing_trees_can_be_merge_inputs() {
    let a = TreeFixture::new();
    a.create_file("left");
    let b = TreeFixture::new();
    b.create_file("right");
    let tree_b = b.source_tree();
    let merged = Tree::merge(
        vec![a.path().into(), tree_b.clone().into()],
        MergeOptions::default(),
    )
    .unwrap();
    assert_eq!(merged.paths().unwrap(), ["left", "right"]);
    assert!(merged.exists("right").unwrap());
    assert!(merged.stat("left").unwrap().is_file());
}

#[test]
fn the_last_of_three_inputs_wins() {
    let fixtures: Vec<TreeFixture> = (0..3).map(|_| TreeFixture::new()).collect();
    for (i, tf) in fixtures.iter().enumerate() {
        tf.create_file_with_contents("shared.txt", format!("from {i}").as_bytes());
    }
    let merged = Tree::merge(
        fixtures.iter().map(|tf| tf.path().into()).collect(),
        MergeOptions { overwrite: true },
    )
    .unwrap();
    assert_eq!(merged.read_file("shared.txt").unwrap(), b"from 2");
    assert_eq!(merged.paths().unwrap(), ["shared.txt"]);
}

#[test]
fn projections_compose_over_merges() {
    let a = TreeFixture::new();
    a.create_dir("shared");
    a.create_file("shared/one.js");
    let b = TreeFixture::new();
    b.create_dir("shared");
    b.create_file("shared/two.txt");
    let merged = Tree::merge(
        vec![a.path().into(), b.path().into()],
        MergeOptions::default(),
    )
    .unwrap();
    let view = merged.chdir("shared").unwrap();
    assert_eq!(view.paths().unwrap(), ["one.js", "two.txt"]);
    assert_eq!(view.readdir("").unwrap(), ["one.js", "two.txt"]);
}

#[cfg(unix)]
#[test]
fn changes_surface_symlink_through_transitions() {
    let a = TreeFixture::new();
    a.create_dir("d");
    a.create_file("d/from-a");
    let b = TreeFixture::new();
    let merged = Tree::merge(
        vec![a.path().into(), b.path().into()],
        MergeOptions::default(),
    )
    .unwrap();

    // First build: `d` lives in one input only, so it is grafted.
    let first: Vec<String> = merged
        .changes()
        .unwrap()
        .iter()
        .map(|c| format!("{c:?}"))
        .collect();
    assert_eq!(first, ["mkdir d"]);

    // `d` appears in the second input too; after the barrier the graft
    // must dissolve into a recursive merge.
    b.create_dir("d");
    b.create_file("d/from-b");
    merged.reread().unwrap();
    let second: Vec<String> = merged
        .changes()
        .unwrap()
        .iter()
        .map(|c| format!("{c:?}"))
        .collect();
    assert_eq!(second, ["change d", "create d/from-a", "create d/from-b"]);
}
