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
use buildfs::{Error, FilterOptions, Matcher};
use pretty_assertions::assert_eq;
use regex::Regex;

#[test]
fn cwd_plus_include_glob() {
    let tf = TreeFixture::new();
    tf.create_dir("my-directory");
    tf.create_file("my-directory/bar.js");
    tf.create_file("my-directory/foo.txt");
    tf.create_dir("my-directory/subdir");
    tf.create_file("my-directory/subdir/baz.js");
    tf.create_file("unrelated.js");
    let parent = tf.source_tree();
    let view = parent
        .filtered(FilterOptions {
            cwd: Some("my-directory".to_owned()),
            include: vec![Matcher::glob("*.js").unwrap()],
            ..FilterOptions::default()
        })
        .unwrap();
    assert_eq!(view.paths().unwrap(), ["bar.js", "subdir", "subdir/baz.js"]);
}

#[test]
fn an_unfiltered_projection_equals_its_parent() {
    let tf = TreeFixture::new();
    tf.create_dir("a");
    tf.create_file("a/one");
    tf.create_dir("a/empty");
    tf.create_file("two");
    let parent = tf.source_tree();
    let view = parent.filtered(FilterOptions::default()).unwrap();
    assert_eq!(view.paths().unwrap(), parent.paths().unwrap());
}

#[test]
fn chdir_scopes_paths() {
    let tf = TreeFixture::new();
    tf.create_dir("sub");
    tf.create_file_with_contents("sub/inner.txt", b"scoped");
    tf.create_file("outside.txt");
    let parent = tf.source_tree();
    let view = parent.chdir("sub").unwrap();
    assert_eq!(view.paths().unwrap(), ["inner.txt"]);
    assert_eq!(view.read_file("inner.txt").unwrap(), b"scoped");
    assert!(!view.exists("outside.txt").unwrap());

    assert_matches!(parent.chdir("missing").unwrap_err(), Error::NoEntry { .. });
    assert_matches!(
        parent.chdir("outside.txt").unwrap_err(),
        Error::NotDir { .. }
    );
}

#[test]
fn excluded_directories_prune_their_subtrees() {
    let tf = TreeFixture::new();
    tf.create_dir("secret");
    tf.create_file("secret/inner.js");
    tf.create_file("open.js");
    let parent = tf.source_tree();
    let view = parent
        .filtered(FilterOptions {
            exclude: vec![Matcher::glob("secret").unwrap()],
            ..FilterOptions::default()
        })
        .unwrap();
    assert_eq!(view.paths().unwrap(), ["open.js"]);
    // The excluded directory's children are invisible to stat as well.
    assert_matches!(view.stat("secret/inner.js").unwrap_err(), Error::NoEntry { .. });
}

#[test]
fn regex_and_predicate_matchers() {
    let tf = TreeFixture::new();
    tf.create_file("notes.txt");
    tf.create_file("notes.md");
    tf.create_file("keep.me");
    let parent = tf.source_tree();
    let view = parent
        .filtered(FilterOptions {
            include: vec![
                Matcher::regex(Regex::new(r"\.txt$").unwrap()),
                Matcher::predicate(|p| p.ends_with(".me")),
            ],
            ..FilterOptions::default()
        })
        .unwrap();
    assert_eq!(view.paths().unwrap(), ["keep.me", "notes.txt"]);
}

#[test]
fn files_filter_lists_exactly_those_files() {
    let tf = TreeFixture::new();
    tf.create_file("a.txt");
    tf.create_file("skip.txt");
    tf.create_dir("sub");
    tf.create_file("sub/b.txt");
    tf.create_file("sub/skip-too.txt");
    let parent = tf.source_tree();
    let view = parent
        .filtered(FilterOptions {
            files: Some(vec!["a.txt".to_owned(), "sub/b.txt".to_owned()]),
            ..FilterOptions::default()
        })
        .unwrap();
    // The listed files' ancestor directory is surfaced with them.
    assert_eq!(view.paths().unwrap(), ["a.txt", "sub", "sub/b.txt"]);
}

#[test]
fn files_and_matchers_are_mutually_exclusive() {
    let tf = TreeFixture::new();
    let parent = tf.source_tree();
    assert_matches!(
        parent
            .filtered(FilterOptions {
                files: Some(vec!["a".to_owned()]),
                include: vec![Matcher::glob("*").unwrap()],
                ..FilterOptions::default()
            })
            .unwrap_err(),
        Error::IncompatibleFilters
    );

    let view = parent.filtered(FilterOptions::default()).unwrap();
    view.set_files(Some(vec!["a".to_owned()])).unwrap();
    assert_matches!(
        view.set_include(vec![Matcher::glob("*").unwrap()]).unwrap_err(),
        Error::IncompatibleFilters
    );
    view.set_files(None).unwrap();
    view.set_include(vec![Matcher::glob("*").unwrap()]).unwrap();
    assert_matches!(
        view.set_files(Some(vec!["a".to_owned()])).unwrap_err(),
        Error::IncompatibleFilters
    );
}

#[test]
fn setters_are_rejected_on_other_tree_kinds() {
    let tf = TreeFixture::new();
    let tree = tf.source_tree();
    assert_matches!(
        tree.set_files(None).unwrap_err(),
        Error::WrongTreeKind { .. }
    );
}

#[test]
fn empty_ancestor_directories_are_not_surfaced() {
    let tf = TreeFixture::new();
    tf.create_dir("only-losers");
    tf.create_file("only-losers/nope.txt");
    tf.create_dir("winners");
    tf.create_file("winners/yes.js");
    let parent = tf.source_tree();
    let view = parent
        .filtered(FilterOptions {
            include: vec![Matcher::glob("*.js").unwrap()],
            ..FilterOptions::default()
        })
        .unwrap();
    assert_eq!(view.paths().unwrap(), ["winners", "winners/yes.js"]);
}

#[test]
fn projections_nest() {
    let tf = TreeFixture::new();
    tf.create_dir("a");
    tf.create_dir("a/b");
    tf.create_file_with_contents("a/b/leaf.txt", b"deep");
    let parent = tf.source_tree();
    let inner = parent.chdir("a").unwrap().chdir("b").unwrap();
    assert_eq!(inner.paths().unwrap(), ["leaf.txt"]);
    assert_eq!(inner.read_file("leaf.txt").unwrap(), b"deep");
    assert!(inner.stat("leaf.txt").unwrap().is_file());
}

#[test]
fn changes_diff_against_the_reread_snapshot() {
    let tf = TreeFixture::new();
    tf.create_dir("scope");
    tf.create_file("scope/a.js");
    tf.create_file("scope/ignored.txt");
    let parent = tf.source_tree();
    let view = parent
        .filtered(FilterOptions {
            cwd: Some("scope".to_owned()),
            include: vec![Matcher::glob("*.js").unwrap()],
            ..FilterOptions::default()
        })
        .unwrap();

    // First build: everything visible is new.
    let first: Vec<String> = view.changes().unwrap().iter().map(|c| format!("{c:?}")).collect();
    assert_eq!(first, ["create a.js"]);

    // The barrier on the parent snapshots the projection, then new files
    // appear on disk.
    parent.reread().unwrap();
    tf.create_file("scope/b.js");
    tf.create_file("scope/more-ignored.txt");
    let second: Vec<String> = view.changes().unwrap().iter().map(|c| format!("{c:?}")).collect();
    assert_eq!(second, ["create b.js"]);
}
