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
use buildfs::paths::{ancestors, basename, common_prefix, is_ancestor_of, join, parent};
use buildfs::{normalize, Error};

#[test]
fn normalize_folds_and_collapses() {
    assert_eq!(normalize("a/./b//c").unwrap(), "a/b/c");
    assert_eq!(normalize("a/b/../c").unwrap(), "a/c");
    assert_eq!(normalize("dir/").unwrap(), "dir");
    assert_eq!(normalize("").unwrap(), "");
}

#[test]
fn escaping_the_root_is_invalid() {
    assert_matches!(normalize("../up").unwrap_err(), Error::InvalidPath { .. });
    assert_matches!(
        normalize("a/../../up").unwrap_err(),
        Error::InvalidPath { .. }
    );
    let message = normalize("../up").unwrap_err().to_string();
    assert!(message.starts_with("EINVAL:"), "{message}");
}

#[test]
fn structural_helpers() {
    assert_eq!(parent("a/b/c"), Some("a/b"));
    assert_eq!(parent("top"), Some(""));
    assert_eq!(parent(""), None);
    assert_eq!(basename("a/b/c"), "c");
    assert_eq!(join("a", "b"), "a/b");
    assert_eq!(join("", "b"), "b");
    assert_eq!(join("a", ""), "a");
    assert_eq!(ancestors("a/b/c").collect::<Vec<_>>(), ["a/b", "a"]);
    assert!(is_ancestor_of("", "x"));
    assert!(is_ancestor_of("x", "x/y"));
    assert!(!is_ancestor_of("x", "xy"));
    assert_eq!(common_prefix("a/b/one", "a/b/two"), "a/b");
    assert_eq!(common_prefix("left", "right"), "");
}
