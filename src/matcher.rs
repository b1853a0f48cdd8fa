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

//! Path matchers for projection filters.

use std::fmt;
use std::rc::Rc;

use globset::{Glob, GlobMatcher};
use regex::Regex;

use crate::errors::{Error, Result};

/// A single include/exclude matcher: a glob pattern, a regular expression,
/// or an arbitrary predicate over the relative path.
#[derive(Clone)]
pub enum Matcher {
    Glob {
        pattern: String,
        matcher: GlobMatcher,
    },
    Regex(Regex),
    Predicate(Rc<dyn Fn(&str) -> bool>),
}

impl Matcher {
    /// Compile a glob pattern.
    ///
    /// Glob syntax is the matcher library's default, where `*` may cross
    /// path separators.
    pub fn glob(pattern: &str) -> Result<Matcher> {
        let glob = Glob::new(pattern).map_err(|source| Error::InvalidGlob {
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(Matcher::Glob {
            pattern: pattern.to_owned(),
            matcher: glob.compile_matcher(),
        })
    }

    pub fn regex(regex: Regex) -> Matcher {
        Matcher::Regex(regex)
    }

    pub fn predicate(predicate: impl Fn(&str) -> bool + 'static) -> Matcher {
        Matcher::Predicate(Rc::new(predicate))
    }

    /// True if the matcher accepts `path`.
    pub fn is_match(&self, path: &str) -> bool {
        match self {
            Matcher::Glob { matcher, .. } => matcher.is_match(path),
            Matcher::Regex(regex) => regex.is_match(path),
            Matcher::Predicate(predicate) => predicate(path),
        }
    }

    /// True unless no descendant of directory `dir` can possibly match.
    ///
    /// Used for descent pruning: globs compare their leading literal
    /// components against the directory, and a wildcard anywhere in the
    /// consumed prefix defeats pruning because `*` may cross separators.
    /// Regexes and predicates always traverse.
    pub fn could_match_under(&self, dir: &str) -> bool {
        match self {
            Matcher::Glob { pattern, .. } => glob_could_match_under(pattern, dir),
            _ => true,
        }
    }
}

fn glob_could_match_under(pattern: &str, dir: &str) -> bool {
    if dir.is_empty() {
        return true;
    }
    let mut pattern_components = pattern.split('/');
    for dir_component in dir.split('/') {
        match pattern_components.next() {
            // Pattern fully consumed above this depth.
            None => return false,
            Some(p) => {
                if p.contains(['*', '?', '[']) {
                    return true;
                }
                if p != dir_component {
                    return false;
                }
            }
        }
    }
    // Every consumed component was an exactly matching literal; anything
    // left in the pattern applies below this directory.
    pattern_components.next().is_some()
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Glob { pattern, .. } => write!(f, "Glob({pattern:?})"),
            Matcher::Regex(regex) => write!(f, "Regex({:?})", regex.as_str()),
            Matcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}
