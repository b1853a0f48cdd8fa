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

//! Tests for the buildfs library API.

mod merge;
mod paths;
mod projection;
mod source_tree;
mod writable_tree;
