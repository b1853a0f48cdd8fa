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

//! Content hash type for written files.
//!
//! Writable trees hash file bodies so that rewriting identical content can be
//! detected and skipped without touching the disk.

use std::fmt;

use blake2_rfc::blake2b::blake2b;

/// Length of the stored content hash.
pub const HASH_SIZE_BYTES: usize = 32;

/// The hash of one file's content.
///
/// Stored in memory as compact bytes, rendered as hex in listings and the
/// change format.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ContentHash {
    bin: [u8; HASH_SIZE_BYTES],
}

impl ContentHash {
    pub fn of_bytes(bytes: &[u8]) -> ContentHash {
        let result = blake2b(HASH_SIZE_BYTES, &[], bytes);
        let mut bin = [0u8; HASH_SIZE_BYTES];
        bin.copy_from_slice(result.as_bytes());
        ContentHash { bin }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bin
    }

    pub fn hex(&self) -> String {
        hex::encode(self.bin)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.hex())
    }
}
