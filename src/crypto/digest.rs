//
// Copyright 2021 The Sigstore Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Artifact digesting. The core only ever produces SHA-256 digests, but the
//! algorithm tag is carried explicitly so a [`Digest`] is self-describing
//! once it ends up inside a [`crate::sign::SigningBundle`].

use std::io::Read;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha256,
}

/// An `(algorithm, bytes)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub algorithm: DigestAlgorithm,
    pub bytes: Vec<u8>,
}

impl Digest {
    /// Hashes a byte span with SHA-256.
    pub fn sha256(data: &[u8]) -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha256,
            bytes: Sha256::digest(data).to_vec(),
        }
    }

    /// Hashes a reader's contents with SHA-256, streaming in fixed chunks so
    /// large artifacts don't need to be buffered in memory.
    pub fn sha256_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self {
            algorithm: DigestAlgorithm::Sha256,
            bytes: hasher.finalize().to_vec(),
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}:{}", self.algorithm, self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_artifact_digest_matches_known_constant() {
        let digest = Digest::sha256(b"");
        assert_eq!(
            digest.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hello_and_world_digests_differ() {
        let hello = Digest::sha256(b"hello");
        let world = Digest::sha256(b"world");
        assert_ne!(hello, world);
        assert_eq!(
            hello.to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn reader_digest_matches_slice_digest() {
        let data = b"hello";
        let from_slice = Digest::sha256(data);
        let from_reader = Digest::sha256_reader(&data[..]).unwrap();
        assert_eq!(from_slice, from_reader);
    }
}
