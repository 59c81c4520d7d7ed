// SPDX-License-Identifier: Apache-2.0

//! Incremental hashers and typed digests for the two hash spaces the rest of
//! the engine moves content between: the native hash (Git's SHA-1, with the
//! `blob <size>\0` / `tree <size>\0` object header folded in) and the
//! compatible hash (plain SHA-256 of the raw bytes).

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("hash hex length {actual} does not match {hash_type:?} (expected {expected})")]
    WrongLength {
        hash_type: HashType,
        expected: usize,
        actual: usize,
    },
    #[error("hex digest contains non-hex characters")]
    InvalidHex,
    #[error("is_tree is only meaningful for the native hash, not {0:?}")]
    TreeFlagOnCompatibleHash(HashType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    /// Git's object hash: SHA-1 over `<kind> <size>\0<content>`.
    GitSha1,
    /// Plain SHA-256 over the raw content, no object header.
    Sha256,
}

impl HashType {
    fn hex_len(self) -> usize {
        match self {
            HashType::GitSha1 => 40,
            HashType::Sha256 => 64,
        }
    }
}

/// A typed, validated content digest: (hash-hex, size, is-tree). `is_tree`
/// is meaningful only under `HashType::GitSha1`; constructing one with
/// `Sha256` rejects it rather than silently ignoring it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    hash_type: HashType,
    hex: String,
    size: u64,
    is_tree: bool,
}

impl Digest {
    pub fn new(hash_type: HashType, hex: impl Into<String>, size: u64, is_tree: bool) -> Result<Self, HashError> {
        let hex = hex.into();
        if hex.len() != hash_type.hex_len() {
            return Err(HashError::WrongLength {
                hash_type,
                expected: hash_type.hex_len(),
                actual: hex.len(),
            });
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex);
        }
        if is_tree && hash_type != HashType::GitSha1 {
            return Err(HashError::TreeFlagOnCompatibleHash(hash_type));
        }
        Ok(Self {
            hash_type,
            hex,
            size,
            is_tree,
        })
    }

    pub fn hash_type(&self) -> HashType {
        self.hash_type
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_tree(&self) -> bool {
        self.is_tree
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// An in-progress hash computation. Produced by [`hasher`]; finalizing
/// consumes it.
pub enum Hasher {
    GitSha1(Sha1),
    Sha256(Sha256),
}

pub fn hasher(hash_type: HashType) -> Hasher {
    match hash_type {
        HashType::GitSha1 => Hasher::GitSha1(Sha1::new()),
        HashType::Sha256 => Hasher::Sha256(Sha256::new()),
    }
}

impl Hasher {
    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            Hasher::GitSha1(h) => sha1::Digest::update(h, bytes),
            Hasher::Sha256(h) => h.update(bytes),
        }
    }

    pub fn hash_type(&self) -> HashType {
        match self {
            Hasher::GitSha1(_) => HashType::GitSha1,
            Hasher::Sha256(_) => HashType::Sha256,
        }
    }

    /// Finalizes the hash, returning the raw digest bytes.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::GitSha1(h) => sha1::Digest::finalize(h).to_vec(),
            Hasher::Sha256(h) => h.finalize().to_vec(),
        }
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.finalize())
    }
}

fn git_object_header(kind: &str, len: usize) -> Vec<u8> {
    let mut header = format!("{kind} {len}\0").into_bytes();
    header.reserve(len);
    header
}

/// Hashes `bytes` as a Git blob: native hash of `blob <len>\0<bytes>`,
/// `is_tree = false`. Stored digests never carry this header; it exists
/// only inside the hash computation.
pub fn hash_bytes_as_blob(bytes: &[u8]) -> Digest {
    let mut h = hasher(HashType::GitSha1);
    h.update(&git_object_header("blob", bytes.len()));
    h.update(bytes);
    let hex = h.finalize_hex();
    Digest::new(HashType::GitSha1, hex, bytes.len() as u64, false)
        .expect("freshly computed native hash is always well-formed")
}

/// Hashes the already-serialised bytes of a Git tree object: native hash of
/// `tree <len>\0<bytes>`, `is_tree = true`.
pub fn hash_bytes_as_tree(bytes: &[u8]) -> Digest {
    let mut h = hasher(HashType::GitSha1);
    h.update(&git_object_header("tree", bytes.len()));
    h.update(bytes);
    let hex = h.finalize_hex();
    Digest::new(HashType::GitSha1, hex, bytes.len() as u64, true)
        .expect("freshly computed native hash is always well-formed")
}

/// Hashes a file's contents as a Git blob.
pub fn hash_file_as_blob(path: impl AsRef<Path>) -> Result<Digest> {
    let path = path.as_ref();
    let contents = std::fs::read(path)
        .with_context(|| format!("reading {} for hashing", path.display()))?;
    Ok(hash_bytes_as_blob(&contents))
}

/// Hashes `bytes` under the compatible hash: plain SHA-256, no header.
pub fn hash_bytes_compatible(bytes: &[u8]) -> Digest {
    let mut h = hasher(HashType::Sha256);
    h.update(bytes);
    let hex = h.finalize_hex();
    Digest::new(HashType::Sha256, hex, bytes.len() as u64, false)
        .expect("freshly computed compatible hash is always well-formed")
}

/// Hashes `bytes` under whichever hash space `hash_type` names, with no
/// Git object header. Used for the canonical action hash (C2), which always
/// runs in the compatible space regardless of which hash space the build is
/// otherwise using.
pub fn hash_bytes(hash_type: HashType, bytes: &[u8]) -> Digest {
    match hash_type {
        HashType::Sha256 => hash_bytes_compatible(bytes),
        HashType::GitSha1 => {
            let mut h = hasher(HashType::GitSha1);
            h.update(bytes);
            let hex = h.finalize_hex();
            Digest::new(HashType::GitSha1, hex, bytes.len() as u64, false)
                .expect("freshly computed native hash is always well-formed")
        }
    }
}

impl FromStr for HashType {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.len() {
            40 => Ok(HashType::GitSha1),
            64 => Ok(HashType::Sha256),
            other => Err(HashError::WrongLength {
                hash_type: HashType::Sha256,
                expected: 64,
                actual: other,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_identity_matches_git_native_hash() {
        let d = hash_bytes_as_blob(b"");
        assert_eq!(d.hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        assert!(!d.is_tree());
    }

    #[test]
    fn empty_blob_identity_matches_compatible_hash() {
        let d = hash_bytes_compatible(b"");
        assert_eq!(
            d.hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn tree_flag_rejected_on_compatible_hash() {
        let err = Digest::new(HashType::Sha256, "a".repeat(64), 0, true).unwrap_err();
        assert_eq!(err, HashError::TreeFlagOnCompatibleHash(HashType::Sha256));
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = Digest::new(HashType::GitSha1, "abc", 0, false).unwrap_err();
        assert_eq!(
            err,
            HashError::WrongLength {
                hash_type: HashType::GitSha1,
                expected: 40,
                actual: 3,
            }
        );
    }

    #[test]
    fn invalid_hex_is_rejected() {
        let err = Digest::new(HashType::GitSha1, "g".repeat(40), 0, false).unwrap_err();
        assert_eq!(err, HashError::InvalidHex);
    }

    #[test]
    fn hash_file_as_blob_matches_byte_hashing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world")?;
        let from_file = hash_file_as_blob(&path)?;
        let from_bytes = hash_bytes_as_blob(b"hello world");
        assert_eq!(from_file, from_bytes);
        Ok(())
    }
}
