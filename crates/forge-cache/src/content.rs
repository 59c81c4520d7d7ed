// SPDX-License-Identifier: Apache-2.0

//! The three-tier content request (spec §4.9, C9): local CAS, then local
//! Git ODB, then remote CAS (behind a serve endpoint or directly), then a
//! network mirror fetch as a last resort. Remote CAS and the network
//! fetcher are external collaborators (§1: "the wire protocol's transport
//! layer", "archive fetching and network mirror selection policy"); this
//! module defines the seam each one plugs into, the same way
//! `forge-evaluate::target_file::TargetFileSource` defines the seam for a
//! served target file.

use forge_git::GitRepo;
use forge_hash::Digest;
use forge_model::ObjectType;

use crate::error::{CacheError, CacheResult};
use crate::local_cas::LocalCas;

/// A remote CAS endpoint (reached directly, or through a serve endpoint
/// that proxies into one). Transport is out of scope (§1); only the
/// request/response shape this engine needs is modelled.
pub trait RemoteCas: Send + Sync {
    fn has(&self, digest: &Digest) -> CacheResult<bool>;
    fn fetch(&self, digest: &Digest) -> CacheResult<Option<Vec<u8>>>;
}

/// A network mirror fetcher: given a list of mirror URLs and optional
/// checksums, returns the bytes. Mirror selection policy and the actual
/// HTTP client are out of scope (§1); this crate only defines what it
/// needs from the result.
pub trait MirrorFetcher: Send + Sync {
    fn fetch(&self, mirrors: &[String], sha256: Option<&str>, sha512: Option<&str>) -> CacheResult<Vec<u8>>;
}

/// Drives the spec §4.9 four-step lookup for one digest.
pub struct ContentCache<'a> {
    local_cas: &'a LocalCas,
    git_odb: Option<&'a GitRepo>,
    remote_cas: Option<&'a dyn RemoteCas>,
    mirrors: Option<&'a dyn MirrorFetcher>,
}

impl<'a> ContentCache<'a> {
    pub fn new(local_cas: &'a LocalCas) -> Self {
        Self {
            local_cas,
            git_odb: None,
            remote_cas: None,
            mirrors: None,
        }
    }

    pub fn with_git_odb(mut self, repo: &'a GitRepo) -> Self {
        self.git_odb = Some(repo);
        self
    }

    pub fn with_remote_cas(mut self, remote: &'a dyn RemoteCas) -> Self {
        self.remote_cas = Some(remote);
        self
    }

    pub fn with_mirrors(mut self, mirrors: &'a dyn MirrorFetcher) -> Self {
        self.mirrors = Some(mirrors);
        self
    }

    /// Resolves `digest`'s bytes, trying each tier in order and writing the
    /// result back into the local CAS once found (steps 1-3 write through;
    /// step 4's network fetch also writes through after checksum
    /// verification).
    pub fn resolve(
        &self,
        digest: &Digest,
        object_type: ObjectType,
        mirrors: &[String],
        sha256: Option<&str>,
        sha512: Option<&str>,
    ) -> CacheResult<Vec<u8>> {
        // 1. Local CAS.
        if let Some(bytes) = self.local_cas.read(digest, object_type)? {
            return Ok(bytes);
        }

        // 2. Local Git ODB.
        if let Some(repo) = self.git_odb {
            if let Ok(bytes) = repo.read_blob(digest.hex()) {
                self.local_cas.store(digest, object_type, &bytes)?;
                return Ok(bytes);
            }
        }

        // 3. Remote CAS (directly, or via a serve endpoint that already
        // confirmed it has the content).
        if let Some(remote) = self.remote_cas {
            if let Some(bytes) = remote.fetch(digest)? {
                self.local_cas.store(digest, object_type, &bytes)?;
                return Ok(bytes);
            }
        }

        // 4. Network fetch: mirrors, with checksum verification against
        // whichever of sha256/sha512 was supplied.
        if let Some(fetcher) = self.mirrors {
            if !mirrors.is_empty() {
                let bytes = fetcher.fetch(mirrors, sha256, sha512)?;
                verify_checksum(&bytes, sha256, sha512, digest.hex())?;
                self.local_cas.store(digest, object_type, &bytes)?;
                return Ok(bytes);
            }
        }

        Err(CacheError::NotFound(digest.hex().to_string()))
    }
}

fn verify_checksum(bytes: &[u8], sha256: Option<&str>, sha512: Option<&str>, digest_hex: &str) -> CacheResult<()> {
    if sha256.is_none() && sha512.is_none() {
        return Ok(());
    }
    if let Some(expected) = sha256 {
        let actual = forge_hash::hash_bytes_compatible(bytes).hex().to_string();
        if actual.eq_ignore_ascii_case(expected) {
            return Ok(());
        }
    }
    if let Some(expected) = sha512 {
        use sha2::{Digest as _, Sha512};
        let mut h = Sha512::new();
        h.update(bytes);
        let actual = hex::encode(h.finalize());
        if actual.eq_ignore_ascii_case(expected) {
            return Ok(());
        }
    }
    Err(CacheError::ChecksumMismatch(digest_hex.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubRemote {
        content: std::collections::HashMap<String, Vec<u8>>,
    }

    impl RemoteCas for StubRemote {
        fn has(&self, digest: &Digest) -> CacheResult<bool> {
            Ok(self.content.contains_key(digest.hex()))
        }
        fn fetch(&self, digest: &Digest) -> CacheResult<Option<Vec<u8>>> {
            Ok(self.content.get(digest.hex()).cloned())
        }
    }

    #[test]
    fn resolves_from_local_cas_first() {
        let dir = tempfile::tempdir().unwrap();
        let cas = LocalCas::open(dir.path(), "git-sha1").unwrap();
        let digest = forge_hash::hash_bytes_as_blob(b"hi");
        cas.store(&digest, ObjectType::File, b"hi").unwrap();
        let cc = ContentCache::new(&cas);
        let bytes = cc.resolve(&digest, ObjectType::File, &[], None, None).unwrap();
        assert_eq!(bytes, b"hi");
    }

    #[test]
    fn falls_through_to_remote_cas_and_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let cas = LocalCas::open(dir.path(), "git-sha1").unwrap();
        let digest = forge_hash::hash_bytes_as_blob(b"remote");
        let mut content = std::collections::HashMap::new();
        content.insert(digest.hex().to_string(), b"remote".to_vec());
        let remote = StubRemote { content };

        let cc = ContentCache::new(&cas).with_remote_cas(&remote);
        let bytes = cc.resolve(&digest, ObjectType::File, &[], None, None).unwrap();
        assert_eq!(bytes, b"remote");
        assert!(cas.contains(&digest, ObjectType::File));
    }

    #[test]
    fn not_found_anywhere_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cas = LocalCas::open(dir.path(), "git-sha1").unwrap();
        let digest = forge_hash::hash_bytes_as_blob(b"absent");
        let cc = ContentCache::new(&cas);
        assert!(cc.resolve(&digest, ObjectType::File, &[], None, None).is_err());
    }
}
