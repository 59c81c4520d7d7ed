// SPDX-License-Identifier: Apache-2.0

//! A persistent key -> blob memoisation table, lifted from the teacher's
//! `content-addressed-cache::local_cache::RocksDBCache`. The teacher keys
//! its cache by a pair of `git2::Oid`s (a memoised pure function's id and
//! its argument's id); every persistent cache this engine needs (the action
//! cache, the target cache, the native->compatible tree-map) is keyed by a
//! single content digest instead, so the composite-key encoding is dropped
//! in favour of a plain byte-string key — the `Cache` trait shape (put/get/
//! clear) and the "destroy, then reopen" `clear()` pattern are kept as-is.
//! The teacher guards its `DB` handle with a bare `RefCell` since its
//! callers are single-threaded; this cache is shared across the rayon pool
//! (C3/C8), so the handle sits behind a `Mutex` instead.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rocksdb::{Options, DB};

use crate::error::CacheResult;

pub trait Cache: Send + Sync {
    fn put(&self, key: &[u8], value: &[u8]) -> CacheResult<()>;
    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>>;
    fn clear(&self) -> CacheResult<()>;
}

/// A RocksDB-backed `Cache`. `ttl` of zero disables expiry, matching the
/// teacher's default `open()` constructor.
pub struct RocksDbCache {
    db: Mutex<Option<DB>>,
    ttl: Duration,
    path: PathBuf,
}

impl RocksDbCache {
    fn make_db(path: &Path, ttl: Duration) -> CacheResult<DB> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        Ok(DB::open_with_ttl(&opts, path, ttl)?)
    }

    pub fn open_with_ttl(path: impl AsRef<Path>, ttl: Duration) -> CacheResult<Self> {
        let path = path.as_ref().to_path_buf();
        Ok(Self {
            db: Mutex::new(Some(Self::make_db(&path, ttl)?)),
            ttl,
            path,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        Self::open_with_ttl(path, Duration::from_secs(0))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Cache for RocksDbCache {
    fn put(&self, key: &[u8], value: &[u8]) -> CacheResult<()> {
        let db = self.db.lock().expect("rocksdb mutex poisoned");
        db.as_ref()
            .expect("db open for the lifetime of RocksDbCache except mid-clear")
            .put(key, value)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> CacheResult<Option<Vec<u8>>> {
        let db = self.db.lock().expect("rocksdb mutex poisoned");
        Ok(db
            .as_ref()
            .expect("db open for the lifetime of RocksDbCache except mid-clear")
            .get(key)?)
    }

    fn clear(&self) -> CacheResult<()> {
        {
            let mut db = self.db.lock().expect("rocksdb mutex poisoned");
            let taken = db.take();
            drop(taken);
        }
        DB::destroy(&Options::default(), &self.path)?;
        *self.db.lock().expect("rocksdb mutex poisoned") = Some(Self::make_db(&self.path, self.ttl)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RocksDbCache::open(dir.path().join("db")).unwrap();
        cache.put(b"key", b"value").unwrap();
        assert_eq!(cache.get(b"key").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RocksDbCache::open(dir.path().join("db")).unwrap();
        assert_eq!(cache.get(b"nope").unwrap(), None);
    }

    #[test]
    fn clear_drops_prior_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RocksDbCache::open(dir.path().join("db")).unwrap();
        cache.put(b"key", b"value").unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.get(b"key").unwrap(), None);
    }
}
