// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("digest {0} not found in any storage tier")]
    NotFound(String),

    #[error("checksum mismatch for {0}: neither sha256 nor sha512 matched")]
    ChecksumMismatch(String),

    #[error("rocksdb error: {0}")]
    RocksDb(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for CacheError {
    fn from(e: rocksdb::Error) -> Self {
        CacheError::RocksDb(e.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
