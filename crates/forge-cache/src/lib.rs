// SPDX-License-Identifier: Apache-2.0

//! Local CAS storage, persistent action/target/tree-map caches, the
//! three-tier content request, and hash-space rehashing (spec §4.9/§6,
//! C9). `forge-exec` (C8) builds its in-memory `OperationCache` on top of
//! this crate's persistent action cache.

pub mod content;
pub mod error;
pub mod layout;
pub mod local_cas;
pub mod rehash;
pub mod rocks_cache;

pub use content::{ContentCache, MirrorFetcher, RemoteCas};
pub use error::{CacheError, CacheResult};
pub use layout::BuildRoot;
pub use local_cas::LocalCas;
pub use rehash::{Rehasher, TREE_MAP_VERSION};
pub use rocks_cache::{Cache, RocksDbCache};
