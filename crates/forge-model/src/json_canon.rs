// SPDX-License-Identifier: Apache-2.0

//! The single canonicalizing JSON serializer referenced throughout §4.2:
//! every `to_json`/identifier computation in this crate funnels through
//! [`canonical_bytes`], so the bytes that get hashed are always exactly the
//! bytes a round-trip through `from_json` would reproduce.
//!
//! `serde_json::Value`'s object representation is a `BTreeMap` (this crate
//! does not enable the `preserve_order` feature anywhere in the workspace),
//! so key order in the produced JSON is always lexical; `to_string` emits
//! the compact form with no incidental whitespace. Together that is exactly
//! "canonical JSON" in the sense the spec uses the term.

use forge_hash::Digest;
use serde_json::Value;

pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    // `serde_json::to_vec` on a `Value` backed by a BTreeMap already emits
    // keys in sorted order with no extra whitespace; `to_string` would do
    // the same modulo UTF-8 validity, which JSON values always satisfy.
    serde_json::to_vec(value).expect("serde_json::Value serialization is infallible")
}

pub fn digest_of(value: &Value) -> Digest {
    forge_hash::hash_bytes_compatible(&canonical_bytes(value))
}

pub fn digest_hex_of(value: &Value) -> String {
    digest_of(value).hex().to_string()
}
