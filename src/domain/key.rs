//! Composite Keys
//!
//! Derives the (hash key, range key, cache key) triple that addresses one
//! logical entry in both tiers.
//!
//! ```text
//! map "orders", key ("eu", 7)  ──canonical──▶  ["eu",7]
//!                                  │
//!                        base64 (url-safe, no pad)
//!                                  ▼
//! hash_key  = orders               range_key = WyJldSIsN10
//! cache_key = orders:WyJldSIsN10
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Serialize;

use crate::error::{Error, Result};

/// Prefix applied to hash keys when running in the test namespace.
pub const TEST_NAMESPACE_PREFIX: &str = "__test_";

/// Joins hash key and range key in the cache tier. Not part of the
/// range-key alphabet, so the last occurrence always marks the split.
pub const CACHE_KEY_SEPARATOR: char = ':';

/// Suffix of the ephemeral lock entry guarding a durable fetch.
const STAMPEDE_TOKEN_SUFFIX: &str = "#stampede";

/// Composite key - value object derived per call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    map_name: String,
    hash_key: String,
    original_key: String,
    range_key: String,
    cache_key: String,
}

impl CompositeKey {
    /// Derive the key triple for `key` in `map_name`.
    ///
    /// Fails only when `key` has no JSON rendering (e.g. a map with
    /// non-string keys).
    pub fn derive<K>(map_name: &str, key: &K, test_namespace: bool) -> Result<Self>
    where
        K: Serialize + ?Sized,
    {
        let canonical = Self::canonicalize(key)?;
        Ok(Self::from_canonical(map_name, canonical, test_namespace))
    }

    /// Build from an already canonical key text (as yielded by key scans
    /// and the key index).
    pub fn from_canonical(
        map_name: &str,
        canonical: impl Into<String>,
        test_namespace: bool,
    ) -> Self {
        let original_key = canonical.into();
        let hash_key = Self::hash_key_for(map_name, test_namespace);
        let range_key = Self::encode_range_key(&original_key);
        let cache_key = format!("{}{}{}", hash_key, CACHE_KEY_SEPARATOR, range_key);

        Self {
            map_name: map_name.to_string(),
            hash_key,
            original_key,
            range_key,
            cache_key,
        }
    }

    /// Canonical text for a key: strings as-is, anything else as compact JSON.
    pub fn canonicalize<K>(key: &K) -> Result<String>
    where
        K: Serialize + ?Sized,
    {
        let value = serde_json::to_value(key)
            .map_err(|e| Error::Encoding(format!("key is not representable: {}", e)))?;
        match value {
            serde_json::Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    /// Hash key (partition) for a map name.
    pub fn hash_key_for(map_name: &str, test_namespace: bool) -> String {
        if test_namespace {
            format!("{}{}", TEST_NAMESPACE_PREFIX, map_name)
        } else {
            map_name.to_string()
        }
    }

    /// Encode canonical key text into a store-safe identifier.
    pub fn encode_range_key(canonical: &str) -> String {
        URL_SAFE_NO_PAD.encode(canonical.as_bytes())
    }

    /// Recover canonical key text from a range key.
    pub fn decode_range_key(range_key: &str) -> Result<String> {
        let bytes = URL_SAFE_NO_PAD
            .decode(range_key)
            .map_err(|e| Error::Encoding(format!("bad range key {:?}: {}", range_key, e)))?;
        String::from_utf8(bytes)
            .map_err(|e| Error::Encoding(format!("range key {:?} is not utf-8: {}", range_key, e)))
    }

    #[inline]
    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    #[inline]
    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    /// Canonical text of the caller's key.
    #[inline]
    pub fn original_key(&self) -> &str {
        &self.original_key
    }

    #[inline]
    pub fn range_key(&self) -> &str {
        &self.range_key
    }

    #[inline]
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Cache entry used as the per-key stampede lock.
    pub fn stampede_token_key(&self) -> String {
        format!("{}{}", self.cache_key, STAMPEDE_TOKEN_SUFFIX)
    }
}

impl std::fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.map_name, self.original_key)
    }
}

// =============================================================================
// Tests
// =============================================================================
