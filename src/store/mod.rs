//! Gateway to the backing key/stream store.
//!
//! Everything above this module talks to the store through the
//! [`StoreGateway`] trait; the concrete backends live in [`redis`] (a live
//! server) and [`memory`] (in-process, used by tests and embedders).

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Key type reported by the backing store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyType {
    String,
    List,
    Stream,
    /// Any other type the store may report (hash, set, ...). The
    /// filesystem cannot materialize these.
    Other(String),
}

impl KeyType {
    /// Parse a TYPE reply. Returns `None` for the store's "no such key"
    /// answer, which callers must turn into a not-found error.
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "none" => None,
            "string" => Some(Self::String),
            "list" => Some(Self::List),
            "stream" => Some(Self::Stream),
            other => Some(Self::Other(other.to_string())),
        }
    }
}

/// One record of an append-only stream, ordered by `id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StreamEntry {
    pub id: String,
    pub fields: BTreeMap<String, String>,
}

/// Store operation failures. `NotFound` is the absent-key sentinel; every
/// other failure, connection errors included, is `Backend`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Narrow command surface consumed by the filesystem layer. Each call is a
/// single synchronous round trip; nothing is cached or retried here.
#[async_trait]
pub trait StoreGateway: Send + Sync + 'static {
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn key_type(&self, key: &str) -> Result<KeyType, StoreError>;

    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    async fn get_string(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn set_string(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    async fn list_range(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError>;

    async fn stream_range(&self, key: &str) -> Result<Vec<StreamEntry>, StoreError>;

    /// Append one entry with an explicit identifier. The store rejects
    /// identifiers that do not sort after the stream's last entry.
    async fn stream_append(
        &self,
        key: &str,
        id: &str,
        fields: &[(&str, &[u8])],
    ) -> Result<(), StoreError>;

    async fn stream_delete(&self, key: &str, id: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_parse() {
        assert_eq!(KeyType::from_wire("string"), Some(KeyType::String));
        assert_eq!(KeyType::from_wire("list"), Some(KeyType::List));
        assert_eq!(KeyType::from_wire("stream"), Some(KeyType::Stream));
        assert_eq!(
            KeyType::from_wire("hash"),
            Some(KeyType::Other("hash".to_string()))
        );
        assert_eq!(KeyType::from_wire("none"), None);
    }
}
