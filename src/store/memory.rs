//! In-memory gateway with the store's observable semantics: stream
//! identifiers are `ms-seq` pairs and must be appended in increasing
//! order, a stream key survives deletion of its last entry, and commands
//! against a key of the wrong kind fail the way the server would.
//!
//! Used by the test suite and by embedders that do not want a live server.

use super::{KeyType, StoreError, StoreGateway, StreamEntry};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Clone, Debug)]
enum Entry {
    String(Vec<u8>),
    List(Vec<Vec<u8>>),
    Stream(Stream),
    /// Stand-in for key types the filesystem does not materialize.
    Other(String),
}

/// The server remembers the last assigned identifier separately from the
/// live entries, so appends must move forward even after deletions.
#[derive(Clone, Debug, Default)]
struct Stream {
    last_id: Option<(u64, u64)>,
    entries: Vec<StreamEntry>,
}

impl Entry {
    fn kind(&self) -> KeyType {
        match self {
            Entry::String(_) => KeyType::String,
            Entry::List(_) => KeyType::List,
            Entry::Stream(_) => KeyType::Stream,
            Entry::Other(tag) => KeyType::Other(tag.clone()),
        }
    }
}

#[derive(Default)]
pub struct MemoryGateway {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a scalar key.
    pub fn put_string(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.lock().insert(key.to_string(), Entry::String(value.into()));
    }

    /// Seed a list key.
    pub fn put_list<I, V>(&self, key: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.lock().insert(key.to_string(), Entry::List(values));
    }

    /// Seed a key of a type the filesystem does not understand.
    pub fn put_other(&self, key: &str, tag: &str) {
        self.lock()
            .insert(key.to_string(), Entry::Other(tag.to_string()));
    }

    /// Drop a key outright, whatever its type.
    pub fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().expect("gateway map poisoned")
    }
}

#[async_trait]
impl StoreGateway for MemoryGateway {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock().contains_key(key))
    }

    async fn key_type(&self, key: &str) -> Result<KeyType, StoreError> {
        self.lock()
            .get(key)
            .map(Entry::kind)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        // Only the wildcard pattern is used by the filesystem; anything
        // else falls back to an exact match. Sorted for stable listings.
        let map = self.lock();
        let mut keys: Vec<String> = match pattern {
            "*" => map.keys().cloned().collect(),
            exact => map.keys().filter(|k| *k == exact).cloned().collect(),
        };
        keys.sort();
        Ok(keys)
    }

    async fn get_string(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        match self.lock().get(key) {
            Some(Entry::String(value)) => Ok(value.clone()),
            Some(_) => Err(wrong_type()),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn set_string(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.lock()
            .insert(key.to_string(), Entry::String(value.to_vec()));
        Ok(())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        match self.lock().get(key) {
            Some(Entry::List(values)) => Ok(values.clone()),
            Some(_) => Err(wrong_type()),
            None => Ok(Vec::new()),
        }
    }

    async fn stream_range(&self, key: &str) -> Result<Vec<StreamEntry>, StoreError> {
        match self.lock().get(key) {
            Some(Entry::Stream(stream)) => Ok(stream.entries.clone()),
            Some(_) => Err(wrong_type()),
            None => Ok(Vec::new()),
        }
    }

    async fn stream_append(
        &self,
        key: &str,
        id: &str,
        fields: &[(&str, &[u8])],
    ) -> Result<(), StoreError> {
        let parsed = parse_stream_id(id)?;
        let mut map = self.lock();
        let entry = map
            .entry(key.to_string())
            .or_insert_with(|| Entry::Stream(Stream::default()));
        let Entry::Stream(stream) = entry else {
            return Err(wrong_type());
        };
        if stream.last_id.is_some_and(|last| last >= parsed) {
            return Err(StoreError::Backend(format!(
                "stream id {id} is not greater than the last assigned id"
            )));
        }
        let fields = fields
            .iter()
            .map(|(name, value)| {
                (
                    (*name).to_string(),
                    String::from_utf8_lossy(value).into_owned(),
                )
            })
            .collect::<BTreeMap<_, _>>();
        stream.last_id = Some(parsed);
        stream.entries.push(StreamEntry {
            id: id.to_string(),
            fields,
        });
        Ok(())
    }

    async fn stream_delete(&self, key: &str, id: &str) -> Result<(), StoreError> {
        let mut map = self.lock();
        match map.get_mut(key) {
            Some(Entry::Stream(stream)) => {
                stream.entries.retain(|entry| entry.id != id);
                Ok(())
            }
            Some(_) => Err(wrong_type()),
            None => Ok(()),
        }
    }
}

fn wrong_type() -> StoreError {
    StoreError::Backend(
        "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    )
}

fn parse_stream_id(id: &str) -> Result<(u64, u64), StoreError> {
    let invalid = || StoreError::Backend(format!("invalid stream id: {id}"));
    let (ms, seq) = id.split_once('-').ok_or_else(invalid)?;
    let ms = ms.parse().map_err(|_| invalid())?;
    let seq = seq.parse().map_err(|_| invalid())?;
    Ok((ms, seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_appends_require_increasing_ids() {
        let gw = MemoryGateway::new();
        gw.stream_append("s", "1-0", &[("blob", b"a".as_slice())]).await.unwrap();
        gw.stream_append("s", "2-0", &[("blob", b"b".as_slice())]).await.unwrap();
        assert!(gw.stream_append("s", "2-0", &[("blob", b"c".as_slice())]).await.is_err());
        assert!(gw.stream_append("s", "bogus", &[("blob", b"c".as_slice())]).await.is_err());
        let ids: Vec<_> = gw
            .stream_range("s")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, ["1-0", "2-0"]);
    }

    #[tokio::test]
    async fn stream_key_survives_deleting_all_entries() {
        let gw = MemoryGateway::new();
        gw.stream_append("s", "0-1", &[("blob", b"dummy".as_slice())]).await.unwrap();
        gw.stream_delete("s", "0-1").await.unwrap();
        assert_eq!(gw.key_type("s").await.unwrap(), KeyType::Stream);
        assert!(gw.stream_range("s").await.unwrap().is_empty());
        // The last assigned id outlives the entry it named.
        assert!(gw.stream_append("s", "0-1", &[("blob", b"x".as_slice())]).await.is_err());
        gw.stream_append("s", "0-2", &[("blob", b"x".as_slice())]).await.unwrap();
    }

    #[tokio::test]
    async fn scalar_commands_enforce_key_kind() {
        let gw = MemoryGateway::new();
        gw.put_list("l", [b"a".to_vec()]);
        assert!(matches!(
            gw.get_string("l").await,
            Err(StoreError::Backend(_))
        ));
        assert!(matches!(
            gw.get_string("missing").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
