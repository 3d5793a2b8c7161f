//! Redis-backed gateway.
//!
//! Commands with a typed high-level binding go through [`AsyncCommands`];
//! the rest (TYPE, LRANGE with binary elements) are issued with
//! [`redis::cmd`]. The connection manager multiplexes and reconnects on its
//! own; cloning it per call is cheap.

use super::{KeyType, StoreError, StoreGateway, StreamEntry};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::StreamRangeReply;
use redis::AsyncCommands;
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct RedisGateway {
    conn: ConnectionManager,
}

impl RedisGateway {
    /// Connect to the given endpoint and validate it with a PING.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(backend_err)?;
        let mut conn = ConnectionManager::new(client).await.map_err(backend_err)?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl StoreGateway for RedisGateway {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        conn.exists(key).await.map_err(backend_err)
    }

    async fn key_type(&self, key: &str) -> Result<KeyType, StoreError> {
        let mut conn = self.conn();
        let tag: String = redis::cmd("TYPE")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        KeyType::from_wire(&tag).ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn();
        conn.keys(pattern).await.map_err(backend_err)
    }

    async fn get_string(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let mut conn = self.conn();
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(backend_err)?;
        value.ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn set_string(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = conn.set(key, value).await.map_err(backend_err)?;
        Ok(())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut conn = self.conn();
        let values: Vec<Vec<u8>> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(values)
    }

    async fn stream_range(&self, key: &str) -> Result<Vec<StreamEntry>, StoreError> {
        let mut conn = self.conn();
        let reply: StreamRangeReply = conn.xrange_all(key).await.map_err(backend_err)?;
        let mut entries = Vec::with_capacity(reply.ids.len());
        for record in reply.ids {
            let mut fields = BTreeMap::new();
            for (name, value) in &record.map {
                let bytes: Vec<u8> = redis::from_redis_value(value).map_err(backend_err)?;
                fields.insert(name.clone(), String::from_utf8_lossy(&bytes).into_owned());
            }
            entries.push(StreamEntry {
                id: record.id.clone(),
                fields,
            });
        }
        Ok(entries)
    }

    async fn stream_append(
        &self,
        key: &str,
        id: &str,
        fields: &[(&str, &[u8])],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: String = conn.xadd(key, id, fields).await.map_err(backend_err)?;
        Ok(())
    }

    async fn stream_delete(&self, key: &str, id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: i64 = conn.xdel(key, &[id]).await.map_err(backend_err)?;
        Ok(())
    }
}

fn backend_err(err: redis::RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}
