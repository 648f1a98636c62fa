// src/metadata/redis.rs

//! Metadata store backed by a redis server.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::config::MetadataConfig;
use crate::errors::{Error, Result};
use crate::metadata::MetadataStore;

#[derive(Debug)]
pub struct RedisMetadataStore {
    client: redis::Client,
}

impl RedisMetadataStore {
    /// Config keys under `data`: `host` (default `localhost`), `port`
    /// (default 6379), `db` (default 0), `username`, `password`.
    pub fn new(config: &MetadataConfig) -> Result<Self> {
        let host = config
            .data
            .get("host")
            .and_then(|v| v.as_str())
            .unwrap_or("localhost")
            .to_string();

        let port = match config.data.get("port") {
            Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(6379) as u16,
            Some(serde_json::Value::String(s)) => s.parse().unwrap_or(6379),
            _ => 6379,
        };

        let db = match config.data.get("db") {
            Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0),
            _ => 0,
        };

        let username = config
            .data
            .get("username")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let password = config
            .data
            .get("password")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(host, port),
            redis: redis::RedisConnectionInfo {
                db,
                username,
                password,
                ..Default::default()
            },
        };

        Ok(Self {
            client: redis::Client::open(info)?,
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl MetadataStore for RedisMetadataStore {
    async fn get(&self, key: &str) -> Result<String> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        value.ok_or_else(|| Error::MetadataKeyNotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Multiplexed connections are per-operation here; dropping the
        // client releases everything.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn builds_client_from_config() {
        let store = RedisMetadataStore::new(&MetadataConfig {
            store_type: "redis".to_string(),
            data: HashMap::from([
                ("host".to_string(), json!("redis.internal")),
                ("port".to_string(), json!(6380)),
                ("db".to_string(), json!(2)),
            ]),
        });
        assert!(store.is_ok());
    }

    #[test]
    fn defaults_apply_without_config() {
        let store = RedisMetadataStore::new(&MetadataConfig {
            store_type: "redis".to_string(),
            data: HashMap::new(),
        });
        assert!(store.is_ok());
    }
}
