// src/metadata/mod.rs

//! Metadata store contract and backend factory.

pub mod http;
pub mod in_config;
pub mod redis;

pub use http::HttpMetadataStore;
pub use in_config::InConfigMetadataStore;
pub use redis::RedisMetadataStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::MetadataConfig;
use crate::errors::{Error, Result};

/// Key/value string store attached to a pipeline.
///
/// Implementations must be safe to share across workers.
#[async_trait]
pub trait MetadataStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<String>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Build a store from its config descriptor. The `type` tag selects the
/// backend: `in-config`, `http` or `redis`.
pub fn create_store(config: &MetadataConfig) -> Result<Arc<dyn MetadataStore>> {
    match config.store_type.as_str() {
        "in-config" => Ok(Arc::new(InConfigMetadataStore::new(config))),
        "http" => Ok(Arc::new(HttpMetadataStore::new(config)?)),
        "redis" => Ok(Arc::new(RedisMetadataStore::new(config)?)),
        other => Err(Error::UnsupportedMetadataType(other.to_string())),
    }
}

/// Stringify a config value the way the store surface expects.
pub(crate) fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_rejects_unknown_type() {
        let config = MetadataConfig {
            store_type: "etcd".to_string(),
            data: Default::default(),
        };
        let err = create_store(&config).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMetadataType(t) if t == "etcd"));
    }

    #[test]
    fn factory_builds_in_config_store() {
        let config = MetadataConfig {
            store_type: "in-config".to_string(),
            data: Default::default(),
        };
        assert!(create_store(&config).is_ok());
    }
}
