// src/metadata/in_config.rs

//! Read-only metadata store seeded from the config's `data` map.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::MetadataConfig;
use crate::errors::{Error, Result};
use crate::metadata::{value_to_string, MetadataStore};

#[derive(Debug, Default)]
pub struct InConfigMetadataStore {
    data: HashMap<String, String>,
}

impl InConfigMetadataStore {
    pub fn new(config: &MetadataConfig) -> Self {
        let data = config
            .data
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect();
        Self { data }
    }
}

#[async_trait]
impl MetadataStore for InConfigMetadataStore {
    async fn get(&self, key: &str) -> Result<String> {
        self.data
            .get(key)
            .cloned()
            .ok_or_else(|| Error::MetadataKeyNotFound(key.to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(Error::ReadOnlyMetadata)
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(Error::ReadOnlyMetadata)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> InConfigMetadataStore {
        InConfigMetadataStore::new(&MetadataConfig {
            store_type: "in-config".to_string(),
            data: HashMap::from([
                ("team".to_string(), json!("platform")),
                ("replicas".to_string(), json!(3)),
            ]),
        })
    }

    #[tokio::test]
    async fn reads_seeded_values_stringified() {
        let store = store();
        assert_eq!(store.get("team").await.unwrap(), "platform");
        assert_eq!(store.get("replicas").await.unwrap(), "3");

        let err = store.get("missing").await.unwrap_err();
        assert!(matches!(err, Error::MetadataKeyNotFound(_)));
    }

    #[tokio::test]
    async fn writes_are_rejected() {
        let store = store();
        assert!(matches!(
            store.set("k", "v").await.unwrap_err(),
            Error::ReadOnlyMetadata
        ));
        assert!(matches!(
            store.delete("team").await.unwrap_err(),
            Error::ReadOnlyMetadata
        ));
    }
}
