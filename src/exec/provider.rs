// src/exec/provider.rs

//! Factory resolving named executor definitions to backends.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ExecutorConfig;
use crate::errors::{Error, Result};
use crate::exec::{Adapter, Bridge, Executor, ExecutorProvider, LocalAdapter, LocalBridge};

/// Provider backed by the config's `Executors` section.
///
/// The `type` tag selects the backend. `local` is built in; the container
/// and cluster tags (`docker`, `kubernetes`/`k8s`) belong to external
/// backends and surface [`Error::UnsupportedExecutorType`] here — callers
/// needing them install their own [`ExecutorProvider`].
#[derive(Debug, Default)]
pub struct DefaultExecutorProvider {
    definitions: HashMap<String, ExecutorConfig>,
}

impl DefaultExecutorProvider {
    pub fn new(definitions: HashMap<String, ExecutorConfig>) -> Self {
        Self { definitions }
    }
}

#[async_trait]
impl ExecutorProvider for DefaultExecutorProvider {
    async fn get_executor(&self, name: &str) -> Result<Box<dyn Executor>> {
        let definition = self
            .definitions
            .get(name)
            .ok_or_else(|| Error::ExecutorNotFound(name.to_string()))?;

        debug!(executor = %name, executor_type = %definition.executor_type, "resolving executor");

        match definition.executor_type.as_str() {
            "local" => {
                let mut adapter = LocalAdapter::new();
                adapter.configure(definition.config.clone()).await?;
                LocalBridge::new().connect(&adapter).await
            }
            other => Err(Error::UnsupportedExecutorType(other.to_string())),
        }
    }
}
