// src/pusher.rs

//! Log-push boundary: the sink that streamed step output is delivered to.
//!
//! The core only defines the contract; concrete sinks (HTTP collectors,
//! message queues) live outside and are installed on the runtime via
//! `set_pusher`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// A single pushed log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub pipeline: String,
    #[serde(rename = "buildId")]
    pub build_id: String,
    pub node: String,
    pub step: String,
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    /// Command stdout/stderr payload.
    pub output: String,
}

#[async_trait]
pub trait Pusher: Send + Sync {
    /// Push a single entry.
    async fn push(&self, entry: Entry) -> Result<()>;

    /// Push a batch of entries.
    async fn push_batch(&self, entries: Vec<Entry>) -> Result<()>;

    /// Close the connection, flushing buffers.
    async fn close(&self) -> Result<()>;
}
