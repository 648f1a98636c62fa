// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Adding the edge would close a cycle (self-loops included).
    #[error("graph has cycle")]
    HasCycle,

    /// The graph is structurally unusable (e.g. vertices but no roots).
    #[error("invalid graph")]
    InvalidGraph,

    #[error("vertex `{0}` not found in graph")]
    VertexMissing(String),

    #[error("invalid expression `{expression}`: {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("pipeline `{0}` not found")]
    PipelineNotFound(String),

    #[error("pipeline id `{0}` has already been used by this runtime")]
    DuplicatePipeline(String),

    #[error("pipeline `{0}` is already running")]
    PipelineRunning(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("node `{node}` failed: {reason}")]
    NodeFailed { node: String, reason: String },

    #[error("worker panicked: {0}")]
    WorkerPanic(String),

    #[error("executor `{0}` is not defined")]
    ExecutorNotFound(String),

    #[error("unsupported executor type `{0}`")]
    UnsupportedExecutorType(String),

    #[error("executor is in state {state}, cannot {operation}")]
    ExecutorState {
        state: &'static str,
        operation: &'static str,
    },

    #[error("metadata store is read-only")]
    ReadOnlyMetadata,

    #[error("metadata key `{0}` not found")]
    MetadataKeyNotFound(String),

    #[error("unsupported metadata store type `{0}`")]
    UnsupportedMetadataType(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
