// src/config/mod.rs

//! Declarative pipeline configuration.
//!
//! This module only performs YAML deserialization and light shaping; the
//! semantic work (graph build, metadata hookup) lives in [`crate::runtime`].

pub mod dsl;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;

/// Top-level pipeline configuration as delivered by the YAML surface.
///
/// Field names follow the external contract verbatim, including the legacy
/// `Metadate` spelling of the metadata descriptor key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(rename = "Version", default)]
    pub version: String,

    #[serde(rename = "Name", default)]
    pub name: String,

    #[serde(rename = "Metadate", default)]
    pub metadata: MetadataConfig,

    #[serde(rename = "AI", default)]
    pub ai: AiConfig,

    /// User parameters merged into the evaluation context's base layer.
    #[serde(rename = "Param", default)]
    pub param: HashMap<String, Value>,

    /// Named executor definitions, keyed by the name nodes refer to.
    #[serde(rename = "Executors", default)]
    pub executors: HashMap<String, ExecutorConfig>,

    #[serde(rename = "Logging", default)]
    pub logging: LoggingConfig,

    /// State-diagram text describing edges; see [`dsl`].
    #[serde(rename = "Graph", default)]
    pub graph: String,

    /// Initial status seeding; nodes missing from this map start `UNKNOWN`.
    #[serde(rename = "Status", default)]
    pub status: HashMap<String, String>,

    #[serde(rename = "Nodes", default)]
    pub nodes: HashMap<String, NodeConfig>,
}

impl PipelineConfig {
    /// Deserialize a config from YAML text. Malformed YAML surfaces as-is.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Metadata store descriptor. `type` selects the backend
/// (`in-config`, `http`, `redis`); `data` carries backend settings or, for
/// `in-config`, the key/value payload itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(rename = "type", default)]
    pub store_type: String,

    #[serde(default)]
    pub data: HashMap<String, Value>,
}

/// AI annotations. Opaque to the core; preserved for tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub template: String,
    #[serde(rename = "generatedAt", default)]
    pub generated_at: String,
    #[serde(default)]
    pub version: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(rename = "type", default)]
    pub executor_type: String,

    #[serde(default)]
    pub config: HashMap<String, Value>,
}

/// Hook for the log pusher; the core carries but does not interpret it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub timeout: String,
    #[serde(default)]
    pub retry: u32,
}

/// A single command of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub run: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default, alias = "Executor")]
    pub executor: String,

    #[serde(default, alias = "Image")]
    pub image: String,

    #[serde(default, alias = "Steps")]
    pub steps: Vec<StepConfig>,

    #[serde(rename = "Config", default)]
    pub config: HashMap<String, Value>,
}
