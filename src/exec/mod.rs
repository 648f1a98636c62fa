// src/exec/mod.rs

//! Executor contract: the adapter/bridge/executor capability trio, the
//! channel message types, and the provider that resolves named executor
//! definitions from config.
//!
//! The scheduler's per-node callback talks to at most one executor per
//! node. It may reuse the executor across a node's steps, but must call
//! `destroy` before forgetting the reference.

pub mod local;
pub mod provider;

pub use local::{LocalAdapter, LocalBridge, LocalExecutor};
pub use provider::DefaultExecutorProvider;

use std::any::Any;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dag::Step;
use crate::errors::Result;

/// A unit of work sent into an executor's command channel.
#[derive(Debug, Clone)]
pub enum Command {
    /// Bare shell command line.
    Shell(String),
    /// A named step of a node.
    Step(Step),
}

impl Command {
    /// Step name (empty for bare commands) and command line.
    pub fn parts(&self) -> (&str, &str) {
        match self {
            Command::Shell(run) => ("", run.as_str()),
            Command::Step(step) => (step.name.as_str(), step.run.as_str()),
        }
    }
}

/// Messages emitted on an executor's result channel: streamed output
/// chunks while a command runs, then one terminal [`StepResult`] per
/// command.
#[derive(Debug, Clone)]
pub enum ExecOutput {
    Chunk(Vec<u8>),
    Result(StepResult),
}

/// Terminal outcome of one command.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: String,
    pub command: String,
    pub output: String,
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Stores backend configuration intent ahead of connection.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn configure(&mut self, config: HashMap<String, Value>) -> Result<()>;

    /// Concrete-type access for bridges; the Rust face of the backend's
    /// type assertion on its own adapter.
    fn as_any(&self) -> &dyn Any;
}

/// Materializes an [`Executor`] from a configured [`Adapter`].
#[async_trait]
pub trait Bridge: Send + Sync {
    async fn connect(&self, adapter: &dyn Adapter) -> Result<Box<dyn Executor>>;
}

/// Streamed command execution against a concrete backend.
///
/// State machine: `New → Prepared → (Transferring ↔ Idle)* → Destroyed`.
/// `transfer` may be invoked once prepared; it returns when the command
/// channel closes or the token fires, terminating any in-flight process
/// best-effort on cancellation. `destroy` is terminal and must release
/// everything `prepare` created; operations after it fail.
#[async_trait]
pub trait Executor: Send + std::fmt::Debug {
    async fn prepare(&mut self, cancel: &CancellationToken) -> Result<()>;

    async fn destroy(&mut self, cancel: &CancellationToken) -> Result<()>;

    async fn transfer(
        &mut self,
        cancel: CancellationToken,
        results: mpsc::Sender<ExecOutput>,
        commands: mpsc::Receiver<Command>,
    ) -> Result<()>;
}

/// Resolves a node's executor name to a ready-to-prepare [`Executor`].
#[async_trait]
pub trait ExecutorProvider: Send + Sync {
    async fn get_executor(&self, name: &str) -> Result<Box<dyn Executor>>;
}
