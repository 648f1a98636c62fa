// src/lib.rs

//! pipedag — the runtime core of a CI/CD pipeline engine.
//!
//! A declarative YAML configuration is compiled into a DAG of work nodes
//! and driven to completion by a frontier-parallel scheduler that honors
//! conditional edges, cancellation and structured errors. Node work runs
//! through pluggable executor backends behind the adapter/bridge/executor
//! contract.
//!
//! Typical embedding:
//!
//! ```no_run
//! use pipedag::Runtime;
//!
//! # async fn example() -> pipedag::Result<()> {
//! let runtime = Runtime::new();
//! runtime.start_background();
//!
//! let config = r#"
//! Graph: |
//!   stateDiagram-v2
//!   [*] --> build
//!   build --> deploy : gate [{{ env == 'prod' }}]
//! Param:
//!   env: prod
//! Nodes:
//!   build: {}
//!   deploy: {}
//! "#;
//!
//! let pipeline = runtime.run_async("release-42", config, None).await?;
//! pipeline.done().await;
//! runtime.stop_background();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod pusher;
pub mod runtime;
pub mod template;
pub mod types;

pub use config::PipelineConfig;
pub use dag::{Edge, EvaluationContext, Graph, Namespace, Node, Step};
pub use errors::{Error, Result};
pub use exec::{
    Adapter, Bridge, Command, ExecOutput, Executor, ExecutorProvider, StepResult,
};
pub use metadata::MetadataStore;
pub use pipeline::{Listener, Pipeline};
pub use pusher::{Entry, Level, Pusher};
pub use runtime::Runtime;
pub use template::{RhaiTemplateEngine, TemplateEngine};
pub use types::{Event, Status};
