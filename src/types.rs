// src/types.rs

//! Status and event constants shared across the crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline / node status. The string forms are part of the external
/// surface: they appear in configs, in the evaluation namespace
/// (`nodeStatus`, `pipelineStatus`) and in listener payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "ABORTED")]
    Aborted,
    #[serde(rename = "PAUSED")]
    Paused,
    #[serde(rename = "UNKNOWN")]
    Unknown,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Running => "RUNNING",
            Status::Failed => "FAILED",
            Status::Success => "SUCCESS",
            Status::Aborted => "ABORTED",
            Status::Paused => "PAUSED",
            Status::Unknown => "UNKNOWN",
            Status::Cancelled => "CANCELLED",
        }
    }

    /// Parse a status string. Anything outside the closed set maps to
    /// `Unknown`, which is also the seeding default for nodes absent from
    /// a config's `Status` map.
    pub fn parse(s: &str) -> Status {
        match s.trim() {
            "RUNNING" => Status::Running,
            "FAILED" => Status::Failed,
            "SUCCESS" => Status::Success,
            "ABORTED" => Status::Aborted,
            "PAUSED" => Status::Paused,
            "CANCELLED" => Status::Cancelled,
            _ => Status::Unknown,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Unknown
    }
}

/// Lifecycle events dispatched to pipeline listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    PipelineInit,
    PipelineStart,
    PipelineFinish,
    PipelineExecutorPrepare,
    PipelineExecutorPrepareDone,
    PipelineNodeStart,
    PipelineNodeFinish,
    PipelineCancelled,
    PipelineStatusUpdate,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::PipelineInit => "pipeline-init",
            Event::PipelineStart => "pipeline-start",
            Event::PipelineFinish => "pipeline-finish",
            Event::PipelineExecutorPrepare => "pipeline-executor-prepare",
            Event::PipelineExecutorPrepareDone => "pipeline-executor-prepare-done",
            Event::PipelineNodeStart => "pipeline-node-start",
            Event::PipelineNodeFinish => "pipeline-node-finish",
            Event::PipelineCancelled => "pipeline-cancelled",
            Event::PipelineStatusUpdate => "pipeline-status-update",
        }
    }

    /// The full event set, in lifecycle order. Listeners default to
    /// subscribing to all of these.
    pub fn all() -> &'static [Event] {
        &[
            Event::PipelineInit,
            Event::PipelineStart,
            Event::PipelineFinish,
            Event::PipelineExecutorPrepare,
            Event::PipelineExecutorPrepareDone,
            Event::PipelineNodeStart,
            Event::PipelineNodeFinish,
            Event::PipelineCancelled,
            Event::PipelineStatusUpdate,
        ]
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in [
            Status::Running,
            Status::Failed,
            Status::Success,
            Status::Aborted,
            Status::Paused,
            Status::Unknown,
            Status::Cancelled,
        ] {
            assert_eq!(Status::parse(s.as_str()), s);
        }
    }

    #[test]
    fn unknown_status_string_maps_to_unknown() {
        assert_eq!(Status::parse("banana"), Status::Unknown);
        assert_eq!(Status::parse(""), Status::Unknown);
    }

    #[test]
    fn event_strings() {
        assert_eq!(Event::PipelineStart.as_str(), "pipeline-start");
        assert_eq!(Event::PipelineNodeFinish.as_str(), "pipeline-node-finish");
        assert_eq!(Event::all().len(), 9);
    }
}
