//! Engine events
//!
//! The engine never calls into a UI. Every observable change is published as
//! a `PipelineEvent` on a channel that the host drains.

use serde::{Deserialize, Serialize};

use super::pipeline::{PipelineId, PipelineStatus, StepStatus};

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Created {
        id: PipelineId,
    },
    StatusChanged {
        id: PipelineId,
        status: PipelineStatus,
    },
    StepStarted {
        id: PipelineId,
        step: usize,
        name: String,
    },
    CommandDispatched {
        id: PipelineId,
        step: usize,
        command: String,
    },
    FanoutProgress {
        id: PipelineId,
        step: usize,
        completed: usize,
        total: usize,
    },
    StepFinished {
        id: PipelineId,
        step: usize,
        status: StepStatus,
        targets: usize,
    },
    /// Periodic elapsed-time refresh for a running step
    Tick {
        id: PipelineId,
        step: usize,
        elapsed_ms: u64,
    },
    Notification {
        message: String,
        level: NotifyLevel,
    },
    /// Number of running or paused pipelines
    ActiveCount {
        count: usize,
    },
}

impl PipelineEvent {
    /// Pipeline the event belongs to, if any
    pub fn pipeline(&self) -> Option<PipelineId> {
        match self {
            PipelineEvent::Created { id }
            | PipelineEvent::StatusChanged { id, .. }
            | PipelineEvent::StepStarted { id, .. }
            | PipelineEvent::CommandDispatched { id, .. }
            | PipelineEvent::FanoutProgress { id, .. }
            | PipelineEvent::StepFinished { id, .. }
            | PipelineEvent::Tick { id, .. } => Some(*id),
            PipelineEvent::Notification { .. } | PipelineEvent::ActiveCount { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = PipelineEvent::StatusChanged {
            id: PipelineId(3),
            status: PipelineStatus::Paused,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "status_changed");
        assert_eq!(json["id"], 3);
        assert_eq!(json["status"], "paused");
        assert_eq!(event.pipeline(), Some(PipelineId(3)));
    }
}
