//! Data Transfer Objects
//!
//! Lightweight views of engine state for hosts that list pipelines without
//! needing every step's output buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::pipeline::{Pipeline, PipelineId, PipelineStatus};

/// Pipeline summary for listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: PipelineId,
    pub template_key: String,
    pub target: String,
    pub status: PipelineStatus,
    pub current_step: Option<usize>,
    pub current_step_name: Option<String>,
    pub step_count: usize,
    pub targets_found: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub channel: Option<String>,
}

impl From<&Pipeline> for PipelineSummary {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            id: pipeline.id,
            template_key: pipeline.template_key.clone(),
            target: pipeline.target.clone(),
            status: pipeline.status,
            current_step: pipeline.current_step,
            current_step_name: pipeline.current().map(|step| step.name().to_string()),
            step_count: pipeline.steps.len(),
            targets_found: pipeline.total_targets(),
            started_at: pipeline.started_at,
            ended_at: pipeline.ended_at,
            channel: pipeline.channel.clone(),
        }
    }
}
