//! Pipeline domain types
//!
//! A `Pipeline` is one run of a `PipelineTemplate` against an initial target.
//! Its steps carry a copy of the template fields plus the mutable state the
//! engine updates as commands run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use super::output::OutputBuffer;
use super::target::Target;
use super::template::{PipelineTemplate, StepTemplate};

/// Pipeline identifier, allocated monotonically by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(pub u64);

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pipeline lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl PipelineStatus {
    /// Completed and cancelled pipelines accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Completed | PipelineStatus::Cancelled)
    }

    /// Running and paused pipelines count towards the active badge
    pub fn is_active(&self) -> bool {
        matches!(self, PipelineStatus::Running | PipelineStatus::Paused)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStatus::Pending => write!(f, "pending"),
            PipelineStatus::Running => write!(f, "running"),
            PipelineStatus::Paused => write!(f, "paused"),
            PipelineStatus::Completed => write!(f, "completed"),
            PipelineStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Skipped,
    Cancelled,
    Error,
}

impl StepStatus {
    /// The step has left `running` and will not change again
    pub fn is_finished(&self) -> bool {
        !matches!(self, StepStatus::Pending | StepStatus::Running)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Skipped => write!(f, "skipped"),
            StepStatus::Cancelled => write!(f, "cancelled"),
            StepStatus::Error => write!(f, "error"),
        }
    }
}

/// One unit of fan-out work
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FanoutItem {
    pub target: String,
    pub port: Option<u16>,
}

impl FanoutItem {
    pub fn new(target: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            target: target.into(),
            port,
        }
    }
}

impl fmt::Display for FanoutItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.target, port),
            None => f.write_str(&self.target),
        }
    }
}

/// Fan-out bookkeeping for one step
///
/// `completed + active + queue.len() == total` holds after every mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutState {
    pub queue: VecDeque<FanoutItem>,
    pub total: usize,
    pub completed: usize,
    pub active: usize,
}

impl FanoutState {
    pub fn new(items: Vec<FanoutItem>) -> Self {
        Self {
            total: items.len(),
            queue: items.into(),
            completed: 0,
            active: 0,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.completed + self.active + self.queue.len() == self.total
    }

    /// Nothing queued and nothing in flight
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.active == 0
    }

    /// Pulls the next item if fewer than `limit` items are in flight
    pub fn take_next(&mut self, limit: usize) -> Option<FanoutItem> {
        if self.active >= limit {
            return None;
        }
        let item = self.queue.pop_front()?;
        self.active += 1;
        Some(item)
    }

    /// Records completion of one in-flight item
    pub fn finish_one(&mut self) {
        if self.active > 0 {
            self.active -= 1;
            self.completed += 1;
        }
    }

    /// Drops queued and in-flight work; the total shrinks to what finished
    pub fn abandon(&mut self) {
        self.queue.clear();
        self.active = 0;
        self.total = self.completed;
    }
}

/// Mutable state of one step within a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    #[serde(flatten)]
    pub template: StepTemplate,
    pub status: StepStatus,
    pub output: OutputBuffer,
    pub targets: Vec<Target>,
    pub current_target: Option<String>,
    pub current_command: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    pub fanout: FanoutState,
}

impl StepState {
    pub fn from_template(template: &StepTemplate, output_cap: usize) -> Self {
        Self {
            template: template.clone(),
            status: StepStatus::Pending,
            output: OutputBuffer::new(output_cap),
            targets: Vec::new(),
            current_target: None,
            current_command: None,
            started_at: None,
            elapsed_ms: 0,
            fanout: FanoutState::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }

    /// Unions `found` into `targets`, keeping first-occurrence order
    pub fn merge_targets(&mut self, found: Vec<Target>) {
        for target in found {
            if !self.targets.contains(&target) {
                self.targets.push(target);
            }
        }
    }

    /// Refreshes `elapsed_ms` from `started_at`
    pub fn touch_elapsed(&mut self, now: DateTime<Utc>) {
        if let Some(started) = self.started_at {
            self.elapsed_ms = (now - started).num_milliseconds().max(0) as u64;
        }
    }
}

/// A pipeline instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub template_key: String,
    pub template_name: String,

    /// Initial input
    pub target: String,
    pub steps: Vec<StepState>,

    /// `None` before the first step starts; only ever moves forward
    pub current_step: Option<usize>,
    pub status: PipelineStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Session channel currently bound to this pipeline
    pub channel: Option<String>,
}

impl Pipeline {
    pub fn new(
        id: PipelineId,
        template: &PipelineTemplate,
        target: impl Into<String>,
        output_cap: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            template_key: template.key.clone(),
            template_name: template.name.clone(),
            target: target.into(),
            steps: template
                .steps
                .iter()
                .map(|step| StepState::from_template(step, output_cap))
                .collect(),
            current_step: None,
            status: PipelineStatus::Pending,
            created_at: now,
            started_at: None,
            ended_at: None,
            channel: None,
        }
    }

    /// Index the next call to advance will move to
    pub fn next_index(&self) -> usize {
        self.current_step.map_or(0, |index| index + 1)
    }

    pub fn current(&self) -> Option<&StepState> {
        self.current_step.and_then(|index| self.steps.get(index))
    }

    pub fn current_mut(&mut self) -> Option<&mut StepState> {
        self.current_step.and_then(|index| self.steps.get_mut(index))
    }

    pub fn running_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Running)
            .count()
    }

    /// Inputs for the step at `index`
    ///
    /// Targets of the nearest earlier step that produced any, otherwise the
    /// pipeline's initial target.
    pub fn input_targets(&self, index: usize) -> Vec<Target> {
        self.steps[..index.min(self.steps.len())]
            .iter()
            .rev()
            .find(|step| !step.targets.is_empty())
            .map(|step| step.targets.clone())
            .unwrap_or_else(|| vec![Target::Host(self.target.clone())])
    }

    /// Number of targets recorded across every step
    pub fn total_targets(&self) -> usize {
        self.steps.iter().map(|step| step.targets.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::template::ParserKind;

    fn template() -> PipelineTemplate {
        PipelineTemplate {
            key: "domain".to_string(),
            name: "Domain".to_string(),
            target_label: "domain".to_string(),
            steps: vec![
                StepTemplate::new("subs", "subfinder -d {target}", ParserKind::Subfinder),
                StepTemplate::new("probe", "httpx -u {target}", ParserKind::Httpx),
                StepTemplate::new("scan", "nuclei -u {target}", ParserKind::Line),
            ],
        }
    }

    #[test]
    fn test_new_pipeline_is_pending() {
        let pipeline = Pipeline::new(PipelineId(1), &template(), "example.com", 10, Utc::now());
        assert_eq!(pipeline.status, PipelineStatus::Pending);
        assert_eq!(pipeline.current_step, None);
        assert_eq!(pipeline.next_index(), 0);
        assert!(pipeline.steps.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn test_input_targets_walks_back_to_last_producer() {
        let mut pipeline = Pipeline::new(PipelineId(1), &template(), "example.com", 10, Utc::now());
        assert_eq!(pipeline.input_targets(0), vec![Target::from("example.com")]);
        assert_eq!(pipeline.input_targets(1), vec![Target::from("example.com")]);

        pipeline.steps[0].targets = vec![Target::from("a.example.com")];
        assert_eq!(pipeline.input_targets(2), vec![Target::from("a.example.com")]);

        pipeline.steps[1].targets = vec![Target::from("https://a.example.com")];
        assert_eq!(
            pipeline.input_targets(2),
            vec![Target::from("https://a.example.com")]
        );
    }

    #[test]
    fn test_fanout_state_invariant() {
        let mut fanout = FanoutState::new(vec![
            FanoutItem::new("a", None),
            FanoutItem::new("b", None),
            FanoutItem::new("c", None),
        ]);
        assert!(fanout.is_consistent());

        let first = fanout.take_next(1).unwrap();
        assert_eq!(first.target, "a");
        assert!(fanout.take_next(1).is_none());
        assert!(fanout.is_consistent());

        fanout.finish_one();
        assert_eq!(fanout.completed, 1);
        assert!(fanout.is_consistent());

        fanout.take_next(1).unwrap();
        fanout.abandon();
        assert!(fanout.is_consistent());
        assert!(fanout.is_drained());
        assert_eq!(fanout.total, 1);
    }

    #[test]
    fn test_merge_targets_dedups_in_order() {
        let mut step = StepState::from_template(&template().steps[0], 10);
        step.merge_targets(vec![Target::from("b"), Target::from("a")]);
        step.merge_targets(vec![Target::from("a"), Target::from("c")]);
        assert_eq!(
            step.targets,
            vec![Target::from("b"), Target::from("a"), Target::from("c")]
        );
    }
}
