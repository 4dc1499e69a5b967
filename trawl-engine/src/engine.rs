//! Pipeline state machine
//!
//! The `Engine` owns every pipeline, the live capture per channel, and the
//! outbound side of the session. All transitions are synchronous and run
//! to completion; the async runtime serialises calls into it.
//!
//! Transitions:
//! - `start`: pending -> running, then advance
//! - advance: moves `current_step` forward by one and launches that step,
//!   repeating while steps finish without a command in flight
//! - command completion: parse output, fold into the step, advance
//! - `pause` / `resume` / `skip` / `cancel`: the only external mutators

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use trawl_core::catalog::Catalog;
use trawl_core::domain::event::{NotifyLevel, PipelineEvent};
use trawl_core::domain::pipeline::{
    FanoutState, Pipeline, PipelineId, PipelineStatus, StepStatus,
};
use trawl_core::domain::template::{CustomStep, InputMode, PipelineTemplate};
use trawl_core::dto::PipelineSummary;

use crate::command::{self, CommandVars};
use crate::config::EngineConfig;
use crate::detector::CaptureBuffer;
use crate::error::{EngineError, Result};
use crate::fanout;
use crate::parsers;
use crate::registry::PipelineRegistry;
use crate::session::SessionChannel;

/// Orchestrates pipelines over session channels
pub struct Engine {
    config: EngineConfig,
    catalog: Catalog,
    registry: PipelineRegistry,
    /// Live capture per channel id
    captures: HashMap<String, CaptureBuffer>,
    session: Arc<dyn SessionChannel>,
    events: UnboundedSender<PipelineEvent>,
}

impl Engine {
    /// Creates an engine
    ///
    /// # Arguments
    /// * `config` - Detector and bookkeeping settings
    /// * `catalog` - Templates pipelines can be created from
    /// * `session` - Carries commands to the shells behind each channel
    /// * `events` - Receives every observable change
    pub fn new(
        config: EngineConfig,
        catalog: Catalog,
        session: Arc<dyn SessionChannel>,
        events: UnboundedSender<PipelineEvent>,
    ) -> Self {
        Self {
            config,
            catalog,
            registry: PipelineRegistry::new(),
            captures: HashMap::new(),
            session,
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    // ========================================================================
    // Registry operations
    // ========================================================================

    /// Creates a pending pipeline
    ///
    /// `custom` supplies the steps when `template_key` is `custom`; it is
    /// ignored for catalog templates.
    pub fn create_pipeline(
        &mut self,
        template_key: &str,
        target: &str,
        custom: Option<&[CustomStep]>,
        now: DateTime<Utc>,
    ) -> Result<PipelineId> {
        let template = self.resolve_template(template_key, custom)?;
        validate_template(&template)?;

        let id = self.registry.allocate_id();
        let pipeline = Pipeline::new(id, &template, target.trim(), self.config.output_cap, now);
        self.registry.insert(pipeline);

        info!(
            "Created pipeline {} from template '{}' for {}",
            id, template.key, target
        );
        self.emit(PipelineEvent::Created { id });
        Ok(id)
    }

    /// Snapshot of one pipeline
    pub fn get(&self, id: PipelineId) -> Result<Pipeline> {
        self.registry.get(id).cloned()
    }

    /// Summaries of every pipeline, ordered by id
    pub fn list(&self) -> Vec<PipelineSummary> {
        self.registry.iter().map(PipelineSummary::from).collect()
    }

    /// Running plus paused pipelines
    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    /// True while a dispatched command of `id` awaits completion
    pub fn has_command_in_flight(&self, id: PipelineId) -> bool {
        self.captures.values().any(|capture| capture.pipeline == id)
    }

    /// Removes a completed or cancelled pipeline
    pub fn remove_pipeline(&mut self, id: PipelineId) -> Result<()> {
        self.registry.remove(id)?;
        info!("Removed pipeline {}", id);
        Ok(())
    }

    /// Removes every completed or cancelled pipeline
    pub fn clear_finished(&mut self) -> usize {
        let removed = self.registry.clear_finished();
        if removed > 0 {
            info!("Cleared {} finished pipeline(s)", removed);
        }
        removed
    }

    // ========================================================================
    // Channel binding
    // ========================================================================

    /// Binds a session channel to a pipeline
    ///
    /// Fails with `ChannelBusy` if another live pipeline owns the channel,
    /// and with `CaptureInFlight` if the pipeline is waiting on a command
    /// over its current channel.
    pub fn bind_channel(&mut self, id: PipelineId, channel: &str) -> Result<()> {
        let pipeline = self.registry.get(id)?;
        if pipeline.channel.as_deref() != Some(channel) && self.has_command_in_flight(id) {
            return Err(EngineError::CaptureInFlight(id));
        }

        self.registry.bind(id, channel)?;
        info!("Pipeline {} bound to channel {}", id, channel);
        Ok(())
    }

    /// Detaches the pipeline's channel; returns the channel id if one was bound
    pub fn unbind_channel(&mut self, id: PipelineId) -> Result<Option<String>> {
        self.registry.get(id)?;
        if self.has_command_in_flight(id) {
            return Err(EngineError::CaptureInFlight(id));
        }

        let channel = self.registry.release(id);
        if let Some(channel) = &channel {
            info!("Pipeline {} unbound from channel {}", id, channel);
        }
        Ok(channel)
    }

    // ========================================================================
    // Control operations
    // ========================================================================
    //
    // Each returns Ok(true) when it changed something and Ok(false) when the
    // pipeline was not in a state the operation applies to.

    /// pending -> running; a paused pipeline is resumed
    pub fn start(&mut self, id: PipelineId, now: DateTime<Utc>) -> Result<bool> {
        let pipeline = self.registry.get_mut(id)?;
        match pipeline.status {
            PipelineStatus::Pending => {
                pipeline.status = PipelineStatus::Running;
                pipeline.started_at.get_or_insert(now);
            }
            PipelineStatus::Paused => return self.resume(id, now),
            _ => return Ok(false),
        }

        info!("Started pipeline {}", id);
        self.emit_status(id, PipelineStatus::Running);
        self.advance(id, now);
        self.emit_active_count();
        Ok(true)
    }

    /// running -> paused
    ///
    /// A command already in flight keeps running and its output is still
    /// folded into the step; nothing new is dispatched until resume.
    pub fn pause(&mut self, id: PipelineId) -> Result<bool> {
        let pipeline = self.registry.get_mut(id)?;
        if pipeline.status != PipelineStatus::Running {
            return Ok(false);
        }
        pipeline.status = PipelineStatus::Paused;

        info!("Paused pipeline {}", id);
        self.emit_status(id, PipelineStatus::Paused);
        self.emit_active_count();
        Ok(true)
    }

    /// paused -> running
    ///
    /// Picks up whatever finished while paused: advances past a completed
    /// step, or dispatches the next queued fan-out item.
    pub fn resume(&mut self, id: PipelineId, now: DateTime<Utc>) -> Result<bool> {
        let pipeline = self.registry.get_mut(id)?;
        if pipeline.status != PipelineStatus::Paused {
            return Ok(false);
        }
        pipeline.status = PipelineStatus::Running;
        let current = pipeline.current_step;

        info!("Resumed pipeline {}", id);
        self.emit_status(id, PipelineStatus::Running);

        if let Some(index) = current
            && !self.has_command_in_flight(id)
        {
            self.continue_step(id, index, now);
        }
        self.advance(id, now);
        self.emit_active_count();
        Ok(true)
    }

    /// Abandons the current step and moves on
    ///
    /// Interrupts the command in flight and drops its capture. On a paused
    /// pipeline the next step waits for resume.
    pub fn skip(&mut self, id: PipelineId, now: DateTime<Utc>) -> Result<bool> {
        let pipeline = self.registry.get_mut(id)?;
        if !pipeline.status.is_active() {
            return Ok(false);
        }
        let Some(index) = pipeline.current_step else {
            return Ok(false);
        };
        let step = &mut pipeline.steps[index];
        if step.status != StepStatus::Running {
            return Ok(false);
        }

        step.status = StepStatus::Skipped;
        step.fanout.abandon();
        step.current_target = None;
        step.touch_elapsed(now);
        let targets = step.targets.len();
        let name = step.name().to_string();

        info!("Skipped step {} ('{}') of pipeline {}", index, name, id);
        self.interrupt(id);
        self.emit(PipelineEvent::StepFinished {
            id,
            step: index,
            status: StepStatus::Skipped,
            targets,
        });
        self.notify(
            format!("Pipeline {} skipped step '{}'", id, name),
            NotifyLevel::Info,
        );
        self.advance(id, now);
        self.emit_active_count();
        Ok(true)
    }

    /// Terminal: stops the pipeline for good
    pub fn cancel(&mut self, id: PipelineId, now: DateTime<Utc>) -> Result<bool> {
        let pipeline = self.registry.get_mut(id)?;
        if pipeline.status.is_terminal() {
            return Ok(false);
        }

        pipeline.status = PipelineStatus::Cancelled;
        pipeline.ended_at = Some(now);
        let mut finished_step = None;
        if let Some(step) = pipeline.current_mut()
            && step.status == StepStatus::Running
        {
            step.status = StepStatus::Cancelled;
            step.fanout.abandon();
            step.current_target = None;
            step.touch_elapsed(now);
            finished_step = Some(step.targets.len());
        }
        let current = pipeline.current_step;

        info!("Cancelled pipeline {}", id);
        self.interrupt(id);
        self.registry.release(id);

        if let (Some(index), Some(targets)) = (current, finished_step) {
            self.emit(PipelineEvent::StepFinished {
                id,
                step: index,
                status: StepStatus::Cancelled,
                targets,
            });
        }
        self.emit_status(id, PipelineStatus::Cancelled);
        self.emit_active_count();
        Ok(true)
    }

    // ========================================================================
    // Session events
    // ========================================================================

    /// Feeds raw output from `channel`
    ///
    /// Data on a channel with no live capture is dropped.
    pub fn on_data(&mut self, channel: &str, chunk: &str, now: DateTime<Utc>) {
        let Some(capture) = self.captures.get_mut(channel) else {
            debug!("Dropping {} bytes on idle channel {}", chunk.len(), channel);
            return;
        };

        if let Some(lines) = capture.feed(chunk, now, &self.config)
            && let Some(capture) = self.captures.remove(channel)
        {
            self.on_step_command_complete(capture, lines, now);
            self.emit_active_count();
        }
    }

    /// Periodic tick
    ///
    /// Completes captures whose prompt has been sitting idle and refreshes
    /// the elapsed time of every running step.
    pub fn on_tick(&mut self, now: DateTime<Utc>) {
        let config = &self.config;
        let idle: Vec<(String, Vec<String>)> = self
            .captures
            .iter_mut()
            .filter_map(|(channel, capture)| {
                capture
                    .poll_idle(now, config)
                    .map(|lines| (channel.clone(), lines))
            })
            .collect();

        let completed = !idle.is_empty();
        for (channel, lines) in idle {
            if let Some(capture) = self.captures.remove(&channel) {
                debug!("Idle prompt on channel {} completes its command", channel);
                self.on_step_command_complete(capture, lines, now);
            }
        }

        let mut ticks = Vec::new();
        for id in self.registry.ids() {
            let Ok(pipeline) = self.registry.get_mut(id) else {
                continue;
            };
            if !pipeline.status.is_active() {
                continue;
            }
            for (index, step) in pipeline.steps.iter_mut().enumerate() {
                if step.status == StepStatus::Running {
                    step.touch_elapsed(now);
                    ticks.push(PipelineEvent::Tick {
                        id,
                        step: index,
                        elapsed_ms: step.elapsed_ms,
                    });
                }
            }
        }
        for tick in ticks {
            self.emit(tick);
        }

        if completed {
            self.emit_active_count();
        }
    }

    /// The shell behind `channel` went away
    ///
    /// The step waiting on it becomes `error`, the channel is unbound, and a
    /// running pipeline is paused until the host binds a new channel and
    /// resumes.
    pub fn on_channel_closed(&mut self, channel: &str, now: DateTime<Utc>) {
        let capture = self.captures.remove(channel);
        let Some(id) = self.registry.owner_of(channel) else {
            debug!("Closed channel {} had no pipeline", channel);
            return;
        };
        self.registry.release(id);
        warn!("Channel {} of pipeline {} closed", channel, id);

        if let Some(capture) = capture
            && capture.pipeline == id
        {
            self.fail_step(id, capture.step, "session channel closed", now);
        }

        if let Ok(pipeline) = self.registry.get_mut(id)
            && pipeline.status == PipelineStatus::Running
        {
            pipeline.status = PipelineStatus::Paused;
            self.emit_status(id, PipelineStatus::Paused);
        }

        self.notify(
            format!("Pipeline {} lost channel {}; bind a new one and resume", id, channel),
            NotifyLevel::Warning,
        );
        self.emit_active_count();
    }

    // ========================================================================
    // Internal transitions
    // ========================================================================

    /// Launches steps until one has a command in flight or steps run out
    ///
    /// No-op unless the pipeline is running and its current step is done.
    fn advance(&mut self, id: PipelineId, now: DateTime<Utc>) {
        loop {
            let Ok(pipeline) = self.registry.get_mut(id) else {
                return;
            };
            if pipeline.status != PipelineStatus::Running {
                return;
            }
            if pipeline.current().is_some_and(|step| !step.status.is_finished()) {
                return;
            }

            let next = pipeline.next_index();
            if next >= pipeline.steps.len() {
                self.complete_pipeline(id, now);
                return;
            }
            pipeline.current_step = Some(next);

            if self.launch_step(id, next, now) {
                return;
            }
        }
    }

    /// Starts the step at `index`; true if a command is now in flight
    fn launch_step(&mut self, id: PipelineId, index: usize, now: DateTime<Utc>) -> bool {
        let Ok(pipeline) = self.registry.get_mut(id) else {
            return false;
        };
        let inputs = pipeline.input_targets(index);
        let step = &mut pipeline.steps[index];
        step.status = StepStatus::Running;
        step.started_at = Some(now);
        step.elapsed_ms = 0;

        let template = step.template.clone();
        let items = fanout::resolve_items(&template, &inputs);

        info!(
            "Pipeline {} step {} ('{}') starting with {} input(s)",
            id,
            index,
            template.name,
            items.len()
        );
        self.emit(PipelineEvent::StepStarted {
            id,
            step: index,
            name: template.name.clone(),
        });

        if items.is_empty() {
            self.finish_step(id, index, StepStatus::Skipped, Some("no input targets"), now);
            return false;
        }

        if template.fanout {
            let total = items.len();
            if let Ok(pipeline) = self.registry.get_mut(id) {
                pipeline.steps[index].fanout = FanoutState::new(items);
            }
            self.emit(PipelineEvent::FanoutProgress {
                id,
                step: index,
                completed: 0,
                total,
            });
            return self.continue_fanout(id, index, now);
        }

        let (command, label) = match template.input_mode {
            InputMode::PipeAll => {
                let targets: Vec<String> = items.iter().map(|item| item.target.clone()).collect();
                let command = command::build(&template.command, &CommandVars::pipe_all(&targets));
                (command, format!("{} target(s)", targets.len()))
            }
            InputMode::Single => {
                if items.len() > 1 {
                    debug!(
                        "Pipeline {} step {} takes one target, {} input(s) left unused",
                        id,
                        index,
                        items.len() - 1
                    );
                }
                let item = &items[0];
                let command = command::build(
                    &template.command,
                    &CommandVars::single(&item.target, item.port),
                );
                (command, item.to_string())
            }
        };

        if let Ok(pipeline) = self.registry.get_mut(id) {
            pipeline.steps[index].current_target = Some(label);
        }
        self.send_command(id, index, command, false, now)
    }

    /// Dispatches the next queued fan-out item; true if one is in flight
    fn continue_fanout(&mut self, id: PipelineId, index: usize, now: DateTime<Utc>) -> bool {
        let limit = fanout::effective_limit(self.config.max_concurrent_fanout);
        let Ok(pipeline) = self.registry.get_mut(id) else {
            return false;
        };
        let step = &mut pipeline.steps[index];
        let Some(item) = step.fanout.take_next(limit) else {
            return false;
        };

        let command = command::build(
            &step.template.command,
            &CommandVars::single(&item.target, item.port),
        );
        step.current_target = Some(item.to_string());
        debug!(
            "Pipeline {} step {} fan-out item {}/{}: {}",
            id,
            index,
            step.fanout.completed + 1,
            step.fanout.total,
            item
        );

        self.send_command(id, index, command, true, now)
    }

    /// Resumes a running step that has nothing in flight
    fn continue_step(&mut self, id: PipelineId, index: usize, now: DateTime<Utc>) {
        let Ok(pipeline) = self.registry.get(id) else {
            return;
        };
        let step = &pipeline.steps[index];
        if step.status != StepStatus::Running {
            return;
        }

        if step.template.fanout && self.continue_fanout(id, index, now) {
            return;
        }
        self.finish_fanout_or_step(id, index, now);
    }

    /// Sends `command` on the pipeline's channel and opens its capture
    ///
    /// Any failure marks the step `error`; returns true on success.
    fn send_command(
        &mut self,
        id: PipelineId,
        index: usize,
        command: String,
        is_fanout_item: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let Ok(pipeline) = self.registry.get_mut(id) else {
            return false;
        };
        let Some(channel) = pipeline.channel.clone() else {
            self.fail_step(id, index, "no session channel bound", now);
            return false;
        };
        if self.captures.contains_key(&channel) {
            self.fail_step(id, index, "channel already has a command in flight", now);
            return false;
        }
        pipeline.steps[index].current_command = Some(command.clone());

        if let Err(e) = self.session.dispatch(&channel, &command) {
            self.fail_step(id, index, &e.to_string(), now);
            return false;
        }

        info!("Pipeline {} step {} dispatched: {}", id, index, command);
        let capture = CaptureBuffer::new(id, index, command.clone(), is_fanout_item, now, &self.config);
        self.captures.insert(channel, capture);
        self.emit(PipelineEvent::CommandDispatched {
            id,
            step: index,
            command,
        });
        true
    }

    /// Folds a finished command's output into its step and moves on
    ///
    /// Completions for steps that are no longer running (skipped, cancelled,
    /// failed) are ignored.
    fn on_step_command_complete(
        &mut self,
        capture: CaptureBuffer,
        lines: Vec<String>,
        now: DateTime<Utc>,
    ) {
        let id = capture.pipeline;
        let index = capture.step;
        let Ok(pipeline) = self.registry.get_mut(id) else {
            debug!("Completion for unknown pipeline {}", id);
            return;
        };
        let paused = pipeline.status == PipelineStatus::Paused;
        let Some(step) = pipeline.steps.get_mut(index) else {
            return;
        };
        if pipeline.status.is_terminal() || step.status != StepStatus::Running {
            debug!("Ignoring stale completion for pipeline {} step {}", id, index);
            return;
        }

        let found = parsers::parse(step.template.parser, &lines);
        debug!(
            "Pipeline {} step {} captured {} line(s), {} target(s)",
            id,
            index,
            lines.len(),
            found.len()
        );
        step.output.extend(lines);
        step.merge_targets(found);
        step.touch_elapsed(now);

        if capture.is_fanout_item {
            step.fanout.finish_one();
            let (completed, total) = (step.fanout.completed, step.fanout.total);
            let drained = step.fanout.is_drained();
            self.emit(PipelineEvent::FanoutProgress {
                id,
                step: index,
                completed,
                total,
            });

            if !drained && (paused || self.continue_fanout(id, index, now)) {
                return;
            }
        }

        self.finish_fanout_or_step(id, index, now);
        self.advance(id, now);
    }

    /// Marks a running step `completed` once no fan-out work remains
    fn finish_fanout_or_step(&mut self, id: PipelineId, index: usize, now: DateTime<Utc>) {
        let Ok(pipeline) = self.registry.get(id) else {
            return;
        };
        let step = &pipeline.steps[index];
        if step.status == StepStatus::Running && step.fanout.is_drained() {
            self.finish_step(id, index, StepStatus::Completed, None, now);
        }
    }

    fn finish_step(
        &mut self,
        id: PipelineId,
        index: usize,
        status: StepStatus,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let Ok(pipeline) = self.registry.get_mut(id) else {
            return;
        };
        let step = &mut pipeline.steps[index];
        step.status = status;
        step.current_target = None;
        step.touch_elapsed(now);
        if let Some(note) = note {
            step.output.push(format!("[trawl] {}", note));
        }
        let targets = step.targets.len();

        info!(
            "Pipeline {} step {} ('{}') {} with {} target(s)",
            id,
            index,
            step.name(),
            status,
            targets
        );
        self.emit(PipelineEvent::StepFinished {
            id,
            step: index,
            status,
            targets,
        });
    }

    /// Records a dispatch failure on the step and tells the host
    fn fail_step(&mut self, id: PipelineId, index: usize, reason: &str, now: DateTime<Utc>) {
        let name = match self.registry.get_mut(id) {
            Ok(pipeline) => {
                let step = &mut pipeline.steps[index];
                if step.status.is_finished() {
                    return;
                }
                step.fanout.abandon();
                step.name().to_string()
            }
            Err(_) => return,
        };

        warn!("Pipeline {} step {} ('{}') failed: {}", id, index, name, reason);
        self.finish_step(id, index, StepStatus::Error, Some(reason), now);
        self.notify(
            format!("Pipeline {} step '{}' failed: {}", id, name, reason),
            NotifyLevel::Error,
        );
    }

    fn complete_pipeline(&mut self, id: PipelineId, now: DateTime<Utc>) {
        let Ok(pipeline) = self.registry.get_mut(id) else {
            return;
        };
        pipeline.status = PipelineStatus::Completed;
        pipeline.ended_at = Some(now);
        let total = pipeline.total_targets();
        let message = format!(
            "Pipeline {} ({}) on {} completed with {} target(s)",
            id, pipeline.template_name, pipeline.target, total
        );
        self.registry.release(id);

        info!("{}", message);
        self.emit_status(id, PipelineStatus::Completed);
        self.notify(message, NotifyLevel::Success);
    }

    /// Drops the pipeline's live capture and interrupts its channel
    fn interrupt(&mut self, id: PipelineId) {
        let channel = self
            .captures
            .iter()
            .find(|(_, capture)| capture.pipeline == id)
            .map(|(channel, _)| channel.clone());
        let Some(channel) = channel else {
            return;
        };
        self.captures.remove(&channel);

        if let Err(e) = self.session.interrupt(&channel) {
            warn!("Failed to interrupt channel {}: {}", channel, e);
        }
    }

    fn resolve_template(
        &self,
        template_key: &str,
        custom: Option<&[CustomStep]>,
    ) -> Result<PipelineTemplate> {
        if template_key == PipelineTemplate::CUSTOM_KEY {
            let steps = custom.unwrap_or_default();
            return Ok(PipelineTemplate::custom(steps));
        }
        self.catalog
            .get(template_key)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTemplate(template_key.to_string()))
    }

    // ========================================================================
    // Events
    // ========================================================================

    fn emit(&self, event: PipelineEvent) {
        // A host that stopped listening is not an engine failure
        let _ = self.events.send(event);
    }

    fn emit_status(&self, id: PipelineId, status: PipelineStatus) {
        self.emit(PipelineEvent::StatusChanged { id, status });
    }

    fn emit_active_count(&self) {
        self.emit(PipelineEvent::ActiveCount {
            count: self.registry.active_count(),
        });
    }

    fn notify(&self, message: String, level: NotifyLevel) {
        self.emit(PipelineEvent::Notification { message, level });
    }
}

/// Checks that a template can run
///
/// Every step needs a name and a command. A pipe-all step must take its
/// inputs through `{targets_newline}`, and only pipe-all steps may use it.
pub fn validate_template(template: &PipelineTemplate) -> Result<()> {
    if template.steps.is_empty() {
        return Err(EngineError::InvalidTemplate(format!(
            "template '{}' has no steps",
            template.key
        )));
    }
    for (index, step) in template.steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            return Err(EngineError::InvalidTemplate(format!(
                "step {} of '{}' has no name",
                index, template.key
            )));
        }
        if step.command.trim().is_empty() {
            return Err(EngineError::InvalidTemplate(format!(
                "step '{}' of '{}' has no command",
                step.name, template.key
            )));
        }

        let takes_list = command::takes_target_list(&step.command);
        let pipe_all = step.input_mode == InputMode::PipeAll;
        if step.fanout && (pipe_all || takes_list) {
            return Err(EngineError::InvalidTemplate(format!(
                "step '{}' of '{}' fans out and cannot take the target list",
                step.name, template.key
            )));
        }
        if pipe_all && !takes_list {
            return Err(EngineError::InvalidTemplate(format!(
                "pipe-all step '{}' of '{}' has no {{targets_newline}} placeholder",
                step.name, template.key
            )));
        }
        if !pipe_all && takes_list {
            return Err(EngineError::InvalidTemplate(format!(
                "step '{}' of '{}' uses {{targets_newline}} but is not pipe-all",
                step.name, template.key
            )));
        }
    }
    Ok(())
}
