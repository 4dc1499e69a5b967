//! Pipeline registry
//!
//! In-memory table of pipeline instances, the channel binding index, and
//! id allocation. Owned by the engine; nothing here is global.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use trawl_core::domain::pipeline::{Pipeline, PipelineId};

use crate::error::{EngineError, Result};

/// Pipelines keyed by id, plus which pipeline owns which channel
#[derive(Debug, Default)]
pub struct PipelineRegistry {
    pipelines: BTreeMap<PipelineId, Pipeline>,
    channels: HashMap<String, PipelineId>,
    next_id: u64,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next pipeline id
    ///
    /// Ids are never reused, even after the pipeline is removed.
    pub fn allocate_id(&mut self) -> PipelineId {
        self.next_id += 1;
        PipelineId(self.next_id)
    }

    pub fn insert(&mut self, pipeline: Pipeline) {
        debug!("Registering pipeline {}", pipeline.id);
        self.pipelines.insert(pipeline.id, pipeline);
    }

    pub fn get(&self, id: PipelineId) -> Result<&Pipeline> {
        self.pipelines
            .get(&id)
            .ok_or(EngineError::PipelineNotFound(id))
    }

    pub fn get_mut(&mut self, id: PipelineId) -> Result<&mut Pipeline> {
        self.pipelines
            .get_mut(&id)
            .ok_or(EngineError::PipelineNotFound(id))
    }

    pub fn contains(&self, id: PipelineId) -> bool {
        self.pipelines.contains_key(&id)
    }

    /// Pipelines ordered by id
    pub fn iter(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    pub fn ids(&self) -> Vec<PipelineId> {
        self.pipelines.keys().copied().collect()
    }

    /// Removes a finished pipeline
    ///
    /// Pending, running and paused pipelines are refused with
    /// `PipelineActive`.
    pub fn remove(&mut self, id: PipelineId) -> Result<Pipeline> {
        let pipeline = self.get(id)?;
        if !pipeline.status.is_terminal() {
            return Err(EngineError::PipelineActive(id));
        }
        self.release(id);
        self.pipelines
            .remove(&id)
            .ok_or(EngineError::PipelineNotFound(id))
    }

    /// Drops every completed or cancelled pipeline; returns how many
    pub fn clear_finished(&mut self) -> usize {
        let finished: Vec<PipelineId> = self
            .pipelines
            .values()
            .filter(|p| p.status.is_terminal())
            .map(|p| p.id)
            .collect();

        for id in &finished {
            self.release(*id);
            self.pipelines.remove(id);
        }
        finished.len()
    }

    /// Binds `channel` to pipeline `id`
    ///
    /// A channel may only be owned by one non-terminal pipeline at a time.
    /// Any channel the pipeline held before is released.
    pub fn bind(&mut self, id: PipelineId, channel: &str) -> Result<()> {
        if !self.contains(id) {
            return Err(EngineError::PipelineNotFound(id));
        }

        if let Some(&holder) = self.channels.get(channel)
            && holder != id
        {
            if self.owner_of(channel).is_some() {
                return Err(EngineError::ChannelBusy {
                    channel: channel.to_string(),
                    owner: holder,
                });
            }
            self.release(holder);
        }

        self.release(id);
        let pipeline = self.get_mut(id)?;
        pipeline.channel = Some(channel.to_string());
        self.channels.insert(channel.to_string(), id);
        debug!("Bound channel {} to pipeline {}", channel, id);
        Ok(())
    }

    /// Unbinds whatever channel pipeline `id` holds; returns it
    pub fn release(&mut self, id: PipelineId) -> Option<String> {
        let channel = self.pipelines.get_mut(&id)?.channel.take()?;
        if self.channels.get(&channel) == Some(&id) {
            self.channels.remove(&channel);
        }
        debug!("Released channel {} from pipeline {}", channel, id);
        Some(channel)
    }

    /// Live pipeline bound to `channel`
    ///
    /// Bindings left behind by terminal pipelines do not count.
    pub fn owner_of(&self, channel: &str) -> Option<PipelineId> {
        let id = self.channels.get(channel)?;
        self.pipelines
            .get(id)
            .filter(|p| !p.status.is_terminal())
            .map(|p| p.id)
    }

    /// Number of running or paused pipelines
    pub fn active_count(&self) -> usize {
        self.pipelines
            .values()
            .filter(|p| p.status.is_active())
            .count()
    }
}
