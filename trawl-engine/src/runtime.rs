//! Engine runtime
//!
//! Runs an [`Engine`] on its own task. Every operation is a message on one
//! queue, so transitions never overlap, and a `tokio::time::interval`
//! drives `on_tick`. Hosts talk to it through a cloneable [`EngineHandle`].

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};
use trawl_core::domain::pipeline::{Pipeline, PipelineId};
use trawl_core::domain::template::CustomStep;
use trawl_core::dto::PipelineSummary;

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// Control operations on one pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Pause,
    Resume,
    Skip,
    Cancel,
}

/// Messages processed by the runtime task
#[derive(Debug)]
pub enum EngineCommand {
    Create {
        template: String,
        target: String,
        custom: Option<Vec<CustomStep>>,
        reply: oneshot::Sender<Result<PipelineId>>,
    },
    Bind {
        id: PipelineId,
        channel: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Unbind {
        id: PipelineId,
        reply: oneshot::Sender<Result<Option<String>>>,
    },
    Control {
        id: PipelineId,
        action: ControlAction,
        reply: oneshot::Sender<Result<bool>>,
    },
    Data {
        channel: String,
        chunk: String,
    },
    ChannelClosed {
        channel: String,
    },
    Get {
        id: PipelineId,
        reply: oneshot::Sender<Result<Pipeline>>,
    },
    List {
        reply: oneshot::Sender<Vec<PipelineSummary>>,
    },
    Remove {
        id: PipelineId,
        reply: oneshot::Sender<Result<()>>,
    },
    ClearFinished {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Cloneable handle to a running engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    pub async fn create_pipeline(
        &self,
        template: impl Into<String>,
        target: impl Into<String>,
        custom: Option<Vec<CustomStep>>,
    ) -> Result<PipelineId> {
        let (template, target) = (template.into(), target.into());
        self.request(|reply| EngineCommand::Create {
            template,
            target,
            custom,
            reply,
        })
        .await?
    }

    pub async fn bind_channel(&self, id: PipelineId, channel: impl Into<String>) -> Result<()> {
        let channel = channel.into();
        self.request(|reply| EngineCommand::Bind { id, channel, reply })
            .await?
    }

    pub async fn unbind_channel(&self, id: PipelineId) -> Result<Option<String>> {
        self.request(|reply| EngineCommand::Unbind { id, reply })
            .await?
    }

    pub async fn start(&self, id: PipelineId) -> Result<bool> {
        self.control(id, ControlAction::Start).await
    }

    pub async fn pause(&self, id: PipelineId) -> Result<bool> {
        self.control(id, ControlAction::Pause).await
    }

    pub async fn resume(&self, id: PipelineId) -> Result<bool> {
        self.control(id, ControlAction::Resume).await
    }

    pub async fn skip(&self, id: PipelineId) -> Result<bool> {
        self.control(id, ControlAction::Skip).await
    }

    pub async fn cancel(&self, id: PipelineId) -> Result<bool> {
        self.control(id, ControlAction::Cancel).await
    }

    pub async fn control(&self, id: PipelineId, action: ControlAction) -> Result<bool> {
        self.request(|reply| EngineCommand::Control { id, action, reply })
            .await?
    }

    pub async fn get(&self, id: PipelineId) -> Result<Pipeline> {
        self.request(|reply| EngineCommand::Get { id, reply }).await?
    }

    pub async fn list(&self) -> Result<Vec<PipelineSummary>> {
        self.request(|reply| EngineCommand::List { reply }).await
    }

    pub async fn remove_pipeline(&self, id: PipelineId) -> Result<()> {
        self.request(|reply| EngineCommand::Remove { id, reply })
            .await?
    }

    pub async fn clear_finished(&self) -> Result<usize> {
        self.request(|reply| EngineCommand::ClearFinished { reply })
            .await
    }

    /// Forwards raw output from a channel
    ///
    /// Does not wait; safe to call from reader tasks.
    pub fn data(&self, channel: impl Into<String>, chunk: impl Into<String>) -> Result<()> {
        self.send(EngineCommand::Data {
            channel: channel.into(),
            chunk: chunk.into(),
        })
    }

    /// Reports that a channel's shell has gone away
    pub fn channel_closed(&self, channel: impl Into<String>) -> Result<()> {
        self.send(EngineCommand::ChannelClosed {
            channel: channel.into(),
        })
    }

    /// Stops the runtime task after the messages already queued
    pub fn shutdown(&self) -> Result<()> {
        self.send(EngineCommand::Shutdown)
    }

    fn send(&self, command: EngineCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| EngineError::EngineStopped)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply))?;
        rx.await.map_err(|_| EngineError::EngineStopped)
    }
}

/// Moves `engine` onto a new task
///
/// The task ends on `shutdown` or when every handle is dropped, and hands
/// the engine back through the join handle.
pub fn spawn(engine: Engine) -> (EngineHandle, JoinHandle<Engine>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(engine, rx));
    (EngineHandle { tx }, task)
}

async fn run(mut engine: Engine, mut commands: mpsc::UnboundedReceiver<EngineCommand>) -> Engine {
    info!(
        "Engine runtime started (tick: {:?})",
        engine.config().tick_interval
    );

    let mut interval = time::interval(engine.config().tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(EngineCommand::Shutdown) | None => break,
                Some(command) => apply(&mut engine, command),
            },
            _ = interval.tick() => engine.on_tick(Utc::now()),
        }
    }

    info!("Engine runtime stopped");
    engine
}

fn apply(engine: &mut Engine, command: EngineCommand) {
    let now = Utc::now();

    // Reply send errors mean the caller gave up waiting
    match command {
        EngineCommand::Create {
            template,
            target,
            custom,
            reply,
        } => {
            let result = engine.create_pipeline(&template, &target, custom.as_deref(), now);
            let _ = reply.send(result);
        }
        EngineCommand::Bind { id, channel, reply } => {
            let _ = reply.send(engine.bind_channel(id, &channel));
        }
        EngineCommand::Unbind { id, reply } => {
            let _ = reply.send(engine.unbind_channel(id));
        }
        EngineCommand::Control { id, action, reply } => {
            debug!("Control {:?} on pipeline {}", action, id);
            let result = match action {
                ControlAction::Start => engine.start(id, now),
                ControlAction::Pause => engine.pause(id),
                ControlAction::Resume => engine.resume(id, now),
                ControlAction::Skip => engine.skip(id, now),
                ControlAction::Cancel => engine.cancel(id, now),
            };
            let _ = reply.send(result);
        }
        EngineCommand::Data { channel, chunk } => engine.on_data(&channel, &chunk, now),
        EngineCommand::ChannelClosed { channel } => engine.on_channel_closed(&channel, now),
        EngineCommand::Get { id, reply } => {
            let _ = reply.send(engine.get(id));
        }
        EngineCommand::List { reply } => {
            let _ = reply.send(engine.list());
        }
        EngineCommand::Remove { id, reply } => {
            let _ = reply.send(engine.remove_pipeline(id));
        }
        EngineCommand::ClearFinished { reply } => {
            let _ = reply.send(engine.clear_finished());
        }
        EngineCommand::Shutdown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trawl_core::catalog::Catalog;
    use trawl_core::domain::event::PipelineEvent;
    use trawl_core::domain::pipeline::{PipelineStatus, StepStatus};
    use trawl_core::domain::target::Target;

    use crate::config::EngineConfig;
    use crate::session::RecordingSession;

    fn spawn_engine() -> (
        EngineHandle,
        JoinHandle<Engine>,
        Arc<RecordingSession>,
        mpsc::UnboundedReceiver<PipelineEvent>,
    ) {
        let config = EngineConfig {
            echo_grace: chrono::Duration::zero(),
            ..EngineConfig::default()
        };
        let session = Arc::new(RecordingSession::new());
        let (events_tx, events) = mpsc::unbounded_channel();
        let engine = Engine::new(config, Catalog::builtin(), session.clone(), events_tx);
        let (handle, task) = spawn(engine);
        (handle, task, session, events)
    }

    #[tokio::test]
    async fn test_runtime_drives_domain_pipeline() {
        let (handle, task, session, mut events) = spawn_engine();

        let id = handle
            .create_pipeline("domain", "example.com", None)
            .await
            .unwrap();
        handle.bind_channel(id, "pty-1").await.unwrap();
        assert!(handle.start(id).await.unwrap());

        handle
            .data("pty-1", "a.example.com\r\nb.example.com\r\nuser@host:~$ ")
            .unwrap();

        let pipeline = handle.get(id).await.unwrap();
        assert_eq!(pipeline.status, PipelineStatus::Running);
        assert_eq!(pipeline.steps[0].status, StepStatus::Completed);
        assert_eq!(
            pipeline.steps[0].targets,
            vec![Target::from("a.example.com"), Target::from("b.example.com")]
        );
        assert_eq!(pipeline.current_step, Some(1));

        let commands = session.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[1].contains("'a.example.com' 'b.example.com'"));

        assert!(handle.cancel(id).await.unwrap());
        assert_eq!(handle.list().await.unwrap().len(), 1);
        assert_eq!(handle.clear_finished().await.unwrap(), 1);

        handle.shutdown().unwrap();
        let engine = task.await.unwrap();
        assert_eq!(engine.active_count(), 0);

        let first = events.recv().await.unwrap();
        assert_eq!(first, PipelineEvent::Created { id });
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_engine() {
        let (handle, task, _session, _events) = spawn_engine();
        handle.shutdown().unwrap();
        task.await.unwrap();

        assert!(matches!(
            handle.list().await,
            Err(EngineError::EngineStopped)
        ));
        assert!(matches!(
            handle.data("pty-1", "x"),
            Err(EngineError::EngineStopped)
        ));
    }
}
