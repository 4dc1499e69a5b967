//! Run command
//!
//! Spawns a local shell, binds it to a new pipeline and prints the engine's
//! events until the pipeline finishes. Ctrl-C cancels the pipeline.

use anyhow::{Context, Result};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use trawl_core::domain::event::{NotifyLevel, PipelineEvent};
use trawl_core::domain::pipeline::{Pipeline, PipelineId, PipelineStatus, StepStatus};
use trawl_core::domain::template::PipelineTemplate;
use trawl_core::dto::PipelineSummary;
use trawl_engine::config::millis;
use trawl_engine::{Engine, EngineHandle};
use uuid::Uuid;

use crate::config::Config;
use crate::shell::LocalShell;

/// Time for the shell to print its first prompt before the first command
const SHELL_SETTLE: Duration = Duration::from_millis(500);

/// Options of `trawl run`
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub template: String,
    pub target: String,
    pub steps: Option<PathBuf>,
    pub shell: String,
    pub echo_grace_ms: u64,
    pub json: bool,
}

/// Run one pipeline to completion in a local shell
pub async fn run_pipeline(config: &Config, options: RunOptions) -> Result<()> {
    let custom = if options.template == PipelineTemplate::CUSTOM_KEY {
        let path = options
            .steps
            .as_deref()
            .context("The custom template needs --steps FILE")?;
        Some(super::load_steps(path)?)
    } else {
        None
    };

    let mut engine_config = config.engine.clone();
    engine_config.echo_grace =
        millis(options.echo_grace_ms).context("Invalid --echo-grace-ms")?;

    let shell = Arc::new(LocalShell::new());
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let engine = Engine::new(
        engine_config,
        config.catalog.clone(),
        shell.clone(),
        events_tx,
    );
    let (handle, task) = trawl_engine::spawn(engine);

    let channel = format!("local-{}", Uuid::new_v4());
    shell.open(&channel, &options.shell, handle.clone())?;

    let id = handle
        .create_pipeline(&options.template, &options.target, custom)
        .await?;
    handle.bind_channel(id, &channel).await?;
    let steps = handle.get(id).await?.steps.len();

    tokio::time::sleep(SHELL_SETTLE).await;
    info!("Running pipeline {} on channel {}", id, channel);
    handle.start(id).await?;

    let outcome = follow(&handle, id, steps, &mut events).await;

    let pipeline = handle.get(id).await;
    handle.shutdown()?;
    task.await.context("Engine task failed")?;
    shell.close(&channel);

    outcome?;
    let pipeline = pipeline?;
    if options.json {
        println!("{}", serde_json::to_string_pretty(&pipeline)?);
    } else {
        print_report(&pipeline);
    }
    Ok(())
}

/// Prints events for `id` until the pipeline is terminal
async fn follow(
    handle: &EngineHandle,
    id: PipelineId,
    steps: usize,
    events: &mut mpsc::UnboundedReceiver<PipelineEvent>,
) -> Result<()> {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    return Ok(());
                };
                if event.pipeline().is_some_and(|p| p != id) {
                    continue;
                }
                print_event(&event, steps);

                match event {
                    PipelineEvent::StatusChanged { status, .. } if status.is_terminal() => {
                        return Ok(());
                    }
                    // Nothing here pauses; a pause means the shell went away
                    PipelineEvent::StatusChanged {
                        status: PipelineStatus::Paused,
                        ..
                    } => {
                        handle.cancel(id).await?;
                    }
                    _ => {}
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                println!("{}", "Cancelling...".yellow());
                handle.cancel(id).await?;
            }
        }
    }
}

fn print_event(event: &PipelineEvent, steps: usize) {
    match event {
        PipelineEvent::StepStarted { step, name, .. } => {
            println!();
            println!(
                "{} {} {}",
                "▸".cyan(),
                format!("[{}/{}]", step + 1, steps).dimmed(),
                name.bold()
            );
        }
        PipelineEvent::CommandDispatched { command, .. } => {
            println!("  {} {}", "$".dimmed(), command);
        }
        PipelineEvent::FanoutProgress {
            completed, total, ..
        } => {
            println!("  {}", format!("fan-out {}/{}", completed, total).dimmed());
        }
        PipelineEvent::StepFinished {
            status, targets, ..
        } => {
            let line = format!("{} ({} target(s))", status, targets);
            let line = match status {
                StepStatus::Completed => format!("✓ {}", line).green(),
                StepStatus::Skipped => format!("» {}", line).yellow(),
                StepStatus::Cancelled => format!("✗ {}", line).yellow(),
                _ => format!("✗ {}", line).red(),
            };
            println!("  {}", line);
        }
        PipelineEvent::Notification { message, level } => {
            let message = match level {
                NotifyLevel::Info => message.normal(),
                NotifyLevel::Success => message.green().bold(),
                NotifyLevel::Warning => message.yellow(),
                NotifyLevel::Error => message.red(),
            };
            println!("{}", message);
        }
        PipelineEvent::Created { .. }
        | PipelineEvent::StatusChanged { .. }
        | PipelineEvent::Tick { .. }
        | PipelineEvent::ActiveCount { .. } => {}
    }
}

/// Print the per-step outcome and the final targets
fn print_report(pipeline: &Pipeline) {
    let summary = PipelineSummary::from(pipeline);

    println!();
    println!("{}", "Pipeline Report:".bold());
    println!("  ID:       {}", summary.id.to_string().cyan());
    println!("  Template: {}", summary.template_key);
    println!("  Target:   {}", summary.target);
    println!("  Status:   {}", summary.status.to_string().yellow());
    if let (Some(started), Some(ended)) = (summary.started_at, summary.ended_at) {
        let seconds = (ended - started).num_milliseconds() as f64 / 1000.0;
        println!("  Duration: {:.1}s", seconds);
    }

    println!("\n{}", "Steps:".bold());
    for (index, step) in pipeline.steps.iter().enumerate() {
        println!(
            "  {}. {:<28} {:<10} {:>6.1}s  {} target(s)",
            index + 1,
            step.name(),
            step.status.to_string(),
            step.elapsed_ms as f64 / 1000.0,
            step.targets.len()
        );
    }

    let last = pipeline.steps.iter().rev().find(|step| !step.targets.is_empty());
    if let Some(step) = last {
        println!("\n{} {}", "Targets from".bold(), step.name().bold());
        println!("{}", "─".repeat(60).dimmed());
        for target in &step.targets {
            println!("  {}", target);
        }
    }
}
