//! Configuration module
//!
//! Builds the engine configuration and template catalog from the
//! environment (see `EngineConfig::from_env`) plus command-line overrides.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use trawl_core::catalog::Catalog;
use trawl_engine::EngineConfig;
use trawl_engine::config::millis;

/// Engine tuning flags shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Quiet period (ms) after which a bare prompt completes a command
    #[arg(long, global = true)]
    pub idle_fallback_ms: Option<u64>,

    /// Prompt-looking lines at least this long count as output
    #[arg(long, global = true)]
    pub max_prompt_line: Option<usize>,

    /// Lines of output kept per step
    #[arg(long, global = true)]
    pub output_cap: Option<usize>,

    /// Upper bound on in-flight fan-out commands
    #[arg(long, global = true)]
    pub max_fanout: Option<usize>,

    /// Interval (ms) of the elapsed-time and idle check
    #[arg(long, global = true)]
    pub tick_ms: Option<u64>,

    /// JSON file with extra pipeline templates
    #[arg(long, env = "TRAWL_TEMPLATES", global = true)]
    pub templates: Option<PathBuf>,
}

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub catalog: Catalog,
}

impl Config {
    /// Environment first, then flags; the result is validated
    pub fn load(args: &EngineArgs) -> Result<Self> {
        let mut engine = EngineConfig::from_env().context("Invalid TRAWL_* environment")?;

        if let Some(ms) = args.idle_fallback_ms {
            engine.idle_fallback = millis(ms).context("Invalid --idle-fallback-ms")?;
        }
        if let Some(len) = args.max_prompt_line {
            engine.max_prompt_line_len = len;
        }
        if let Some(cap) = args.output_cap {
            engine.output_cap = cap;
        }
        if let Some(max) = args.max_fanout {
            engine.max_concurrent_fanout = max;
        }
        if let Some(ms) = args.tick_ms {
            engine.tick_interval = std::time::Duration::from_millis(ms);
        }
        engine.validate()?;

        let mut catalog = Catalog::builtin();
        if let Some(path) = &args.templates {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read templates file: {}", path.display()))?;
            let extra = Catalog::from_json(&json)
                .with_context(|| format!("Failed to parse templates file: {}", path.display()))?;
            info!("Loaded {} template(s) from {}", extra.len(), path.display());
            catalog.merge(extra);
        }

        Ok(Self { engine, catalog })
    }
}
