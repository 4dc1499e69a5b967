//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod parse;
mod render;
mod run;
mod templates;

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use trawl_core::domain::template::CustomStep;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List the available pipeline templates
    Templates,
    /// Run an output parser over a file or stdin and print the targets as JSON
    Parse {
        /// Parser id (subfinder, httpx, nmap, nmap_http, nmap_ports, gobuster, line)
        parser: String,

        /// Captured tool output; stdin when omitted
        file: Option<PathBuf>,
    },
    /// Print the commands a template would run for a target
    Render {
        /// Template key
        template: String,

        /// Initial target
        target: String,

        /// JSON file with the steps of a `custom` template
        #[arg(long)]
        steps: Option<PathBuf>,
    },
    /// Run a pipeline against a target in a local shell
    Run {
        /// Template key
        template: String,

        /// Initial target
        target: String,

        /// JSON file with the steps of a `custom` template
        #[arg(long)]
        steps: Option<PathBuf>,

        /// Shell to run the commands in
        #[arg(long, default_value = "bash")]
        shell: String,

        /// Echo window (ms) after each command; local shells do not echo input
        #[arg(long, env = "TRAWL_ECHO_GRACE_MS", default_value_t = 0)]
        echo_grace_ms: u64,

        /// Print the finished pipeline as JSON instead of a report
        #[arg(long)]
        json: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Templates => templates::list_templates(config),
        Commands::Parse { parser, file } => parse::parse_output(&parser, file.as_deref()),
        Commands::Render {
            template,
            target,
            steps,
        } => render::render_template(config, &template, &target, steps.as_deref()),
        Commands::Run {
            template,
            target,
            steps,
            shell,
            echo_grace_ms,
            json,
        } => {
            let options = run::RunOptions {
                template,
                target,
                steps,
                shell,
                echo_grace_ms,
                json,
            };
            run::run_pipeline(config, options).await
        }
    }
}

/// Reads custom steps from a JSON array file
fn load_steps(path: &Path) -> Result<Vec<CustomStep>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read steps file: {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse steps file: {}", path.display()))
}
