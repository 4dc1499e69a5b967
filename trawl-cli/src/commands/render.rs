//! Render command
//!
//! Dry run of the command builder. The first step is rendered against the
//! real target; later steps only know their inputs at run time and are shown
//! with a stand-in.

use anyhow::{Result, bail};
use colored::*;
use std::path::Path;
use trawl_core::domain::template::{InputMode, PipelineTemplate};
use trawl_engine::command::{self, CommandVars};
use trawl_engine::engine::validate_template;

use super::templates::step_flags;
use crate::config::Config;

/// Print each step's rendered command for `target`
pub fn render_template(
    config: &Config,
    key: &str,
    target: &str,
    steps: Option<&Path>,
) -> Result<()> {
    let template = resolve_template(config, key, steps)?;
    validate_template(&template)?;

    println!(
        "{} {} {}",
        template.name.bold(),
        "→".dimmed(),
        target.cyan()
    );
    println!();

    for (index, step) in template.steps.iter().enumerate() {
        let stand_in = format!("<output of step {}>", index);
        let input = if index == 0 { target } else { stand_in.as_str() };
        let inputs = vec![input.to_string()];

        let vars = if step.input_mode == InputMode::PipeAll && !step.fanout {
            CommandVars::pipe_all(&inputs)
        } else {
            CommandVars::single(input, None)
        };

        println!(
            "  {}. {} {}",
            index + 1,
            step.name.bold(),
            step_flags(step).dimmed()
        );
        println!("     $ {}", command::build(&step.command, &vars));
    }

    Ok(())
}

/// Catalog template for `key`, or the custom template from `steps`
pub fn resolve_template(
    config: &Config,
    key: &str,
    steps: Option<&Path>,
) -> Result<PipelineTemplate> {
    if key == PipelineTemplate::CUSTOM_KEY {
        let Some(path) = steps else {
            bail!("The custom template needs --steps FILE");
        };
        return Ok(PipelineTemplate::custom(&super::load_steps(path)?));
    }

    match config.catalog.get(key) {
        Some(template) => Ok(template.clone()),
        None => {
            let keys: Vec<&str> = config.catalog.keys().collect();
            bail!("Unknown template '{}' (available: {}, custom)", key, keys.join(", "))
        }
    }
}
