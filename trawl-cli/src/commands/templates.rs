//! Template listing

use anyhow::Result;
use colored::*;
use trawl_core::domain::template::{
    InputField, InputFilter, InputMode, PipelineTemplate, StepTemplate,
};

use crate::config::Config;

/// Print every template in the catalog
pub fn list_templates(config: &Config) -> Result<()> {
    if config.catalog.is_empty() {
        println!("{}", "No templates found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} template(s):", config.catalog.len()).bold()
    );
    println!();
    for template in config.catalog.iter() {
        print_template(template);
    }
    println!(
        "  {} {}",
        "▸".cyan(),
        "custom".bold(),
    );
    println!("    {}", "Steps supplied with --steps FILE".dimmed());
    println!();

    Ok(())
}

fn print_template(template: &PipelineTemplate) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        template.key.bold(),
        format!("({})", template.name).dimmed()
    );
    if !template.target_label.is_empty() {
        println!("    Target: {}", template.target_label);
    }
    for (index, step) in template.steps.iter().enumerate() {
        println!(
            "    {}. {} {}",
            index + 1,
            step.name,
            step_flags(step).dimmed()
        );
        println!("       {}", step.command.cyan());
        if !step.description.is_empty() {
            println!("       {}", step.description.dimmed());
        }
    }
    println!();
}

/// Short description of how a step consumes its input
pub fn step_flags(step: &StepTemplate) -> String {
    let mut flags = vec![format!("parser={}", step.parser)];
    if step.fanout {
        flags.push("fan-out".to_string());
    }
    if step.input_mode == InputMode::PipeAll {
        flags.push("pipe-all".to_string());
    }
    if step.input_filter == InputFilter::HttpOnly {
        flags.push("http-only".to_string());
    }
    if step.input_field == InputField::HostFromUrl {
        flags.push("host-from-url".to_string());
    }
    format!("[{}]", flags.join(", "))
}
