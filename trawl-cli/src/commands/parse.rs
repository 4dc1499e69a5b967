//! Parser command
//!
//! Runs one of the engine's output parsers over saved tool output; useful
//! for checking what a step would extract before running a pipeline.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use tracing::warn;
use trawl_core::domain::template::ParserKind;
use trawl_engine::parsers;

/// Parse `file` (or stdin) with `parser` and print the targets as JSON
pub fn parse_output(parser: &str, file: Option<&Path>) -> Result<()> {
    let kind = ParserKind::from_id(parser);
    if kind.id() != parser.trim().to_ascii_lowercase().replace('-', "_") {
        warn!("Unknown parser '{}', using '{}'", parser, kind);
    }

    let text = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            text
        }
    };

    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    let targets = parsers::parse(kind, &lines);

    println!("{}", serde_json::to_string_pretty(&targets)?);
    Ok(())
}
