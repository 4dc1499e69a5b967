//! Template domain types
//!
//! Templates are static definitions. A pipeline deep-copies its template's
//! steps when it is created, so a template never changes under a running
//! pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output parser applied to a step's captured lines
///
/// Parser ids coming from configuration are free-form strings; anything not
/// recognised maps to [`ParserKind::Line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParserKind {
    Subfinder,
    Httpx,
    Nmap,
    NmapHttp,
    NmapPorts,
    Gobuster,
    #[default]
    Line,
}

impl ParserKind {
    pub const ALL: [ParserKind; 7] = [
        ParserKind::Subfinder,
        ParserKind::Httpx,
        ParserKind::Nmap,
        ParserKind::NmapHttp,
        ParserKind::NmapPorts,
        ParserKind::Gobuster,
        ParserKind::Line,
    ];

    /// Resolves a parser id, falling back to `Line` for unknown ids
    pub fn from_id(id: &str) -> Self {
        match id.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "subfinder" => ParserKind::Subfinder,
            "httpx" => ParserKind::Httpx,
            "nmap" => ParserKind::Nmap,
            "nmap_http" => ParserKind::NmapHttp,
            "nmap_ports" => ParserKind::NmapPorts,
            "gobuster" => ParserKind::Gobuster,
            _ => ParserKind::Line,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            ParserKind::Subfinder => "subfinder",
            ParserKind::Httpx => "httpx",
            ParserKind::Nmap => "nmap",
            ParserKind::NmapHttp => "nmap_http",
            ParserKind::NmapPorts => "nmap_ports",
            ParserKind::Gobuster => "gobuster",
            ParserKind::Line => "line",
        }
    }
}

impl From<String> for ParserKind {
    fn from(id: String) -> Self {
        ParserKind::from_id(&id)
    }
}

impl From<ParserKind> for String {
    fn from(kind: ParserKind) -> Self {
        kind.id().to_string()
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// How a step consumes its input targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// One command for one target
    #[default]
    Single,
    /// One command with every target piped in through `{targets_newline}`
    PipeAll,
}

/// Which input targets a step accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFilter {
    #[default]
    None,
    /// Only URLs with an http(s) scheme and port records flagged as HTTP
    HttpOnly,
}

/// Which part of an input target is handed to the command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputField {
    #[default]
    None,
    /// Bare host extracted from a URL
    HostFromUrl,
}

/// Static definition of one pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub name: String,

    /// Command with `{target}`, `{port}` and `{targets_newline}` placeholders
    pub command: String,

    #[serde(default)]
    pub parser: ParserKind,

    /// Run the command once per input target instead of once per step
    #[serde(default)]
    pub fanout: bool,

    #[serde(default)]
    pub input_mode: InputMode,

    #[serde(default)]
    pub input_filter: InputFilter,

    #[serde(default)]
    pub input_field: InputField,

    #[serde(default)]
    pub description: String,
}

impl StepTemplate {
    pub fn new(name: impl Into<String>, command: impl Into<String>, parser: ParserKind) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            parser,
            fanout: false,
            input_mode: InputMode::Single,
            input_filter: InputFilter::None,
            input_field: InputField::None,
            description: String::new(),
        }
    }

    pub fn with_fanout(mut self) -> Self {
        self.fanout = true;
        self
    }

    pub fn with_pipe_all(mut self) -> Self {
        self.input_mode = InputMode::PipeAll;
        self
    }

    pub fn with_filter(mut self, filter: InputFilter) -> Self {
        self.input_filter = filter;
        self
    }

    pub fn with_field(mut self, field: InputField) -> Self {
        self.input_field = field;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Ordered list of steps selected by key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTemplate {
    pub key: String,
    pub name: String,

    /// Hint for the shape of the initial target (e.g. "domain", "ip")
    #[serde(default)]
    pub target_label: String,

    pub steps: Vec<StepTemplate>,
}

impl PipelineTemplate {
    /// Key under which user-assembled templates are created
    pub const CUSTOM_KEY: &'static str = "custom";

    /// Builds the `custom` template from user-supplied steps
    pub fn custom(steps: &[CustomStep]) -> Self {
        Self {
            key: Self::CUSTOM_KEY.to_string(),
            name: "Custom".to_string(),
            target_label: "target".to_string(),
            steps: steps.iter().map(StepTemplate::from).collect(),
        }
    }
}

/// User input for one step of a custom template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomStep {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub parser: String,
    #[serde(default)]
    pub fanout: bool,
}

impl From<&CustomStep> for StepTemplate {
    fn from(step: &CustomStep) -> Self {
        let mut template = StepTemplate::new(
            step.name.clone(),
            step.command.clone(),
            ParserKind::from_id(&step.parser),
        );
        template.fanout = step.fanout;
        if step.command.contains("{targets_newline}") {
            template.input_mode = InputMode::PipeAll;
        }
        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_from_id_falls_back_to_line() {
        assert_eq!(ParserKind::from_id("nmap_http"), ParserKind::NmapHttp);
        assert_eq!(ParserKind::from_id("NMAP-PORTS"), ParserKind::NmapPorts);
        assert_eq!(ParserKind::from_id("nuclei"), ParserKind::Line);
        assert_eq!(ParserKind::from_id(""), ParserKind::Line);
    }

    #[test]
    fn test_parser_serde_uses_ids() {
        let json = serde_json::to_string(&ParserKind::NmapHttp).unwrap();
        assert_eq!(json, "\"nmap_http\"");

        let parsed: ParserKind = serde_json::from_str("\"whatweb\"").unwrap();
        assert_eq!(parsed, ParserKind::Line);
    }

    #[test]
    fn test_step_template_defaults_from_json() {
        let step: StepTemplate =
            serde_json::from_str(r#"{"name": "probe", "command": "httpx -u {target}"}"#).unwrap();
        assert_eq!(step.parser, ParserKind::Line);
        assert!(!step.fanout);
        assert_eq!(step.input_mode, InputMode::Single);
        assert_eq!(step.input_filter, InputFilter::None);
    }

    #[test]
    fn test_custom_template() {
        let steps = vec![
            CustomStep {
                name: "subs".to_string(),
                command: "subfinder -d {target}".to_string(),
                parser: "subfinder".to_string(),
                fanout: false,
            },
            CustomStep {
                name: "probe".to_string(),
                command: "echo {targets_newline} | httpx".to_string(),
                parser: "httpx".to_string(),
                fanout: false,
            },
        ];

        let template = PipelineTemplate::custom(&steps);
        assert_eq!(template.key, "custom");
        assert_eq!(template.steps.len(), 2);
        assert_eq!(template.steps[0].parser, ParserKind::Subfinder);
        assert_eq!(template.steps[1].input_mode, InputMode::PipeAll);
    }
}
