//! Template catalog
//!
//! Built-in reconnaissance pipelines keyed by the kind of target they start
//! from, plus loading of extra templates from JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::template::{
    InputField, InputFilter, ParserKind, PipelineTemplate, StepTemplate,
};

const WORDLIST: &str = "/usr/share/wordlists/dirb/common.txt";

/// Keyed set of pipeline templates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    templates: BTreeMap<String, PipelineTemplate>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the `domain`, `ip` and `webapp` templates
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.insert(domain_template());
        catalog.insert(ip_template());
        catalog.insert(webapp_template());
        catalog
    }

    /// Parses templates from a JSON array
    ///
    /// Each entry is a `PipelineTemplate`; unknown parser ids become `line`.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let templates: Vec<PipelineTemplate> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for template in templates {
            catalog.insert(template);
        }
        Ok(catalog)
    }

    /// Adds or replaces a template under its own key
    pub fn insert(&mut self, template: PipelineTemplate) {
        self.templates.insert(template.key.clone(), template);
    }

    /// Adds every template of `other`, replacing same-keyed entries
    pub fn merge(&mut self, other: Catalog) {
        self.templates.extend(other.templates);
    }

    pub fn get(&self, key: &str) -> Option<&PipelineTemplate> {
        self.templates.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn domain_template() -> PipelineTemplate {
    PipelineTemplate {
        key: "domain".to_string(),
        name: "Domain recon".to_string(),
        target_label: "domain (example.com)".to_string(),
        steps: vec![
            StepTemplate::new(
                "Subdomain enumeration",
                "subfinder -d {target} -silent",
                ParserKind::Subfinder,
            )
            .with_description("Passive subdomain discovery"),
            StepTemplate::new(
                "Live host probe",
                "echo {targets_newline} | httpx -silent",
                ParserKind::Httpx,
            )
            .with_pipe_all()
            .with_description("Keep subdomains that answer over HTTP(S)"),
            StepTemplate::new(
                "Port scan",
                "nmap -sV -T4 --top-ports 100 {target}",
                ParserKind::NmapPorts,
            )
            .with_fanout()
            .with_field(InputField::HostFromUrl)
            .with_description("Service scan of every live host"),
            StepTemplate::new(
                "Vulnerability scan",
                "nuclei -u {target}:{port} -silent",
                ParserKind::Line,
            )
            .with_fanout()
            .with_filter(InputFilter::HttpOnly)
            .with_description("Nuclei templates against HTTP services"),
        ],
    }
}

fn ip_template() -> PipelineTemplate {
    PipelineTemplate {
        key: "ip".to_string(),
        name: "Host recon".to_string(),
        target_label: "IP address or CIDR".to_string(),
        steps: vec![
            StepTemplate::new("Port scan", "nmap -sV -T4 {target}", ParserKind::NmapHttp)
                .with_description("Service scan, keeping HTTP endpoints as URLs"),
            StepTemplate::new(
                "Web fingerprint",
                "echo {targets_newline} | httpx -silent -title -tech-detect",
                ParserKind::Httpx,
            )
            .with_pipe_all()
            .with_filter(InputFilter::HttpOnly)
            .with_description("Title and technology detection"),
            StepTemplate::new(
                "Content discovery",
                &format!("gobuster dir -q -u {{target}} -w {WORDLIST}"),
                ParserKind::Gobuster,
            )
            .with_fanout()
            .with_filter(InputFilter::HttpOnly)
            .with_description("Directory brute force per web service"),
        ],
    }
}

fn webapp_template() -> PipelineTemplate {
    PipelineTemplate {
        key: "webapp".to_string(),
        name: "Web application".to_string(),
        target_label: "URL (https://app.example.com)".to_string(),
        steps: vec![
            StepTemplate::new("HTTP probe", "httpx -u {target} -silent", ParserKind::Httpx)
                .with_description("Confirm the application responds"),
            StepTemplate::new(
                "Service scan",
                "nmap -sV -T4 --top-ports 1000 {target}",
                ParserKind::NmapHttp,
            )
            .with_field(InputField::HostFromUrl)
            .with_description("Find other web services on the same host"),
            StepTemplate::new(
                "Content discovery",
                &format!("gobuster dir -q -u {{target}} -w {WORDLIST}"),
                ParserKind::Gobuster,
            )
            .with_fanout()
            .with_filter(InputFilter::HttpOnly)
            .with_description("Directory brute force per web service"),
        ],
    }
}
