//! Fan-out input resolution
//!
//! Turns the targets produced by earlier steps into the work items a step
//! runs against, after applying the step's input filter and field
//! extraction. The per-step queue itself is `FanoutState` in trawl-core;
//! the engine drains it one item at a time.

use std::collections::HashSet;
use trawl_core::domain::pipeline::FanoutItem;
use trawl_core::domain::target::Target;
use trawl_core::domain::template::{InputField, InputFilter, StepTemplate};

/// Commands a single session channel can carry at once
///
/// Every pipeline owns exactly one channel and the detector can only follow
/// one command on it, so fan-out is serialised regardless of the configured
/// maximum.
pub const CHANNEL_LANES: usize = 1;

/// In-flight limit for fan-out items
pub fn effective_limit(max_concurrent_fanout: usize) -> usize {
    max_concurrent_fanout.clamp(1, CHANNEL_LANES)
}

/// Applies the step's filter and field to `inputs`, dropping duplicates
pub fn resolve_items(step: &StepTemplate, inputs: &[Target]) -> Vec<FanoutItem> {
    let mut seen = HashSet::new();
    inputs
        .iter()
        .filter(|target| passes_filter(step.input_filter, target))
        .map(|target| to_item(step.input_field, target))
        .filter(|item| !item.target.is_empty())
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn passes_filter(filter: InputFilter, target: &Target) -> bool {
    match filter {
        InputFilter::None => true,
        InputFilter::HttpOnly => match target {
            Target::Host(value) => is_http_url(value),
            Target::Port(record) => record.is_http,
        },
    }
}

fn to_item(field: InputField, target: &Target) -> FanoutItem {
    let value = match field {
        InputField::None => target.value().trim().to_string(),
        InputField::HostFromUrl => host_from_url(target.value()),
    };
    FanoutItem::new(value, target.port())
}

fn is_http_url(value: &str) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Bare host of a URL (or of a `host:port` string)
///
/// Strips scheme, credentials, port, path, query and fragment. IPv6
/// literals lose their brackets.
pub fn host_from_url(url: &str) -> String {
    let url = url.trim();
    let rest = match url.find("://") {
        Some(index) => &url[index + 3..],
        None => url,
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();

    if let Some(bracketed) = host_port.strip_prefix('[') {
        return bracketed.split(']').next().unwrap_or_default().to_string();
    }

    host_port.split(':').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawl_core::domain::target::PortRecord;
    use trawl_core::domain::template::ParserKind;

    fn port(target: &str, port: u16, is_http: bool) -> Target {
        Target::Port(PortRecord {
            port,
            proto: "tcp".to_string(),
            service: if is_http { "http" } else { "ssh" }.to_string(),
            is_http,
            target: target.to_string(),
        })
    }

    #[test]
    fn test_effective_limit_is_single_lane() {
        assert_eq!(effective_limit(3), 1);
        assert_eq!(effective_limit(1), 1);
        assert_eq!(effective_limit(0), 1);
    }

    #[test]
    fn test_host_from_url() {
        assert_eq!(host_from_url("https://a.example.com/login?x=1"), "a.example.com");
        assert_eq!(host_from_url("http://user:pw@b.example.com:8080/"), "b.example.com");
        assert_eq!(host_from_url("c.example.com:443"), "c.example.com");
        assert_eq!(host_from_url("http://[::1]:8080/x"), "::1");
        assert_eq!(host_from_url("plain"), "plain");
        assert_eq!(host_from_url(""), "");
    }

    #[test]
    fn test_resolve_items_http_only() {
        let step = StepTemplate::new("scan", "nuclei -u {target}:{port}", ParserKind::Line)
            .with_fanout()
            .with_filter(InputFilter::HttpOnly);
        let inputs = vec![
            port("10.0.0.5", 22, false),
            port("10.0.0.5", 80, true),
            Target::from("https://a.example.com"),
            Target::from("a.example.com"),
        ];

        let items = resolve_items(&step, &inputs);
        assert_eq!(
            items,
            vec![
                FanoutItem::new("10.0.0.5", Some(80)),
                FanoutItem::new("https://a.example.com", None),
            ]
        );
    }

    #[test]
    fn test_resolve_items_host_from_url_dedups() {
        let step = StepTemplate::new("ports", "nmap {target}", ParserKind::NmapPorts)
            .with_fanout()
            .with_field(InputField::HostFromUrl);
        let inputs = vec![
            Target::from("https://a.example.com"),
            Target::from("http://a.example.com:8080"),
            Target::from("https://b.example.com/"),
        ];

        let items = resolve_items(&step, &inputs);
        assert_eq!(
            items,
            vec![
                FanoutItem::new("a.example.com", None),
                FanoutItem::new("b.example.com", None),
            ]
        );
    }
}
