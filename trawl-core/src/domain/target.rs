//! Target domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Something a step discovered and the next step consumes
///
/// Most parsers emit plain strings (hosts, URLs, paths). The nmap family emits
/// structured port records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Host(String),
    Port(PortRecord),
}

/// An open port reported by nmap
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRecord {
    pub port: u16,
    pub proto: String,
    pub service: String,
    pub is_http: bool,
    /// Host the port belongs to
    pub target: String,
}

impl Target {
    /// The host or string value, without any port
    pub fn value(&self) -> &str {
        match self {
            Target::Host(value) => value,
            Target::Port(record) => &record.target,
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            Target::Host(_) => None,
            Target::Port(record) => Some(record.port),
        }
    }
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        Target::Host(value.to_string())
    }
}

impl From<String> for Target {
    fn from(value: String) -> Self {
        Target::Host(value)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Host(value) => f.write_str(value),
            Target::Port(record) => write!(
                f,
                "{}:{}/{} {}",
                record.target, record.port, record.proto, record.service
            ),
        }
    }
}
