//! Output parsers
//!
//! Pure functions from captured lines to targets, one per supported tool.
//! Every parser is total: malformed input yields fewer targets, never an
//! error. Results keep the order of first occurrence.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use trawl_core::domain::target::{PortRecord, Target};
use trawl_core::domain::template::ParserKind;

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9_](?:[a-z0-9_-]{0,61}[a-z0-9])?\.)+[a-z][a-z0-9-]{0,61}[a-z0-9]$")
        .unwrap()
});

static URL_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^https?://").unwrap());

static NMAP_REPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Nmap scan report for (\S+)(?:\s+\(([^)]+)\))?").unwrap());

static NMAP_PORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,5})/(tcp|udp|sctp)\s+open\s+(\S+)").unwrap());

static GOBUSTER_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(/\S*)\s+\(Status:\s*(\d{3})\)").unwrap());

static GOBUSTER_FOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Found:\s+(/\S*)\s+\[(\d{3})\]").unwrap());

const HTTP_PORTS: [u16; 4] = [80, 443, 8080, 8443];
const HTTPS_PORTS: [u16; 2] = [443, 8443];

/// Runs the parser for `kind` over `lines`
pub fn parse(kind: ParserKind, lines: &[String]) -> Vec<Target> {
    match kind {
        ParserKind::Subfinder => hosts(subfinder(lines)),
        ParserKind::Httpx => hosts(httpx(lines)),
        ParserKind::Nmap | ParserKind::NmapPorts => {
            nmap(lines).into_iter().map(Target::Port).collect()
        }
        ParserKind::NmapHttp => hosts(nmap_http(lines)),
        ParserKind::Gobuster => hosts(gobuster(lines)),
        ParserKind::Line => hosts(line(lines)),
    }
}

/// Hostnames, one per line
pub fn subfinder(lines: &[String]) -> Vec<String> {
    let mut seen = Dedup::default();
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| HOSTNAME.is_match(l))
        .filter(|l| seen.first(l))
        .map(str::to_string)
        .collect()
}

/// First token of every line that starts with a URL
pub fn httpx(lines: &[String]) -> Vec<String> {
    let mut seen = Dedup::default();
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| URL_PREFIX.is_match(l))
        .filter_map(|l| l.split_whitespace().next())
        .filter(|url| seen.first(url))
        .map(str::to_string)
        .collect()
}

/// Open ports per scanned host
///
/// Port lines before any `Nmap scan report for` line are attributed to an
/// empty host.
pub fn nmap(lines: &[String]) -> Vec<PortRecord> {
    let mut records: Vec<PortRecord> = Vec::new();
    let mut current = String::new();

    for line in lines {
        let line = line.trim();

        if let Some(caps) = NMAP_REPORT.captures(line) {
            current = caps[1].to_string();
            continue;
        }

        let Some(caps) = NMAP_PORT.captures(line) else {
            continue;
        };
        let Ok(port) = caps[1].parse::<u16>() else {
            continue;
        };
        let proto = caps[2].to_string();
        let service = caps[3].to_string();
        let is_http = service.to_ascii_lowercase().contains("http") || HTTP_PORTS.contains(&port);

        let duplicate = records
            .iter()
            .any(|r| r.target == current && r.port == port && r.proto == proto);
        if !duplicate {
            records.push(PortRecord {
                port,
                proto,
                service,
                is_http,
                target: current.clone(),
            });
        }
    }

    records
}

/// HTTP services from an nmap scan as URLs
pub fn nmap_http(lines: &[String]) -> Vec<String> {
    let mut seen = Dedup::default();
    nmap(lines)
        .iter()
        .filter(|r| r.is_http && !r.target.is_empty())
        .map(port_url)
        .filter(|url| seen.first(url))
        .collect()
}

/// URL for an HTTP port record; default ports are left implicit
pub fn port_url(record: &PortRecord) -> String {
    let https = HTTPS_PORTS.contains(&record.port) || record.service.contains("https");
    let scheme = if https { "https" } else { "http" };
    let default_port = if https { 443 } else { 80 };
    if record.port == default_port {
        format!("{}://{}", scheme, record.target)
    } else {
        format!("{}://{}:{}", scheme, record.target, record.port)
    }
}

/// Paths reported with a status below 400
pub fn gobuster(lines: &[String]) -> Vec<String> {
    let mut seen = Dedup::default();
    let mut paths = Vec::new();

    for line in lines {
        let line = line.trim();
        let caps = GOBUSTER_STATUS
            .captures(line)
            .or_else(|| GOBUSTER_FOUND.captures(line));
        let Some(caps) = caps else {
            continue;
        };
        let Ok(status) = caps[2].parse::<u16>() else {
            continue;
        };
        if status < 400 && seen.first(&caps[1]) {
            paths.push(caps[1].to_string());
        }
    }

    paths
}

/// Every non-blank line, trimmed
pub fn line(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn hosts(values: Vec<String>) -> Vec<Target> {
    values.into_iter().map(Target::Host).collect()
}

#[derive(Default)]
struct Dedup(HashSet<String>);

impl Dedup {
    /// True the first time `value` is seen
    fn first(&mut self, value: &str) -> bool {
        self.0.insert(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_every_parser_handles_empty_input() {
        for kind in ParserKind::ALL {
            assert!(parse(kind, &[]).is_empty(), "{} on empty input", kind);
        }
    }

    #[test]
    fn test_parsers_are_deterministic() {
        let input = lines(&[
            "Nmap scan report for 10.0.0.5",
            "80/tcp open http Apache",
            "a.example.com",
            "https://a.example.com [200]",
            "/admin (Status: 200)",
            "garbage \u{1b} line",
        ]);
        for kind in ParserKind::ALL {
            assert_eq!(parse(kind, &input), parse(kind, &input));
        }
    }

    #[test]
    fn test_subfinder() {
        let input = lines(&[
            "a.example.com\n",
            "b.example.com",
            "a.example.com",
            "[INF] Enumerating subdomains for example.com",
            "not a host",
            "",
        ]);
        assert_eq!(subfinder(&input), vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn test_httpx() {
        let input = lines(&[
            "https://a.example.com [200] [Welcome]",
            "http://b.example.com",
            "https://a.example.com [301]",
            "b.example.com",
            "  HTTPS://c.example.com  ",
        ]);
        assert_eq!(
            httpx(&input),
            vec![
                "https://a.example.com",
                "http://b.example.com",
                "HTTPS://c.example.com"
            ]
        );
    }

    #[test]
    fn test_nmap_records() {
        let input = lines(&[
            "Starting Nmap 7.94",
            "Nmap scan report for 10.0.0.5",
            "PORT     STATE  SERVICE VERSION",
            "22/tcp   open   ssh     OpenSSH 8.9",
            "80/tcp   open   http    Apache",
            "443/tcp  closed https",
            "Nmap scan report for web.local (10.0.0.6)",
            "8080/tcp open   http-proxy",
            "9000/tcp open   cslistener",
        ]);

        let records = nmap(&input);
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].port, 22);
        assert!(!records[0].is_http);
        assert_eq!(records[1].target, "10.0.0.5");
        assert!(records[1].is_http);
        assert_eq!(records[2].target, "web.local");
        assert!(records[2].is_http);
        assert_eq!(records[3].port, 9000);
        assert!(!records[3].is_http);
    }

    #[test]
    fn test_nmap_http_scenario() {
        let input = lines(&["Nmap scan report for 10.0.0.5", "80/tcp open http Apache"]);
        assert_eq!(
            parse(ParserKind::NmapHttp, &input),
            vec![Target::from("http://10.0.0.5")]
        );
    }

    #[test]
    fn test_nmap_http_schemes_and_ports() {
        let input = lines(&[
            "Nmap scan report for h",
            "443/tcp open https",
            "8443/tcp open https-alt",
            "8080/tcp open http-proxy",
            "8000/tcp open http",
            "22/tcp open ssh",
        ]);
        assert_eq!(
            nmap_http(&input),
            vec![
                "https://h",
                "https://h:8443",
                "http://h:8080",
                "http://h:8000"
            ]
        );
    }

    #[test]
    fn test_nmap_ports_passes_every_record() {
        let input = lines(&[
            "Nmap scan report for h",
            "22/tcp open ssh",
            "53/udp open domain",
        ]);
        let targets = parse(ParserKind::NmapPorts, &input);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].port(), Some(53));
    }

    #[test]
    fn test_gobuster_scenario() {
        let input = lines(&["/admin (Status: 200)", "/secret (Status: 500)"]);
        assert_eq!(
            parse(ParserKind::Gobuster, &input),
            vec![Target::from("/admin")]
        );
    }

    #[test]
    fn test_gobuster_both_shapes() {
        let input = lines(&[
            "/images               (Status: 301) [Size: 0] [--> /images/]",
            "Found: /login [200]",
            "Found: /private [403]",
            "/images (Status: 301)",
        ]);
        assert_eq!(gobuster(&input), vec!["/images", "/login"]);
    }

    #[test]
    fn test_line_parser() {
        let input = lines(&["  one ", "", "   ", "two", "one"]);
        assert_eq!(line(&input), vec!["one", "two", "one"]);
    }
}
