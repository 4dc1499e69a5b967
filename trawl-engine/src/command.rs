//! Command builder
//!
//! Renders a step's command template for concrete inputs. Every value that
//! reaches the shell came from a tool's output and is treated as hostile:
//! it is always wrapped in single quotes.

use tracing::warn;

const TARGET: &str = "{target}";
const PORT: &str = "{port}";
const TARGETS_NEWLINE: &str = "{targets_newline}";

/// Values substituted into a command template
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandVars<'a> {
    pub target: &'a str,
    pub port: Option<u16>,
    /// Inputs of a pipe-all step
    pub targets: &'a [String],
}

impl<'a> CommandVars<'a> {
    pub fn single(target: &'a str, port: Option<u16>) -> Self {
        Self {
            target,
            port,
            targets: &[],
        }
    }

    pub fn pipe_all(targets: &'a [String]) -> Self {
        Self {
            target: targets.first().map(String::as_str).unwrap_or_default(),
            port: None,
            targets,
        }
    }
}

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a value for the shell (always quotes).
pub fn quote(value: &str) -> String {
    format!("'{}'", escape_single_quote_content(value))
}

/// Renders `template` with `vars`
///
/// Templates containing `{targets_newline}` are pipe-all templates: the
/// segment before the first `|` is replaced by a `printf` feeding one quoted
/// target per line into the rest of the pipe. A pipe-all template without a
/// `|` is returned unchanged.
pub fn build(template: &str, vars: &CommandVars<'_>) -> String {
    if takes_target_list(template) {
        let Some(pipe) = template.find('|') else {
            warn!("Pipe-all template has no pipe, leaving it as is: {}", template);
            return template.to_string();
        };
        let (head, rest) = template.split_at(pipe);
        if head.contains(TARGETS_NEWLINE) {
            return format!("{} {}", printf_lines(vars.targets), substitute(rest, vars));
        }
    }

    substitute(template, vars)
}

/// True if `template` receives every input through `{targets_newline}`
pub fn takes_target_list(template: &str) -> bool {
    template.contains(TARGETS_NEWLINE)
}

/// `printf` invocation that prints each target on its own line
fn printf_lines(targets: &[String]) -> String {
    if targets.is_empty() {
        return "printf ''".to_string();
    }
    let args: Vec<String> = targets.iter().map(|t| quote(t)).collect();
    format!("printf '%s\\n' {}", args.join(" "))
}

/// Replaces `{target}`, `{port}` and any stray `{targets_newline}` in one pass
///
/// A single pass keeps placeholder text inside substituted values from being
/// expanded again.
fn substitute(template: &str, vars: &CommandVars<'_>) -> String {
    let mut out = String::with_capacity(template.len() + vars.target.len() + 8);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];

        if let Some(after) = tail.strip_prefix(TARGET) {
            out.push_str(&quote(vars.target));
            rest = after;
        } else if let Some(after) = tail.strip_prefix(PORT) {
            let port = vars.port.map(|p| p.to_string()).unwrap_or_default();
            out.push_str(&quote(&port));
            rest = after;
        } else if let Some(after) = tail.strip_prefix(TARGETS_NEWLINE) {
            out.push_str(&quote(&vars.targets.join("\n")));
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}
