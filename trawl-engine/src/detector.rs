//! Completion detector
//!
//! Interactive shells give no structured signal when a command finishes.
//! The detector watches the raw text stream of one channel and declares the
//! command complete when a shell prompt shows up again.
//!
//! The heuristic per line (after ANSI and CR stripping):
//! - before the echo grace period has passed, everything is the terminal
//!   echoing the typed command and is discarded
//! - a short line that looks like a prompt bumps the prompt streak; with at
//!   least one line of output captured, or after a quiet period, the command
//!   is complete
//! - any other line resets the streak and is captured as output
//!
//! Prompts usually arrive without a trailing newline, so the unterminated
//! tail of the stream is also checked: a prompt followed by the cursor gap
//! counts at once, any other prompt-looking tail only after a quiet period.
//! Nothing seen during the echo grace period counts as a prompt.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use trawl_core::domain::output::OutputBuffer;
use trawl_core::domain::pipeline::PipelineId;

use crate::config::EngineConfig;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[()][A-Za-z0-9]|\x1b[@-Z\\-_]",
    )
    .unwrap()
});

static PROMPT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // bash / sh / root
        r"[$#]$",
        // zsh `%`, but not percentages like "50%"
        r"(?:^|[^\d.])%$",
        // `>` after a path or separator, but not markup like "<html>"
        r"(?:^|[\s@:~/\\\])])>$",
        // box-drawing corner themes (╰─, └─)
        r"^[╰└╚][─━═]",
        // arrow glyph themes (➜ ~, ❯)
        r"^[➜❯λ»](?:\s|$)",
        r"\s[➜❯»]$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Removes ANSI escape sequences and carriage returns
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").replace('\r', "")
}

/// True if the trimmed line looks like a shell prompt
pub fn is_prompt(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && PROMPT_PATTERNS.iter().any(|p| p.is_match(line))
}

/// A prompt waiting for input, cursor gap included
///
/// Tool output cut at a chunk boundary (`total: 5$`) has no trailing gap.
fn is_open_prompt(tail: &str) -> bool {
    tail.ends_with(char::is_whitespace) && is_prompt(tail)
}

/// Transient capture state for one dispatched command
///
/// Lives from dispatch until completion is declared or the channel goes
/// away.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    pub pipeline: PipelineId,
    pub step: usize,
    pub is_fanout_item: bool,
    pub command: String,
    dispatched_at: DateTime<Utc>,
    command_sent: bool,
    echo_seen: bool,
    prompt_streak: u32,
    last_data: DateTime<Utc>,
    buffer: OutputBuffer,
    /// Unterminated tail of the stream, still raw
    partial: String,
    /// The last thing seen after the echo window was a prompt
    prompt_pending: bool,
}

impl CaptureBuffer {
    pub fn new(
        pipeline: PipelineId,
        step: usize,
        command: impl Into<String>,
        is_fanout_item: bool,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            pipeline,
            step,
            is_fanout_item,
            command: command.into(),
            dispatched_at: now,
            command_sent: config.echo_grace <= chrono::Duration::zero(),
            echo_seen: false,
            prompt_streak: 0,
            last_data: now,
            buffer: OutputBuffer::new(config.output_cap),
            partial: String::new(),
            prompt_pending: false,
        }
    }

    pub fn command_sent(&self) -> bool {
        self.command_sent
    }

    pub fn prompt_streak(&self) -> u32 {
        self.prompt_streak
    }

    /// Lines captured so far
    pub fn captured(&self) -> Vec<String> {
        self.buffer.to_vec()
    }

    /// Consumes a raw chunk
    ///
    /// Returns the command's output once completion is declared.
    pub fn feed(
        &mut self,
        chunk: &str,
        now: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Option<Vec<String>> {
        let idle = now - self.last_data;
        self.last_data = now;
        self.refresh_sent(now, config);

        self.partial.push_str(chunk);
        if let Some(last_newline) = self.partial.rfind('\n') {
            let tail = self.partial.split_off(last_newline + 1);
            let complete = std::mem::replace(&mut self.partial, tail);

            for raw in complete.split('\n') {
                if raw.is_empty() {
                    continue;
                }
                let line = strip_ansi(raw);
                if self.observe_line(&line, idle, config) {
                    return Some(self.buffer.drain());
                }
            }
        }

        if !self.command_sent {
            // Still echo, including whatever prompt the previous command left
            self.partial.clear();
            return None;
        }
        self.check_tail(idle, config)
    }

    /// Periodic check for a prompt that was the last thing on the channel
    ///
    /// Catches commands that print nothing, and prompts that never got the
    /// cursor gap. Pending text that is not a prompt keeps the command open.
    pub fn poll_idle(&mut self, now: DateTime<Utc>, config: &EngineConfig) -> Option<Vec<String>> {
        self.refresh_sent(now, config);
        if !self.command_sent {
            return None;
        }

        let tail = strip_ansi(&self.partial);
        let prompt_at_tail = if tail.trim().is_empty() {
            self.prompt_pending
        } else {
            self.is_short_prompt(&tail, config)
        };
        if prompt_at_tail && now - self.last_data >= config.idle_fallback {
            return Some(self.buffer.drain());
        }
        None
    }

    fn refresh_sent(&mut self, now: DateTime<Utc>, config: &EngineConfig) {
        if !self.command_sent && now - self.dispatched_at >= config.echo_grace {
            self.command_sent = true;
        }
    }

    /// Handles one complete line; true when the command is complete
    fn observe_line(&mut self, line: &str, idle: chrono::Duration, config: &EngineConfig) -> bool {
        let line = line.trim();
        if !self.command_sent {
            return false;
        }

        if self.is_echo(line) {
            self.echo_seen = true;
            return false;
        }

        if self.is_short_prompt(line, config) {
            self.prompt_streak += 1;
            self.prompt_pending = true;
            return self.should_complete(self.prompt_streak, idle, config);
        }

        self.prompt_streak = 0;
        self.prompt_pending = false;
        if !line.is_empty() {
            self.buffer.push(line);
        }
        false
    }

    /// Checks the unterminated tail; an open prompt there is consumed as a line
    fn check_tail(&mut self, idle: chrono::Duration, config: &EngineConfig) -> Option<Vec<String>> {
        let tail = strip_ansi(&self.partial);
        if tail.trim().is_empty() {
            return None;
        }
        if !is_open_prompt(&tail) {
            self.prompt_pending = false;
            return None;
        }

        self.partial.clear();
        if self.observe_line(&tail, idle, config) {
            return Some(self.buffer.drain());
        }
        None
    }

    fn should_complete(&self, streak: u32, idle: chrono::Duration, config: &EngineConfig) -> bool {
        streak >= 1 && (!self.buffer.is_empty() || idle >= config.idle_fallback)
    }

    fn is_short_prompt(&self, line: &str, config: &EngineConfig) -> bool {
        line.chars().count() < config.max_prompt_line_len && is_prompt(line)
    }

    /// The typed command echoed back, alone or after a prompt
    ///
    /// Only the first such line before any output counts.
    fn is_echo(&self, line: &str) -> bool {
        let command = self.command.trim();
        if self.echo_seen || !self.buffer.is_empty() || command.is_empty() {
            return false;
        }
        match line.strip_suffix(command) {
            Some(prefix) => prefix.trim().is_empty() || is_prompt(prefix),
            None => false,
        }
    }
}
