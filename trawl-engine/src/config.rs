//! Engine configuration
//!
//! Defines the tunables of the completion heuristics and the bookkeeping
//! limits. All durations are configurable so hosts with unusual terminals
//! (no echo, slow prompts) can adjust the detector.

use chrono::Duration;
use trawl_core::domain::output::DEFAULT_OUTPUT_CAP;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time after dispatch during which everything on the channel is treated
    /// as the terminal echoing the typed command
    pub echo_grace: Duration,

    /// Quiet period after which a prompt completes a command with no output
    pub idle_fallback: Duration,

    /// Prompt-looking lines at least this long are treated as output
    pub max_prompt_line_len: usize,

    /// Lines kept per step output and per capture
    pub output_cap: usize,

    /// Upper bound on in-flight fan-out items per step
    pub max_concurrent_fanout: usize,

    /// Interval of the runtime's periodic tick
    pub tick_interval: std::time::Duration,
}

impl EngineConfig {
    /// Creates a configuration with defaults
    pub fn new() -> Self {
        Self {
            echo_grace: Duration::milliseconds(500),
            idle_fallback: Duration::milliseconds(1000),
            max_prompt_line_len: 300,
            output_cap: DEFAULT_OUTPUT_CAP,
            max_concurrent_fanout: 3,
            tick_interval: std::time::Duration::from_millis(1000),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - TRAWL_ECHO_GRACE_MS (default: 500)
    /// - TRAWL_IDLE_FALLBACK_MS (default: 1000)
    /// - TRAWL_MAX_PROMPT_LINE (default: 300)
    /// - TRAWL_OUTPUT_CAP (default: 2000)
    /// - TRAWL_MAX_FANOUT (default: 3)
    /// - TRAWL_TICK_MS (default: 1000)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup
    ///
    /// Unset keys keep their defaults; set keys that fail to parse are errors.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::new();

        let number = |key: &str| -> anyhow::Result<Option<u64>> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|e| anyhow::anyhow!("{} must be a non-negative integer: {}", key, e)),
                None => Ok(None),
            }
        };

        let echo_grace = number("TRAWL_ECHO_GRACE_MS")?
            .map(millis)
            .transpose()?
            .unwrap_or(defaults.echo_grace);

        let idle_fallback = number("TRAWL_IDLE_FALLBACK_MS")?
            .map(millis)
            .transpose()?
            .unwrap_or(defaults.idle_fallback);

        let max_prompt_line_len = number("TRAWL_MAX_PROMPT_LINE")?
            .map(|n| n as usize)
            .unwrap_or(defaults.max_prompt_line_len);

        let output_cap = number("TRAWL_OUTPUT_CAP")?
            .map(|n| n as usize)
            .unwrap_or(defaults.output_cap);

        let max_concurrent_fanout = number("TRAWL_MAX_FANOUT")?
            .map(|n| n as usize)
            .unwrap_or(defaults.max_concurrent_fanout);

        let tick_interval = number("TRAWL_TICK_MS")?
            .map(std::time::Duration::from_millis)
            .unwrap_or(defaults.tick_interval);

        Ok(Self {
            echo_grace,
            idle_fallback,
            max_prompt_line_len,
            output_cap,
            max_concurrent_fanout,
            tick_interval,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.echo_grace < Duration::zero() {
            anyhow::bail!("echo_grace cannot be negative");
        }

        if self.idle_fallback < Duration::zero() {
            anyhow::bail!("idle_fallback cannot be negative");
        }

        if self.max_prompt_line_len == 0 {
            anyhow::bail!("max_prompt_line_len must be greater than 0");
        }

        if self.output_cap == 0 {
            anyhow::bail!("output_cap must be greater than 0");
        }

        if self.max_concurrent_fanout == 0 {
            anyhow::bail!("max_concurrent_fanout must be greater than 0");
        }

        if self.tick_interval.is_zero() {
            anyhow::bail!("tick_interval must be greater than 0");
        }

        Ok(())
    }
}

/// Converts milliseconds, refusing values a `chrono::Duration` cannot hold
pub fn millis(ms: u64) -> anyhow::Result<Duration> {
    i64::try_from(ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .ok_or_else(|| anyhow::anyhow!("{} ms is out of range", ms))
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
