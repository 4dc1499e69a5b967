//! Capped line buffer
//!
//! Step output and in-flight captures both accumulate lines from tools that
//! can print without bound. The buffer keeps the newest `cap` lines and drops
//! the oldest first.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of lines kept per step
pub const DEFAULT_OUTPUT_CAP: usize = 2000;

/// Ring buffer of output lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBuffer {
    cap: usize,
    lines: VecDeque<String>,
}

impl OutputBuffer {
    /// Creates an empty buffer holding at most `cap` lines (minimum 1)
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            lines: VecDeque::new(),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn extend<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.push(line);
        }
    }

    /// Removes and returns every buffered line, oldest first
    pub fn drain(&mut self) -> Vec<String> {
        self.lines.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_first() {
        let mut buffer = OutputBuffer::new(3);
        buffer.extend(["a", "b", "c", "d", "e"]);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.to_vec(), vec!["c", "d", "e"]);
    }

    #[test]
    fn test_zero_cap_keeps_one_line() {
        let mut buffer = OutputBuffer::new(0);
        buffer.push("x");
        buffer.push("y");
        assert_eq!(buffer.cap(), 1);
        assert_eq!(buffer.to_vec(), vec!["y"]);
    }

    #[test]
    fn test_drain_empties_buffer() {
        let mut buffer = OutputBuffer::new(10);
        buffer.extend(["root", "admin"]);

        assert_eq!(buffer.drain(), vec!["root", "admin"]);
        assert!(buffer.is_empty());
    }
}
