//! Session channel
//!
//! The engine has no process handle. It only knows how to type a command
//! into an interactive shell and how to ask that shell to abort. Hosts
//! implement [`SessionChannel`] for whatever carries the text (a pty, a
//! terminal emulator pane, an SSH session) and feed the raw output back
//! through the engine's `on_data`.

use std::sync::Mutex;

use crate::error::SessionError;

/// Outbound half of an interactive command channel
pub trait SessionChannel: Send + Sync {
    /// Types `command` into the shell behind `channel` and submits it
    fn dispatch(&self, channel: &str, command: &str) -> Result<(), SessionError>;

    /// Best-effort abort of whatever is running on `channel`
    fn interrupt(&self, channel: &str) -> Result<(), SessionError>;
}

/// Something a [`RecordingSession`] was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    Dispatch { channel: String, command: String },
    Interrupt { channel: String },
}

/// Session double that records every request
///
/// Channels listed as closed reject dispatches with
/// [`SessionError::ChannelClosed`].
#[derive(Debug, Default)]
pub struct RecordingSession {
    actions: Mutex<Vec<SessionAction>>,
    closed: Mutex<Vec<String>>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes later dispatches to `channel` fail
    pub fn close(&self, channel: &str) {
        self.closed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(channel.to_string());
    }

    /// All actions so far, in order
    pub fn actions(&self) -> Vec<SessionAction> {
        self.actions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Commands dispatched so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                SessionAction::Dispatch { command, .. } => Some(command),
                SessionAction::Interrupt { .. } => None,
            })
            .collect()
    }

    pub fn interrupts(&self) -> usize {
        self.actions()
            .iter()
            .filter(|action| matches!(action, SessionAction::Interrupt { .. }))
            .count()
    }

    fn is_closed(&self, channel: &str) -> bool {
        self.closed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|c| c == channel)
    }

    fn record(&self, action: SessionAction) {
        self.actions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(action);
    }
}

impl SessionChannel for RecordingSession {
    fn dispatch(&self, channel: &str, command: &str) -> Result<(), SessionError> {
        if self.is_closed(channel) {
            return Err(SessionError::ChannelClosed(channel.to_string()));
        }
        self.record(SessionAction::Dispatch {
            channel: channel.to_string(),
            command: command.to_string(),
        });
        Ok(())
    }

    fn interrupt(&self, channel: &str) -> Result<(), SessionError> {
        self.record(SessionAction::Interrupt {
            channel: channel.to_string(),
        });
        Ok(())
    }
}
