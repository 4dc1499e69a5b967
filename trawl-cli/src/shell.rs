//! Local shell session
//!
//! Runs an interactive shell as a child process and exposes it to the engine
//! as a session channel. Without a terminal the shell does not echo what it
//! is sent and prints its prompt on stderr, so stderr is folded into stdout
//! as soon as the shell starts; one pipe keeps output and prompt in order.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use trawl_engine::{EngineHandle, SessionChannel, SessionError};

/// Prompt the shell is started with
pub const PROMPT: &str = "trawl$ ";

/// Sent before anything else
const SHELL_SETUP: &str = "exec 2>&1; set +H";

struct Session {
    input: mpsc::UnboundedSender<String>,
    pid: Option<u32>,
}

/// Shells spawned by this process, keyed by channel id
#[derive(Default)]
pub struct LocalShell {
    sessions: Mutex<HashMap<String, Session>>,
}

impl LocalShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `program` as channel `channel`
    ///
    /// # Arguments
    /// * `channel` - Channel id the engine will dispatch to
    /// * `program` - Shell executable (bash-compatible)
    /// * `engine` - Receives the shell's output and its exit
    pub fn open(&self, channel: &str, program: &str, engine: EngineHandle) -> Result<()> {
        let mut command = Command::new(program);
        if program.ends_with("bash") {
            command.args(["--norc", "--noprofile"]);
        }
        command
            .arg("-i")
            .env("PS1", PROMPT)
            .env("PS2", "")
            .env("TERM", "dumb")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so an interrupt reaches whatever the shell runs
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start shell '{}'", program))?;
        let pid = child.id();

        let stdin = child.stdin.take().context("Shell stdin was not captured")?;
        let stdout = child.stdout.take().context("Shell stdout was not captured")?;
        let stderr = child.stderr.take().context("Shell stderr was not captured")?;

        let (input, commands) = mpsc::unbounded_channel();
        tokio::spawn(write_input(stdin, commands));
        tokio::spawn(forward_output(stdout, channel.to_string(), engine.clone()));
        tokio::spawn(forward_output(stderr, channel.to_string(), engine.clone()));
        tokio::spawn(wait_for_exit(child, channel.to_string(), engine));

        input
            .send(SHELL_SETUP.to_string())
            .context("Shell input closed during setup")?;

        self.lock().insert(channel.to_string(), Session { input, pid });
        info!("Started {} (pid {:?}) as channel {}", program, pid, channel);
        Ok(())
    }

    /// Closes the shell's input; the shell exits on its own
    pub fn close(&self, channel: &str) {
        if self.lock().remove(channel).is_some() {
            debug!("Closed channel {}", channel);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionChannel for LocalShell {
    fn dispatch(&self, channel: &str, command: &str) -> Result<(), SessionError> {
        let sessions = self.lock();
        let session = sessions
            .get(channel)
            .ok_or_else(|| SessionError::ChannelClosed(channel.to_string()))?;
        session
            .input
            .send(command.to_string())
            .map_err(|_| SessionError::ChannelClosed(channel.to_string()))
    }

    fn interrupt(&self, channel: &str) -> Result<(), SessionError> {
        let pid = self
            .lock()
            .get(channel)
            .ok_or_else(|| SessionError::ChannelClosed(channel.to_string()))?
            .pid;
        let Some(pid) = pid else {
            return Err(SessionError::SendFailed {
                channel: channel.to_string(),
                reason: "shell process id unknown".to_string(),
            });
        };

        let status = std::process::Command::new("kill")
            .arg("-INT")
            .arg(format!("-{}", pid))
            .status()
            .map_err(|e| SessionError::SendFailed {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        if !status.success() {
            return Err(SessionError::SendFailed {
                channel: channel.to_string(),
                reason: format!("kill exited with {}", status),
            });
        }
        Ok(())
    }
}

async fn write_input(mut stdin: ChildStdin, mut commands: mpsc::UnboundedReceiver<String>) {
    while let Some(command) = commands.recv().await {
        let line = format!("{}\n", command);
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            warn!("Failed to write to shell: {}", e);
            break;
        }
        if let Err(e) = stdin.flush().await {
            warn!("Failed to flush shell input: {}", e);
            break;
        }
    }
}

async fn forward_output<R>(mut reader: R, channel: String, engine: EngineHandle)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if engine.data(channel.as_str(), chunk).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to read from channel {}: {}", channel, e);
                break;
            }
        }
    }
}

async fn wait_for_exit(mut child: Child, channel: String, engine: EngineHandle) {
    match child.wait().await {
        Ok(status) => info!("Shell on channel {} exited with {}", channel, status),
        Err(e) => warn!("Failed to wait for shell on channel {}: {}", channel, e),
    }
    // The engine may already be gone when the CLI is shutting down
    let _ = engine.channel_closed(channel);
}
