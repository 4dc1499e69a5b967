//! Trawl Engine
//!
//! Orchestrates reconnaissance pipelines over interactive shell sessions.
//!
//! Each pipeline step renders a command, types it into the shell bound to
//! the pipeline, infers from the raw output stream when the command has
//! finished, and parses what it printed into targets for the next step.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trawl_core::catalog::Catalog;
//! use trawl_engine::session::RecordingSession;
//! use trawl_engine::{Engine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//!     let session = Arc::new(RecordingSession::new());
//!     let engine = Engine::new(EngineConfig::from_env()?, Catalog::builtin(), session, events_tx);
//!     let (handle, _task) = trawl_engine::spawn(engine);
//!
//!     let id = handle.create_pipeline("domain", "example.com", None).await?;
//!     handle.bind_channel(id, "pty-1").await?;
//!     handle.start(id).await?;
//!
//!     // Raw shell output goes back in through the handle
//!     handle.data("pty-1", "a.example.com\nuser@host:~$ ")?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod parsers;
pub mod registry;
pub mod runtime;
pub mod session;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result, SessionError};
pub use runtime::{ControlAction, EngineHandle, spawn};
pub use session::SessionChannel;
