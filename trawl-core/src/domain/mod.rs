//! Core domain types
//!
//! This module contains the structures that describe a reconnaissance
//! pipeline: the static templates it is built from, the mutable state of a
//! running instance, the targets that flow between steps, and the events the
//! engine publishes to its host.

pub mod event;
pub mod output;
pub mod pipeline;
pub mod target;
pub mod template;
