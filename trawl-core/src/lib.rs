//! Trawl Core
//!
//! Core types shared by the trawl pipeline engine and its hosts.
//!
//! This crate contains:
//! - Domain types: templates, pipeline instances, step state, targets, events
//! - The template catalog: built-in reconnaissance pipelines and JSON loading
//! - DTOs: lightweight views of pipelines for listing

pub mod catalog;
pub mod domain;
pub mod dto;
