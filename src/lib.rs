//! offsync - offline-first sync engine
//!
//! Records are written to a local SQLite store together with a durable
//! mutation queue, then reconciled with a Supabase backend when the device
//! is online.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Entity records, typed payloads, queue items
//! - [`storage`] - SQLite store, mutation queue, sync metadata
//! - [`sync`] - Orchestrator, queue manager, realtime bridge, Supabase clients
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
