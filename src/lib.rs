//! rulebook - cached question answering over a rules corpus.
//!
//! Questions are answered by retrieving relevant passages from a persisted
//! search index and handing them to a chat completion service. Building the
//! index is paid once: later runs load the persisted snapshot. Each session
//! caches answers by normalized question so a repeated question never costs
//! a second upstream call.
//!
//! # Modules
//!
//! - [`cache`] - Per-session answer cache
//! - [`index`] - Retrieval index and its build/load lifecycle
//! - [`query`] - Retrieval plus generation, and the upstream client
//! - [`corpus`] - Document loading and snapshot manifest types
//! - [`storage`] - Persisted snapshot location
//! - [`config`] - Configuration loading
//! - [`commands`] - Operations behind the CLI
//! - [`cli`] - Command-line interface definitions

pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod index;
pub mod query;
pub mod storage;
