//! # lk-core
//!
//! Launch supervision for an external coding agent CLI.
//!
//! This crate provides:
//! - A launcher that runs the CLI in terminals: one primary (scope) launch
//!   and a bounded pool of mockup analyses
//! - A progress monitor over the files the CLI reports into
//! - A file-backed message broker for cross-component notifications
//! - Scope serialization, configuration loading and project initialization
//!
//! ## Modules
//!
//! - [`launcher`]: Primary/secondary launch state machines
//! - [`monitor`]: Progress file watching and polling
//! - [`broker`]: `{id}.{status}.json` message queue
//! - [`scope`]: Scope normalization and storage
//! - [`terminal`]: Terminal host abstraction and implementations
//! - [`auth`]: Auth context providers
//! - [`events`]: In-process event bus
//! - [`integration`]: Proxy and prompt library glue
//! - [`paths`]: Temp and config directory resolution
//! - [`config`]: `.launchkit/` configuration loading
//! - [`init`]: `.launchkit/` generation

pub mod auth;
pub mod broker;
pub mod config;
pub mod events;
pub mod init;
pub mod integration;
pub mod launcher;
pub mod monitor;
pub mod paths;
pub mod scope;
pub mod terminal;
