//! # lk-protocol
//!
//! Core protocol definitions and data models for launchkit.
//!
//! This crate defines all shared data structures used for:
//! - Launch state tracking (primary launch and mockup analysis pool)
//! - File-backed broker messages
//! - Serialized scopes and progress files
//! - In-process events published by the core
//!
//! ## Modules
//!
//! - [`launch_models`]: Execution status, launch context, process table entries
//! - [`message_models`]: Broker message, type and status
//! - [`scope_models`]: Scope documents and items
//! - [`progress_models`]: Progress file contents
//! - [`ipc`]: Events published on the in-process bus
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, ts-rs, uuid and chrono
//! - TypeScript generation: All types derive `TS` for host compatibility
//! - Independent compilation: No dependencies on other launchkit crates

pub mod ipc;
pub mod launch_models;
pub mod message_models;
pub mod progress_models;
pub mod scope_models;

// Re-export all public types for convenience
pub use ipc::*;
pub use launch_models::*;
pub use message_models::*;
pub use progress_models::*;
pub use scope_models::*;
