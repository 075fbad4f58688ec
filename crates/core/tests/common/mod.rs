//! Common test utilities shared by the integration tests.
//!
//! - Fixtures: temp roots, projects with driver files and mockups, launchers
//!   wired to a mock terminal host
//! - Assertions: event and message file helpers

pub mod assertions;
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
