//! Project initialization.
//!
//! Generates the `.launchkit/` directory of a project together with a driver
//! document and a mockup analysis template:
//! - `.launchkit/config.toml`
//! - `.launchkit/prompts/*.md` (unless minimal)
//! - `CLAUDE.md`
//! - `docs/mockup_analysis_template.md` (unless minimal)
//!
//! # Example
//!
//! ```no_run
//! use lk_core::init::{generate_launchkit_structure, InitOptions};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = InitOptions {
//!     target_dir: PathBuf::from("."),
//!     force: false,
//!     minimal: false,
//! };
//!
//! let written = generate_launchkit_structure(options).await?;
//! println!("wrote {} files", written.len());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod generator;
pub mod templates;

pub use error::{InitError, InitResult};
pub use generator::{generate_launchkit_structure, InitOptions};
pub use templates::{get_template, list_templates};
