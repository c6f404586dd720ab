//! Launcher Core - Foundation for the training job launcher
//!
//! Provides the settings record, error handling, and the job specification
//! model shared by the submission backends and the launcher itself.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Settings, SubmitConfig};
pub use error::{Error, Result};
pub use types::*;
