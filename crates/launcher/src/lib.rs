//! Training job launcher
//!
//! Assembles a command job for the Ahmed body training run and submits it:
//! - **Metadata**: tags and display name derived from the settings
//! - **Bindings**: data input, scalar hyperparameters, output folders
//! - **Distribution**: MPI or PyTorch launcher selected by `parallel_mode`
//! - **Submission**: through any [`job_api::JobSubmitter`]
//!
//! # Example
//!
//! ```ignore
//! use job_api::DryRunSubmitter;
//! use launcher::run_training_job;
//! use launcher_core::Settings;
//!
//! #[tokio::main]
//! async fn main() -> launcher_core::Result<()> {
//!     let settings = Settings::load(None)?;
//!     let handle = run_training_job(&settings, &DryRunSubmitter::new("jobs")).await?;
//!     println!("{:?}", handle.studio_url);
//!     Ok(())
//! }
//! ```

pub mod job;
pub mod run;

pub use job::{build_job, build_name, build_tags, create_inputs, create_outputs};
pub use run::{connect, run_training_job, DRY_RUN_DIR_VAR};
