//! Job API - Submission backends for the training job launcher
//!
//! Provides the [`JobSubmitter`] interface with support for:
//! - Local dry-run output (with `local` feature)
//! - Azure Machine Learning management REST API (with `azure` feature)
//!
//! # Example
//!
//! ```no_run
//! use job_api::{DryRunSubmitter, JobSubmitter};
//! use launcher_core::JobSpec;
//!
//! # async fn example(job: JobSpec) -> launcher_core::Result<()> {
//! let submitter = DryRunSubmitter::new("/tmp/jobs");
//! let handle = submitter.create_or_update(&job).await?;
//! println!("{:?}", handle.studio_url);
//! # Ok(())
//! # }
//! ```

mod backend;
#[cfg(feature = "local")]
mod local;

#[cfg(feature = "azure")]
mod azure;
#[cfg(feature = "azure")]
mod credential;
#[cfg(feature = "azure")]
mod wire;

pub use backend::JobSubmitter;
#[cfg(feature = "local")]
pub use local::DryRunSubmitter;

#[cfg(feature = "azure")]
pub use azure::{AzureMlClient, WorkspaceScope};
#[cfg(feature = "azure")]
pub use credential::{
    default_credential, AccessToken, ClientSecretCredential, StaticTokenCredential,
    TokenCredential,
};
