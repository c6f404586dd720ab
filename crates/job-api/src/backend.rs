//! Job submitter trait definition
//!
//! Defines the async interface that all submission backends must implement.

use async_trait::async_trait;
use launcher_core::{JobHandle, JobSpec, Result};

/// Async trait for job submission backends
///
/// Implementors accept a fully assembled job specification and hand it to
/// whatever executes it (the remote platform, or a local directory for
/// dry runs).
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    /// Create the job, or update it if a job with the same name exists
    ///
    /// # Arguments
    /// * `job` - Job specification to submit
    ///
    /// # Returns
    /// A handle carrying the platform's status and studio URL
    ///
    /// # Errors
    /// Returns error if the backend rejects the job or is unreachable
    async fn create_or_update(&self, job: &JobSpec) -> Result<JobHandle>;

    /// Short backend name used in logs
    fn backend_name(&self) -> &'static str;
}
