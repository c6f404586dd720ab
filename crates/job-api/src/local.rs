//! Local dry-run backend
//!
//! Writes the job specification as JSON instead of submitting it. Writes are
//! atomic so a reader never sees a partial file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use launcher_core::{Error, JobHandle, JobSpec, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::JobSubmitter;

/// Status reported for jobs written by the dry-run backend
pub const DRY_RUN_STATUS: &str = "DryRun";

/// Dry-run backend writing `<job name>.json` into a directory
#[derive(Debug, Clone)]
pub struct DryRunSubmitter {
    /// Directory receiving job files
    output_dir: PathBuf,
}

impl DryRunSubmitter {
    /// Create a new DryRunSubmitter
    ///
    /// # Arguments
    /// * `output_dir` - Directory to write job specifications into
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// Path a job's specification is written to
    pub fn job_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}.json", name))
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.output_dir
            .join(format!(".{}.json.{}.tmp", name, Uuid::new_v4()))
    }
}

#[async_trait]
impl JobSubmitter for DryRunSubmitter {
    #[instrument(skip(self, job), fields(backend = "dry-run", job = %job.name))]
    async fn create_or_update(&self, job: &JobSpec) -> Result<JobHandle> {
        let full_path = self.job_path(&job.name);
        let temp_path = self.temp_path(&job.name);
        let data = serde_json::to_vec_pretty(job)?;

        debug!(?full_path, size = data.len(), "Writing job specification");

        fs::create_dir_all(&self.output_dir).await.map_err(|e| Error::Internal {
            message: format!("Failed to create directory {:?}: {}", self.output_dir, e),
        })?;

        if let Err(e) = write_then_rename(&temp_path, &full_path, &data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        info!(path = ?full_path, "Job specification written (dry run)");

        Ok(JobHandle {
            name: job.name.clone(),
            status: DRY_RUN_STATUS.to_string(),
            studio_url: Some(format!("file://{}", full_path.display())),
            submitted_at: Utc::now(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "dry-run"
    }
}

/// Write `data` to `temp_path`, flush it, then move it over `path`
async fn write_then_rename(temp_path: &Path, path: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::File::create(temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(temp_path, path).await.map_err(|e| Error::Internal {
        message: format!("Failed to rename {:?} to {:?}: {}", temp_path, path, e),
    })
}
