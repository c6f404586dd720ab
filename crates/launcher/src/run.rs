//! Submission entry point

use std::collections::HashMap;
use std::path::PathBuf;

use job_api::{
    default_credential, AzureMlClient, DryRunSubmitter, JobSubmitter, WorkspaceScope,
};
use launcher_core::{JobHandle, Result, Settings};
use tracing::{info, warn};

use crate::job::build_job;

/// When set, jobs are written to this directory instead of being submitted
pub const DRY_RUN_DIR_VAR: &str = "LAUNCHER_DRY_RUN_DIR";

/// Pick the submission backend: a dry-run directory if one is given,
/// otherwise an authenticated client for the settings' workspace.
pub fn connect<F>(settings: &Settings, lookup: F) -> Result<Box<dyn JobSubmitter>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(DRY_RUN_DIR_VAR).filter(|d| !d.is_empty()) {
        info!(dir = %dir, "Dry run, job will not be submitted");
        return Ok(Box::new(DryRunSubmitter::new(PathBuf::from(dir))));
    }

    let http = AzureMlClient::http_client(&settings.submit)?;
    let credential = default_credential(&settings.submit.authority, http.clone(), lookup)?;
    let scope = WorkspaceScope::new(
        &settings.subscription_id,
        &settings.resource_group,
        &settings.workspace,
    );
    Ok(Box::new(AzureMlClient::with_http(
        http,
        scope,
        credential,
        settings.submit.clone(),
    )))
}

/// Build the training job from `settings` and submit it.
pub async fn run_training_job(
    settings: &Settings,
    submitter: &dyn JobSubmitter,
) -> Result<JobHandle> {
    let job = build_job(settings);
    warn_on_shared_asset_names(&job.outputs);

    info!(
        backend = submitter.backend_name(),
        job = %job.name,
        display_name = %job.display_name,
        compute = %job.compute,
        instance_count = job.instance_count,
        "Submitting training job"
    );

    let handle = submitter.create_or_update(&job).await?;

    match &handle.studio_url {
        Some(url) => info!(job = %handle.name, status = %handle.status, %url, "Job status URL"),
        None => warn!(job = %handle.name, "Platform returned no status URL"),
    }
    Ok(handle)
}

fn warn_on_shared_asset_names(outputs: &launcher_core::Outputs) {
    let mut by_name: HashMap<&str, Vec<&str>> = HashMap::new();
    for (binding, output) in outputs {
        if let Some(name) = output.name.as_deref() {
            by_name.entry(name).or_default().push(binding.as_str());
        }
    }
    for (name, bindings) in by_name.into_iter().filter(|(_, b)| b.len() > 1) {
        warn!(asset = name, ?bindings, "Outputs share an asset name");
    }
}
