//! Management API request and response bodies for command jobs

use std::collections::{BTreeMap, HashMap};

use launcher_core::{
    Distribution, Identity, InputMode, JobInput, JobOutput, JobSpec, OutputMode,
};
use serde::{Deserialize, Serialize};

/// `PUT .../jobs/{name}` body
#[derive(Debug, Serialize)]
pub(crate) struct JobResource {
    pub properties: CommandJobProperties,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommandJobProperties {
    pub job_type: &'static str,
    pub display_name: String,
    pub experiment_name: String,
    pub tags: BTreeMap<String, String>,
    pub code_id: String,
    pub command: String,
    pub environment_id: String,
    pub compute_id: String,
    pub identity: IdentityConfiguration,
    pub inputs: BTreeMap<String, WireInput>,
    pub outputs: BTreeMap<String, WireOutput>,
    pub environment_variables: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<WireDistribution>,
    pub resources: JobResources,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IdentityConfiguration {
    pub identity_type: &'static str,
}

impl From<Identity> for IdentityConfiguration {
    fn from(identity: Identity) -> Self {
        let identity_type = match identity {
            Identity::User => "UserIdentity",
        };
        Self { identity_type }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "jobInputType")]
pub(crate) enum WireInput {
    #[serde(rename = "uri_folder")]
    UriFolder { uri: String, mode: &'static str },

    #[serde(rename = "literal")]
    Literal { value: String },
}

impl From<&JobInput> for WireInput {
    fn from(input: &JobInput) -> Self {
        match input {
            JobInput::UriFolder { path, mode } => WireInput::UriFolder {
                uri: path.clone(),
                mode: match mode {
                    InputMode::ReadOnlyMount => "ReadOnlyMount",
                },
            },
            JobInput::Integer { default } => WireInput::Literal {
                value: default.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireOutput {
    pub job_output_type: &'static str,
    pub uri: String,
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_name: Option<String>,
}

impl From<&JobOutput> for WireOutput {
    fn from(output: &JobOutput) -> Self {
        Self {
            job_output_type: "uri_folder",
            uri: output.path.clone(),
            mode: match output.mode {
                OutputMode::ReadWriteMount => "ReadWriteMount",
            },
            asset_name: output.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "distributionType")]
pub(crate) enum WireDistribution {
    Mpi {
        #[serde(rename = "processCountPerInstance")]
        process_count_per_instance: u32,
    },
    PyTorch {
        #[serde(rename = "processCountPerInstance")]
        process_count_per_instance: u32,
    },
}

impl From<Distribution> for WireDistribution {
    fn from(distribution: Distribution) -> Self {
        match distribution {
            Distribution::Mpi {
                process_count_per_instance,
            } => WireDistribution::Mpi {
                process_count_per_instance,
            },
            Distribution::PyTorch {
                process_count_per_instance,
            } => WireDistribution::PyTorch {
                process_count_per_instance,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobResources {
    pub instance_count: u32,
    pub shm_size: String,
}

impl JobResource {
    /// Build the request body; asset references must already be resolved
    pub fn new(job: &JobSpec, code_id: String, environment_id: String, compute_id: String) -> Self {
        Self {
            properties: CommandJobProperties {
                job_type: "Command",
                display_name: job.display_name.clone(),
                experiment_name: job.experiment_name.clone(),
                tags: job
                    .tags
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_string()))
                    .collect(),
                code_id,
                command: job.command.clone(),
                environment_id,
                compute_id,
                identity: job.identity.into(),
                inputs: job
                    .inputs
                    .iter()
                    .map(|(k, v)| (k.clone(), WireInput::from(v)))
                    .collect(),
                outputs: job
                    .outputs
                    .iter()
                    .map(|(k, v)| (k.clone(), WireOutput::from(v)))
                    .collect(),
                environment_variables: job.environment_variables.clone(),
                distribution: job.distribution.map(WireDistribution::from),
                resources: JobResources {
                    instance_count: job.instance_count,
                    shm_size: job.shm_size.clone(),
                },
            },
        }
    }
}

/// Job resource as returned by the API
#[derive(Debug, Deserialize)]
pub(crate) struct JobResponse {
    pub name: Option<String>,
    #[serde(default)]
    pub properties: JobResponseProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobResponseProperties {
    pub status: Option<String>,
    #[serde(default)]
    pub services: HashMap<String, JobService>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobService {
    pub endpoint: Option<String>,
}

impl JobResponse {
    /// Studio URL, published as the `Studio` service endpoint
    pub fn studio_url(&self) -> Option<String> {
        self.properties
            .services
            .get("Studio")
            .and_then(|s| s.endpoint.clone())
    }
}

/// Error envelope used by the management API
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    pub code: Option<String>,
    pub message: Option<String>,
}
