//! Launcher configuration types
//!
//! Settings are read once per run: an optional JSON file provides the base
//! values and environment variables (upper-cased field names) override them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::{Error, ParallelMode, Result, Tags};

/// Run settings for a training job submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Azure subscription holding the workspace
    pub subscription_id: String,

    /// Resource group holding the workspace
    pub resource_group: String,

    /// ML workspace name
    pub workspace: String,

    /// Compute cluster to run on
    pub compute_name: String,

    /// Hydra experiment config to train with
    pub experiment: String,

    /// Distributed execution backend
    pub parallel_mode: ParallelMode,

    /// Number of nodes
    pub instance_count: u32,

    /// Training data location
    pub data_dir: String,

    /// Output location
    pub output_dir: String,

    /// Checkpoint location
    pub ckpt_dir: String,

    /// Environment reference (e.g. `azureml:modulus:3`)
    pub aml_environment: String,

    /// Epoch override; zero or unset uses the default
    pub hydra_epochs: Option<u32>,

    /// Checkpoint frequency override; zero or unset uses the default
    pub hydra_checkpoint_save_freq: Option<u32>,

    /// Extra job tags
    pub tags: Option<Tags>,

    /// Registered code asset (`azureml:<name>:<version>`) or its ARM ID
    pub code: String,

    /// Shared memory per container
    pub shm_size: String,

    /// Submission settings
    pub submit: SubmitConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            subscription_id: String::new(),
            resource_group: String::new(),
            workspace: String::new(),
            compute_name: String::new(),
            experiment: String::new(),
            parallel_mode: ParallelMode::default(),
            instance_count: 1,
            data_dir: String::new(),
            output_dir: String::new(),
            ckpt_dir: String::new(),
            aml_environment: String::new(),
            hydra_epochs: None,
            hydra_checkpoint_save_freq: None,
            tags: None,
            code: String::new(),
            shm_size: "15g".to_string(),
            submit: SubmitConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from an optional JSON file, then apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        debug!(?path, "Reading settings file");
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("Failed to read settings file {:?}: {}", path, e))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text_fields: [(&str, &mut String); 12] = [
            ("SUBSCRIPTION_ID", &mut self.subscription_id),
            ("RESOURCE_GROUP", &mut self.resource_group),
            ("WORKSPACE", &mut self.workspace),
            ("COMPUTE_NAME", &mut self.compute_name),
            ("EXPERIMENT", &mut self.experiment),
            ("DATA_DIR", &mut self.data_dir),
            ("OUTPUT_DIR", &mut self.output_dir),
            ("CKPT_DIR", &mut self.ckpt_dir),
            ("AML_ENVIRONMENT", &mut self.aml_environment),
            ("CODE", &mut self.code),
            ("SHM_SIZE", &mut self.shm_size),
            ("SUBMIT_ENDPOINT", &mut self.submit.endpoint),
        ];
        for (key, field) in text_fields {
            if let Some(value) = lookup(key) {
                debug!(key, "Settings override from environment");
                *field = value;
            }
        }

        if let Some(mode) = lookup("PARALLEL_MODE") {
            self.parallel_mode = ParallelMode::from(mode);
        }
        if let Some(count) = lookup("INSTANCE_COUNT") {
            self.instance_count = parse_number("INSTANCE_COUNT", &count)?;
        }
        if let Some(epochs) = lookup("HYDRA_EPOCHS") {
            self.hydra_epochs = Some(parse_number("HYDRA_EPOCHS", &epochs)?);
        }
        if let Some(freq) = lookup("HYDRA_CHECKPOINT_SAVE_FREQ") {
            self.hydra_checkpoint_save_freq =
                Some(parse_number("HYDRA_CHECKPOINT_SAVE_FREQ", &freq)?);
        }
        if let Some(tags) = lookup("TAGS") {
            let parsed: Tags = serde_json::from_str(&tags).map_err(|e| {
                Error::invalid_config(format!("TAGS must be a JSON object: {}", e))
            })?;
            self.tags = Some(parsed);
        }
        Ok(())
    }

    /// Check that everything needed to address the workspace and run is set
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("subscription_id", &self.subscription_id),
            ("resource_group", &self.resource_group),
            ("workspace", &self.workspace),
            ("compute_name", &self.compute_name),
            ("experiment", &self.experiment),
            ("aml_environment", &self.aml_environment),
            ("code", &self.code),
            ("data_dir", &self.data_dir),
            ("output_dir", &self.output_dir),
            ("ckpt_dir", &self.ckpt_dir),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(Error::invalid_config(format!("{} must be set", name)));
        }
        if self.instance_count == 0 {
            return Err(Error::invalid_config("instance_count must be at least 1"));
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    value.trim().parse().map_err(|e| {
        Error::invalid_config(format!("{} must be a non-negative integer: {}", key, e))
    })
}

/// Job API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitConfig {
    /// Management API base URL
    pub endpoint: String,

    /// Token authority base URL
    pub authority: String,

    /// REST API version
    pub api_version: String,

    /// Per-request timeout
    #[serde(with = "millis_serde")]
    pub request_timeout: Duration,

    /// Total attempts, first try included, for transient failures
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on every attempt. A longer
    /// minimum wait for the error kind (e.g. throttling) takes precedence.
    #[serde(with = "millis_serde")]
    pub initial_retry_delay: Duration,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://management.azure.com".to_string(),
            authority: "https://login.microsoftonline.com".to_string(),
            api_version: "2023-04-01".to_string(),
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            initial_retry_delay: Duration::from_millis(500),
        }
    }
}

/// Durations are written as milliseconds
mod millis_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
