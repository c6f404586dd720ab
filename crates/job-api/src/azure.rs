//! Azure Machine Learning job backend
//!
//! Submits command jobs through the management REST API with:
//! - ARM ID resolution for environment, compute and code references
//! - Exponential backoff retry on throttling and server errors
//! - Custom endpoint support (sovereign clouds, local mocks)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use launcher_core::{Error, JobHandle, JobSpec, Result, SubmitConfig};
use tracing::{debug, info, instrument, warn};

use crate::credential::TokenCredential;
use crate::wire::{ErrorResponse, JobResource, JobResponse};
use crate::JobSubmitter;

const ASSET_PREFIX: &str = "azureml:";

/// Subscription, resource group and workspace a client is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceScope {
    pub subscription_id: String,
    pub resource_group: String,
    pub workspace: String,
}

impl WorkspaceScope {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        workspace: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            workspace: workspace.into(),
        }
    }

    /// ARM ID of the workspace
    pub fn workspace_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.MachineLearningServices/workspaces/{}",
            self.subscription_id, self.resource_group, self.workspace
        )
    }

    /// Resolve `azureml:<name>:<version>` to a versioned asset ARM ID
    fn resolve_versioned(&self, collection: &str, reference: &str) -> Result<String> {
        if reference.starts_with("/subscriptions/") {
            return Ok(reference.to_string());
        }

        let short = reference.strip_prefix(ASSET_PREFIX).ok_or_else(|| {
            Error::invalid_config(format!(
                "{} reference {:?} must be `azureml:<name>:<version>` or an ARM ID",
                collection, reference
            ))
        })?;
        if short.starts_with("/subscriptions/") {
            return Ok(short.to_string());
        }

        match short.split_once(':') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => Ok(format!(
                "{}/{}/{}/versions/{}",
                self.workspace_id(),
                collection,
                name,
                version
            )),
            _ => Err(Error::invalid_config(format!(
                "{} reference {:?} is missing a version",
                collection, reference
            ))),
        }
    }

    /// Resolve an environment reference
    pub fn environment_id(&self, reference: &str) -> Result<String> {
        self.resolve_versioned("environments", reference)
    }

    /// Resolve a code asset reference
    ///
    /// Local code directories are not uploaded; register the code as an
    /// asset first.
    pub fn code_id(&self, reference: &str) -> Result<String> {
        if !reference.starts_with(ASSET_PREFIX) && !reference.starts_with("/subscriptions/") {
            return Err(Error::invalid_config(format!(
                "code location {:?} is a local path; register it as a code asset \
                 and set `code` to `azureml:<name>:<version>`",
                reference
            )));
        }
        self.resolve_versioned("codes", reference)
    }

    /// Resolve a compute target name
    pub fn compute_id(&self, name: &str) -> String {
        let name = name.strip_prefix(ASSET_PREFIX).unwrap_or(name);
        if name.starts_with("/subscriptions/") {
            name.to_string()
        } else {
            format!("{}/computes/{}", self.workspace_id(), name)
        }
    }
}

/// Azure ML management API client
pub struct AzureMlClient {
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    scope: WorkspaceScope,
    config: SubmitConfig,
}

impl AzureMlClient {
    /// Create a client bound to a workspace
    pub fn new(
        scope: WorkspaceScope,
        credential: Arc<dyn TokenCredential>,
        config: SubmitConfig,
    ) -> Result<Self> {
        let http = Self::http_client(&config)?;
        Ok(Self::with_http(http, scope, credential, config))
    }

    /// Create a client sharing an existing HTTP client
    pub fn with_http(
        http: reqwest::Client,
        scope: WorkspaceScope,
        credential: Arc<dyn TokenCredential>,
        config: SubmitConfig,
    ) -> Self {
        Self {
            http,
            credential,
            scope,
            config,
        }
    }

    /// HTTP client honouring the configured request timeout
    pub fn http_client(config: &SubmitConfig) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Internal {
                message: format!("Failed to build HTTP client: {}", e),
            })
    }

    fn job_url(&self, name: &str) -> String {
        format!(
            "{}{}/jobs/{}?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.scope.workspace_id(),
            name,
            self.config.api_version
        )
    }

    /// Wait before retry `attempt` (zero based): the doubling delay, or the
    /// error's minimum wait when that is longer
    fn backoff_delay(&self, attempt: u32, error: &Error) -> Duration {
        let exponential = self.config.initial_retry_delay * (1u32 << attempt.min(16));
        let hint = error
            .retry_delay_hint_ms()
            .map(Duration::from_millis)
            .unwrap_or_default();
        exponential.max(hint)
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() || attempt + 1 == attempts {
                        return Err(e);
                    }

                    let delay = self.backoff_delay(attempt, &e);
                    warn!(
                        %operation,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Internal {
            message: format!("{} failed after {} attempts", operation, attempts),
        }))
    }

    async fn put_job(&self, url: &str, body: &JobResource) -> Result<JobResponse> {
        let token = self.credential.token().await?;

        let response = self
            .http
            .put(url)
            .bearer_auth(&token.secret)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error("create_or_update", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(body) => (
                    body.error.code.unwrap_or_default(),
                    body.error.message.unwrap_or_default(),
                ),
                Err(_) => (String::new(), text),
            };
            return Err(Error::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }

        response
            .json::<JobResponse>()
            .await
            .map_err(|e| Error::Serialization(format!("Malformed job response: {}", e)))
    }

    fn transport_error(&self, operation: &str, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                operation: operation.to_string(),
                timeout_ms: duration_ms(self.config.request_timeout),
            }
        } else {
            Error::Http {
                message: e.to_string(),
            }
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[async_trait]
impl JobSubmitter for AzureMlClient {
    #[instrument(skip(self, job), fields(backend = "azureml", workspace = %self.scope.workspace, job = %job.name))]
    async fn create_or_update(&self, job: &JobSpec) -> Result<JobHandle> {
        let body = JobResource::new(
            job,
            self.scope.code_id(&job.code)?,
            self.scope.environment_id(&job.environment)?,
            self.scope.compute_id(&job.compute),
        );
        let url = self.job_url(&job.name);
        debug!(%url, "Submitting command job");

        let response = self
            .with_retry("create_or_update", || self.put_job(&url, &body))
            .await?;

        let handle = JobHandle {
            studio_url: response.studio_url(),
            name: response.name.unwrap_or_else(|| job.name.clone()),
            status: response
                .properties
                .status
                .unwrap_or_else(|| "Unknown".to_string()),
            submitted_at: Utc::now(),
        };
        info!(status = %handle.status, "Job accepted");
        Ok(handle)
    }

    fn backend_name(&self) -> &'static str {
        "azureml"
    }
}
