//! Bearer token credentials for the management API
//!
//! Two sources are supported, checked in this order:
//! - `AZURE_ACCESS_TOKEN`: a pre-issued token (e.g. from `az account get-access-token`)
//! - `AZURE_TENANT_ID` + `AZURE_CLIENT_ID` + `AZURE_CLIENT_SECRET`: service principal

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use launcher_core::{Error, Result};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Scope requested for management API tokens
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Tokens this close to expiry are refreshed
const EXPIRY_SKEW_SECS: i64 = 60;

/// Issued access token
#[derive(Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(at) => at - ChronoDuration::seconds(EXPIRY_SKEW_SECS) > Utc::now(),
            None => true,
        }
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of bearer tokens
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Get a token valid for the management API
    async fn token(&self) -> Result<AccessToken>;
}

/// Fixed, pre-issued token
#[derive(Debug, Clone)]
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            token: AccessToken {
                secret: secret.into(),
                expires_at: None,
            },
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn token(&self) -> Result<AccessToken> {
        Ok(self.token.clone())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Service principal credential using the client-credentials grant
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority: String,
    http: reqwest::Client,
    cached: Mutex<Option<AccessToken>>,
}

impl ClientSecretCredential {
    pub fn new(
        authority: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authority: authority.into(),
            http,
            cached: Mutex::new(None),
        }
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }

    async fn request_token(&self) -> Result<AccessToken> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", MANAGEMENT_SCOPE),
        ];

        let response = self
            .http
            .post(self.token_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Auth {
                message: format!("Token request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<TokenErrorResponse>().await {
                Ok(body) => format!(
                    "{}: {}",
                    body.error,
                    body.error_description.unwrap_or_default()
                ),
                Err(_) => format!("token endpoint returned {}", status),
            };
            return Err(Error::Auth { message });
        }

        let body: TokenResponse = response.json().await.map_err(|e| Error::Auth {
            message: format!("Malformed token response: {}", e),
        })?;

        Ok(AccessToken {
            secret: body.access_token,
            expires_at: body
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        })
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    #[instrument(skip(self), fields(tenant = %self.tenant_id, client = %self.client_id))]
    async fn token(&self) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.clone());
        }

        debug!("Requesting management token");
        let token = self.request_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Pick a credential from a key lookup (normally the process environment)
pub fn default_credential<F>(
    authority: &str,
    http: reqwest::Client,
    lookup: F,
) -> Result<Arc<dyn TokenCredential>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup("AZURE_ACCESS_TOKEN").filter(|t| !t.is_empty()) {
        info!("Using access token from AZURE_ACCESS_TOKEN");
        return Ok(Arc::new(StaticTokenCredential::new(token)));
    }

    match (
        lookup("AZURE_TENANT_ID"),
        lookup("AZURE_CLIENT_ID"),
        lookup("AZURE_CLIENT_SECRET"),
    ) {
        (Some(tenant), Some(client), Some(secret)) => {
            info!(%tenant, %client, "Using service principal credential");
            Ok(Arc::new(ClientSecretCredential::new(
                authority, tenant, client, secret, http,
            )))
        }
        _ => Err(Error::Auth {
            message: "no credential found: set AZURE_ACCESS_TOKEN or \
                      AZURE_TENANT_ID/AZURE_CLIENT_ID/AZURE_CLIENT_SECRET"
                .to_string(),
        }),
    }
}
