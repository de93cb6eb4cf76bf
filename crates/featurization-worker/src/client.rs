//! Featurization service client.

use crate::{FeaturizationError, FeaturizationHit, FeaturizationResult};
use async_trait::async_trait;
use pipeline_config_and_utils::FeaturizationConfig;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// Calls made by the retry engine.
#[async_trait]
pub trait FeaturizationClient: Send + Sync {
    /// Whether the experience is already registered.
    async fn check_exists(&self, hit: &FeaturizationHit) -> FeaturizationResult<bool>;

    /// Registers the experience content.
    async fn register(&self, hit: &FeaturizationHit) -> FeaturizationResult<()>;
}

#[derive(Debug, Deserialize)]
struct ExistsResponse {
    exists: bool,
}

/// JSON-over-HTTP client for the featurization service.
#[derive(Clone)]
pub struct HttpFeaturizationClient {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpFeaturizationClient {
    pub fn new(base_url: Url, timeout: Duration) -> FeaturizationResult<Self> {
        if base_url.cannot_be_a_base() {
            return Err(FeaturizationError::Config(format!(
                "featurization URL cannot be a base: {base_url}"
            )));
        }
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn from_config(config: &FeaturizationConfig) -> FeaturizationResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| FeaturizationError::Config(format!("invalid featurization URL: {e}")))?;
        Self::new(base_url, Duration::from_secs(config.request_timeout_secs))
    }

    /// `{base}/experiences[/{id}]`
    fn experiences_url(&self, experience_id: Option<&str>) -> FeaturizationResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                FeaturizationError::Config("featurization URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty().push("experiences");
            if let Some(id) = experience_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn check_response(&self, response: reqwest::Response) -> FeaturizationResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() != 404 {
            error!(status = status.as_u16(), body = %body, "Featurization request failed");
        }
        Err(FeaturizationError::Http {
            status: status.as_u16(),
            message: body,
        })
    }
}

/// Requests that never got a response are network errors; the rest keep
/// the reqwest error.
fn transport_error(err: reqwest::Error) -> FeaturizationError {
    if err.is_decode() || err.is_builder() {
        FeaturizationError::Transport(err)
    } else {
        FeaturizationError::Network(err.to_string())
    }
}

#[async_trait]
impl FeaturizationClient for HttpFeaturizationClient {
    async fn check_exists(&self, hit: &FeaturizationHit) -> FeaturizationResult<bool> {
        let mut url = self.experiences_url(Some(&hit.experience_id))?;
        url.query_pairs_mut()
            .append_pair("orgId", &hit.org_id)
            .append_pair("datastreamId", &hit.datastream_id);

        debug!(experience_id = %hit.experience_id, "Checking experience registration");

        let response = self
            .http_client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;
        let response = self.check_response(response).await?;
        let body: ExistsResponse = response.json().await.map_err(transport_error)?;
        Ok(body.exists)
    }

    async fn register(&self, hit: &FeaturizationHit) -> FeaturizationResult<()> {
        let url = self.experiences_url(None)?;

        debug!(experience_id = %hit.experience_id, "Registering experience");

        let response = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json")
            .json(hit)
            .send()
            .await
            .map_err(transport_error)?;
        self.check_response(response).await?;
        Ok(())
    }
}

impl std::fmt::Debug for HttpFeaturizationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFeaturizationClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}
