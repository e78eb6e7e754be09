//! ARM REST client
//!
//! Implements [`ManagementClient`] over HTTPS with bearer token
//! authentication. The client never retries: transport failures surface as
//! [`ApiError::transport`] and long-running operations are handed back as
//! handles for the poller.

use crate::error::{ArmError, Result};
use crate::response::{operation_url, parse_error_body, parse_operation_status, retry_after};
use async_trait::async_trait;
use driftwood_config::{DEFAULT_ENDPOINT, ENDPOINT_ENV, ProviderConfig, TOKEN_ENV};
use driftwood_core::{ApiError, Lookup, ManagementClient, OperationHandle, OperationStatus, Submission};
use reqwest::{RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for [`ArmClient`]
#[derive(Debug, Clone)]
pub struct ArmConfig {
    pub endpoint: String,
    pub token: String,
    /// Bound on a single HTTP request
    pub request_timeout: Duration,
}

impl ArmConfig {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Create ArmConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let token =
            std::env::var(TOKEN_ENV).map_err(|_| ArmError::MissingEnvVar(TOKEN_ENV.to_string()))?;
        let endpoint = std::env::var(ENDPOINT_ENV).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Ok(Self::new(endpoint, token))
    }

    pub fn from_provider(config: &ProviderConfig) -> Result<Self> {
        Ok(Self::new(config.endpoint.clone(), config.token()?))
    }
}

/// Azure Resource Manager client
#[derive(Debug)]
pub struct ArmClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl ArmClient {
    pub fn new(config: ArmConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(ArmError::InvalidConfig("token must not be empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("driftwood/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, ApiError> {
        request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| ApiError::transport(err.to_string()))
    }
}

async fn body_text(response: Response) -> std::result::Result<String, ApiError> {
    response
        .text()
        .await
        .map_err(|err| ApiError::transport(format!("failed to read response body: {err}")))
}

fn parse_document(status: u16, body: &str) -> std::result::Result<Option<Value>, ApiError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body).map(Some).map_err(|err| {
        ApiError::new(status, "MalformedResponse", format!("response is not valid JSON: {err}"))
    })
}

/// Map a PUT or DELETE response onto a [`Submission`]
async fn submission(response: Response) -> std::result::Result<Submission, ApiError> {
    let status = response.status().as_u16();
    if status == 404 {
        return Ok(Submission::NotFound);
    }
    if !response.status().is_success() {
        let body = body_text(response).await?;
        return Err(parse_error_body(status, &body));
    }

    if let Some(url) = operation_url(status, response.headers()) {
        let hint = retry_after(response.headers());
        tracing::debug!(status, operation = %url, "mutation accepted");
        return Ok(Submission::Accepted(
            OperationHandle::new(url.clone(), url).with_retry_after(hint),
        ));
    }
    if status == 202 {
        tracing::warn!("202 Accepted without an operation URL, treating as complete");
    }

    let body = body_text(response).await?;
    Ok(Submission::Done(parse_document(status, &body)?))
}

#[async_trait]
impl ManagementClient for ArmClient {
    async fn get(&self, path: &str, api_version: &str) -> std::result::Result<Lookup<Value>, ApiError> {
        tracing::debug!(path, api_version, "GET");
        let response = self
            .send(self.http.get(self.url(path)).query(&[("api-version", api_version)]))
            .await?;

        let status = response.status().as_u16();
        if status == 404 {
            return Ok(Lookup::NotFound);
        }
        let body = body_text(response).await?;
        if !(200..300).contains(&status) {
            return Err(parse_error_body(status, &body));
        }
        Ok(Lookup::Found(parse_document(status, &body)?.unwrap_or(Value::Null)))
    }

    async fn put(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
    ) -> std::result::Result<Submission, ApiError> {
        tracing::debug!(path, api_version, "PUT");
        let response = self
            .send(
                self.http
                    .put(self.url(path))
                    .query(&[("api-version", api_version)])
                    .json(body),
            )
            .await?;
        submission(response).await
    }

    async fn delete(&self, path: &str, api_version: &str) -> std::result::Result<Submission, ApiError> {
        tracing::debug!(path, api_version, "DELETE");
        let response = self
            .send(self.http.delete(self.url(path)).query(&[("api-version", api_version)]))
            .await?;
        submission(response).await
    }

    async fn operation_status(
        &self,
        handle: &OperationHandle,
    ) -> std::result::Result<OperationStatus, ApiError> {
        // operation URLs are absolute and already carry their api-version
        let response = self.send(self.http.get(handle.status_url())).await?;
        let status = response.status().as_u16();
        let hint = retry_after(response.headers());
        let body = body_text(response).await?;
        parse_operation_status(status, &body, hint)
    }
}
