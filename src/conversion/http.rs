//! HTTP client for a job-based document parsing service.
//!
//! Protocol:
//! 1. `POST {base}/upload` (multipart, field `file`) → `{"id": "..."}`
//! 2. `GET {base}/job/{id}` until `status` is `SUCCESS` (or `ERROR`)
//! 3. `GET {base}/job/{id}/result/{result_type}` → `{"pages": [{"md": "..."}]}`

use super::ConversionClient;
use crate::config::ConversionConfig;
use crate::error::{ConversionError, Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

#[derive(Debug, Deserialize)]
struct JobCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobResult {
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(alias = "text", alias = "markdown")]
    md: String,
}

/// Production [`ConversionClient`] talking to a parsing service over HTTP
#[derive(Clone, Debug)]
pub struct HttpConversionClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    result_type: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl HttpConversionClient {
    /// Create a client from the conversion settings
    pub fn new(config: &ConversionConfig) -> Result<Self> {
        // Url::join drops the last path segment unless the base ends with '/'
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| Error::Config {
            message: format!("invalid conversion base_url '{}': {}", config.base_url, e),
            key: Some("base_url".to_string()),
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to build HTTP client: {e}"),
                key: None,
            })?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            result_type: config.result_type.clone(),
            poll_interval: config.poll_interval,
            timeout: config.timeout,
        })
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, ConversionError> {
        self.base_url
            .join(path)
            .map_err(|e| ConversionError::Malformed(format!("invalid endpoint {path}: {e}")))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let req = self.client.request(method, url);
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn upload(&self, path: &Path) -> std::result::Result<String, ConversionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ConversionError::Input {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();

        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        let response = self
            .request(reqwest::Method::POST, self.endpoint("upload")?)
            .multipart(form)
            .send()
            .await?;
        let job: JobCreated = check_status(response).await?.json().await?;
        Ok(job.id)
    }

    async fn wait_for_job(&self, id: &str) -> std::result::Result<(), ConversionError> {
        let deadline = Instant::now() + self.timeout;
        let url = self.endpoint(&format!("job/{id}"))?;

        loop {
            let response = self
                .request(reqwest::Method::GET, url.clone())
                .send()
                .await?;
            let job: JobStatus = check_status(response).await?.json().await?;

            match job.status.to_ascii_uppercase().as_str() {
                "SUCCESS" => return Ok(()),
                "ERROR" | "FAILED" | "CANCELED" | "CANCELLED" => {
                    return Err(ConversionError::Service(
                        job.error.unwrap_or_else(|| format!("job {id} ended as {}", job.status)),
                    ));
                }
                _ => {}
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(ConversionError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn fetch_result(&self, id: &str) -> std::result::Result<Vec<String>, ConversionError> {
        let url = self.endpoint(&format!("job/{id}/result/{}", self.result_type))?;
        let response = self.request(reqwest::Method::GET, url).send().await?;
        let result: JobResult = check_status(response).await?.json().await?;
        Ok(result.pages.into_iter().map(|p| p.md).collect())
    }
}

#[async_trait]
impl ConversionClient for HttpConversionClient {
    #[tracing::instrument(skip(self), fields(base_url = %self.base_url))]
    async fn convert(&self, path: &Path) -> std::result::Result<Vec<String>, ConversionError> {
        let id = self.upload(path).await?;
        tracing::debug!(job_id = %id, "upload accepted, polling job");

        self.wait_for_job(&id).await?;
        let pages = self.fetch_result(&id).await?;

        tracing::info!(job_id = %id, pages = pages.len(), "conversion completed");
        Ok(pages)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Map non-success responses to conversion errors, keeping the body as context
async fn check_status(
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, ConversionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string()
    } else {
        body
    };

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Err(ConversionError::RateLimited { message })
    } else {
        Err(ConversionError::Http {
            status: status.as_u16(),
            message,
        })
    }
}
