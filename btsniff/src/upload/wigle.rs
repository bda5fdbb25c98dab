use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, multipart};
use serde::Deserialize;
use tracing::debug;

use super::{UploadBackend, UploadConfigError};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum WigleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WiGLE returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("WiGLE rejected the upload: {0}")]
    Rejected(String),
}

/// Body of a WiGLE upload response.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the WiGLE file upload API.
pub struct WigleClient {
    http: reqwest::Client,
    base_url: String,
    name: String,
    token: String,
}

impl WigleClient {
    /// Refuses to build without both credentials, so a misconfigured
    /// uploader never hits the network.
    pub fn new(
        base_url: impl Into<String>,
        name: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, UploadConfigError> {
        let name = name.into();
        let token = token.into();
        if name.trim().is_empty() || token.trim().is_empty() {
            return Err(UploadConfigError::MissingCredentials);
        }

        let http = reqwest::Client::builder().timeout(UPLOAD_TIMEOUT).build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            name,
            token,
        })
    }

    pub fn account(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl UploadBackend for WigleClient {
    type Error = WigleError;

    async fn upload(&self, file_name: &str, contents: Vec<u8>) -> Result<(), Self::Error> {
        let part = multipart::Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("text/csv")?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/api/v2/file/upload", self.base_url))
            .basic_auth(&self.name, Some(&self.token))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WigleError::Status { status, body });
        }

        let body: UploadResponse = response.json().await?;
        if body.success {
            Ok(())
        } else {
            Err(WigleError::Rejected(body.message.unwrap_or_default()))
        }
    }

    async fn reachable(&self) -> bool {
        match self
            .http
            .get(&self.base_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(status = %response.status(), "WiGLE probe got an error status");
                false
            }
            Err(e) => {
                debug!(error = %e, "WiGLE probe failed");
                false
            }
        }
    }
}
