//! HTTP client for the recordings API
//!
//! Uploads are multipart: the media as a binary `file` part plus a JSON
//! `metadata` part. Every non-2xx answer is an error so callers can fall
//! back to local storage.

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

use super::{ApiError, RemoteApi, RemoteRecording};
use crate::data::RecordingMetadata;

/// Body of `POST /auth/login`
#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default = "default_success")]
    success: bool,
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default = "default_success")]
    success: bool,
    recording: Option<RemoteRecording>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Wrapped { recordings: Vec<RemoteRecording> },
    Bare(Vec<RemoteRecording>),
}

fn default_success() -> bool {
    true
}

/// Client for the remote recordings service
pub struct ApiClient {
    client: Client,
    base_url: Option<String>,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
            token: RwLock::new(None),
        })
    }

    /// Check if a base URL is configured
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<String, ApiError> {
        let base = self.base_url.as_ref().ok_or(ApiError::NotConfigured)?;
        Ok(format!("{}{}", base, path))
    }

    fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.token().ok_or(ApiError::Unauthorized)?;
        Ok(request.bearer_auth(token))
    }

    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// File extension matching a media type, for the multipart file name
fn extension_for(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    match essence {
        "video/webm" | "audio/webm" => "webm",
        "video/mp4" => "mp4",
        "audio/mp4" => "m4a",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" => "wav",
        _ => "bin",
    }
}

#[async_trait::async_trait]
impl RemoteApi for ApiClient {
    async fn upload(
        &self,
        payload: &[u8],
        metadata: &RecordingMetadata,
    ) -> Result<RemoteRecording, ApiError> {
        let endpoint = self.endpoint("/recordings/upload")?;

        info!(
            "Uploading recording \"{}\" ({:.2} MB)",
            metadata.title,
            payload.len() as f64 / (1024.0 * 1024.0)
        );

        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| ApiError::Rejected(format!("invalid metadata: {}", e)))?;

        let file_part = Part::bytes(payload.to_vec())
            .file_name(format!("recording.{}", extension_for(&metadata.mime_type)))
            .mime_str(&metadata.mime_type)?;
        let metadata_part = Part::text(metadata_json).mime_str("application/json")?;

        let form = Form::new()
            .part("file", file_part)
            .part("metadata", metadata_part);

        let response = self
            .authorized(self.client.post(&endpoint))?
            .multipart(form)
            .send()
            .await?;

        let body: UploadResponse = Self::check(response).await?.json().await?;
        if !body.success {
            return Err(ApiError::Rejected(
                body.error.unwrap_or_else(|| "upload rejected".to_string()),
            ));
        }

        let recording = body
            .recording
            .ok_or_else(|| ApiError::Rejected("response carried no recording".to_string()))?;

        info!("Uploaded recording as {}", recording.id);
        Ok(recording)
    }

    async fn list(&self) -> Result<Vec<RemoteRecording>, ApiError> {
        let endpoint = self.endpoint("/recordings")?;
        let response = self.authorized(self.client.get(&endpoint))?.send().await?;

        let recordings = match Self::check(response).await?.json::<ListResponse>().await? {
            ListResponse::Wrapped { recordings } => recordings,
            ListResponse::Bare(recordings) => recordings,
        };

        debug!("Listed {} remote recording(s)", recordings.len());
        Ok(recordings)
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let endpoint = self.endpoint(&format!("/recordings/{}", id))?;
        let response = self
            .authorized(self.client.delete(&endpoint))?
            .send()
            .await?;
        Self::check(response).await?;

        info!("Deleted remote recording {}", id);
        Ok(())
    }

    async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let endpoint = self.endpoint("/auth/login")?;
        let response = self
            .client
            .post(&endpoint)
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let body: LoginResponse = Self::check(response).await?.json().await?;
        match (body.success, body.token) {
            (true, Some(token)) => {
                self.set_token(Some(token.clone()));
                Ok(token)
            }
            _ => Err(ApiError::Rejected(
                body.error.unwrap_or_else(|| "login failed".to_string()),
            )),
        }
    }

    async fn logout(&self) -> Result<(), ApiError> {
        let endpoint = self.endpoint("/auth/logout")?;
        let result = match self.authorized(self.client.post(&endpoint)) {
            Ok(request) => match request.send().await {
                Ok(response) => Self::check(response).await.map(|_| ()),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e),
        };

        // The local token goes away whatever the server said
        self.set_token(None);
        result
    }

    fn set_token(&self, token: Option<String>) {
        let mut guard = match self.token.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = token;
    }
}
