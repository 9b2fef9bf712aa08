//! Remote recordings API
//!
//! The coordinator only depends on the `RemoteApi` contract; `ApiClient`
//! is the HTTP implementation.

mod client;

pub use client::ApiClient;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{Platform, RecordingMetadata, RecordingRecord};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("recordings API endpoint not configured")]
    NotConfigured,

    #[error("not signed in")]
    Unauthorized,

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("server rejected the request: {0}")]
    Rejected(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// A recording as the server describes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecording {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Canonical URL assigned by the server
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub platform: Option<Platform>,
}

impl RemoteRecording {
    /// Build a synced record, falling back to the locally known metadata
    /// for anything the server did not echo back
    pub fn into_record(self, local: &RecordingMetadata) -> RecordingRecord {
        RecordingRecord {
            id: self.id,
            title: self.title.unwrap_or_else(|| local.title.clone()),
            url: self
                .url
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| local.url.clone()),
            duration: self.duration.unwrap_or(local.duration),
            start_time: self.start_time.unwrap_or(local.start_time),
            end_time: self.end_time.unwrap_or(local.end_time),
            file_size: self.file_size.unwrap_or(local.file_size),
            mime_type: self.mime_type.unwrap_or_else(|| local.mime_type.clone()),
            platform: self.platform.or(local.platform),
            is_local: false,
            needs_sync: false,
            payload: None,
        }
    }

    /// Convert a listing entry that has no local counterpart
    pub fn into_listed_record(self) -> RecordingRecord {
        let start_time = self.start_time.unwrap_or_else(Utc::now);
        RecordingRecord {
            id: self.id,
            title: self.title.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            duration: self.duration.unwrap_or(0),
            start_time,
            end_time: self.end_time.unwrap_or(start_time),
            file_size: self.file_size.unwrap_or(0),
            mime_type: self.mime_type.unwrap_or_default(),
            platform: self.platform,
            is_local: false,
            needs_sync: false,
            payload: None,
        }
    }
}

/// Operations the coordinator needs from the remote store
#[async_trait::async_trait]
pub trait RemoteApi: Send + Sync {
    async fn upload(
        &self,
        payload: &[u8],
        metadata: &RecordingMetadata,
    ) -> Result<RemoteRecording, ApiError>;

    async fn list(&self) -> Result<Vec<RemoteRecording>, ApiError>;

    async fn delete(&self, id: &str) -> Result<(), ApiError>;

    /// Exchange credentials for a bearer token
    async fn login(&self, email: &str, password: &str) -> Result<String, ApiError>;

    async fn logout(&self) -> Result<(), ApiError>;

    /// Install (or clear) the bearer token used for subsequent calls
    fn set_token(&self, token: Option<String>);
}
