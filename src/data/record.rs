//! Persisted recording records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::meeting::Platform;

/// Prefix of ids assigned on-device before the server issues one
pub const LOCAL_ID_PREFIX: &str = "local_";

/// A finished recording, either synced to the remote store or pending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRecord {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub url: String,

    /// Effective duration in seconds (paused time excluded)
    #[serde(default)]
    pub duration: u64,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    /// Size of the media in bytes
    #[serde(default)]
    pub file_size: u64,

    #[serde(default)]
    pub mime_type: String,

    #[serde(default)]
    pub platform: Option<Platform>,

    /// True while the recording only exists on this device
    #[serde(default)]
    pub is_local: bool,

    /// True until an upload of this recording has succeeded
    #[serde(default)]
    pub needs_sync: bool,

    /// Encoded media, kept only while the record is local
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "payload_base64"
    )]
    pub payload: Option<Vec<u8>>,
}

/// Metadata sent alongside the media when uploading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub title: String,
    pub url: String,
    pub duration: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub file_size: u64,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl RecordingRecord {
    /// Local id for a recording finalized at `millis` (Unix epoch ms)
    pub fn local_id(millis: i64) -> String {
        format!("{}{}", LOCAL_ID_PREFIX, millis)
    }

    #[cfg(test)]
    pub fn has_local_id(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn metadata(&self) -> RecordingMetadata {
        RecordingMetadata {
            title: self.title.clone(),
            url: self.url.clone(),
            duration: self.duration,
            start_time: self.start_time,
            end_time: self.end_time,
            file_size: self.file_size,
            mime_type: self.mime_type.clone(),
            platform: self.platform,
        }
    }

    /// Copy without the media payload, for listings and broadcasts
    pub fn summary(&self) -> Self {
        Self {
            payload: None,
            ..self.clone()
        }
    }

    /// Mark the record as synced: drop the payload and adopt the server's
    /// identity. The payload is released in the same step the flags flip.
    pub fn mark_synced(&mut self, server_id: String, server_url: Option<String>) {
        self.payload = None;
        self.needs_sync = false;
        self.is_local = false;
        self.id = server_id;
        if let Some(url) = server_url.filter(|url| !url.is_empty()) {
            self.url = url;
        }
    }

    /// A synced record never carries a payload
    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        self.needs_sync || self.payload.is_none()
    }
}

mod payload_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(payload: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match payload {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
