//! User preferences and remote API credentials

use serde::{Deserialize, Serialize};

use crate::capture::{AudioQuality, VideoQuality};

/// Preferences stored under the `settings` key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub video_quality: VideoQuality,

    #[serde(default)]
    pub audio_quality: AudioQuality,

    /// Upload finished recordings right away; when off they are kept
    /// locally until the next sync
    #[serde(default = "default_true")]
    pub auto_upload: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            video_quality: VideoQuality::default(),
            audio_quality: AudioQuality::default(),
            auto_upload: true,
        }
    }
}

/// Remote API access stored under the `apiConfig` key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCredentials {
    /// Overrides the configured base URL when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert!(settings.auto_upload);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_credentials_omit_empty_fields() {
        let json = serde_json::to_value(ApiCredentials::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
