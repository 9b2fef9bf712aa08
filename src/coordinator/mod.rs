//! Recording lifecycle coordinator
//!
//! Owns the one authoritative recording session. Observers send requests,
//! the capture surface sends events, and the coordinator answers both by
//! driving the capture surface, persisting finished recordings and
//! broadcasting state changes.

mod controller;
mod dispatch;
mod observers;
mod session;

pub use controller::Coordinator;
pub use observers::{Observer, ObserverError};
pub use session::{Clock, SystemClock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::{AudioQuality, CaptureError, CaptureOptions, VideoQuality};
use crate::data::{MeetingInfo, RecordingRecord, Settings, TabContext};
use crate::storage::StoreError;
use crate::upload::ApiError;

/// Requests observers can send to the coordinator
///
/// Every message kind is a variant here; dispatch matches exhaustively so
/// a new kind cannot silently fall through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    Start {
        #[serde(default)]
        options: StartOptions,
        #[serde(default)]
        tab: Option<TabContext>,
    },
    Pause,
    Resume,
    Stop {
        #[serde(default)]
        tab: Option<TabContext>,
    },
    GetStatus,
    SyncPending,
    Subscribe,
    Unsubscribe,
    UpdateContext {
        tab: TabContext,
    },
    ListRecordings,
    DeleteRecording {
        id: String,
    },
    RefreshRecordings,
    Login {
        email: String,
        password: String,
    },
    Logout,
    GetSettings,
    UpdateSettings {
        settings: Settings,
    },
    DetectMeeting {
        url: String,
    },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Start { .. } => "start",
            Request::Pause => "pause",
            Request::Resume => "resume",
            Request::Stop { .. } => "stop",
            Request::GetStatus => "getStatus",
            Request::SyncPending => "syncPending",
            Request::Subscribe => "subscribe",
            Request::Unsubscribe => "unsubscribe",
            Request::UpdateContext { .. } => "updateContext",
            Request::ListRecordings => "listRecordings",
            Request::DeleteRecording { .. } => "deleteRecording",
            Request::RefreshRecordings => "refreshRecordings",
            Request::Login { .. } => "login",
            Request::Logout => "logout",
            Request::GetSettings => "getSettings",
            Request::UpdateSettings { .. } => "updateSettings",
            Request::DetectMeeting { .. } => "detectMeeting",
        }
    }
}

/// Capture options as requested. Qualities left out fall back to the
/// stored settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    #[serde(default = "default_true")]
    pub include_screen: bool,
    #[serde(default = "default_true")]
    pub include_audio: bool,
    #[serde(default)]
    pub include_system_audio: bool,
    #[serde(default)]
    pub video_quality: Option<VideoQuality>,
    #[serde(default)]
    pub audio_quality: Option<AudioQuality>,
}

fn default_true() -> bool {
    true
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            include_screen: true,
            include_audio: true,
            include_system_audio: false,
            video_quality: None,
            audio_quality: None,
        }
    }
}

impl StartOptions {
    pub fn resolve(self, settings: &Settings) -> CaptureOptions {
        CaptureOptions {
            include_screen: self.include_screen,
            include_audio: self.include_audio,
            include_system_audio: self.include_system_audio,
            video_quality: self.video_quality.unwrap_or(settings.video_quality),
            audio_quality: self.audio_quality.unwrap_or(settings.audio_quality),
        }
    }
}

/// Point-in-time view of the session, as returned by `getStatus`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub is_recording: bool,
    pub is_paused: bool,
    pub start_time: Option<DateTime<Utc>>,
    /// Effective recorded seconds, excluding paused time
    pub duration: u64,
}

/// Replies to requests
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    #[serde(rename_all = "camelCase")]
    Started {
        success: bool,
        start_time: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Synced { success: bool, synced: usize },
    #[serde(rename_all = "camelCase")]
    Recordings {
        success: bool,
        recordings: Vec<RecordingRecord>,
        local_recordings: Vec<RecordingRecord>,
    },
    #[serde(rename_all = "camelCase")]
    Settings { success: bool, settings: Settings },
    #[serde(rename_all = "camelCase")]
    Meeting {
        success: bool,
        meeting: Option<MeetingInfo>,
    },
    #[serde(rename_all = "camelCase")]
    Failure {
        success: bool,
        error: String,
        code: String,
    },
    Status(StatusSnapshot),
    #[serde(rename_all = "camelCase")]
    Ack { success: bool },
}

impl Response {
    pub fn ack() -> Self {
        Response::Ack { success: true }
    }

    pub fn failure(err: &CoordinatorError) -> Self {
        Response::Failure {
            success: false,
            error: err.to_string(),
            code: err.code().to_string(),
        }
    }

    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        match self {
            Response::Started { success, .. }
            | Response::Synced { success, .. }
            | Response::Recordings { success, .. }
            | Response::Settings { success, .. }
            | Response::Meeting { success, .. }
            | Response::Failure { success, .. }
            | Response::Ack { success } => *success,
            Response::Status(_) => true,
        }
    }
}

/// State changes broadcast to every observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CoordinatorEvent {
    #[serde(rename_all = "camelCase")]
    Started { start_time: DateTime<Utc> },
    Paused,
    Resumed,
    Stopped,
    /// Capture failed; the session is back to idle without a recording
    Failed { error: String },
    /// A finished recording is available (independent of `Stopped`)
    RecordingSaved { record: RecordingRecord },
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("select at least one capture source (screen or audio)")]
    InvalidOptions,

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no active recording")]
    NoActiveRecording,

    #[error("recording is not paused")]
    NotPaused,

    #[error("recording is already paused")]
    AlreadyPaused,

    #[error("capture is still starting")]
    CaptureStarting,

    #[error("recording was stopped before capture started")]
    StartCancelled,

    #[error("capture unavailable: {0}")]
    CaptureUnavailable(#[from] CaptureError),

    #[error("upload failed: {0}")]
    UploadFailure(#[from] ApiError),

    #[error("storage failure: {0}")]
    PersistenceFailure(#[from] StoreError),

    #[error("recording {0} not found")]
    RecordingNotFound(String),
}

impl CoordinatorError {
    /// Stable identifier sent to observers alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::InvalidOptions => "invalidOptions",
            CoordinatorError::AlreadyRecording => "alreadyRecording",
            CoordinatorError::NoActiveRecording => "noActiveRecording",
            CoordinatorError::NotPaused => "notPaused",
            CoordinatorError::AlreadyPaused => "alreadyPaused",
            CoordinatorError::CaptureStarting => "captureStarting",
            CoordinatorError::StartCancelled => "startCancelled",
            CoordinatorError::CaptureUnavailable(_) => "captureUnavailable",
            CoordinatorError::UploadFailure(_) => "uploadFailure",
            CoordinatorError::PersistenceFailure(_) => "persistenceFailure",
            CoordinatorError::RecordingNotFound(_) => "recordingNotFound",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parsing() {
        let req: Request = serde_json::from_str(
            r#"{"type":"start","options":{"includeScreen":true,"includeAudio":false}}"#,
        )
        .unwrap();
        match req {
            Request::Start { options, tab } => {
                assert!(options.include_screen);
                assert!(!options.include_audio);
                assert!(tab.is_none());
            }
            other => panic!("unexpected request {:?}", other),
        }

        let req: Request = serde_json::from_str(r#"{"type":"getStatus"}"#).unwrap();
        assert_eq!(req, Request::GetStatus);
        assert_eq!(req.name(), "getStatus");
    }

    #[test]
    fn test_start_options_fall_back_to_settings() {
        let settings = Settings {
            video_quality: VideoQuality::Low,
            audio_quality: AudioQuality::Medium,
            auto_upload: true,
        };
        let requested = StartOptions {
            audio_quality: Some(AudioQuality::High),
            ..StartOptions::default()
        };

        let options = requested.resolve(&settings);
        assert_eq!(options.video_quality, VideoQuality::Low);
        assert_eq!(options.audio_quality, AudioQuality::High);
        assert!(options.include_screen);
    }

    #[test]
    fn test_unknown_request_is_rejected() {
        let result = serde_json::from_str::<Request>(r#"{"type":"toggleEverything"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_response_shapes() {
        let json = serde_json::to_value(Response::ack()).unwrap();
        assert_eq!(json, serde_json::json!({"success": true}));

        let json = serde_json::to_value(Response::failure(&CoordinatorError::AlreadyRecording))
            .unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "alreadyRecording");

        let json = serde_json::to_value(Response::Synced {
            success: true,
            synced: 3,
        })
        .unwrap();
        assert_eq!(json["synced"], 3);

        let json = serde_json::to_value(Response::Status(StatusSnapshot {
            is_recording: true,
            is_paused: false,
            start_time: None,
            duration: 12,
        }))
        .unwrap();
        assert_eq!(json["isRecording"], true);
        assert_eq!(json["duration"], 12);
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(CoordinatorEvent::Paused).unwrap();
        assert_eq!(json["type"], "paused");

        let json = serde_json::to_value(CoordinatorEvent::Failed {
            error: "permission denied".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["error"], "permission denied");
    }
}
