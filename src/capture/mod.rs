//! Capture surface contract
//!
//! The capture surface is the isolated context that owns the browser's
//! screen/audio capture primitive (the extension's offscreen document).
//! The coordinator only talks to it through this contract: commands go out,
//! events come back on a separate channel.

mod offscreen;

pub use offscreen::OffscreenCapture;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Video quality presets understood by the capture surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Low,
    Medium,
    #[default]
    High,
}

/// Audio quality presets understood by the capture surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    Medium,
    #[default]
    High,
}

/// Capture configuration chosen at start; fixed for the session's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOptions {
    #[serde(default = "default_true")]
    pub include_screen: bool,

    #[serde(default = "default_true")]
    pub include_audio: bool,

    #[serde(default)]
    pub include_system_audio: bool,

    #[serde(default)]
    pub video_quality: VideoQuality,

    #[serde(default)]
    pub audio_quality: AudioQuality,
}

fn default_true() -> bool {
    true
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            include_screen: true,
            include_audio: true,
            include_system_audio: false,
            video_quality: VideoQuality::default(),
            audio_quality: AudioQuality::default(),
        }
    }
}

impl CaptureOptions {
    /// At least one of screen or microphone must be selected
    pub fn has_source(&self) -> bool {
        self.include_screen || self.include_audio
    }
}

/// Commands sent from the coordinator to the capture surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum CaptureCommand {
    Start { options: CaptureOptions },
    Pause,
    Resume,
    Stop,
}

impl CaptureCommand {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureCommand::Start { .. } => "start",
            CaptureCommand::Pause => "pause",
            CaptureCommand::Resume => "resume",
            CaptureCommand::Stop => "stop",
        }
    }
}

/// Encoded media produced by the capture surface when a recording ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaArtifact {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub size: u64,
}

/// Events emitted by the capture surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Capture hardware is live
    Started,
    /// Capture could not start (e.g. permission denied)
    CaptureError(String),
    /// Recording finished and the artifact is ready
    Complete(MediaArtifact),
    /// Recording failed after it was running
    RecordingError(String),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture surface did not become ready within {0} ms")]
    ReadyTimeout(u64),

    #[error("capture surface is unreachable: {0}")]
    Unreachable(String),
}

/// The coordinator's view of the capture surface
///
/// `prepare` establishes (or re-establishes) the capture context and must
/// succeed before a start command is issued. The context may be torn down
/// between calls, so every method can fail.
#[async_trait::async_trait]
pub trait CaptureSurface: Send + Sync {
    async fn prepare(&self) -> Result<(), CaptureError>;

    async fn send(&self, command: CaptureCommand) -> Result<(), CaptureError>;
}
