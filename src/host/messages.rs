//! Envelopes exchanged with the extension over the native port
//!
//! Every frame carries a `kind`. Requests come from observers and are
//! answered with a `response` addressed to the same target; capture frames
//! come from the offscreen document.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::capture::{CaptureCommand, CaptureEvent, MediaArtifact};
use crate::coordinator::{CoordinatorEvent, Request, Response};

/// Frames sent by the extension
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Inbound {
    #[serde(rename_all = "camelCase")]
    Request {
        request_id: String,
        /// Sender of the request (e.g. `tab:42`, `popup`)
        #[serde(default)]
        target: Option<String>,
        request: Request,
    },
    Capture {
        event: CaptureMessage,
    },
}

/// Messages from the capture surface
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CaptureMessage {
    /// Acknowledges `capturePrepare`
    CaptureReady,
    CaptureStarted,
    CaptureError {
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    RecordingComplete {
        /// Base64-encoded media
        artifact: String,
        mime_type: String,
        #[serde(default)]
        size: Option<u64>,
    },
    RecordingError {
        error: String,
    },
}

impl CaptureMessage {
    /// Convert to a coordinator event. `CaptureReady` is consumed by the
    /// host itself and yields `None`.
    pub fn into_event(self) -> Option<CaptureEvent> {
        match self {
            CaptureMessage::CaptureReady => None,
            CaptureMessage::CaptureStarted => Some(CaptureEvent::Started),
            CaptureMessage::CaptureError { error } => Some(CaptureEvent::CaptureError(error)),
            CaptureMessage::RecordingError { error } => Some(CaptureEvent::RecordingError(error)),
            CaptureMessage::RecordingComplete {
                artifact,
                mime_type,
                size,
            } => match STANDARD.decode(artifact.as_bytes()) {
                Ok(data) => {
                    let size = size.unwrap_or(data.len() as u64);
                    Some(CaptureEvent::Complete(MediaArtifact {
                        data,
                        mime_type,
                        size,
                    }))
                }
                Err(e) => {
                    warn!("Recording artifact is not valid base64: {}", e);
                    Some(CaptureEvent::RecordingError(format!(
                        "recording data could not be decoded: {}",
                        e
                    )))
                }
            },
        }
    }
}

/// Frames sent to the extension
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Outbound {
    #[serde(rename_all = "camelCase")]
    Response {
        request_id: String,
        target: String,
        response: Response,
    },
    Broadcast {
        target: String,
        event: CoordinatorEvent,
    },
    /// Ask the extension to (re)create the offscreen document
    CapturePrepare,
    Capture {
        message: CaptureCommand,
    },
    Notification {
        id: String,
        title: String,
        message: String,
    },
}
