//! Request routing
//!
//! Maps every request kind to a coordinator operation and shapes the reply.
//! Errors never escape as anything but a failure response.

use std::sync::Arc;
use tracing::{debug, warn};

use super::controller::Coordinator;
use super::observers::Observer;
use super::{CoordinatorError, Request, Response};
use crate::data::Settings;

impl Coordinator {
    /// Handle one request from `origin`. Any context that talks to the
    /// coordinator is subscribed to broadcasts until it unsubscribes.
    pub async fn handle_request(&self, request: Request, origin: Arc<dyn Observer>) -> Response {
        let name = request.name();
        debug!("Handling {} from {}", name, origin.id());

        if !matches!(request, Request::Unsubscribe) && !self.observers().contains(origin.id()) {
            self.observers().register(origin.clone());
        }

        let result = match request {
            Request::Start { options, tab } => {
                let settings = self.settings().await.unwrap_or_else(|e| {
                    warn!("Using default capture quality, settings unreadable: {}", e);
                    Settings::default()
                });
                self.start(options.resolve(&settings), tab)
                    .await
                    .map(|start_time| Response::Started {
                        success: true,
                        start_time,
                    })
            }
            Request::Pause => self.pause().await.map(|_| Response::ack()),
            Request::Resume => self.resume().await.map(|_| Response::ack()),
            Request::Stop { tab } => self.stop(tab).await.map(|_| Response::ack()),
            Request::GetStatus => Ok(Response::Status(self.status())),
            Request::SyncPending => self.sync_pending().await.map(|report| Response::Synced {
                success: true,
                synced: report.synced,
            }),
            Request::Subscribe => Ok(Response::ack()),
            Request::Unsubscribe => {
                self.observers().remove(origin.id());
                Ok(Response::ack())
            }
            Request::UpdateContext { tab } => {
                self.update_context(tab);
                Ok(Response::ack())
            }
            Request::ListRecordings => {
                self.recordings()
                    .await
                    .map(|(recordings, local_recordings)| Response::Recordings {
                        success: true,
                        recordings,
                        local_recordings,
                    })
            }
            Request::DeleteRecording { id } => {
                self.delete_recording(&id).await.map(|_| Response::ack())
            }
            Request::RefreshRecordings => {
                self.refresh_recordings()
                    .await
                    .map(|(recordings, local_recordings)| Response::Recordings {
                        success: true,
                        recordings,
                        local_recordings,
                    })
            }
            Request::Login { email, password } => {
                self.login(&email, &password).await.map(|_| Response::ack())
            }
            Request::Logout => self.logout().await.map(|_| Response::ack()),
            Request::GetSettings => self.settings().await.map(|settings| Response::Settings {
                success: true,
                settings,
            }),
            Request::UpdateSettings { settings } => {
                self.update_settings(settings).await.map(|_| Response::ack())
            }
            Request::DetectMeeting { url } => Ok(Response::Meeting {
                success: true,
                meeting: self.detect_meeting(&url),
            }),
        };

        result.unwrap_or_else(|e| {
            if is_guard_error(&e) {
                debug!("Rejected {}: {}", name, e);
            } else {
                warn!("{} failed: {}", name, e);
            }
            Response::failure(&e)
        })
    }
}

/// Validation and guard violations only concern the requester
fn is_guard_error(err: &CoordinatorError) -> bool {
    matches!(
        err,
        CoordinatorError::InvalidOptions
            | CoordinatorError::AlreadyRecording
            | CoordinatorError::NoActiveRecording
            | CoordinatorError::NotPaused
            | CoordinatorError::AlreadyPaused
            | CoordinatorError::CaptureStarting
            | CoordinatorError::StartCancelled
            | CoordinatorError::RecordingNotFound(_)
    )
}
