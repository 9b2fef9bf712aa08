//! User-facing notifications
//!
//! One notification per terminal outcome of a recording. The extension
//! turns these into system notifications; here we only decide what to say.

use tracing::{debug, warn};

use crate::host::{Outbound, PortSender};

/// Terminal outcomes the user is told about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Uploaded to the recordings service
    RecordingSaved { title: String },
    /// Upload skipped or failed; kept on this device until the next sync
    SavedLocally { title: String },
    /// Capture failed or the recording could not be stored anywhere
    RecordingError { error: String },
}

impl Notification {
    /// Stable identifier, also used by the extension to pick an icon
    pub fn id(&self) -> &'static str {
        match self {
            Notification::RecordingSaved { .. } => "recordingSaved",
            Notification::SavedLocally { .. } => "savedLocally",
            Notification::RecordingError { .. } => "recordingError",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Notification::RecordingSaved { .. } => "Recording saved",
            Notification::SavedLocally { .. } => "Recording saved locally",
            Notification::RecordingError { .. } => "Recording failed",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notification::RecordingSaved { title } => {
                format!("\"{}\" was uploaded.", title)
            }
            Notification::SavedLocally { title } => format!(
                "\"{}\" could not be uploaded and will sync later.",
                title
            ),
            Notification::RecordingError { error } => error.clone(),
        }
    }
}

/// Sink for user notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Shows notifications through the extension
pub struct PortNotifier {
    port: PortSender,
}

impl PortNotifier {
    pub fn new(port: PortSender) -> Self {
        Self { port }
    }
}

impl Notifier for PortNotifier {
    fn notify(&self, notification: Notification) {
        let frame = Outbound::Notification {
            id: notification.id().to_string(),
            title: notification.title().to_string(),
            message: notification.message(),
        };

        match self.port.send(frame) {
            Ok(()) => debug!("Showed {} notification", notification.id()),
            Err(e) => warn!("Failed to show {} notification: {}", notification.id(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_notifier_sends_frame() {
        let (port, mut rx) = PortSender::channel();
        let notifier = PortNotifier::new(port);

        notifier.notify(Notification::SavedLocally {
            title: "Standup".to_string(),
        });

        match rx.try_recv().unwrap() {
            Outbound::Notification { id, title, message } => {
                assert_eq!(id, "savedLocally");
                assert_eq!(title, "Recording saved locally");
                assert!(message.contains("Standup"));
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_notify_on_closed_port_is_harmless() {
        let (port, rx) = PortSender::channel();
        drop(rx);
        PortNotifier::new(port).notify(Notification::RecordingError {
            error: "Permission denied".to_string(),
        });
    }
}
