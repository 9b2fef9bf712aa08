//! Native messaging host
//!
//! The browser launches this process and talks to it over stdin/stdout.
//! Requests from observers are answered on their own tasks so a slow
//! upload never holds up a status query; capture events are forwarded, in
//! arrival order, to the coordinator's event task.

mod codec;
mod messages;
mod port;

pub use codec::{CodecError, NativeMessageCodec, DEFAULT_MAX_INBOUND_BYTES};
pub use messages::{CaptureMessage, Inbound, Outbound};
pub use port::{run_writer, PortObserver, PortSender};

use futures::StreamExt;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureEvent, OffscreenCapture};
use crate::coordinator::{Coordinator, Response};

/// Commands that can be sent to the host loop
#[derive(Debug, Clone)]
pub enum HostCommand {
    /// Stop reading from the port and return
    Shutdown,
}

pub fn create_host_channels() -> (mpsc::Sender<HostCommand>, mpsc::Receiver<HostCommand>) {
    mpsc::channel(8)
}

pub struct NativeHost {
    coordinator: Arc<Coordinator>,
    capture: Arc<OffscreenCapture>,
    port: PortSender,
    capture_tx: mpsc::UnboundedSender<CaptureEvent>,
    max_inbound: usize,
}

impl NativeHost {
    pub fn new(
        coordinator: Arc<Coordinator>,
        capture: Arc<OffscreenCapture>,
        port: PortSender,
        capture_tx: mpsc::UnboundedSender<CaptureEvent>,
        max_inbound: usize,
    ) -> Self {
        Self {
            coordinator,
            capture,
            port,
            capture_tx,
            max_inbound,
        }
    }

    /// Read frames until the browser closes the port or shutdown is requested
    pub async fn run<R>(
        &self,
        reader: R,
        mut commands: mpsc::Receiver<HostCommand>,
    ) -> Result<(), CodecError>
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FramedRead::new(reader, NativeMessageCodec::new(self.max_inbound));
        info!("Native host listening");

        loop {
            tokio::select! {
                frame = frames.next() => {
                    match frame {
                        Some(Ok(Ok(value))) => self.handle_frame(value),
                        Some(Ok(Err(e))) => warn!("Ignoring frame that is not JSON: {}", e),
                        Some(Err(e)) => {
                            error!("Native port read failed: {}", e);
                            return Err(e);
                        }
                        None => {
                            info!("Browser closed the native port");
                            break;
                        }
                    }
                }

                Some(command) = commands.recv() => {
                    match command {
                        HostCommand::Shutdown => {
                            info!("Shutdown requested");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn handle_frame(&self, value: serde_json::Value) {
        let inbound = match serde_json::from_value::<Inbound>(value.clone()) {
            Ok(inbound) => inbound,
            Err(e) => {
                self.reject(&value, &e.to_string());
                return;
            }
        };

        match inbound {
            Inbound::Request {
                request_id,
                target,
                request,
            } => {
                let target =
                    target.unwrap_or_else(|| format!("anonymous:{}", uuid::Uuid::new_v4()));
                let coordinator = self.coordinator.clone();
                let port = self.port.clone();
                let origin = Arc::new(PortObserver::new(target.clone(), port.clone()));

                tokio::spawn(async move {
                    let response = coordinator.handle_request(request, origin).await;
                    let reply = Outbound::Response {
                        request_id,
                        target,
                        response,
                    };
                    if port.send(reply).is_err() {
                        debug!("Port closed before a response could be sent");
                    }
                });
            }
            Inbound::Capture { event } => {
                if matches!(event, CaptureMessage::CaptureReady) {
                    self.capture.mark_ready();
                    return;
                }
                if let Some(event) = event.into_event() {
                    if self.capture_tx.send(event).is_err() {
                        error!("Coordinator event task is gone, dropping capture event");
                    }
                }
            }
        }
    }

    /// Answer a malformed or unknown request so the caller is not left
    /// waiting; anything else is only logged.
    fn reject(&self, value: &serde_json::Value, reason: &str) {
        let request_id = value.get("requestId").and_then(|id| match id {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        let Some(request_id) = request_id else {
            warn!("Ignoring unrecognized frame: {}", reason);
            return;
        };

        warn!("Rejecting unsupported request {}: {}", request_id, reason);
        let target = value
            .get("target")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();
        let reply = Outbound::Response {
            request_id,
            target,
            response: Response::Failure {
                success: false,
                error: format!("unsupported request: {}", reason),
                code: "unsupportedRequest".to_string(),
            },
        };
        if self.port.send(reply).is_err() {
            debug!("Port closed before a rejection could be sent");
        }
    }
}
