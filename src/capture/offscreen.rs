//! Capture surface living in the extension's offscreen document
//!
//! Commands are forwarded over the native port. `prepare` asks the
//! extension to (re)create the document and waits for its `captureReady`
//! acknowledgement, so a start is never sent into a torn-down context.

use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{CaptureCommand, CaptureError, CaptureSurface};
use crate::host::{Outbound, PortSender};

pub struct OffscreenCapture {
    port: PortSender,
    ready: Mutex<Option<oneshot::Sender<()>>>,
    ready_timeout: Duration,
}

impl OffscreenCapture {
    pub fn new(port: PortSender, ready_timeout: Duration) -> Self {
        Self {
            port,
            ready: Mutex::new(None),
            ready_timeout,
        }
    }

    /// Deliver the readiness ack. Returns false if nobody was waiting.
    pub fn mark_ready(&self) -> bool {
        let waiter = match self.ready.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match waiter {
            Some(tx) => tx.send(()).is_ok(),
            None => {
                debug!("Ignoring captureReady with no prepare in flight");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl CaptureSurface for OffscreenCapture {
    async fn prepare(&self) -> Result<(), CaptureError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut guard = match self.ready.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // A newer prepare supersedes an older one
            *guard = Some(tx);
        }

        self.port
            .send(Outbound::CapturePrepare)
            .map_err(|e| CaptureError::Unreachable(e.to_string()))?;

        match tokio::time::timeout(self.ready_timeout, rx).await {
            Ok(Ok(())) => {
                info!("Offscreen capture document is ready");
                Ok(())
            }
            Ok(Err(_)) => Err(CaptureError::Unreachable(
                "prepare was superseded".to_string(),
            )),
            Err(_) => {
                warn!(
                    "Offscreen document did not answer within {:?}",
                    self.ready_timeout
                );
                Err(CaptureError::ReadyTimeout(
                    self.ready_timeout.as_millis() as u64
                ))
            }
        }
    }

    async fn send(&self, command: CaptureCommand) -> Result<(), CaptureError> {
        debug!("Sending capture command: {}", command.name());
        self.port
            .send(Outbound::Capture { message: command })
            .map_err(|e| CaptureError::Unreachable(e.to_string()))
    }
}
