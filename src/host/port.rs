//! Outbound side of the native port
//!
//! Everything the host says goes through one channel drained by a single
//! writer task, so frames never interleave and each target sees its
//! messages in send order.

use futures::SinkExt;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tracing::{debug, error, warn};

use super::codec::{CodecError, NativeMessageCodec};
use super::messages::Outbound;
use crate::coordinator::{CoordinatorEvent, Observer, ObserverError};

#[derive(Debug, Error)]
#[error("native port is closed")]
pub struct PortClosed;

/// Cloneable handle for queueing outbound frames
#[derive(Debug, Clone)]
pub struct PortSender {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl PortSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, message: Outbound) -> Result<(), PortClosed> {
        self.tx.send(message).map_err(|_| PortClosed)
    }
}

/// Drain queued frames into `writer` until every sender is dropped
pub async fn run_writer<W>(
    writer: W,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, NativeMessageCodec::default());

    while let Some(message) = rx.recv().await {
        match sink.send(message).await {
            Ok(()) => {}
            Err(CodecError::OutboundTooLarge { size, limit }) => {
                // Only this frame is lost; the port stays usable
                error!("Dropped outbound frame of {} bytes (limit {})", size, limit);
            }
            Err(e) => {
                error!("Native port write failed: {}", e);
                return Err(e);
            }
        }
    }

    debug!("Port writer finished");
    Ok(())
}

/// An extension context (tab, popup, dashboard) reached through the port
pub struct PortObserver {
    id: String,
    port: PortSender,
}

impl PortObserver {
    pub fn new(id: impl Into<String>, port: PortSender) -> Self {
        Self {
            id: id.into(),
            port,
        }
    }
}

#[async_trait::async_trait]
impl Observer for PortObserver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, event: &CoordinatorEvent) -> Result<(), ObserverError> {
        self.port
            .send(Outbound::Broadcast {
                target: self.id.clone(),
                event: event.clone(),
            })
            .map_err(|_| {
                warn!("Port closed while broadcasting to {}", self.id);
                ObserverError::Disconnected(self.id.clone())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use tokio::io::AsyncReadExt;
    use tokio_util::codec::Decoder;

    #[tokio::test]
    async fn test_writer_frames_messages_in_order() {
        let (port, rx) = PortSender::channel();
        let (client, mut server) = tokio::io::duplex(64 * 1024);

        port.send(Outbound::CapturePrepare).unwrap();
        port.send(Outbound::Broadcast {
            target: "popup".to_string(),
            event: CoordinatorEvent::Paused,
        })
        .unwrap();
        drop(port);

        run_writer(client, rx).await.unwrap();

        let mut raw = Vec::new();
        server.read_to_end(&mut raw).await.unwrap();
        let mut buf = BytesMut::from(&raw[..]);
        let mut codec = NativeMessageCodec::default();

        let first = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(first["kind"], "capturePrepare");
        assert_eq!(second["kind"], "broadcast");
        assert_eq!(second["event"]["type"], "paused");
    }

    #[tokio::test]
    async fn test_observer_reports_closed_port() {
        let (port, rx) = PortSender::channel();
        let observer = PortObserver::new("tab:3", port);
        drop(rx);

        let err = observer.deliver(&CoordinatorEvent::Stopped).await.unwrap_err();
        assert!(matches!(err, ObserverError::Disconnected(id) if id == "tab:3"));
    }
}
