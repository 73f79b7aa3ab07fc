//! Connected client records and the transport seam

use crate::constants::close_codes;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub type ClientId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SocketError {
    /// The connection is gone; the client should be dropped
    #[error("socket closed")]
    Closed,
    /// The outbound buffer is full; this frame is dropped
    #[error("outbound buffer full")]
    Backpressure,
}

/// Outbound half of one client connection
///
/// Sends are synchronous and must not block: implementations queue the frame
/// and report whether it was accepted.
pub trait ClientSocket: Send + Sync {
    fn send_text(&self, text: String) -> Result<(), SocketError>;

    fn send_ping(&self) -> Result<(), SocketError>;

    /// Ask the transport to close with a WebSocket close code
    fn close(&self, code: u16, reason: &str);

    fn is_open(&self) -> bool {
        true
    }
}

/// Frames handed to a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Ping,
    Close(u16, String),
}

/// [`ClientSocket`] backed by a bounded channel to a writer task
///
/// Closing never needs buffer space: the requested close frame is parked and
/// the connection's token is cancelled, which ends both the writer and the
/// read loop.
#[derive(Debug, Clone)]
pub struct ChannelSocket {
    sender: mpsc::Sender<OutboundFrame>,
    close_frame: Arc<Mutex<Option<(u16, String)>>>,
    closed: CancellationToken,
}

impl ChannelSocket {
    /// Socket plus the receiving end for the writer
    pub fn channel(buffer: usize) -> (Self, OutboundReceiver) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let close_frame = Arc::new(Mutex::new(None));
        let closed = CancellationToken::new();
        let socket = Self {
            sender,
            close_frame: Arc::clone(&close_frame),
            closed: closed.clone(),
        };
        let receiver = OutboundReceiver {
            receiver,
            close_frame,
            closed,
            finished: false,
        };
        (socket, receiver)
    }

    fn try_send(&self, frame: OutboundFrame) -> Result<(), SocketError> {
        if self.closed.is_cancelled() {
            return Err(SocketError::Closed);
        }
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SocketError::Backpressure,
            TrySendError::Closed(_) => SocketError::Closed,
        })
    }
}

impl ClientSocket for ChannelSocket {
    fn send_text(&self, text: String) -> Result<(), SocketError> {
        self.try_send(OutboundFrame::Text(text))
    }

    fn send_ping(&self) -> Result<(), SocketError> {
        self.try_send(OutboundFrame::Ping)
    }

    fn close(&self, code: u16, reason: &str) {
        {
            let mut frame = self.close_frame.lock();
            if frame.is_none() {
                *frame = Some((code, reason.to_string()));
            }
        }
        self.closed.cancel();
    }

    fn is_open(&self) -> bool {
        !self.closed.is_cancelled() && !self.sender.is_closed()
    }
}

/// Writer side of a [`ChannelSocket`]
#[derive(Debug)]
pub struct OutboundReceiver {
    receiver: mpsc::Receiver<OutboundFrame>,
    close_frame: Arc<Mutex<Option<(u16, String)>>>,
    closed: CancellationToken,
    finished: bool,
}

impl OutboundReceiver {
    /// Next frame to write
    ///
    /// Once the socket is closed this yields a single `Close` frame, skipping
    /// anything still buffered, and then `None`.
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        if self.finished {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => {
                self.finished = true;
                let (code, reason) = self.close_frame.lock().take().unwrap_or_else(|| {
                    (close_codes::GOING_AWAY, close_codes::REMOVED_REASON.to_string())
                });
                Some(OutboundFrame::Close(code, reason))
            }
            frame = self.receiver.recv() => frame,
        }
    }

    /// Cancelled when the manager closes this connection
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

/// Registry record for one connection; owned by the broadcast manager
pub(crate) struct ClientEntry {
    pub(crate) socket: Arc<dyn ClientSocket>,
    pub(crate) connected_at: chrono::DateTime<chrono::Utc>,
    pub(crate) last_message_time: Option<Instant>,
    pub(crate) last_heartbeat: Instant,
}

/// Read-only view of a client for diagnostics
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub id: ClientId,
    pub connected_at: chrono::DateTime<chrono::Utc>,
    pub last_message_time: Option<Instant>,
    pub last_heartbeat: Instant,
    pub is_alive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_socket_reports_backpressure_and_close() {
        let (socket, mut receiver) = ChannelSocket::channel(1);

        assert!(socket.send_text("a".into()).is_ok());
        assert_eq!(socket.send_ping(), Err(SocketError::Backpressure));
        assert_eq!(receiver.recv().await, Some(OutboundFrame::Text("a".into())));

        drop(receiver);
        assert!(!socket.is_open());
        assert_eq!(socket.send_text("b".into()), Err(SocketError::Closed));
    }

    #[tokio::test]
    async fn test_close_reaches_writer_even_with_full_buffer() {
        let (socket, mut receiver) = ChannelSocket::channel(1);
        let token = receiver.closed_token();
        socket.send_text("a".into()).unwrap();

        socket.close(close_codes::GOING_AWAY, "Heartbeat timeout");
        socket.close(close_codes::NORMAL, "ignored");

        assert!(token.is_cancelled());
        assert!(!socket.is_open());
        assert_eq!(socket.send_ping(), Err(SocketError::Closed));
        assert_eq!(
            receiver.recv().await,
            Some(OutboundFrame::Close(1001, "Heartbeat timeout".into()))
        );
        assert_eq!(receiver.recv().await, None);
    }
}
