//! Feed Producer
//!
//! One producer per upstream stream. Dials the endpoint, answers
//! transport pings, and forwards every received frame unmodified into a
//! bounded event queue. Any read or dial error tears the connection
//! down and the producer redials after a fixed delay, indefinitely,
//! until cancelled.
//!
//! The frame path is lossy: a full queue drops the frame rather than
//! blocking the socket read.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::config::FeedSettings;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one connection attempt. None of them end the
/// producer itself; the supervising loop redials.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// WebSocket dial or read failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server closed the stream.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// A pong reply did not complete within the deadline.
    #[error("pong deadline exceeded")]
    PongDeadline,

    /// The downstream event queue is gone; the producer stops.
    #[error("event queue closed")]
    QueueClosed,
}

// =============================================================================
// Events
// =============================================================================

/// Events emitted by a feed producer.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// The upstream connection is established.
    Connected,
    /// The upstream connection was lost.
    Disconnected,
    /// A redial is about to happen.
    Reconnecting {
        /// Consecutive failures since the last successful connection.
        attempt: u32,
    },
    /// One raw frame, byte-for-byte as received.
    Frame(Vec<u8>),
}

// =============================================================================
// Producer
// =============================================================================

/// Long-lived producer for one upstream stream URL.
pub struct FeedProducer {
    url: String,
    settings: FeedSettings,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
}

impl FeedProducer {
    /// Create a producer for a stream URL.
    #[must_use]
    pub const fn new(
        url: String,
        settings: FeedSettings,
        event_tx: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            url,
            settings,
            event_tx,
            cancel,
        }
    }

    /// Run the connect/read/redial loop until cancellation.
    ///
    /// Dial and read errors are logged and never fatal; the loop sleeps
    /// the configured fixed delay between attempts and observes
    /// cancellation both while waiting and while connected.
    pub async fn run(self) {
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!(url = %self.url, "Feed producer cancelled");
                return;
            }

            match self.connect_and_read(&mut attempt).await {
                Ok(()) => {
                    tracing::info!(url = %self.url, "Feed producer stopped");
                    return;
                }
                Err(FeedError::QueueClosed) => {
                    tracing::warn!(url = %self.url, "Frame queue closed, stopping producer");
                    return;
                }
                Err(e) => {
                    attempt += 1;
                    tracing::warn!(url = %self.url, attempt, error = %e, "Feed connection lost, will reconnect");
                    self.emit(FeedEvent::Disconnected);
                    self.emit(FeedEvent::Reconnecting { attempt });
                }
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!(url = %self.url, "Feed producer cancelled during retry wait");
                    return;
                }
                () = tokio::time::sleep(self.settings.retry_delay) => {}
            }
        }
    }

    /// One connection: dial, then read until error or cancellation.
    async fn connect_and_read(&self, attempt: &mut u32) -> Result<(), FeedError> {
        tracing::info!(url = %self.url, "Connecting to feed");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&self.url).await?;
        tracing::info!(url = %self.url, "Feed connection established");
        *attempt = 0;
        self.emit(FeedEvent::Connected);

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Ping(data))) => {
                            // Liveness-probe responder: the exchange drops
                            // connections that miss the pong deadline.
                            match timeout(
                                self.settings.pong_deadline,
                                write.send(Message::Pong(data)),
                            )
                            .await
                            {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => return Err(e.into()),
                                Err(_) => return Err(FeedError::PongDeadline),
                            }
                        }
                        Some(Ok(Message::Text(text))) => {
                            self.forward_frame(text.as_bytes().to_vec())?;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.forward_frame(data.to_vec())?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            return Err(FeedError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Pong or raw frame types carry no data we use.
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(FeedError::ConnectionClosed),
                    }
                }
            }
        }
    }

    /// Non-blocking forward of one frame; a full queue drops it.
    fn forward_frame(&self, frame: Vec<u8>) -> Result<(), FeedError> {
        match self.event_tx.try_send(FeedEvent::Frame(frame)) {
            Ok(()) => {
                metrics::counter!("stream_hub_frames_received_total").increment(1);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::counter!("stream_hub_frames_dropped_total").increment(1);
                tracing::warn!(url = %self.url, "Frame queue full, frame dropped");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(FeedError::QueueClosed),
        }
    }

    /// Lifecycle events are best-effort as well.
    fn emit(&self, event: FeedEvent) {
        let _ = self.event_tx.try_send(event);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::SinkExt;
    use tokio::net::TcpListener;

    use super::*;

    fn test_settings() -> FeedSettings {
        FeedSettings {
            retry_delay: Duration::from_millis(20),
            ..FeedSettings::default()
        }
    }

    /// WebSocket server that accepts connections one at a time, sends
    /// the scripted frames, then drops the socket.
    async fn frame_server(frames_per_conn: Vec<Vec<String>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for frames in frames_per_conn {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                for frame in frames {
                    ws.send(Message::Text(frame.into())).await.unwrap();
                }
                // Dropping the socket simulates an upstream failure.
            }
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn forwards_frames_unmodified() {
        let url = frame_server(vec![vec!["{\"p\":\"1\"}".to_string()]]).await;
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let producer = FeedProducer::new(url, test_settings(), tx, cancel.clone());
        let handle = tokio::spawn(producer.run());

        loop {
            match rx.recv().await.unwrap() {
                FeedEvent::Frame(frame) => {
                    assert_eq!(frame, b"{\"p\":\"1\"}");
                    break;
                }
                _ => {}
            }
        }

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_connection_loss() {
        let url = frame_server(vec![
            vec!["first".to_string()],
            vec!["second".to_string()],
        ])
        .await;
        let (tx, mut rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let producer = FeedProducer::new(url, test_settings(), tx, cancel.clone());
        let handle = tokio::spawn(producer.run());

        let mut frames = Vec::new();
        let mut reconnects = 0;
        while frames.len() < 2 {
            match tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap()
            {
                FeedEvent::Frame(frame) => frames.push(String::from_utf8(frame).unwrap()),
                FeedEvent::Reconnecting { .. } => reconnects += 1,
                _ => {}
            }
        }

        assert_eq!(frames, vec!["first", "second"]);
        assert!(reconnects >= 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_retry_loop() {
        // Nothing listens on this port range reliably; dial fails fast
        // and the producer sits in its retry wait.
        let (tx, _rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let producer = FeedProducer::new(
            "ws://127.0.0.1:1".to_string(),
            test_settings(),
            tx,
            cancel.clone(),
        );
        let handle = tokio::spawn(producer.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
