//! gRPC Streaming Server Implementation
//!
//! Implements the `StreamHubService` gRPC service: long-lived
//! server-streaming calls that relay raw exchange frames until the
//! client cancels or the hub shuts down.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use tokio::sync::{broadcast, mpsc};
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use super::proto::coinwatch::v1::{
    RawAggTradeRequest, RawMiniTickerRequest, RawResponse,
    stream_hub_service_server::StreamHubService,
};
use crate::application::ports::RawStreamSource;

// =============================================================================
// Type Aliases
// =============================================================================

type StreamResult<T> = Result<Response<T>, Status>;
type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// Capacity of the per-call relay queue toward the gRPC transport.
const RELAY_CAPACITY: usize = 256;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the gRPC streaming server.
#[derive(Debug, Clone)]
pub struct StreamHubServerConfig {
    /// Hub version string.
    pub version: String,
}

impl Default for StreamHubServerConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

/// gRPC streaming server for raw exchange frames.
pub struct StreamHubServer {
    #[allow(dead_code)]
    config: StreamHubServerConfig,
    source: Arc<dyn RawStreamSource>,
    shutdown: CancellationToken,
    active_streams: Arc<AtomicI32>,
}

impl StreamHubServer {
    /// Create a new gRPC streaming server.
    #[must_use]
    pub fn new(
        config: StreamHubServerConfig,
        source: Arc<dyn RawStreamSource>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            source,
            shutdown,
            active_streams: Arc::new(AtomicI32::new(0)),
        }
    }

    /// Number of streaming calls currently running.
    #[must_use]
    pub fn active_stream_count(&self) -> i32 {
        self.active_streams.load(Ordering::Relaxed)
    }

    /// Spawn the forwarding loop for one call and return its stream.
    ///
    /// The loop exits when the caller goes away (the relay send fails),
    /// the shutdown token fires (the caller sees a cancellation status),
    /// or the source channel closes (clean completion).
    fn relay(&self, mut rx: broadcast::Receiver<Vec<u8>>, stream_name: String) -> BoxedStream<RawResponse> {
        let stream_id = uuid::Uuid::new_v4();
        self.active_streams.fetch_add(1, Ordering::Relaxed);

        let (tx, grpc_rx) = mpsc::channel(RELAY_CAPACITY);
        let shutdown = self.shutdown.clone();
        let active_streams = Arc::clone(&self.active_streams);

        tokio::spawn(async move {
            let mut messages_sent: u64 = 0;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        let _ = tx
                            .send(Err(Status::cancelled("stream hub shutting down")))
                            .await;
                        break;
                    }
                    frame = rx.recv() => {
                        match frame {
                            Ok(data) => {
                                let response = RawResponse { data };
                                if tx.send(Ok(response)).await.is_err() {
                                    // Caller cancelled; its context error
                                    // is surfaced client-side by tonic.
                                    break;
                                }
                                messages_sent += 1;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                tracing::warn!(
                                    stream = %stream_name,
                                    stream_id = %stream_id,
                                    lagged = n,
                                    "Raw stream receiver lagged"
                                );
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                tracing::info!(
                                    stream = %stream_name,
                                    stream_id = %stream_id,
                                    "Raw stream source closed"
                                );
                                break;
                            }
                        }
                    }
                }
            }
            tracing::debug!(
                stream = %stream_name,
                stream_id = %stream_id,
                messages_sent,
                "Forwarding loop finished"
            );
            active_streams.fetch_sub(1, Ordering::Relaxed);
        });

        Box::pin(ReceiverStream::new(grpc_rx))
    }
}

#[tonic::async_trait]
impl StreamHubService for StreamHubServer {
    type ReceiveRawAggTradeStream = BoxedStream<RawResponse>;
    type ReceiveRawMiniTickerStream = BoxedStream<RawResponse>;

    async fn receive_raw_agg_trade(
        &self,
        request: Request<RawAggTradeRequest>,
    ) -> StreamResult<Self::ReceiveRawAggTradeStream> {
        let symbol = request.into_inner().symbol;
        if symbol.is_empty() {
            return Err(Status::invalid_argument("symbol must not be empty"));
        }

        tracing::info!(symbol = %symbol, "Client connected to raw aggTrade stream");
        let rx = self.source.agg_trade_stream(&symbol);
        Ok(Response::new(self.relay(rx, symbol)))
    }

    async fn receive_raw_mini_ticker(
        &self,
        _request: Request<RawMiniTickerRequest>,
    ) -> StreamResult<Self::ReceiveRawMiniTickerStream> {
        tracing::info!("Client connected to raw miniTicker stream");
        let rx = self.source.mini_ticker_stream();
        Ok(Response::new(self.relay(rx, "!miniTicker".to_string())))
    }
}

impl std::fmt::Debug for StreamHubServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHubServer")
            .field("active_streams", &self.active_stream_count())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
