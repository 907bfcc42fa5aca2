//! Raw Feed Hub
//!
//! Supplies raw frame channels to the gRPC gateway. One upstream feed
//! producer exists per demanded agg-trade symbol, plus one for the
//! mini-ticker firehose; each publishes into a broadcast channel so any
//! number of concurrent gRPC calls share a single upstream connection.
//!
//! Producers are created lazily on first demand and run until the hub's
//! cancellation token fires. Connection state per feed is tracked for
//! the health endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::application::ports::RawStreamSource;
use crate::infrastructure::binance::{FeedEvent, FeedProducer, agg_trade_url, mini_ticker_url};
use crate::infrastructure::config::FeedSettings;

// =============================================================================
// Feed Status
// =============================================================================

/// Connection state of one upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedConnectionState {
    /// No connection.
    Disconnected,
    /// Connected and reading.
    Connected,
    /// Between attempts.
    Reconnecting,
}

impl FeedConnectionState {
    /// Lowercase state name for health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Tracks the state of one upstream feed connection.
#[derive(Debug)]
pub struct FeedStatus {
    state: RwLock<FeedConnectionState>,
    reconnect_attempts: AtomicU32,
    frames_received: AtomicU64,
}

impl Default for FeedStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedStatus {
    /// New status, initially disconnected.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(FeedConnectionState::Disconnected),
            reconnect_attempts: AtomicU32::new(0),
            frames_received: AtomicU64::new(0),
        }
    }

    /// Set the connection state; connecting resets the attempt counter.
    pub fn set_state(&self, state: FeedConnectionState) {
        *self.state.write() = state;
        if state == FeedConnectionState::Connected {
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> FeedConnectionState {
        *self.state.read()
    }

    /// Record one redial attempt.
    pub fn record_reconnect(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one received frame.
    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames received since startup.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of one feed, for health output.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    /// Stream name (symbol or `!miniTicker`).
    pub name: String,
    /// Connection state.
    pub state: FeedConnectionState,
    /// Frames received since startup.
    pub frames_received: u64,
}

// =============================================================================
// Hub
// =============================================================================

struct FeedHandle {
    sender: broadcast::Sender<Vec<u8>>,
    status: Arc<FeedStatus>,
}

#[derive(Default)]
struct HubState {
    agg_trades: HashMap<String, FeedHandle>,
    mini_ticker: Option<FeedHandle>,
}

/// Lazily-populated registry of upstream feed producers.
pub struct RawFeedHub {
    settings: FeedSettings,
    cancel: CancellationToken,
    state: Mutex<HubState>,
    tasks: tokio_util::task::TaskTracker,
}

impl RawFeedHub {
    /// Create a hub; no producers run until demanded.
    #[must_use]
    pub fn new(settings: FeedSettings, cancel: CancellationToken) -> Self {
        Self {
            settings,
            cancel,
            state: Mutex::new(HubState::default()),
            tasks: tokio_util::task::TaskTracker::new(),
        }
    }

    /// Wait for every producer and relay task to exit after the hub's
    /// cancellation token fired.
    pub async fn wait_for_tasks(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Spawn a producer for `url` and the relay task feeding `sender`.
    fn spawn_feed(&self, name: &str, url: String) -> FeedHandle {
        let (event_tx, mut event_rx) = mpsc::channel(self.settings.frame_capacity);
        let sender = broadcast::channel(self.settings.raw_stream_capacity).0;
        let status = Arc::new(FeedStatus::new());

        let producer = FeedProducer::new(
            url,
            self.settings.clone(),
            event_tx,
            self.cancel.clone(),
        );
        self.tasks.spawn(producer.run());

        let relay_sender = sender.clone();
        let relay_status = Arc::clone(&status);
        let feed_name = name.to_string();
        self.tasks.spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match event {
                    FeedEvent::Connected => {
                        relay_status.set_state(FeedConnectionState::Connected);
                        tracing::info!(feed = %feed_name, "Feed connected");
                    }
                    FeedEvent::Disconnected => {
                        relay_status.set_state(FeedConnectionState::Disconnected);
                        tracing::warn!(feed = %feed_name, "Feed disconnected");
                    }
                    FeedEvent::Reconnecting { attempt } => {
                        relay_status.set_state(FeedConnectionState::Reconnecting);
                        relay_status.record_reconnect();
                        tracing::info!(feed = %feed_name, attempt, "Feed reconnecting");
                    }
                    FeedEvent::Frame(frame) => {
                        relay_status.record_frame();
                        // No receivers is fine; frames before the first
                        // gRPC call are simply not retained.
                        let _ = relay_sender.send(frame);
                    }
                }
            }
        });

        FeedHandle { sender, status }
    }

    /// Snapshot every feed's state for the health endpoint.
    #[must_use]
    pub fn feed_snapshots(&self) -> Vec<FeedSnapshot> {
        let state = self.state.lock();
        let mut snapshots: Vec<FeedSnapshot> = state
            .agg_trades
            .iter()
            .map(|(name, handle)| FeedSnapshot {
                name: name.clone(),
                state: handle.status.state(),
                frames_received: handle.status.frames_received(),
            })
            .collect();
        if let Some(handle) = &state.mini_ticker {
            snapshots.push(FeedSnapshot {
                name: "!miniTicker".to_string(),
                state: handle.status.state(),
                frames_received: handle.status.frames_received(),
            });
        }
        snapshots
    }
}

impl RawStreamSource for RawFeedHub {
    fn agg_trade_stream(&self, symbol: &str) -> broadcast::Receiver<Vec<u8>> {
        let mut state = self.state.lock();
        if let Some(handle) = state.agg_trades.get(symbol) {
            return handle.sender.subscribe();
        }

        tracing::info!(symbol, "Starting agg-trade feed on first demand");
        let url = agg_trade_url(&self.settings.stream_base_url, symbol);
        let handle = self.spawn_feed(symbol, url);
        let receiver = handle.sender.subscribe();
        state.agg_trades.insert(symbol.to_string(), handle);
        receiver
    }

    fn mini_ticker_stream(&self) -> broadcast::Receiver<Vec<u8>> {
        let mut state = self.state.lock();
        if let Some(handle) = &state.mini_ticker {
            return handle.sender.subscribe();
        }

        tracing::info!("Starting mini-ticker feed on first demand");
        let url = mini_ticker_url(&self.settings.stream_base_url);
        let handle = self.spawn_feed("!miniTicker", url);
        let receiver = handle.sender.subscribe();
        state.mini_ticker = Some(handle);
        receiver
    }
}

impl std::fmt::Debug for RawFeedHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RawFeedHub")
            .field("agg_trade_feeds", &state.agg_trades.len())
            .field("mini_ticker", &state.mini_ticker.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
