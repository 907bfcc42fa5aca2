//! Session WebSocket Endpoint
//!
//! HTTP surface of the hub: the per-user WebSocket upgrade route and
//! the health check. Identity is established by the authentication
//! collaborator in front of this service, which forwards the validated
//! user id in the `x-user-id` header.
//!
//! # Endpoints
//!
//! - `GET /v2/user/profile/ws` - upgrade to the per-user push stream
//! - `GET /health` - JSON health status

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    ConnectionError, ConnectionSink, ConnectionSource, ProfileProvider, SessionConnection,
    SessionFrame,
};
use crate::application::services::SessionRegistry;
use crate::infrastructure::grpc::StreamHubServer;
use crate::infrastructure::rawhub::RawFeedHub;

// =============================================================================
// Shared State
// =============================================================================

/// State shared by the HTTP handlers.
pub struct AppState {
    /// Session registry.
    pub registry: Arc<SessionRegistry>,
    /// Profile lookup collaborator.
    pub profiles: Arc<dyn ProfileProvider>,
    /// Raw feed hub, for health reporting.
    pub rawhub: Arc<RawFeedHub>,
    /// gRPC server, for health reporting.
    pub grpc: Arc<StreamHubServer>,
    /// Hub version.
    pub version: String,
    /// Startup instant.
    pub started_at: Instant,
}

/// Create the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v2/user/profile/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve the router on an already-bound listener until the shutdown
/// token fires. Binding happens at startup so a bad port is fatal
/// before any traffic is accepted.
pub async fn serve(
    state: Arc<AppState>,
    listener: tokio::net::TcpListener,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

// =============================================================================
// WebSocket Upgrade
// =============================================================================

/// Upgrade handler: resolve identity and profile, then hand the socket
/// to the registry.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> axum::response::Response {
    let Some(user_id) = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    else {
        return (StatusCode::UNAUTHORIZED, "missing user identity").into_response();
    };

    let profile = match state.profiles.profile(user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return (StatusCode::NOT_FOUND, "unknown user").into_response(),
        Err(e) => {
            tracing::error!(user_id, error = %e, "Profile lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "profile lookup failed").into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        // Follow every tracked coin before the session goes live so the
        // first dispatched ticks already find the interest sets.
        for holding in &profile.coins {
            state
                .registry
                .follow_topic(profile.id, &holding.symbol.to_lowercase())
                .await;
        }
        state
            .registry
            .register(profile, Box::new(WsConnection { socket }));
    })
}

// =============================================================================
// Transport Adapter
// =============================================================================

/// [`SessionConnection`] over an axum WebSocket.
pub struct WsConnection {
    socket: WebSocket,
}

impl WsConnection {
    /// Wrap an upgraded socket.
    #[must_use]
    pub const fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl SessionConnection for WsConnection {
    fn split(self: Box<Self>) -> (Box<dyn ConnectionSink>, Box<dyn ConnectionSource>) {
        let (sink, source) = self.socket.split();
        (Box::new(WsSink { sink }), Box::new(WsSource { source }))
    }
}

struct WsSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl ConnectionSink for WsSink {
    async fn send_text(&mut self, payload: String) -> Result<(), ConnectionError> {
        self.sink
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| ConnectionError::Transport {
                reason: e.to_string(),
            })
    }

    async fn send_ping(&mut self) -> Result<(), ConnectionError> {
        self.sink
            .send(Message::Ping(vec![].into()))
            .await
            .map_err(|e| ConnectionError::Transport {
                reason: e.to_string(),
            })
    }

    async fn send_close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
    }
}

struct WsSource {
    source: SplitStream<WebSocket>,
}

#[async_trait]
impl ConnectionSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<SessionFrame, ConnectionError>> {
        let frame = self.source.next().await?;
        Some(match frame {
            Ok(Message::Pong(_)) => Ok(SessionFrame::Pong),
            // Client pings are answered by the transport layer.
            Ok(Message::Ping(_)) => Ok(SessionFrame::Ping),
            Ok(Message::Close(_)) => Ok(SessionFrame::Close),
            Ok(_) => Ok(SessionFrame::Other),
            Err(e) => Err(ConnectionError::Transport {
                reason: e.to_string(),
            }),
        })
    }
}

// =============================================================================
// Health
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: &'static str,
    /// Hub version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Live session count.
    pub sessions: usize,
    /// Topics with a non-empty interest set.
    pub active_topics: usize,
    /// Running gRPC streaming calls.
    pub active_raw_streams: i32,
    /// Upstream feed states.
    pub feeds: Vec<FeedInfo>,
}

/// One upstream feed's state.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Stream name.
    pub name: String,
    /// Connection state.
    pub state: &'static str,
    /// Frames received since startup.
    pub frames_received: u64,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let feeds = state
        .rawhub
        .feed_snapshots()
        .into_iter()
        .map(|snapshot| FeedInfo {
            name: snapshot.name,
            state: snapshot.state.as_str(),
            frames_received: snapshot.frames_received,
        })
        .collect();

    Json(HealthResponse {
        status: "healthy",
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        sessions: state.registry.session_count(),
        active_topics: state.registry.active_topic_count(),
        active_raw_streams: state.grpc.active_stream_count(),
        feeds,
    })
}

// =============================================================================
// Tests
// =============================================================================
