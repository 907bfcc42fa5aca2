//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`TopicBus`]: demand-driven subscribe/unsubscribe on the pub/sub bus
//! - [`InterestNotifier`]: fire-and-forget interest-change notifications
//! - [`ProfileProvider`]: lookup of a user's profile at session upgrade
//!
//! ## Session Transport
//!
//! - [`SessionConnection`]: the duplex per-user connection as an abstract
//!   capability, so the session table holds a transport-agnostic handle
//!   and tests can substitute an in-memory fake.

use async_trait::async_trait;

use crate::domain::ticks::{Symbol, UserId, UserProfile};

// =============================================================================
// Pub/Sub Bus
// =============================================================================

/// Errors surfaced by bus subscribe/unsubscribe calls.
///
/// These are returned to the caller, not swallowed: the registry logs
/// them and leaves the interest-set invariant intact so the next
/// follow/unfollow drives another attempt.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Subscribing a topic on the bus failed.
    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe {
        /// Topic being subscribed.
        topic: String,
        /// Underlying failure.
        reason: String,
    },

    /// Unsubscribing a topic from the bus failed.
    #[error("unsubscribe from {topic} failed: {reason}")]
    Unsubscribe {
        /// Topic being unsubscribed.
        topic: String,
        /// Underlying failure.
        reason: String,
    },

    /// The bus connection could not be established.
    #[error("bus connection failed: {reason}")]
    Connection {
        /// Underlying failure.
        reason: String,
    },
}

/// One message delivered on the broker's shared inbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Raw payload as published.
    pub payload: String,
}

/// Demand-driven access to the pub/sub bus.
///
/// Both operations are idempotent; the broker keeps at most one listener
/// per topic and multiplexes all subscribed topics into one inbound
/// queue handed out at construction time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TopicBus: Send + Sync {
    /// Subscribe to a topic. No-op if already subscribed.
    async fn subscribe(&self, topic: &str) -> Result<(), BusError>;

    /// Unsubscribe from a topic. No-op if not subscribed.
    async fn unsubscribe(&self, topic: &str) -> Result<(), BusError>;

    /// Unsubscribe everything and close the inbound queue so receivers
    /// observe end-of-stream.
    async fn close(&self);
}

// =============================================================================
// Interest-Change Notifications
// =============================================================================

/// Direction of an interest transition for a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestChangeKind {
    /// Interest started: the topic's set went empty → non-empty.
    Followed,
    /// Interest stopped: the topic's set went non-empty → empty.
    Unfollowed,
}

/// One interest transition, carrying the acting user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterestChange {
    /// Topic whose interest changed.
    pub topic: Symbol,
    /// User whose follow/unfollow drove the transition.
    pub user_id: UserId,
    /// Transition direction.
    pub kind: InterestChangeKind,
}

/// Best-effort outbound notification of interest transitions.
///
/// `notify` must not block: implementations enqueue and a background
/// task performs the call. Failures are logged, never retried, never
/// surfaced to the caller.
#[cfg_attr(test, mockall::automock)]
pub trait InterestNotifier: Send + Sync {
    /// Record an interest transition for eventual delivery.
    fn notify(&self, change: InterestChange);
}

// =============================================================================
// Raw Stream Source
// =============================================================================

/// Supplier of raw exchange frame channels, keyed by symbol.
///
/// The gRPC gateway draws from this source; each call gets its own
/// receiver so concurrent streams for the same symbol are independent.
pub trait RawStreamSource: Send + Sync {
    /// Receiver for one symbol's aggregated trade frames. Creates the
    /// upstream connection on first demand.
    fn agg_trade_stream(&self, symbol: &str) -> tokio::sync::broadcast::Receiver<Vec<u8>>;

    /// Receiver for the unfiltered mini-ticker firehose.
    fn mini_ticker_stream(&self) -> tokio::sync::broadcast::Receiver<Vec<u8>>;
}

// =============================================================================
// Profile Lookup
// =============================================================================

/// Error from the external profile store.
#[derive(Debug, thiserror::Error)]
#[error("profile lookup failed: {reason}")]
pub struct ProfileError {
    /// Underlying failure.
    pub reason: String,
}

/// Lookup of a user's profile at connection upgrade time.
///
/// The profile store itself (persistence, coin CRUD) is an external
/// collaborator; the hub only reads.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// Fetch the profile for a user, `None` if unknown.
    async fn profile(&self, user_id: UserId) -> Result<Option<UserProfile>, ProfileError>;
}

// =============================================================================
// Session Transport
// =============================================================================

/// Errors on the per-session duplex connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// A send did not complete before the write deadline.
    #[error("write timed out")]
    WriteTimeout,

    /// Transport-level failure.
    #[error("transport error: {reason}")]
    Transport {
        /// Underlying failure.
        reason: String,
    },
}

/// One inbound frame on a session connection.
///
/// The client sends no application payloads; frames matter only as
/// liveness signals, except `Close` which ends the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFrame {
    /// Liveness acknowledgement for a probe.
    Pong,
    /// Transport-level ping from the client.
    Ping,
    /// Any other frame (ignored, but extends the read deadline).
    Other,
    /// The client closed the connection.
    Close,
}

/// Write half of a session connection. Owned exclusively by the
/// session's writer task.
#[async_trait]
pub trait ConnectionSink: Send {
    /// Send one text frame.
    async fn send_text(&mut self, payload: String) -> Result<(), ConnectionError>;

    /// Send a liveness probe.
    async fn send_ping(&mut self) -> Result<(), ConnectionError>;

    /// Send a close frame, best effort.
    async fn send_close(&mut self);
}

/// Read half of a session connection. Owned exclusively by the
/// session's reader task.
#[async_trait]
pub trait ConnectionSource: Send {
    /// Next inbound frame; `None` when the transport is closed.
    async fn next_frame(&mut self) -> Option<Result<SessionFrame, ConnectionError>>;
}

/// A duplex per-user connection as an abstract capability.
pub trait SessionConnection: Send {
    /// Split into independently owned write and read halves.
    fn split(self: Box<Self>) -> (Box<dyn ConnectionSink>, Box<dyn ConnectionSource>);
}
