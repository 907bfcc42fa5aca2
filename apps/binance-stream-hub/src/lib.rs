#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Binance Stream Hub - Price Tick Distributor
//!
//! Distributes live price ticks from Binance's streaming feeds to many
//! downstream consumers: internal gRPC clients receive raw frames,
//! per-user WebSocket sessions receive recomputed portfolio valuations.
//! Bus subscriptions are demand-driven — a symbol is subscribed on the
//! pub/sub bus only while at least one session follows it.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Tick, valuation, and interest-set types
//!   - `ticks`: price ticks, holdings, the pushed valuation document
//!   - `interest`: reference-counted topic interest
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: interfaces for the bus, notifier, profiles, connections
//!   - `services`: session registry and per-session tasks
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: WebSocket feed producers with fixed-delay reconnect
//!   - `rawhub`: per-symbol and firehose raw frame channels
//!   - `bus`: Redis pub/sub broker
//!   - `grpc`: gRPC streaming gateway
//!   - `ws`: session WebSocket endpoint and health checks
//!   - `notify`: queued interest-change notifier
//!   - `config`, `telemetry`, `metrics`: ambient wiring
//!
//! # Data Flow
//!
//! ```text
//! Binance WS ──► FeedProducer ──► RawFeedHub ──► gRPC ──► internal clients
//!
//! Redis bus ──► Broker inbound queue ──► SessionRegistry.dispatch
//!                                            │
//!                              per-session outbound queue
//!                                            │
//!                               session writer ──► user WebSocket
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core tick and interest types with no I/O.
pub mod domain;

/// Application layer - Session registry and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::interest::InterestSets;
pub use domain::ticks::{Holding, Symbol, Tick, UserId, UserProfile, ValuationUpdate};

// Application services and ports
pub use application::ports::{
    BusError, BusMessage, InterestChange, InterestChangeKind, InterestNotifier, ProfileError,
    ProfileProvider, RawStreamSource, SessionConnection, TopicBus,
};
pub use application::services::{SessionRegistry, SessionTiming};

// Infrastructure config
pub use infrastructure::config::{
    BusSettings, FeedSettings, HubConfig, NotifierSettings, ProfileSettings, ServerSettings,
    SessionSettings,
};

// Raw feed hub (for integration tests)
pub use infrastructure::rawhub::{FeedConnectionState, FeedSnapshot, RawFeedHub};

// gRPC server (for integration tests)
pub use infrastructure::grpc::{
    proto::coinwatch::v1 as proto,
    server::{StreamHubServer, StreamHubServerConfig},
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
