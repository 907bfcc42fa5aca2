//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port
//! interfaces defined in the application layer.

/// Binance WebSocket feed producer.
pub mod binance;

/// Redis pub/sub broker.
pub mod bus;

/// Configuration loading.
pub mod config;

/// gRPC streaming server implementation.
pub mod grpc;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Queued interest-change notifier.
pub mod notify;

/// Profile store HTTP client.
pub mod profiles;

/// Per-symbol and firehose raw frame channels.
pub mod rawhub;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// WebSocket session endpoint and health checks.
pub mod ws;
