//! Hub Configuration Settings
//!
//! Configuration types for the stream hub, loaded from environment
//! variables. Every knob has a default preserving the behavior the
//! services shipped with; unparseable values fall back to the default.

use std::time::Duration;

use crate::application::services::SessionTiming;

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// gRPC server port.
    pub grpc_port: u16,
    /// HTTP port for session upgrades and health checks.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            grpc_port: 12345,
            http_port: 8080,
        }
    }
}

/// Upstream feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Base WebSocket URL of the exchange stream endpoint.
    pub stream_base_url: String,
    /// Fixed delay between reconnection attempts.
    pub retry_delay: Duration,
    /// Deadline for answering a transport ping with a pong.
    pub pong_deadline: Duration,
    /// Capacity of the per-feed ingestion queue.
    pub frame_capacity: usize,
    /// Capacity of the per-feed raw broadcast channel.
    pub raw_stream_capacity: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            stream_base_url: "wss://stream.binance.com:9443".to_string(),
            retry_delay: Duration::from_secs(5),
            pong_deadline: Duration::from_secs(10),
            frame_capacity: 200,
            raw_stream_capacity: 256,
        }
    }
}

/// Per-session connection settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Outbound queue capacity per session.
    pub outbound_capacity: usize,
    /// Interval between liveness probes.
    pub ping_interval: Duration,
    /// Read deadline, extended by every inbound frame.
    pub read_deadline: Duration,
    /// Deadline for one outbound write.
    pub write_deadline: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            outbound_capacity: 100,
            ping_interval: Duration::from_secs(30),
            read_deadline: Duration::from_secs(60),
            write_deadline: Duration::from_secs(10),
        }
    }
}

impl From<&SessionSettings> for SessionTiming {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            ping_interval: settings.ping_interval,
            read_deadline: settings.read_deadline,
            write_deadline: settings.write_deadline,
            outbound_capacity: settings.outbound_capacity,
        }
    }
}

/// Pub/sub bus settings.
#[derive(Debug, Clone)]
pub struct BusSettings {
    /// Redis connection URL.
    pub redis_url: String,
    /// Capacity of the shared inbound queue.
    pub inbound_capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            redis_url: "redis://redis:6379".to_string(),
            inbound_capacity: 200,
        }
    }
}

/// Interest-change notifier settings.
#[derive(Debug, Clone)]
pub struct NotifierSettings {
    /// Base URL of the aggregator service.
    pub aggregator_base_url: String,
    /// Capacity of the local notification queue.
    pub queue_capacity: usize,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            aggregator_base_url: "http://aggregator-service:8088".to_string(),
            queue_capacity: 64,
        }
    }
}

/// Profile store client settings.
#[derive(Debug, Clone)]
pub struct ProfileSettings {
    /// Base URL of the profile service.
    pub base_url: String,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            base_url: "http://profile-service:8080".to_string(),
        }
    }
}

/// Complete hub configuration.
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Upstream feed settings.
    pub feed: FeedSettings,
    /// Per-session settings.
    pub session: SessionSettings,
    /// Bus settings.
    pub bus: BusSettings,
    /// Notifier settings.
    pub notifier: NotifierSettings,
    /// Profile store settings.
    pub profiles: ProfileSettings,
}

impl HubConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server: ServerSettings {
                grpc_port: parse_env("STREAM_HUB_GRPC_PORT", defaults.server.grpc_port),
                http_port: parse_env("STREAM_HUB_HTTP_PORT", defaults.server.http_port),
            },
            feed: FeedSettings {
                stream_base_url: env_string("BINANCE_STREAM_URL", &defaults.feed.stream_base_url),
                retry_delay: env_secs("FEED_RETRY_DELAY_SECS", defaults.feed.retry_delay),
                pong_deadline: env_secs("FEED_PONG_DEADLINE_SECS", defaults.feed.pong_deadline),
                frame_capacity: parse_env("FEED_FRAME_CAPACITY", defaults.feed.frame_capacity),
                raw_stream_capacity: parse_env(
                    "FEED_RAW_STREAM_CAPACITY",
                    defaults.feed.raw_stream_capacity,
                ),
            },
            session: SessionSettings {
                outbound_capacity: parse_env(
                    "SESSION_OUTBOUND_CAPACITY",
                    defaults.session.outbound_capacity,
                ),
                ping_interval: env_secs(
                    "SESSION_PING_INTERVAL_SECS",
                    defaults.session.ping_interval,
                ),
                read_deadline: env_secs(
                    "SESSION_READ_DEADLINE_SECS",
                    defaults.session.read_deadline,
                ),
                write_deadline: env_secs(
                    "SESSION_WRITE_DEADLINE_SECS",
                    defaults.session.write_deadline,
                ),
            },
            bus: BusSettings {
                redis_url: env_string("REDIS_URL", &defaults.bus.redis_url),
                inbound_capacity: parse_env("BUS_INBOUND_CAPACITY", defaults.bus.inbound_capacity),
            },
            notifier: NotifierSettings {
                aggregator_base_url: env_string(
                    "AGGREGATOR_URL",
                    &defaults.notifier.aggregator_base_url,
                ),
                queue_capacity: parse_env(
                    "NOTIFIER_QUEUE_CAPACITY",
                    defaults.notifier.queue_capacity,
                ),
            },
            profiles: ProfileSettings {
                base_url: env_string("PROFILE_SERVICE_URL", &defaults.profiles.base_url),
            },
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map_or(default, Duration::from_secs)
}

// =============================================================================
// Tests
// =============================================================================
