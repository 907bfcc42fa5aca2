//! Binance Stream Hub Binary
//!
//! Starts the price tick distribution hub.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin binance-stream-hub
//! ```
//!
//! # Environment Variables
//!
//! All optional; defaults preserve the shipped behavior.
//! - `STREAM_HUB_GRPC_PORT`: gRPC server port (default: 12345)
//! - `STREAM_HUB_HTTP_PORT`: WebSocket/health HTTP port (default: 8080)
//! - `BINANCE_STREAM_URL`: exchange stream base URL
//! - `REDIS_URL`: pub/sub bus URL (default: redis://redis:6379)
//! - `AGGREGATOR_URL`: interest-change notification target
//! - `FEED_RETRY_DELAY_SECS`: fixed reconnect delay (default: 5)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use binance_stream_hub::infrastructure::bus::RedisBroker;
use binance_stream_hub::infrastructure::grpc::proto::coinwatch::v1::stream_hub_service_server::StreamHubServiceServer;
use binance_stream_hub::infrastructure::notify::AggregatorNotifier;
use binance_stream_hub::infrastructure::profiles::HttpProfileProvider;
use binance_stream_hub::infrastructure::telemetry;
use binance_stream_hub::infrastructure::ws::{self, AppState};
use binance_stream_hub::{
    HubConfig, RawFeedHub, RawStreamSource, SessionRegistry, SessionTiming, StreamHubServer,
    StreamHubServerConfig, TopicBus, init_metrics,
};
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Binance Stream Hub");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = HubConfig::from_env();
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Raw frame hub feeding the gRPC gateway
    let rawhub = Arc::new(RawFeedHub::new(config.feed.clone(), shutdown_token.clone()));

    // Broker over the pub/sub bus; a bad URL is fatal before serving
    let (broker, inbound_rx) = RedisBroker::new(&config.bus, shutdown_token.clone())?;
    let broker = Arc::new(broker);

    // Queued fire-and-forget notifier toward the aggregator
    let notifier = Arc::new(AggregatorNotifier::new(
        &config.notifier,
        shutdown_token.clone(),
    ));

    // Session registry and its dispatcher
    let registry = Arc::new(SessionRegistry::new(
        Arc::clone(&broker) as Arc<dyn TopicBus>,
        notifier,
        SessionTiming::from(&config.session),
    ));
    let dispatcher = tokio::spawn(
        Arc::clone(&registry).run(inbound_rx, shutdown_token.clone()),
    );

    // gRPC server; bind first so a taken port is fatal before serving
    let grpc_server = Arc::new(StreamHubServer::new(
        StreamHubServerConfig::default(),
        Arc::clone(&rawhub) as Arc<dyn RawStreamSource>,
        shutdown_token.clone(),
    ));
    let grpc_addr: SocketAddr = format!("0.0.0.0:{}", config.server.grpc_port).parse()?;
    let grpc_listener = tokio::net::TcpListener::bind(grpc_addr).await?;
    let grpc_service = StreamHubServiceServer::from_arc(Arc::clone(&grpc_server));
    let grpc_shutdown = shutdown_token.clone();

    let grpc_task = tokio::spawn(async move {
        tracing::info!(addr = %grpc_addr, "gRPC server listening");
        if let Err(e) = Server::builder()
            .add_service(grpc_service)
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(grpc_listener),
                grpc_shutdown.cancelled(),
            )
            .await
        {
            tracing::error!(error = %e, "gRPC server error");
        }
        tracing::info!("gRPC server stopped");
    });

    // HTTP server: session upgrades + health
    let http_listener =
        tokio::net::TcpListener::bind(("0.0.0.0", config.server.http_port)).await?;
    tracing::info!(port = config.server.http_port, "HTTP server listening");
    let app_state = Arc::new(AppState {
        registry: Arc::clone(&registry),
        profiles: Arc::new(HttpProfileProvider::new(&config.profiles)),
        rawhub: Arc::clone(&rawhub),
        grpc: Arc::clone(&grpc_server),
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: Instant::now(),
    });
    let http_shutdown = shutdown_token.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = ws::serve(app_state, http_listener, http_shutdown).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Stream hub ready");

    await_shutdown(shutdown_token).await;

    // Unsubscribe everything and close the inbound queue so the
    // dispatcher observes end-of-stream even if it missed the token,
    // then close the live sessions so their task pairs and the HTTP
    // server's graceful shutdown can finish.
    broker.close().await;
    registry.close_all_sessions();

    let drain = async {
        let _ = dispatcher.await;
        let _ = grpc_task.await;
        let _ = http_task.await;
        registry.wait_for_tasks().await;
        rawhub.wait_for_tasks().await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("Shutdown timeout exceeded, exiting anyway");
    }

    tracing::info!("Stream hub stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &HubConfig) {
    tracing::info!(
        grpc_port = config.server.grpc_port,
        http_port = config.server.http_port,
        redis_url = %config.bus.redis_url,
        aggregator_url = %config.notifier.aggregator_base_url,
        "Configuration loaded"
    );
    tracing::debug!(
        stream_base_url = %config.feed.stream_base_url,
        retry_delay_secs = config.feed.retry_delay.as_secs(),
        outbound_capacity = config.session.outbound_capacity,
        "Feed and session settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
