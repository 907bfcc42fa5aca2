//! Interest-Change Notifier
//!
//! Best-effort notifications to the aggregator service when interest in
//! a symbol starts or stops. Changes are queued onto a small bounded
//! channel and drained by one background task, keeping the HTTP call
//! off the dispatch and teardown hot paths.
//!
//! Fire-and-forget: failures are logged and never retried; a full queue
//! drops the change.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{InterestChange, InterestChangeKind, InterestNotifier};
use crate::infrastructure::config::NotifierSettings;

/// Queued notifier toward the aggregator service.
///
/// `notify` enqueues without blocking; the drainer task owns the HTTP
/// client and performs the calls.
#[derive(Debug)]
pub struct AggregatorNotifier {
    tx: mpsc::Sender<InterestChange>,
}

impl AggregatorNotifier {
    /// Create the notifier and spawn its drainer task.
    #[must_use]
    pub fn new(settings: &NotifierSettings, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity);
        let base_url = settings.aggregator_base_url.clone();
        tokio::spawn(drain(base_url, rx, cancel));
        Self { tx }
    }
}

impl InterestNotifier for AggregatorNotifier {
    fn notify(&self, change: InterestChange) {
        match self.tx.try_send(change) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(change)) => {
                tracing::warn!(
                    topic = %change.topic,
                    "Notification queue full, interest change dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Notification drainer gone");
            }
        }
    }
}

/// Drain queued changes until cancellation or queue closure.
async fn drain(
    base_url: String,
    mut rx: mpsc::Receiver<InterestChange>,
    cancel: CancellationToken,
) {
    let client = reqwest::Client::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::info!("Notification drainer cancelled");
                return;
            }
            change = rx.recv() => {
                let Some(change) = change else {
                    return;
                };
                send_change(&client, &base_url, &change).await;
            }
        }
    }
}

/// One best-effort call: GET when interest starts, DELETE when it stops.
async fn send_change(client: &reqwest::Client, base_url: &str, change: &InterestChange) {
    let url = format!("{base_url}/coin");
    let query = [
        ("symbol", change.topic.clone()),
        ("id", change.user_id.to_string()),
    ];

    let request = match change.kind {
        InterestChangeKind::Followed => client.get(&url),
        InterestChangeKind::Unfollowed => client.delete(&url),
    };

    match request.query(&query).send().await {
        Ok(response) => {
            tracing::debug!(
                topic = %change.topic,
                user_id = change.user_id,
                status = %response.status(),
                "Interest change delivered"
            );
        }
        Err(e) => {
            tracing::warn!(
                topic = %change.topic,
                user_id = change.user_id,
                error = %e,
                "Interest change delivery failed"
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::Router;
    use axum::extract::{Query, State};
    use axum::routing::get;

    use super::*;

    #[derive(Clone, Default)]
    struct Recorded {
        calls: Arc<Mutex<Vec<(String, String, String)>>>,
    }

    async fn spawn_aggregator(recorded: Recorded) -> String {
        async fn follow(
            State(recorded): State<Recorded>,
            Query(params): Query<std::collections::HashMap<String, String>>,
        ) -> &'static str {
            record(&recorded, "GET", &params);
            "ok"
        }

        async fn unfollow(
            State(recorded): State<Recorded>,
            Query(params): Query<std::collections::HashMap<String, String>>,
        ) -> &'static str {
            record(&recorded, "DELETE", &params);
            "ok"
        }

        fn record(
            recorded: &Recorded,
            method: &str,
            params: &std::collections::HashMap<String, String>,
        ) {
            recorded.calls.lock().unwrap().push((
                method.to_string(),
                params.get("symbol").cloned().unwrap_or_default(),
                params.get("id").cloned().unwrap_or_default(),
            ));
        }

        let app = Router::new()
            .route("/coin", get(follow).delete(unfollow))
            .with_state(recorded);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn delivers_follow_and_unfollow_calls() {
        let recorded = Recorded::default();
        let base_url = spawn_aggregator(recorded.clone()).await;

        let settings = NotifierSettings {
            aggregator_base_url: base_url,
            queue_capacity: 8,
        };
        let notifier = AggregatorNotifier::new(&settings, CancellationToken::new());

        notifier.notify(InterestChange {
            topic: "btcusdt".to_string(),
            user_id: 1,
            kind: InterestChangeKind::Followed,
        });
        notifier.notify(InterestChange {
            topic: "btcusdt".to_string(),
            user_id: 1,
            kind: InterestChangeKind::Unfollowed,
        });

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if recorded.calls.lock().unwrap().len() == 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let calls = recorded.calls.lock().unwrap();
        assert_eq!(calls[0], ("GET".into(), "btcusdt".into(), "1".into()));
        assert_eq!(calls[1], ("DELETE".into(), "btcusdt".into(), "1".into()));
    }

    #[tokio::test]
    async fn unreachable_aggregator_is_tolerated() {
        let settings = NotifierSettings {
            aggregator_base_url: "http://127.0.0.1:1".to_string(),
            queue_capacity: 2,
        };
        let notifier = AggregatorNotifier::new(&settings, CancellationToken::new());

        // Must neither block nor panic.
        for _ in 0..10 {
            notifier.notify(InterestChange {
                topic: "ethusdt".to_string(),
                user_id: 2,
                kind: InterestChangeKind::Followed,
            });
        }
    }
}
