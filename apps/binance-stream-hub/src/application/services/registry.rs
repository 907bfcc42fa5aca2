//! Session Registry
//!
//! Owns the table of live per-user sessions and the per-topic interest
//! sets, and fans decoded ticks out to interested sessions' outbound
//! queues.
//!
//! # Locking discipline
//!
//! One `parking_lot::RwLock` guards the session map and the interest
//! sets as a single logical table. Writers (register, teardown, follow,
//! unfollow) hold it only long enough to mutate; bus calls and
//! connection I/O always happen outside the lock. The dispatch path
//! takes the read lock just to snapshot, then enqueues lock-free.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    BusMessage, InterestChange, InterestChangeKind, InterestNotifier, SessionConnection, TopicBus,
};
use crate::application::services::session::{
    ReaderExit, Session, SessionTiming, run_reader, run_writer,
};
use crate::domain::interest::InterestSets;
use crate::domain::ticks::{Tick, UserId, UserProfile};

// =============================================================================
// Registry
// =============================================================================

/// The session table and interest sets behind one lock.
#[derive(Debug, Default)]
struct RegistryState {
    sessions: std::collections::HashMap<UserId, Arc<Session>>,
    interest: InterestSets,
}

/// Registry of live per-user sessions with demand-driven bus
/// subscriptions.
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
    bus: Arc<dyn TopicBus>,
    notifier: Arc<dyn InterestNotifier>,
    timing: SessionTiming,
    tasks: tokio_util::task::TaskTracker,
}

impl SessionRegistry {
    /// Create a registry over the given bus and notifier.
    #[must_use]
    pub fn new(
        bus: Arc<dyn TopicBus>,
        notifier: Arc<dyn InterestNotifier>,
        timing: SessionTiming,
    ) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            bus,
            notifier,
            timing,
            tasks: tokio_util::task::TaskTracker::new(),
        }
    }

    // =========================================================================
    // Session Lifecycle
    // =========================================================================

    /// Install a session for a user, evicting any existing one.
    ///
    /// Newest connection wins: an existing session for the same user id
    /// is closed (its tasks observe the closure and exit) before the new
    /// one is installed. Spawns the writer and reader tasks for the new
    /// connection.
    pub fn register(self: &Arc<Self>, profile: UserProfile, connection: Box<dyn SessionConnection>) {
        let user_id = profile.id;
        let (session, outbound_rx) = Session::new(profile, self.timing.outbound_capacity);
        let session = Arc::new(session);

        let evicted = {
            let mut state = self.state.write();
            state.sessions.insert(user_id, Arc::clone(&session))
        };

        if let Some(old) = evicted {
            tracing::info!(user_id, "User reconnecting, closing old session");
            old.closed.cancel();
        }

        tracing::info!(user_id, "Session registered");
        metrics::gauge!("stream_hub_live_sessions").set(self.session_count() as f64);

        let (sink, source) = connection.split();

        self.tasks.spawn(run_writer(
            sink,
            outbound_rx,
            session.closed.clone(),
            self.timing.clone(),
        ));

        let registry = Arc::clone(self);
        let closed = session.closed.clone();
        let timing = self.timing.clone();
        self.tasks.spawn(async move {
            let exit = run_reader(source, closed.clone(), &timing).await;
            // An evicted session's transport also closes; only a loss on
            // a still-open session tears it down, otherwise the reader
            // would remove the replacement session's record.
            if exit == ReaderExit::ConnectionLost && !closed.is_cancelled() {
                registry.teardown_session(user_id).await;
            }
        });
    }

    /// Remove a session and every trace of its topic interest.
    ///
    /// Drives the per-topic empty-set logic: each topic the user was the
    /// last follower of is unsubscribed on the bus and reported to the
    /// notifier. A no-op for unknown user ids.
    pub async fn teardown_session(&self, user_id: UserId) {
        let (session, deactivated) = {
            let mut state = self.state.write();
            let session = state.sessions.remove(&user_id);
            let removed = state.interest.remove_user(user_id);
            (session, removed.deactivated)
        };

        if session.is_none() && deactivated.is_empty() {
            return;
        }

        for topic in deactivated {
            if let Err(e) = self.bus.unsubscribe(&topic).await {
                tracing::error!(user_id, topic = %topic, error = %e, "Bus unsubscribe failed");
            }
            self.notifier.notify(InterestChange {
                topic,
                user_id,
                kind: InterestChangeKind::Unfollowed,
            });
        }

        if let Some(session) = session {
            session.closed.cancel();
            tracing::info!(user_id, "Session torn down");
        }
        metrics::gauge!("stream_hub_live_sessions").set(self.session_count() as f64);
    }

    // =========================================================================
    // Topic Interest
    // =========================================================================

    /// Add a user to a topic's interest set.
    ///
    /// The first follower triggers the bus subscription; repeat follows
    /// are no-ops. A failed subscribe is logged and not retried — the
    /// interest set stays intact for the next transition.
    pub async fn follow_topic(&self, user_id: UserId, topic: &str) {
        let newly_active = self.state.write().interest.follow(user_id, topic);

        if !newly_active {
            return;
        }

        tracing::info!(user_id, topic, "Topic newly followed, subscribing on bus");
        if let Err(e) = self.bus.subscribe(topic).await {
            tracing::error!(user_id, topic, error = %e, "Bus subscribe failed");
        }
        self.notifier.notify(InterestChange {
            topic: topic.to_string(),
            user_id,
            kind: InterestChangeKind::Followed,
        });
    }

    /// Remove a user from a topic's interest set.
    ///
    /// The last follower leaving triggers the bus unsubscribe and an
    /// interest-stopped notification. A no-op when the user does not
    /// follow the topic.
    pub async fn unfollow_topic(&self, user_id: UserId, topic: &str) {
        let deactivated = self.state.write().interest.unfollow(user_id, topic);

        if !deactivated {
            return;
        }

        tracing::info!(topic, "No followers left, unsubscribing on bus");
        if let Err(e) = self.bus.unsubscribe(topic).await {
            tracing::error!(user_id, topic, error = %e, "Bus unsubscribe failed");
        }
        self.notifier.notify(InterestChange {
            topic: topic.to_string(),
            user_id,
            kind: InterestChangeKind::Unfollowed,
        });
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Fan a tick out to every interested session's outbound queue.
    ///
    /// Snapshots the interest set under the read lock, then enqueues
    /// without it. A full outbound queue drops the new message and keeps
    /// the queued ones in order. Ticks carrying a user id go only to
    /// that user's session.
    pub fn dispatch(&self, topic: &str, tick: &Tick) {
        let targets: Vec<Arc<Session>> = {
            let state = self.state.read();
            if let Some(user_id) = tick.user_id {
                state.sessions.get(&user_id).cloned().into_iter().collect()
            } else {
                state
                    .interest
                    .snapshot(topic)
                    .into_iter()
                    .filter_map(|id| state.sessions.get(&id).cloned())
                    .collect()
            }
        };

        for session in targets {
            Self::push_to_session(&session, tick);
        }
    }

    /// Update one session's price cache and enqueue a valuation push.
    fn push_to_session(session: &Session, tick: &Tick) {
        let update = {
            let mut prices = session.prices.lock();
            prices.insert(tick.symbol.clone(), tick.price);
            crate::domain::ticks::ValuationUpdate::compute(&session.profile, &prices)
        };

        let payload = match serde_json::to_string(&update) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(user_id = session.user_id, error = %e, "Push serialization failed");
                return;
            }
        };

        match session.outbound.try_send(payload) {
            Ok(()) => {
                metrics::counter!("stream_hub_pushes_total").increment(1);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::counter!("stream_hub_pushes_dropped_total").increment(1);
                tracing::warn!(
                    user_id = session.user_id,
                    symbol = %tick.symbol,
                    "Outbound queue full, push dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(user_id = session.user_id, "Outbound queue closed");
            }
        }
    }

    /// Drain the broker's inbound queue until it closes or the hub
    /// shuts down.
    ///
    /// Payloads that fail to decode are dropped; dispatch continues.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<BusMessage>, cancel: CancellationToken) {
        tracing::info!("Session registry dispatcher started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Session registry dispatcher cancelled");
                    return;
                }
                msg = inbound.recv() => {
                    let Some(msg) = msg else {
                        tracing::warn!("Bus inbound queue closed");
                        return;
                    };
                    match serde_json::from_str::<Tick>(&msg.payload) {
                        Ok(tick) => {
                            metrics::counter!("stream_hub_ticks_dispatched_total").increment(1);
                            self.dispatch(&msg.topic, &tick);
                        }
                        Err(e) => {
                            tracing::debug!(topic = %msg.topic, error = %e, "Undecodable tick dropped");
                        }
                    }
                }
            }
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Close every live session without the per-topic unsubscribe
    /// ceremony. Used at process shutdown, after the broker is closed;
    /// the writer tasks send close frames so the HTTP server's graceful
    /// shutdown can complete.
    pub fn close_all_sessions(&self) {
        let mut state = self.state.write();
        for (_, session) in state.sessions.drain() {
            session.closed.cancel();
        }
    }

    /// Wait for every session writer/reader task to exit.
    pub async fn wait_for_tasks(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state.read().sessions.len()
    }

    /// Number of topics with a non-empty interest set.
    #[must_use]
    pub fn active_topic_count(&self) -> usize {
        self.state.read().interest.active_topic_count()
    }

    /// Whether a user currently has a live session.
    #[must_use]
    pub fn has_session(&self, user_id: UserId) -> bool {
        self.state.read().sessions.contains_key(&user_id)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.session_count())
            .field("active_topics", &self.active_topic_count())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::{
        BusError, ConnectionError, ConnectionSink, ConnectionSource, SessionFrame,
    };
    use crate::domain::ticks::Holding;

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    /// Records subscribe/unsubscribe calls; never fails.
    #[derive(Default)]
    struct RecordingBus {
        subscribes: StdMutex<Vec<String>>,
        unsubscribes: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl TopicBus for RecordingBus {
        async fn subscribe(&self, topic: &str) -> Result<(), BusError> {
            self.subscribes.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        async fn unsubscribe(&self, topic: &str) -> Result<(), BusError> {
            self.unsubscribes.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        async fn close(&self) {}
    }

    #[derive(Default)]
    struct RecordingNotifier {
        changes: StdMutex<Vec<InterestChange>>,
    }

    impl InterestNotifier for RecordingNotifier {
        fn notify(&self, change: InterestChange) {
            self.changes.lock().unwrap().push(change);
        }
    }

    /// In-memory connection: collects sent frames, blocks on reads until
    /// dropped from the outside.
    struct FakeConnection {
        sent: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<SessionFrame>,
    }

    struct FakeSink {
        sent: mpsc::UnboundedSender<String>,
    }

    struct FakeSource {
        inbound: mpsc::UnboundedReceiver<SessionFrame>,
    }

    impl SessionConnection for FakeConnection {
        fn split(self: Box<Self>) -> (Box<dyn ConnectionSink>, Box<dyn ConnectionSource>) {
            (
                Box::new(FakeSink { sent: self.sent }),
                Box::new(FakeSource {
                    inbound: self.inbound,
                }),
            )
        }
    }

    #[async_trait]
    impl ConnectionSink for FakeSink {
        async fn send_text(&mut self, payload: String) -> Result<(), ConnectionError> {
            let _ = self.sent.send(payload);
            Ok(())
        }

        async fn send_ping(&mut self) -> Result<(), ConnectionError> {
            Ok(())
        }

        async fn send_close(&mut self) {}
    }

    #[async_trait]
    impl ConnectionSource for FakeSource {
        async fn next_frame(&mut self) -> Option<Result<SessionFrame, ConnectionError>> {
            self.inbound.recv().await.map(Ok)
        }
    }

    struct Harness {
        registry: Arc<SessionRegistry>,
        bus: Arc<RecordingBus>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness() -> Harness {
        let bus = Arc::new(RecordingBus::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&bus) as Arc<dyn TopicBus>,
            Arc::clone(&notifier) as Arc<dyn InterestNotifier>,
            SessionTiming::default(),
        ));
        Harness {
            registry,
            bus,
            notifier,
        }
    }

    fn profile(id: UserId, holdings: &[(&str, u64)]) -> UserProfile {
        UserProfile {
            id,
            name: format!("user-{id}"),
            coins: holdings
                .iter()
                .map(|(symbol, quantity)| Holding {
                    symbol: (*symbol).to_string(),
                    quantity: Decimal::from(*quantity),
                })
                .collect(),
        }
    }

    /// Register a session and return the channel its pushes land on plus
    /// the sender that keeps its reader alive.
    fn connect(
        registry: &Arc<SessionRegistry>,
        profile: UserProfile,
    ) -> (
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<SessionFrame>,
    ) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        registry.register(
            profile,
            Box::new(FakeConnection {
                sent: sent_tx,
                inbound: inbound_rx,
            }),
        );
        (sent_rx, inbound_tx)
    }

    fn tick(symbol: &str, price: u64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            price: Decimal::from(price),
            user_id: None,
        }
    }

    // -------------------------------------------------------------------------
    // Scenarios
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn follow_subscribes_once_and_dispatch_pushes_valuation() {
        let h = harness();
        let (mut pushes, _keepalive) = connect(&h.registry, profile(1, &[("btcusdt", 2)]));

        h.registry.follow_topic(1, "btcusdt").await;
        assert_eq!(*h.bus.subscribes.lock().unwrap(), vec!["btcusdt"]);

        h.registry.dispatch("btcusdt", &tick("btcusdt", 50_000));

        let payload = pushes.recv().await.unwrap();
        let update: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(update["ID"], 1);
        assert_eq!(update["Coins"]["Totals"]["btcusdt"], "100000");
    }

    #[tokio::test]
    async fn double_follow_issues_single_subscribe() {
        let h = harness();
        h.registry.follow_topic(1, "btcusdt").await;
        h.registry.follow_topic(1, "btcusdt").await;
        assert_eq!(h.bus.subscribes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_follower_does_not_resubscribe() {
        let h = harness();
        h.registry.follow_topic(1, "ethusdt").await;
        h.registry.follow_topic(2, "ethusdt").await;
        assert_eq!(h.bus.subscribes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn teardown_with_remaining_follower_does_not_unsubscribe() {
        let h = harness();
        let (_pushes_a, _ka_a) = connect(&h.registry, profile(1, &[("ethusdt", 1)]));
        let (_pushes_b, _ka_b) = connect(&h.registry, profile(2, &[("ethusdt", 1)]));
        h.registry.follow_topic(1, "ethusdt").await;
        h.registry.follow_topic(2, "ethusdt").await;

        h.registry.teardown_session(2).await;

        assert!(h.bus.unsubscribes.lock().unwrap().is_empty());
        assert!(h.registry.has_session(1));
        assert!(!h.registry.has_session(2));
    }

    #[tokio::test]
    async fn sole_follower_teardown_unsubscribes_and_notifies_once() {
        let h = harness();
        let (_pushes, _ka) = connect(&h.registry, profile(1, &[("dogeusdt", 5)]));
        h.registry.follow_topic(1, "dogeusdt").await;
        // The follow itself reports interest started.
        assert_eq!(h.notifier.changes.lock().unwrap().len(), 1);

        h.registry.teardown_session(1).await;

        assert_eq!(*h.bus.unsubscribes.lock().unwrap(), vec!["dogeusdt"]);
        let changes = h.notifier.changes.lock().unwrap();
        let stops: Vec<_> = changes
            .iter()
            .filter(|c| c.kind == InterestChangeKind::Unfollowed)
            .collect();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].topic, "dogeusdt");
        assert_eq!(stops[0].user_id, 1);
    }

    #[tokio::test]
    async fn unfollow_of_unknown_topic_is_noop() {
        let h = harness();
        h.registry.unfollow_topic(1, "btcusdt").await;
        assert!(h.bus.unsubscribes.lock().unwrap().is_empty());
        assert!(h.notifier.changes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn teardown_of_unknown_user_is_noop() {
        let h = harness();
        h.registry.teardown_session(42).await;
        assert!(h.bus.unsubscribes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn newest_connection_wins() {
        let h = harness();
        let (_old_pushes, _old_ka) = connect(&h.registry, profile(1, &[("btcusdt", 1)]));
        let (mut new_pushes, _new_ka) = connect(&h.registry, profile(1, &[("btcusdt", 1)]));

        assert_eq!(h.registry.session_count(), 1);

        h.registry.follow_topic(1, "btcusdt").await;
        h.registry.dispatch("btcusdt", &tick("btcusdt", 10));

        // Only the new session receives the push.
        let payload = new_pushes.recv().await.unwrap();
        assert!(payload.contains("\"ID\":1"));
    }

    #[tokio::test]
    async fn eviction_does_not_tear_down_replacement_session() {
        let h = harness();
        let (_old_pushes, _old_ka) = connect(&h.registry, profile(1, &[("btcusdt", 1)]));
        h.registry.follow_topic(1, "btcusdt").await;

        let (_new_pushes, _new_ka) = connect(&h.registry, profile(1, &[("btcusdt", 1)]));

        // Give the evicted reader a chance to exit.
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(h.registry.has_session(1));
        assert!(h.bus.unsubscribes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reader_disconnect_triggers_teardown() {
        let h = harness();
        let (_pushes, keepalive) = connect(&h.registry, profile(1, &[("dogeusdt", 1)]));
        h.registry.follow_topic(1, "dogeusdt").await;

        drop(keepalive); // connection closes, reader sees end-of-stream

        tokio::time::timeout(Duration::from_secs(1), async {
            while h.registry.has_session(1) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(*h.bus.unsubscribes.lock().unwrap(), vec!["dogeusdt"]);
    }

    #[tokio::test]
    async fn dispatch_ignores_uninterested_sessions() {
        let h = harness();
        let (mut pushes_a, _ka_a) = connect(&h.registry, profile(1, &[("btcusdt", 1)]));
        let (mut pushes_b, _ka_b) = connect(&h.registry, profile(2, &[("ethusdt", 1)]));
        h.registry.follow_topic(1, "btcusdt").await;
        h.registry.follow_topic(2, "ethusdt").await;

        h.registry.dispatch("btcusdt", &tick("btcusdt", 7));

        assert!(pushes_a.recv().await.is_some());
        assert!(pushes_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn direct_push_targets_single_user() {
        let h = harness();
        let (mut pushes_a, _ka_a) = connect(&h.registry, profile(1, &[("btcusdt", 1)]));
        let (mut pushes_b, _ka_b) = connect(&h.registry, profile(2, &[("btcusdt", 1)]));
        h.registry.follow_topic(1, "btcusdt").await;
        h.registry.follow_topic(2, "btcusdt").await;

        let direct = Tick {
            symbol: "btcusdt".to_string(),
            price: Decimal::from(9),
            user_id: Some(2),
        };
        h.registry.dispatch("btcusdt", &direct);

        assert!(pushes_b.recv().await.is_some());
        assert!(pushes_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_subscribe_is_logged_not_fatal() {
        struct FailingBus;
        #[async_trait]
        impl TopicBus for FailingBus {
            async fn subscribe(&self, topic: &str) -> Result<(), BusError> {
                Err(BusError::Subscribe {
                    topic: topic.to_string(),
                    reason: "bus down".to_string(),
                })
            }
            async fn unsubscribe(&self, _topic: &str) -> Result<(), BusError> {
                Ok(())
            }
            async fn close(&self) {}
        }

        let notifier = Arc::new(RecordingNotifier::default());
        let registry = Arc::new(SessionRegistry::new(
            Arc::new(FailingBus),
            Arc::clone(&notifier) as Arc<dyn InterestNotifier>,
            SessionTiming::default(),
        ));

        registry.follow_topic(1, "btcusdt").await;
        // Interest recorded despite the failure.
        assert_eq!(registry.active_topic_count(), 1);
    }

    #[tokio::test]
    async fn run_decodes_and_dispatches_bus_messages() {
        let h = harness();
        let (mut pushes, _ka) = connect(&h.registry, profile(1, &[("btcusdt", 3)]));
        h.registry.follow_topic(1, "btcusdt").await;

        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let runner = tokio::spawn(Arc::clone(&h.registry).run(rx, cancel.clone()));

        tx.send(BusMessage {
            topic: "btcusdt".to_string(),
            payload: r#"{"s":"btcusdt","p":"50000"}"#.to_string(),
        })
        .await
        .unwrap();
        // Garbage is dropped without killing the loop.
        tx.send(BusMessage {
            topic: "btcusdt".to_string(),
            payload: "not json".to_string(),
        })
        .await
        .unwrap();
        tx.send(BusMessage {
            topic: "btcusdt".to_string(),
            payload: r#"{"s":"btcusdt","p":"51000"}"#.to_string(),
        })
        .await
        .unwrap();

        let first = pushes.recv().await.unwrap();
        assert!(first.contains("150000"));
        let second = pushes.recv().await.unwrap();
        assert!(second.contains("153000"));

        cancel.cancel();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn full_outbound_queue_drops_newest_and_keeps_order() {
        let bus = Arc::new(RecordingBus::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let timing = SessionTiming {
            outbound_capacity: 2,
            ..SessionTiming::default()
        };
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&bus) as Arc<dyn TopicBus>,
            Arc::clone(&notifier) as Arc<dyn InterestNotifier>,
            timing.clone(),
        ));

        // Build the session by hand so the writer never drains the queue.
        let (session, mut outbound_rx) =
            Session::new(profile(1, &[("btcusdt", 1)]), timing.outbound_capacity);
        let session = Arc::new(session);
        registry
            .state
            .write()
            .sessions
            .insert(1, Arc::clone(&session));
        registry.state.write().interest.follow(1, "btcusdt");

        registry.dispatch("btcusdt", &tick("btcusdt", 1));
        registry.dispatch("btcusdt", &tick("btcusdt", 2));
        registry.dispatch("btcusdt", &tick("btcusdt", 3)); // dropped

        let first = outbound_rx.recv().await.unwrap();
        let second = outbound_rx.recv().await.unwrap();
        assert!(first.contains("\"btcusdt\":\"1\""));
        assert!(second.contains("\"btcusdt\":\"2\""));
        assert!(outbound_rx.try_recv().is_err());
    }
}
