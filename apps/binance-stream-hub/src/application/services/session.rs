//! Live Session State and Tasks
//!
//! One [`Session`] per connected user: the transport-agnostic record the
//! registry keeps, plus the writer and reader tasks that own the two
//! halves of the connection.
//!
//! # Exclusivity
//!
//! The writer task is the sole entity writing to the connection; the
//! reader task is the sole entity reading from it. The shared dispatch
//! path only enqueues onto the session's bounded outbound queue, so
//! fan-out never blocks on transport latency.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ConnectionSink, ConnectionSource, SessionFrame};
use crate::domain::ticks::{Symbol, UserId, UserProfile};

// =============================================================================
// Timing
// =============================================================================

/// Timing and capacity knobs for a session's tasks.
///
/// Defaults preserve the long-standing constants: 30s probe interval,
/// 60s read deadline, 10s write deadline, 100-message outbound queue.
#[derive(Debug, Clone)]
pub struct SessionTiming {
    /// Interval between liveness probes when no message was sent.
    pub ping_interval: Duration,
    /// Deadline for any inbound frame before the connection is dead.
    pub read_deadline: Duration,
    /// Deadline for one outbound write.
    pub write_deadline: Duration,
    /// Outbound queue capacity.
    pub outbound_capacity: usize,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            read_deadline: Duration::from_secs(60),
            write_deadline: Duration::from_secs(10),
            outbound_capacity: 100,
        }
    }
}

// =============================================================================
// Session Record
// =============================================================================

/// One live per-user session.
///
/// Owns the outbound queue sender and the cancellation token that closes
/// the session. The connection halves live in the writer/reader tasks,
/// never here.
#[derive(Debug)]
pub struct Session {
    /// Owning user id.
    pub user_id: UserId,
    /// Profile captured at registration (holdings drive valuations).
    pub profile: UserProfile,
    /// Last known price per symbol, filled by dispatch.
    pub prices: Mutex<HashMap<Symbol, Decimal>>,
    /// Outbound queue; dispatch enqueues serialized push documents.
    pub outbound: mpsc::Sender<String>,
    /// Cancelled to close the session; both tasks observe it.
    pub closed: CancellationToken,
}

impl Session {
    /// Create a session record and the receiving half of its queue.
    #[must_use]
    pub fn new(profile: UserProfile, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(capacity);
        let session = Self {
            user_id: profile.id,
            profile,
            prices: Mutex::new(HashMap::new()),
            outbound,
            closed: CancellationToken::new(),
        };
        (session, rx)
    }
}

// =============================================================================
// Writer Task
// =============================================================================

/// Drain the outbound queue to the connection, probing on idle.
///
/// Runs until the session is closed, the queue ends, or a write fails.
/// Always attempts a close frame on the way out; transport write
/// failures are left for the reader to observe as closure.
pub async fn run_writer(
    mut sink: Box<dyn ConnectionSink>,
    mut outbound: mpsc::Receiver<String>,
    closed: CancellationToken,
    timing: SessionTiming,
) {
    let mut probe = tokio::time::interval(timing.ping_interval);
    probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The immediate first tick would probe before anything was sent.
    probe.reset();

    loop {
        tokio::select! {
            () = closed.cancelled() => {
                sink.send_close().await;
                return;
            }
            msg = outbound.recv() => {
                let Some(msg) = msg else {
                    sink.send_close().await;
                    return;
                };
                match timeout(timing.write_deadline, sink.send_text(msg)).await {
                    Ok(Ok(())) => {
                        // A delivered message counts as liveness; probe
                        // only after a full idle interval.
                        probe.reset();
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "Session write failed");
                        return;
                    }
                    Err(_) => {
                        tracing::warn!("Session write deadline exceeded");
                        return;
                    }
                }
            }
            _ = probe.tick() => {
                match timeout(timing.write_deadline, sink.send_ping()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "Session probe failed");
                        return;
                    }
                    Err(_) => {
                        tracing::warn!("Session probe deadline exceeded");
                        return;
                    }
                }
            }
        }
    }
}

// =============================================================================
// Reader Task
// =============================================================================

/// Why the reader loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The session was closed by eviction or explicit teardown; the
    /// registry has already done (or is doing) the bookkeeping.
    Closed,
    /// The connection died: read error, close frame, or deadline expiry.
    /// The caller must tear the session down.
    ConnectionLost,
}

/// Block on inbound transport reads solely to detect liveness.
///
/// Every inbound frame (probe acknowledgements included) extends the
/// read deadline. No application-level input is expected; a close
/// frame, transport error, end-of-stream, or an expired deadline ends
/// the loop.
pub async fn run_reader(
    mut source: Box<dyn ConnectionSource>,
    closed: CancellationToken,
    timing: &SessionTiming,
) -> ReaderExit {
    loop {
        tokio::select! {
            () = closed.cancelled() => return ReaderExit::Closed,
            frame = timeout(timing.read_deadline, source.next_frame()) => {
                match frame {
                    Err(_) => {
                        tracing::warn!("Session read deadline expired");
                        return ReaderExit::ConnectionLost;
                    }
                    Ok(None) | Ok(Some(Ok(SessionFrame::Close))) => {
                        return ReaderExit::ConnectionLost;
                    }
                    Ok(Some(Err(e))) => {
                        tracing::debug!(error = %e, "Session read failed");
                        return ReaderExit::ConnectionLost;
                    }
                    Ok(Some(Ok(_))) => {
                        // Liveness signal; the next loop iteration re-arms
                        // the deadline.
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
