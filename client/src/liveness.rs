//! Liveness monitoring.
//!
//! UDP gives no signal when the peer disappears, and a BattlEye server only
//! speaks when spoken to (apart from server messages). The client therefore
//! keeps the session warm with empty commands and treats a request that goes
//! unanswered for longer than the timeout as a lost connection. The command
//! in flight is tracked on its own: other traffic arriving in the meantime
//! does not count as its answer.

use crate::network::ClientInner;
use crate::session::Session;
use log::{debug, error, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Marks `command_sent` while no command is on the wire.
const NOTHING_IN_FLIGHT: u64 = u64::MAX;

/// Send/receive timestamps, stored as microseconds since the session began
/// so they can be shared without a lock.
#[derive(Debug)]
pub struct Timestamps {
    epoch: Instant,
    last_sent: AtomicU64,
    last_request: AtomicU64,
    last_received: AtomicU64,
    command_sent: AtomicU64,
}

impl Default for Timestamps {
    fn default() -> Self {
        Self::new()
    }
}

impl Timestamps {
    /// All timestamps start at "now".
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_sent: AtomicU64::new(0),
            last_request: AtomicU64::new(0),
            last_received: AtomicU64::new(0),
            command_sent: AtomicU64::new(NOTHING_IN_FLIGHT),
        }
    }

    fn now(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn since(&self, timestamp: &AtomicU64) -> Duration {
        let then = timestamp.load(Ordering::Acquire);
        Duration::from_micros(self.now().saturating_sub(then))
    }

    /// `expects_reply` is false for acknowledgements, which the server never
    /// answers.
    pub fn mark_sent(&self, expects_reply: bool) {
        let now = self.now();
        self.last_sent.store(now, Ordering::Release);
        if expects_reply {
            self.last_request.store(now, Ordering::Release);
        }
    }

    pub fn mark_received(&self) {
        self.last_received.store(self.now(), Ordering::Release);
    }

    pub fn since_last_sent(&self) -> Duration {
        self.since(&self.last_sent)
    }

    pub fn since_last_received(&self) -> Duration {
        self.since(&self.last_received)
    }

    /// How long the latest request has waited, if nothing arrived after it.
    pub fn unanswered_for(&self) -> Option<Duration> {
        let request = self.last_request.load(Ordering::Acquire);
        let received = self.last_received.load(Ordering::Acquire);
        (request > received).then(|| self.since(&self.last_request))
    }

    /// Called when a queued command is about to go on the wire.
    pub fn mark_command_sent(&self) {
        self.command_sent.store(self.now(), Ordering::Release);
    }

    /// Called once the in-flight command is answered or dropped.
    pub fn mark_command_settled(&self) {
        self.command_sent.store(NOTHING_IN_FLIGHT, Ordering::Release);
    }

    /// How long the command on the wire has waited for its full response.
    pub fn command_waiting_for(&self) -> Option<Duration> {
        let sent = self.command_sent.load(Ordering::Acquire);
        (sent != NOTHING_IN_FLIGHT).then(|| Duration::from_micros(self.now().saturating_sub(sent)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Healthy,
    KeepAliveDue,
    TimedOut(Duration),
}

pub fn assess(timestamps: &Timestamps, timeout: Duration, keep_alive_interval: Duration) -> Liveness {
    let waiting = timestamps
        .unanswered_for()
        .into_iter()
        .chain(timestamps.command_waiting_for())
        .max();
    if let Some(waiting) = waiting {
        if waiting > timeout {
            return Liveness::TimedOut(waiting);
        }
    }
    if timestamps.since_last_sent() > keep_alive_interval {
        Liveness::KeepAliveDue
    } else {
        Liveness::Healthy
    }
}

/// Runs until the session is cancelled or declared lost.
pub(crate) async fn run_monitor(
    client: Arc<ClientInner>,
    session: Arc<Session>,
    cancel: CancellationToken,
) {
    let config = client.config();
    let mut ticker = interval(config.monitor_tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick since it fires immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match assess(
            &session.timestamps,
            config.timeout,
            config.keep_alive_interval,
        ) {
            Liveness::Healthy => {}
            Liveness::KeepAliveDue => match session.send_keep_alive().await {
                Ok(sequence) => debug!("Sent keep-alive {}", sequence),
                Err(e) => error!("Failed to send keep-alive: {}", e),
            },
            Liveness::TimedOut(waiting) => {
                warn!(
                    "No reply from {} for {:?} (last datagram {:?} ago)",
                    session.server_addr,
                    waiting,
                    session.timestamps.since_last_received()
                );
                if let Some(command) = session.in_flight().await {
                    warn!("Command {} ({}) went unanswered", command.id, command.text);
                }
                client.connection_lost(session.generation).await;
                break;
            }
        }
    }

    debug!("Liveness monitor for session {} stopped", session.generation);
}
