//! Counters for what the mock server has seen, so tests can assert on the
//! client's behaviour from the other side of the wire.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Traffic {
    pub logins: usize,
    pub failed_logins: usize,
    pub commands: usize,
    pub keep_alives: usize,
    pub acks: usize,
    pub malformed: usize,
}

#[derive(Debug, Default)]
pub struct TrafficLog {
    logins: AtomicUsize,
    failed_logins: AtomicUsize,
    commands: AtomicUsize,
    keep_alives: AtomicUsize,
    acks: AtomicUsize,
    malformed: AtomicUsize,
    command_log: Mutex<Vec<String>>,
}

impl TrafficLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_login(&self, accepted: bool) {
        if accepted {
            self.logins.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_logins.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_command(&self, text: &str) {
        if text.is_empty() {
            self.keep_alives.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.commands.fetch_add(1, Ordering::Relaxed);
        self.command_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
    }

    pub(crate) fn record_ack(&self) {
        self.acks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Traffic {
        Traffic {
            logins: self.logins.load(Ordering::Relaxed),
            failed_logins: self.failed_logins.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            keep_alives: self.keep_alives.load(Ordering::Relaxed),
            acks: self.acks.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }

    /// Non-empty commands in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.command_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
