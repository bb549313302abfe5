//! Logged-in admin tracking for the mock server
//!
//! BattlEye identifies an admin by the address the login came from. Each
//! admin has its own server message counter and a set of messages the admin
//! has not acknowledged yet; those are sent again until the ack arrives or
//! the admin goes quiet for too long.

use log::info;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct Admin {
    pub addr: SocketAddr,
    /// Last time any datagram arrived from this admin
    pub last_seen: Instant,
    next_message: u8,
    unacked: BTreeMap<u8, String>,
}

impl Admin {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            last_seen: Instant::now(),
            next_message: 0,
            unacked: BTreeMap::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Assigns the next message sequence number and remembers the message
    /// until it is acknowledged.
    pub fn push_message(&mut self, text: &str) -> u8 {
        let sequence = self.next_message;
        self.next_message = self.next_message.wrapping_add(1);
        self.unacked.insert(sequence, text.to_string());
        sequence
    }

    pub fn acknowledge(&mut self, sequence: u8) -> bool {
        self.unacked.remove(&sequence).is_some()
    }

    pub fn unacked(&self) -> impl Iterator<Item = (u8, &str)> {
        self.unacked
            .iter()
            .map(|(sequence, text)| (*sequence, text.as_str()))
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

#[derive(Debug, Default)]
pub struct Admins {
    admins: HashMap<SocketAddr, Admin>,
}

impl Admins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh session for `addr`, replacing any earlier one.
    pub fn login(&mut self, addr: SocketAddr) {
        if self.admins.insert(addr, Admin::new(addr)).is_some() {
            info!("Admin at {} logged in again", addr);
        } else {
            info!("Admin at {} logged in", addr);
        }
    }

    pub fn get_mut(&mut self, addr: SocketAddr) -> Option<&mut Admin> {
        self.admins.get_mut(&addr)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Admin> {
        self.admins.values_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Admin> {
        self.admins.values()
    }

    /// Drops admins that have been silent longer than `timeout`.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<SocketAddr> {
        let timed_out: Vec<SocketAddr> = self
            .admins
            .values()
            .filter(|admin| admin.is_timed_out(timeout))
            .map(|admin| admin.addr)
            .collect();

        for addr in &timed_out {
            self.admins.remove(addr);
            info!("Admin at {} timed out", addr);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.admins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admins.is_empty()
    }
}
