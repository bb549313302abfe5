//! Single-in-flight command queue.
//!
//! BattlEye echoes the sequence number of the command a response belongs to,
//! but over UDP responses can be lost or reordered, and multi-part responses
//! share one reassembly slot. Keeping at most one command on the wire avoids
//! any ambiguity about which command a fragment belongs to.
//!
//! The queue does no I/O. Operations hand back the packet that has to go on
//! the wire now, and the caller transmits it while still holding the queue.

use crate::error::{ClientError, Result};
use crate::sequence::SequenceAllocator;
use berc_shared::Packet;
use log::{debug, warn};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub id: u8,
    pub text: String,
}

impl PendingCommand {
    pub fn packet(&self) -> Packet {
        Packet::command(self.id, &self.text)
    }
}

/// Result of `CommandQueue::enqueue`.
#[derive(Debug)]
pub struct Enqueued {
    pub id: u8,
    /// Set when the queue was empty, i.e. this command goes out immediately.
    pub transmit: Option<Packet>,
}

#[derive(Debug)]
pub struct CommandQueue {
    pending: VecDeque<PendingCommand>,
    capacity: usize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            capacity,
        }
    }

    pub fn enqueue(&mut self, sequence: &SequenceAllocator, text: &str) -> Result<Enqueued> {
        if self.pending.len() >= self.capacity {
            return Err(ClientError::QueueFull {
                capacity: self.capacity,
            });
        }

        let command = PendingCommand {
            id: sequence.next(),
            text: text.to_string(),
        };
        let id = command.id;
        let transmit = self.pending.is_empty().then(|| command.packet());
        self.pending.push_back(command);

        if transmit.is_none() {
            debug!(
                "Command {} queued behind {} pending",
                id,
                self.pending.len() - 1
            );
        }

        Ok(Enqueued { id, transmit })
    }

    /// Retires the head once its response has been delivered and returns
    /// the packet of the next command, if any.
    pub fn complete_head(&mut self, responding_id: u8) -> Option<Packet> {
        match self.pending.pop_front() {
            Some(head) if head.id != responding_id => {
                warn!(
                    "Response for command {} completed pending command {} ({})",
                    responding_id, head.id, head.text
                );
            }
            Some(_) => {}
            None => {
                warn!(
                    "Response for command {} arrived with no command pending",
                    responding_id
                );
                return None;
            }
        }

        self.pending.front().map(PendingCommand::packet)
    }

    /// Drops a command that never made it onto the wire.
    pub fn remove(&mut self, id: u8) -> bool {
        match self.pending.iter().position(|command| command.id == id) {
            Some(index) => self.pending.remove(index).is_some(),
            None => false,
        }
    }

    pub fn head(&self) -> Option<&PendingCommand> {
        self.pending.front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
