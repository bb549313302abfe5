//! State shared by the receive loop, the liveness monitor and command
//! submission for one logged-in session.
//!
//! A fresh `Session` is built for every connect attempt, so sequence
//! numbers, timestamps, the command queue and any half-assembled response
//! start clean after a reconnect. Loops belonging to an earlier session keep
//! their own `Arc<Session>` and can never touch the new one.

use crate::error::Result;
use crate::liveness::Timestamps;
use crate::queue::{CommandQueue, PendingCommand};
use crate::reassembly::{FragmentOutcome, ReassemblyBuffer};
use crate::sequence::SequenceAllocator;
use berc_shared::{Packet, PacketKind};
use log::{debug, error};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Mutex, PoisonError};
use tokio::net::UdpSocket;

pub(crate) struct Session {
    pub(crate) generation: u64,
    pub(crate) socket: UdpSocket,
    pub(crate) server_addr: SocketAddr,
    pub(crate) timestamps: Timestamps,
    sequence: SequenceAllocator,
    queue: tokio::sync::Mutex<CommandQueue>,
    reassembly: Mutex<ReassemblyBuffer>,
    keep_alive: Mutex<Option<u8>>,
    last_message: Mutex<Option<u8>>,
}

impl Session {
    /// Binds an ephemeral local port and associates it with the server.
    pub(crate) async fn open(
        server_addr: SocketAddr,
        generation: u64,
        queue_capacity: usize,
    ) -> io::Result<Self> {
        let local: SocketAddr = if server_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(server_addr).await?;
        debug!(
            "Session {} bound to {} for {}",
            generation,
            socket.local_addr()?,
            server_addr
        );

        Ok(Self {
            generation,
            socket,
            server_addr,
            timestamps: Timestamps::new(),
            sequence: SequenceAllocator::new(),
            queue: tokio::sync::Mutex::new(CommandQueue::new(queue_capacity)),
            reassembly: Mutex::new(ReassemblyBuffer::new()),
            keep_alive: Mutex::new(None),
            last_message: Mutex::new(None),
        })
    }

    /// Encodes into a buffer of its own and writes one datagram.
    pub(crate) async fn send(&self, packet: &Packet) -> io::Result<()> {
        let frame = packet.encode();
        // Stamped before the write: the reply may be recorded by the receive
        // loop before `send` returns. Only commands (including keep-alives)
        // expect the server to answer.
        self.timestamps
            .mark_sent(packet.kind == PacketKind::Command);
        self.socket.send(&frame).await?;
        debug!(
            "Sent {:?} seq={:?} ({} bytes)",
            packet.kind,
            packet.sequence,
            frame.len()
        );
        Ok(())
    }

    /// Queues a command, transmitting it right away if nothing is in flight.
    pub(crate) async fn submit(&self, text: &str) -> Result<u8> {
        let mut queue = self.queue.lock().await;
        let enqueued = queue.enqueue(&self.sequence, text)?;

        if let Some(packet) = enqueued.transmit {
            self.timestamps.mark_command_sent();
            if let Err(e) = self.send(&packet).await {
                queue.remove(enqueued.id);
                self.timestamps.mark_command_settled();
                return Err(e.into());
            }
        }
        Ok(enqueued.id)
    }

    /// Retires the in-flight command and puts the next one on the wire.
    pub(crate) async fn complete(&self, responding_id: u8) {
        let mut queue = self.queue.lock().await;
        match queue.complete_head(responding_id) {
            Some(next) => {
                self.timestamps.mark_command_sent();
                if let Err(e) = self.send(&next).await {
                    error!(
                        "Failed to send queued command {:?}: {}",
                        next.sequence, e
                    );
                }
            }
            None => self.timestamps.mark_command_settled(),
        }
    }

    /// Empty command outside the queue; its reply is swallowed by
    /// `take_keep_alive`.
    pub(crate) async fn send_keep_alive(&self) -> io::Result<u8> {
        let sequence = self.sequence.next();
        *self
            .keep_alive
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(sequence);
        self.send(&Packet::keep_alive(sequence)).await?;
        Ok(sequence)
    }

    /// True (once) when `sequence` answers the outstanding keep-alive.
    pub(crate) fn take_keep_alive(&self, sequence: u8) -> bool {
        let mut keep_alive = self
            .keep_alive
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *keep_alive == Some(sequence) {
            *keep_alive = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn push_fragment(&self, total: u8, index: u8, data: &[u8]) -> FragmentOutcome {
        self.reassembly
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(total, index, data)
    }

    /// Records a server message sequence number. Returns true when it repeats
    /// the previous one, meaning the server resent a message whose
    /// acknowledgement it missed.
    pub(crate) fn is_retransmission(&self, sequence: u8) -> bool {
        let mut last = self
            .last_message
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let repeated = *last == Some(sequence);
        *last = Some(sequence);
        repeated
    }

    pub(crate) async fn pending_commands(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// The command on the wire, if any.
    pub(crate) async fn in_flight(&self) -> Option<PendingCommand> {
        self.queue.lock().await.head().cloned()
    }

    /// Drops queued commands and any partial response.
    pub(crate) async fn clear(&self) {
        self.queue.lock().await.clear();
        self.timestamps.mark_command_settled();
        let mut reassembly = self
            .reassembly
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if reassembly.is_active() {
            debug!("Discarding partial response of session {}", self.generation);
        }
        reassembly.clear();
        drop(reassembly);
        *self
            .keep_alive
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use berc_shared::decode;
    use std::time::Duration;
    use tokio::time::timeout;

    /// A session connected to a loopback socket standing in for the server.
    pub(crate) async fn session_pair() -> (Session, UdpSocket) {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let session = Session::open(server.local_addr().unwrap(), 1, 8)
            .await
            .unwrap();
        (session, server)
    }

    pub(crate) async fn recv_packet(server: &UdpSocket) -> Option<Packet> {
        let mut buffer = [0u8; 2048];
        match timeout(Duration::from_millis(200), server.recv(&mut buffer)).await {
            Ok(Ok(len)) => Some(decode(&buffer[..len]).unwrap()),
            _ => None,
        }
    }

    async fn accept_client(session: &Session, server: &UdpSocket) {
        server
            .connect(session.socket.local_addr().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_submit_transmits_only_head() {
        let (session, server) = session_pair().await;
        accept_client(&session, &server).await;

        assert_eq!(session.submit("players").await.unwrap(), 0);
        assert_eq!(session.submit("bans").await.unwrap(), 1);
        assert_eq!(session.pending_commands().await, 2);

        assert_eq!(recv_packet(&server).await, Some(Packet::command(0, "players")));
        assert_eq!(recv_packet(&server).await, None);

        session.complete(0).await;
        assert_eq!(recv_packet(&server).await, Some(Packet::command(1, "bans")));
        assert_eq!(session.pending_commands().await, 1);
    }

    #[tokio::test]
    async fn test_in_flight_command_tracked_until_answered() {
        let (session, server) = session_pair().await;
        accept_client(&session, &server).await;
        assert!(session.timestamps.command_waiting_for().is_none());

        session.submit("players").await.unwrap();
        session.submit("bans").await.unwrap();
        assert!(session.timestamps.command_waiting_for().is_some());

        // Traffic other than the response does not settle the command
        session.timestamps.mark_received();
        assert!(session.timestamps.command_waiting_for().is_some());
        assert_eq!(session.in_flight().await.map(|c| c.id), Some(0));

        session.complete(0).await;
        assert!(session.timestamps.command_waiting_for().is_some());
        session.complete(1).await;
        assert!(session.timestamps.command_waiting_for().is_none());
        assert!(session.in_flight().await.is_none());
    }

    #[tokio::test]
    async fn test_keep_alive_bypasses_queue() {
        let (session, server) = session_pair().await;
        accept_client(&session, &server).await;

        session.submit("players").await.unwrap();
        let keep_alive = session.send_keep_alive().await.unwrap();

        assert_eq!(keep_alive, 1);
        assert_eq!(recv_packet(&server).await, Some(Packet::command(0, "players")));
        assert_eq!(recv_packet(&server).await, Some(Packet::keep_alive(1)));
        assert_eq!(session.pending_commands().await, 1);

        assert!(!session.take_keep_alive(0));
        assert!(session.take_keep_alive(1));
        assert!(!session.take_keep_alive(1));
    }

    #[tokio::test]
    async fn test_retransmission_detection() {
        let (session, _server) = session_pair().await;

        assert!(!session.is_retransmission(0));
        assert!(session.is_retransmission(0));
        assert!(!session.is_retransmission(1));
        assert!(!session.is_retransmission(0));
    }

    #[tokio::test]
    async fn test_send_marks_requests_only() {
        let (session, server) = session_pair().await;
        accept_client(&session, &server).await;

        session.send(&Packet::acknowledge(3)).await.unwrap();
        assert!(session.timestamps.unanswered_for().is_none());

        session.send(&Packet::keep_alive(0)).await.unwrap();
        assert!(session.timestamps.unanswered_for().is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let (session, server) = session_pair().await;
        accept_client(&session, &server).await;

        session.submit("players").await.unwrap();
        session.push_fragment(2, 0, b"half");
        session.clear().await;

        assert_eq!(session.pending_commands().await, 0);
        assert!(session.timestamps.command_waiting_for().is_none());
        assert_eq!(
            session.push_fragment(1, 0, b"fresh"),
            FragmentOutcome::Complete(b"fresh".to_vec())
        );
    }
}
