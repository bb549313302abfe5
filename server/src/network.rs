//! Mock server network loop: a single task owning the socket, the admin
//! table and the retransmit timer.

use crate::admins::Admins;
use crate::config::MockServerConfig;
use crate::traffic::{Traffic, TrafficLog};
use berc_shared::{decode, fragment_response, Packet, PacketKind, MAX_DATAGRAM_SIZE};
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Control side of a running [`MockServer`].
#[derive(Debug, Clone)]
pub struct MockServerHandle {
    local_addr: SocketAddr,
    traffic: Arc<TrafficLog>,
    announce_tx: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
}

impl MockServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Broadcasts a server message to every logged-in admin.
    pub fn announce(&self, text: &str) {
        if self.announce_tx.send(text.to_string()).is_err() {
            warn!("Mock server stopped, dropping announcement");
        }
    }

    pub fn traffic(&self) -> Traffic {
        self.traffic.snapshot()
    }

    pub fn commands(&self) -> Vec<String> {
        self.traffic.commands()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

pub struct MockServer {
    socket: UdpSocket,
    local_addr: SocketAddr,
    config: MockServerConfig,
    admins: Admins,
    traffic: Arc<TrafficLog>,
    announce_tx: mpsc::UnboundedSender<String>,
    announce_rx: mpsc::UnboundedReceiver<String>,
    shutdown: CancellationToken,
}

impl MockServer {
    pub async fn bind(addr: impl ToSocketAddrs, config: MockServerConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        info!("Mock RCon server listening on {}", local_addr);

        let (announce_tx, announce_rx) = mpsc::unbounded_channel();

        Ok(Self {
            socket,
            local_addr,
            config,
            admins: Admins::new(),
            traffic: Arc::new(TrafficLog::new()),
            announce_tx,
            announce_rx,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> MockServerHandle {
        MockServerHandle {
            local_addr: self.local_addr,
            traffic: Arc::clone(&self.traffic),
            announce_tx: self.announce_tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Runs the server on its own task.
    pub fn spawn(self) -> (MockServerHandle, JoinHandle<()>) {
        let handle = self.handle();
        (handle, tokio::spawn(self.run()))
    }

    /// Serves until [`MockServerHandle::shutdown`] is called.
    pub async fn run(mut self) {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut retransmit = interval(self.config.retransmit_interval);
        retransmit.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        retransmit.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                result = self.socket.recv_from(&mut buffer) => match result {
                    Ok((len, addr)) => self.handle_datagram(&buffer[..len], addr).await,
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        sleep(Duration::from_millis(10)).await;
                    }
                },
                Some(text) = self.announce_rx.recv() => self.announce(&text).await,
                _ = retransmit.tick() => self.retransmit().await,
            }
        }

        info!("Mock RCon server on {} stopped", self.local_addr);
    }

    async fn handle_datagram(&mut self, bytes: &[u8], addr: SocketAddr) {
        let packet = match decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping datagram from {}: {}", addr, e);
                self.traffic.record_malformed();
                return;
            }
        };

        if packet.kind == PacketKind::Login {
            self.handle_login(&packet, addr).await;
            return;
        }
        if self.config.silent {
            debug!("Silent, ignoring {:?} from {}", packet.kind, addr);
            return;
        }

        match self.admins.get_mut(addr) {
            Some(admin) => admin.touch(),
            None => {
                debug!("Ignoring {:?} from {}, not logged in", packet.kind, addr);
                return;
            }
        }

        match (packet.kind, packet.sequence) {
            (PacketKind::Command, Some(sequence)) => {
                self.handle_command(sequence, &packet.text(), addr).await
            }
            (PacketKind::ServerMessage, Some(sequence)) => self.handle_ack(sequence, addr),
            (kind, sequence) => warn!("Unexpected {:?} seq={:?} from {}", kind, sequence, addr),
        }
    }

    async fn handle_login(&mut self, packet: &Packet, addr: SocketAddr) {
        let accepted = packet.payload == self.config.password.as_bytes();
        self.traffic.record_login(accepted);

        if accepted {
            self.admins.login(addr);
        } else {
            warn!("Rejected login from {}", addr);
        }
        self.send(&Packet::login_reply(accepted), addr).await;
    }

    async fn handle_command(&self, sequence: u8, text: &str, addr: SocketAddr) {
        self.traffic.record_command(text);
        let response = if text.is_empty() {
            ""
        } else {
            self.config.response_for(text)
        };
        debug!("Command {} from {}: '{}'", sequence, addr, text);

        let mut packets = fragment_response(sequence, response.as_bytes(), self.config.fragment_size);
        if self.config.shuffle_fragments {
            packets.shuffle(&mut rand::thread_rng());
        }
        for packet in &packets {
            self.send(packet, addr).await;
        }
    }

    fn handle_ack(&mut self, sequence: u8, addr: SocketAddr) {
        self.traffic.record_ack();
        let acknowledged = self
            .admins
            .get_mut(addr)
            .map_or(false, |admin| admin.acknowledge(sequence));
        if !acknowledged {
            debug!("Ack {} from {} matches no pending message", sequence, addr);
        }
    }

    async fn announce(&mut self, text: &str) {
        if self.config.silent {
            return;
        }
        let outgoing: Vec<(SocketAddr, Packet)> = self
            .admins
            .iter_mut()
            .map(|admin| {
                let sequence = admin.push_message(text);
                (admin.addr, Packet::server_message(sequence, text))
            })
            .collect();

        info!("Announcing '{}' to {} admin(s)", text, outgoing.len());
        for (addr, packet) in &outgoing {
            self.send(packet, *addr).await;
        }
    }

    async fn retransmit(&mut self) {
        self.admins.check_timeouts(self.config.admin_timeout);

        let outgoing: Vec<(SocketAddr, Packet)> = self
            .admins
            .iter()
            .flat_map(|admin| {
                admin
                    .unacked()
                    .map(move |(sequence, text)| (admin.addr, Packet::server_message(sequence, text)))
            })
            .collect();

        for (addr, packet) in &outgoing {
            debug!("Resending server message {:?} to {}", packet.sequence, addr);
            self.send(packet, *addr).await;
        }
    }

    async fn send(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = self.socket.send_to(&packet.encode(), addr).await {
            error!("Failed to send packet to {}: {}", addr, e);
        }
    }
}
