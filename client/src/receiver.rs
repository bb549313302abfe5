//! Receive loop and inbound packet dispatch.

use crate::events::Listeners;
use crate::network::ClientInner;
use crate::reassembly::FragmentOutcome;
use crate::session::Session;
use berc_shared::{decode, Packet, PacketKind, ResponseBody, MAX_DATAGRAM_SIZE};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Reads datagrams until the session is cancelled or the socket fails.
///
/// Undecodable datagrams are dropped; they neither stop the loop nor count
/// as traffic for liveness purposes.
pub(crate) async fn run_receiver(
    client: Arc<ClientInner>,
    session: Arc<Session>,
    cancel: CancellationToken,
) {
    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = session.socket.recv(&mut buffer) => result,
        };

        match result {
            Ok(len) => match decode(&buffer[..len]) {
                Ok(packet) => {
                    session.timestamps.mark_received();
                    dispatch(&session, client.listeners(), packet).await;
                }
                Err(e) => warn!("Dropping datagram from {}: {}", session.server_addr, e),
            },
            Err(e) => {
                if cancel.is_cancelled() {
                    break;
                }
                error!("Error receiving from {}: {}", session.server_addr, e);
                client.connection_lost(session.generation).await;
                break;
            }
        }
    }

    debug!("Receive loop for session {} stopped", session.generation);
}

pub(crate) async fn dispatch(session: &Session, listeners: &Listeners, packet: Packet) {
    match (packet.kind, packet.sequence) {
        (PacketKind::Command, Some(sequence)) => {
            handle_command_response(session, listeners, sequence, &packet.payload).await
        }
        (PacketKind::ServerMessage, Some(sequence)) => {
            handle_server_message(session, listeners, sequence, &packet).await
        }
        (PacketKind::Login, _) => {
            info!("Ignoring login reply outside of the handshake");
        }
        (kind, None) => {
            warn!("Ignoring {:?} packet without sequence number", kind);
        }
    }
}

async fn handle_command_response(
    session: &Session,
    listeners: &Listeners,
    sequence: u8,
    payload: &[u8],
) {
    let body = match ResponseBody::parse(payload) {
        Ok(body) => body,
        Err(e) => {
            warn!("Dropping response to command {}: {}", sequence, e);
            return;
        }
    };

    match body {
        ResponseBody::Empty => {
            if session.take_keep_alive(sequence) {
                debug!("Keep-alive {} answered", sequence);
                return;
            }
            deliver(session, listeners, sequence, "").await;
        }
        ResponseBody::Single(text) => {
            deliver(session, listeners, sequence, &String::from_utf8_lossy(text)).await;
        }
        ResponseBody::Fragment { total, index, data } => {
            match session.push_fragment(total, index, data) {
                FragmentOutcome::Complete(joined) => {
                    deliver(session, listeners, sequence, &String::from_utf8_lossy(&joined)).await;
                }
                FragmentOutcome::Pending { received, expected } => {
                    debug!(
                        "Fragment {} of response {} ({}/{})",
                        index, sequence, received, expected
                    );
                }
                FragmentOutcome::Rejected(reason) => {
                    warn!(
                        "Dropping fragment {}/{} of response {}: {}",
                        index, total, sequence, reason
                    );
                }
            }
        }
    }
}

async fn deliver(session: &Session, listeners: &Listeners, sequence: u8, response: &str) {
    debug!("Response to command {} ({} bytes)", sequence, response.len());
    listeners.fire_command_response(response, sequence);
    session.complete(sequence).await;
}

async fn handle_server_message(
    session: &Session,
    listeners: &Listeners,
    sequence: u8,
    packet: &Packet,
) {
    // The server keeps resending until it sees this, so it goes out before
    // anything else happens.
    if let Err(e) = session.send(&Packet::acknowledge(sequence)).await {
        error!("Failed to acknowledge server message {}: {}", sequence, e);
    }

    if session.is_retransmission(sequence) {
        debug!("Server message {} repeated, already delivered", sequence);
        return;
    }

    let message = packet.text();
    if message.is_empty() {
        return;
    }
    listeners.fire_server_message(&message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{recv_packet, session_pair};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Seen {
        responses: Mutex<Vec<(u8, String)>>,
        messages: Mutex<Vec<String>>,
    }

    fn recording_listeners() -> (Listeners, Arc<Seen>) {
        let listeners = Listeners::new();
        let seen = Arc::new(Seen::default());

        let sink = Arc::clone(&seen);
        listeners.add_command_response_handler(move |text: &str, id: u8| {
            sink.responses.lock().unwrap().push((id, text.to_string()));
        });
        let sink = Arc::clone(&seen);
        listeners.add_message_handler(move |text: &str| {
            sink.messages.lock().unwrap().push(text.to_string());
        });

        (listeners, seen)
    }

    fn fragment(sequence: u8, total: u8, index: u8, text: &str) -> Packet {
        let mut payload = vec![0x00, total, index];
        payload.extend_from_slice(text.as_bytes());
        Packet::new(PacketKind::Command, Some(sequence), payload)
    }

    #[tokio::test]
    async fn test_single_response_is_delivered_and_completes_head() {
        let (session, server) = session_pair().await;
        server
            .connect(session.socket.local_addr().unwrap())
            .await
            .unwrap();
        let (listeners, seen) = recording_listeners();

        session.submit("players").await.unwrap();
        session.submit("bans").await.unwrap();
        recv_packet(&server).await.unwrap();

        dispatch(&session, &listeners, Packet::command(0, "Players on server:")).await;

        assert_eq!(
            *seen.responses.lock().unwrap(),
            vec![(0, "Players on server:".to_string())]
        );
        assert_eq!(recv_packet(&server).await, Some(Packet::command(1, "bans")));
    }

    #[tokio::test]
    async fn test_fragments_reassemble_in_index_order() {
        let (session, _server) = session_pair().await;
        let (listeners, seen) = recording_listeners();
        session.submit("players").await.unwrap();

        dispatch(&session, &listeners, fragment(0, 3, 2, "ld")).await;
        dispatch(&session, &listeners, fragment(0, 3, 0, "he")).await;
        assert!(seen.responses.lock().unwrap().is_empty());
        assert_eq!(session.pending_commands().await, 1);

        dispatch(&session, &listeners, fragment(0, 3, 1, "llo, wor")).await;

        assert_eq!(
            *seen.responses.lock().unwrap(),
            vec![(0, "hello, world".to_string())]
        );
        assert_eq!(session.pending_commands().await, 0);
    }

    #[tokio::test]
    async fn test_empty_response_is_delivered() {
        let (session, _server) = session_pair().await;
        let (listeners, seen) = recording_listeners();
        session.submit("say -1 hi").await.unwrap();

        dispatch(&session, &listeners, Packet::keep_alive(0)).await;

        assert_eq!(*seen.responses.lock().unwrap(), vec![(0, String::new())]);
        assert_eq!(session.pending_commands().await, 0);
    }

    #[tokio::test]
    async fn test_keep_alive_reply_is_swallowed() {
        let (session, _server) = session_pair().await;
        let (listeners, seen) = recording_listeners();
        session.submit("players").await.unwrap();
        let keep_alive = session.send_keep_alive().await.unwrap();

        dispatch(&session, &listeners, Packet::keep_alive(keep_alive)).await;

        assert!(seen.responses.lock().unwrap().is_empty());
        assert_eq!(session.pending_commands().await, 1);
    }

    #[tokio::test]
    async fn test_server_message_acknowledged_before_delivery() {
        let server = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        server
            .set_read_timeout(Some(std::time::Duration::from_millis(200)))
            .unwrap();
        let session = Session::open(server.local_addr().unwrap(), 1, 8)
            .await
            .unwrap();
        let server = Arc::new(server);

        let listeners = Listeners::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&order);
        let ack_reader = Arc::clone(&server);
        listeners.add_message_handler(move |text: &str| {
            // The ack must already be sitting in the server's receive buffer.
            let mut buffer = [0u8; 64];
            let acked = ack_reader
                .recv_from(&mut buffer)
                .ok()
                .and_then(|(len, _)| decode(&buffer[..len]).ok());
            sink.lock().unwrap().push((acked, text.to_string()));
        });

        dispatch(
            &session,
            &listeners,
            Packet::server_message(5, "Player X connected"),
        )
        .await;

        let order = order.lock().unwrap();
        assert_eq!(order.len(), 1);
        assert_eq!(order[0].0, Some(Packet::acknowledge(5)));
        assert_eq!(order[0].1, "Player X connected");

        let mut buffer = [0u8; 64];
        assert!(server.recv_from(&mut buffer).is_err());
    }

    #[tokio::test]
    async fn test_repeated_server_message_acked_but_not_redelivered() {
        let (session, server) = session_pair().await;
        server
            .connect(session.socket.local_addr().unwrap())
            .await
            .unwrap();
        let (listeners, seen) = recording_listeners();

        let message = Packet::server_message(7, "RCon admin #0 logged in");
        dispatch(&session, &listeners, message.clone()).await;
        dispatch(&session, &listeners, message).await;

        assert_eq!(recv_packet(&server).await, Some(Packet::acknowledge(7)));
        assert_eq!(recv_packet(&server).await, Some(Packet::acknowledge(7)));
        assert_eq!(seen.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_server_message_acked_only() {
        let (session, server) = session_pair().await;
        server
            .connect(session.socket.local_addr().unwrap())
            .await
            .unwrap();
        let (listeners, seen) = recording_listeners();

        dispatch(&session, &listeners, Packet::server_message(0, "")).await;

        assert_eq!(recv_packet(&server).await, Some(Packet::acknowledge(0)));
        assert!(seen.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stray_login_reply_ignored() {
        let (session, _server) = session_pair().await;
        let (listeners, seen) = recording_listeners();
        session.submit("players").await.unwrap();

        dispatch(&session, &listeners, Packet::login_reply(true)).await;

        assert!(seen.responses.lock().unwrap().is_empty());
        assert_eq!(session.pending_commands().await, 1);
    }
}
