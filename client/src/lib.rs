//! # BattlEye RCon Client Library
//!
//! This library implements the client side of the BattlEye remote console
//! protocol used by Arma, DayZ and other games that ship with BattlEye. It
//! logs in to a game server over UDP, runs administrative commands, collects
//! their (possibly fragmented) responses and relays the messages the server
//! broadcasts to logged-in admins.
//!
//! ## Architecture Overview
//!
//! UDP offers no connection, so the client keeps its own idea of one. A
//! successful login starts a session with two background tasks:
//!
//! ### Receive Loop
//! Reads every datagram from the server, validates it and dispatches it:
//! command responses are reassembled and handed to the response handlers,
//! server messages are acknowledged first and then passed to the message
//! handlers. Datagrams that fail validation are logged and dropped.
//!
//! ### Liveness Monitor
//! Wakes up periodically. When nothing was sent for a while it sends an
//! empty command so the server keeps the session open; when a request stays
//! unanswered past the timeout it declares the connection lost and, if
//! configured, schedules a reconnect with the stored password.
//!
//! ### Command Queue
//! BattlEye answers one command at a time. Commands are queued and only the
//! head of the queue is on the wire; its response releases the next one.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! The public [`BattlEyeClient`] and its connection state machine.
//!
//! ### Events Module (`events`)
//! Listener traits and the registry they are stored in.
//!
//! ### Config Module (`config`)
//! Timeouts, intervals and the server address, loadable from JSON.
//!
//! ### Queue, Reassembly and Sequence Modules
//! The sans-IO pieces of the session: the single-in-flight command queue,
//! the multipart response buffer and the sequence number allocator.
//!
//! ### Liveness Module (`liveness`)
//! Send/receive bookkeeping and the monitor task.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use berc_client::{BattlEyeClient, ClientConfig};
//! use berc_shared::Command;
//!
//! # async fn run() -> berc_client::Result<()> {
//! let mut config = ClientConfig::new("127.0.0.1:2302".parse().unwrap());
//! config.auto_reconnect = true;
//!
//! let client = BattlEyeClient::new(config)?;
//! client.add_message_handler(|message: &str| println!("server: {}", message));
//! client.add_command_response_handler(|response: &str, id: u8| {
//!     println!("response to {}: {}", id, response);
//! });
//!
//! client.connect("changeme").await?;
//! client.send(Command::Say, &["-1", "Restart in 5 minutes"]).await?;
//! client.send_command("players").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod liveness;
pub mod network;
pub mod queue;
pub mod reassembly;
mod receiver;
pub mod sequence;
mod session;

pub use config::{ClientConfig, DEFAULT_PORT};
pub use error::{ClientError, Result};
pub use events::{
    CommandResponseHandler, ConnectionHandler, DisconnectReason, ListenerId, Listeners,
    MessageHandler,
};
pub use network::{BattlEyeClient, ConnectionState};
