//! # Mock BattlEye RCon Server
//!
//! A small stand-in for the RCon endpoint of a BattlEye-protected game
//! server. It speaks the same wire format as the real thing and is used by
//! the client's integration tests and for trying the console client without
//! a game server at hand.
//!
//! ## Behaviour
//!
//! ### Login
//! Logins carrying the configured password are answered with `0x01` and the
//! sender becomes a logged-in admin; anything else gets `0x00`. Logging in
//! again from the same address starts a fresh admin session.
//!
//! ### Commands
//! Commands are answered from a canned response table (`players`, `bans`,
//! `missions`, otherwise `Unknown command`). Empty commands, which clients
//! use as keep-alives, get an empty response. Long responses are split into
//! multi-part fragments and can be sent out of order to exercise
//! reassembly.
//!
//! ### Server Messages
//! [`MockServerHandle::announce`] pushes a message to every admin. A message
//! is resent on every retransmit tick until the admin acknowledges it, like
//! a real server does.
//!
//! ### Silent Mode
//! Accepts the login and then ignores everything, which is how a server that
//! went away looks from the client side.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use berc_server::{MockServer, MockServerConfig};
//!
//! # async fn run() -> std::io::Result<()> {
//! let server = MockServer::bind("127.0.0.1:0", MockServerConfig::new("secret")).await?;
//! let (handle, _task) = server.spawn();
//!
//! // ... point a client at handle.local_addr() ...
//! handle.announce("Player #0 Miller connected");
//! assert_eq!(handle.traffic().malformed, 0);
//! handle.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod admins;
pub mod config;
pub mod network;
pub mod traffic;

pub use config::{MockServerConfig, DEFAULT_PASSWORD, UNKNOWN_COMMAND};
pub use network::{MockServer, MockServerHandle};
pub use traffic::{Traffic, TrafficLog};
