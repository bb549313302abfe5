//! Mock server settings and its canned command responses.

use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_PASSWORD: &str = "changeme";

/// Answer for commands missing from the response table.
pub const UNKNOWN_COMMAND: &str = "Unknown command";

const PLAYERS: &str = "Players on server:
[#] [IP Address]:[Port] [Ping] [GUID] [Name]
--------------------------------------------------
0   192.168.1.10:2304     31   3b8e0d1c52a44a9fbd2e7c1f0c9a6e51(OK) Miller
1   10.0.0.23:2316        48   9f2c11a0d7e34b5c8e6f1a2b3c4d5e6f(OK) Kerry
(2 players in total)";

const BANS: &str = "GUID Bans:
[#] [GUID] [Minutes left] [Reason]
----------------------------------------
0  7a1c4e2f9b0d4c3e8f5a6b7c8d9e0f1a perm Cheating

IP Bans:
[#] [IP Address] [Minutes left] [Reason]
----------------------------------------------
1  203.0.113.7    1440 Spamming";

const MISSIONS: &str = "Missions on server:
co10_Escape.Altis
wasteland.Stratis
KOTH.Tanoa";

#[derive(Debug, Clone)]
pub struct MockServerConfig {
    /// Password admins must log in with
    pub password: String,
    /// Largest response text sent in one datagram; longer ones are split
    pub fragment_size: usize,
    /// Send the fragments of a multi-part response in random order
    pub shuffle_fragments: bool,
    /// How often unacknowledged server messages are sent again
    pub retransmit_interval: Duration,
    /// Admins that stay quiet this long are logged out
    pub admin_timeout: Duration,
    /// Answer logins, ignore everything afterwards
    pub silent: bool,
    /// Keyed by lower-case command name
    pub responses: HashMap<String, String>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        let responses = [("players", PLAYERS), ("bans", BANS), ("missions", MISSIONS)]
            .into_iter()
            .map(|(command, text)| (command.to_string(), text.to_string()))
            .collect();

        Self {
            password: DEFAULT_PASSWORD.to_string(),
            fragment_size: 1024,
            shuffle_fragments: false,
            retransmit_interval: Duration::from_secs(1),
            admin_timeout: Duration::from_secs(45),
            silent: false,
            responses,
        }
    }
}

impl MockServerConfig {
    pub fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
            ..Self::default()
        }
    }

    /// Adds or replaces the canned answer for `command`.
    pub fn with_response(mut self, command: &str, text: &str) -> Self {
        self.responses
            .insert(command.to_ascii_lowercase(), text.to_string());
        self
    }

    /// Looks the command up by its first word, ignoring case.
    pub fn response_for(&self, command: &str) -> &str {
        let name = command.split_whitespace().next().unwrap_or_default();
        self.responses
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or(UNKNOWN_COMMAND)
    }
}
