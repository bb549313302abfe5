use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Administrative commands understood by BattlEye-enabled servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Reload the server config file loaded by the `-config` option.
    Init,
    /// Restart the mission.
    Restart,
    /// Start over and reassign roles.
    Reassign,
    /// Shut the server down.
    Shutdown,
    /// Prevent new clients from joining.
    Lock,
    /// Allow new clients to join again.
    Unlock,
    /// `#mission <filename>`: select a mission by name.
    Mission,
    /// List the missions available on the server.
    Missions,
    /// List players with their BE GUIDs and pings.
    Players,
    /// `say <player#> <text>`; `-1` addresses everyone.
    Say,
    /// `kick <player#>`
    Kick,
    /// `RConPassword <password>`
    RConPassword,
    /// `MaxPing <ping>`: players above it get kicked.
    MaxPing,
    /// Reload scripts.txt without a restart.
    LoadScripts,
    /// Reload createvehicle.txt, remoteexec.txt and publicvariable.txt.
    LoadEvents,
    /// Reload bans.txt.
    LoadBans,
    /// List all BE server bans.
    Bans,
    /// `ban <player#> [minutes] [reason]`; no time or 0 means permanent.
    Ban,
    /// `addBan <GUID> [minutes] [reason]`, for players not on the server.
    AddBan,
    /// `removeBan <ban#>`
    RemoveBan,
    /// Remove expired bans from the bans file.
    WriteBans,
}

impl Command {
    pub const ALL: [Command; 21] = [
        Command::Init,
        Command::Restart,
        Command::Reassign,
        Command::Shutdown,
        Command::Lock,
        Command::Unlock,
        Command::Mission,
        Command::Missions,
        Command::Players,
        Command::Say,
        Command::Kick,
        Command::RConPassword,
        Command::MaxPing,
        Command::LoadScripts,
        Command::LoadEvents,
        Command::LoadBans,
        Command::Bans,
        Command::Ban,
        Command::AddBan,
        Command::RemoveBan,
        Command::WriteBans,
    ];

    /// The literal string sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Init => "#init",
            Command::Restart => "#restart",
            Command::Reassign => "#reassign",
            Command::Shutdown => "#shutdown",
            Command::Lock => "#lock",
            Command::Unlock => "#unlock",
            Command::Mission => "#mission",
            Command::Missions => "missions",
            Command::Players => "players",
            Command::Say => "say",
            Command::Kick => "kick",
            Command::RConPassword => "RConPassword",
            Command::MaxPing => "MaxPing",
            Command::LoadScripts => "loadScripts",
            Command::LoadEvents => "loadEvents",
            Command::LoadBans => "loadBans",
            Command::Bans => "bans",
            Command::Ban => "ban",
            Command::AddBan => "addBan",
            Command::RemoveBan => "removeBan",
            Command::WriteBans => "writeBans",
        }
    }

    /// Command string followed by its parameters, space separated.
    pub fn with_args(self, args: &[&str]) -> String {
        let mut text = String::from(self.as_str());
        for arg in args {
            text.push(' ');
            text.push_str(arg);
        }
        text
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .iter()
            .copied()
            .find(|command| command.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_strings() {
        assert_eq!(Command::Players.as_str(), "players");
        assert_eq!(Command::Lock.as_str(), "#lock");
        assert_eq!(Command::RConPassword.to_string(), "RConPassword");
    }

    #[test]
    fn test_with_args() {
        assert_eq!(Command::Say.with_args(&["-1", "Hello World"]), "say -1 Hello World");
        assert_eq!(Command::Players.with_args(&[]), "players");
        assert_eq!(Command::Ban.with_args(&["3", "0", "cheating"]), "ban 3 0 cheating");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("PLAYERS".parse::<Command>(), Ok(Command::Players));
        assert_eq!("maxping".parse::<Command>(), Ok(Command::MaxPing));
        assert_eq!("#Shutdown".parse::<Command>(), Ok(Command::Shutdown));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            "dance".parse::<Command>(),
            Err(UnknownCommand("dance".to_string()))
        );
    }

    #[test]
    fn test_all_strings_are_distinct() {
        for (i, a) in Command::ALL.iter().enumerate() {
            for b in &Command::ALL[i + 1..] {
                assert!(!a.as_str().eq_ignore_ascii_case(b.as_str()));
            }
        }
    }
}
