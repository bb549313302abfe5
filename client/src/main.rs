use berc_client::{BattlEyeClient, ClientConfig, ConnectionHandler, DisconnectReason};
use clap::Parser;
use log::{info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RCon address of the game server [default: 127.0.0.1:2302]
    #[arg(short = 's', long)]
    server: Option<SocketAddr>,

    /// RCon password
    #[arg(short = 'p', long)]
    password: String,

    /// JSON settings file; --server and the flags below override it
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log back in automatically after the connection is lost
    #[arg(short = 'r', long)]
    auto_reconnect: bool,

    /// Unanswered request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Keep-alive interval in milliseconds
    #[arg(long)]
    keep_alive_ms: Option<u64>,

    /// Run this command, print the response and exit (repeatable)
    #[arg(short = 'x', long = "command")]
    commands: Vec<String>,
}

impl Args {
    fn client_config(&self) -> berc_client::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_json_file(path)?,
            None => ClientConfig::default(),
        };
        if let Some(server) = self.server {
            config.server_addr = server;
        }
        config.auto_reconnect |= self.auto_reconnect;
        if let Some(ms) = self.timeout_ms {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.keep_alive_ms {
            config.keep_alive_interval = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

struct ConsoleEvents;

impl ConnectionHandler for ConsoleEvents {
    fn on_connected(&self) {
        println!("* logged in");
    }

    fn on_connection_failed(&self) {
        println!("* login failed");
    }

    fn on_disconnected(&self, reason: DisconnectReason) {
        println!("* disconnected ({:?})", reason);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.client_config()?;
    let response_timeout = config.timeout;

    info!("Starting RCon client...");
    info!("Server: {}", config.server_addr);

    let client = BattlEyeClient::new(config)?;
    let (responses_tx, mut responses) = mpsc::unbounded_channel();
    client.add_command_response_handler(move |response: &str, id: u8| {
        let _ = responses_tx.send((id, response.to_string()));
    });
    client.add_message_handler(|message: &str| println!("> {}", message));
    client.add_connection_handler(ConsoleEvents);

    client.connect(&args.password).await?;

    if !args.commands.is_empty() {
        for command in &args.commands {
            let id = client.send_command(command).await?;
            match timeout(response_timeout, wait_for(&mut responses, id)).await {
                Ok(Some(response)) => println!("{}", response),
                Ok(None) => break,
                Err(_) => warn!("No response to '{}' within {:?}", command, response_timeout),
            }
        }
        client.disconnect().await?;
        return Ok(());
    }

    println!("Type a command, 'reconnect' or 'quit'");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some((id, response)) = responses.recv() => println!("[{}] {}", id, response),
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                match line {
                    "" => {}
                    "quit" | "exit" => break,
                    "reconnect" => {
                        if let Err(e) = client.reconnect().await {
                            eprintln!("! {}", e);
                        }
                    }
                    command => match client.send_command(command).await {
                        Ok(id) => info!("Sent command {}", id),
                        Err(e) => eprintln!("! {}", e),
                    },
                }
            }
        }
    }

    client.disconnect().await?;
    info!("Bye");
    Ok(())
}

async fn wait_for(
    responses: &mut mpsc::UnboundedReceiver<(u8, String)>,
    id: u8,
) -> Option<String> {
    while let Some((response_id, response)) = responses.recv().await {
        if response_id == id {
            return Some(response);
        }
    }
    None
}
