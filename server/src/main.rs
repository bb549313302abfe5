use berc_server::{MockServer, MockServerConfig, DEFAULT_PASSWORD};
use clap::Parser;
use log::info;
use tokio::time::{interval, Duration};

/// Main-method of the mock server.
/// Parses command-line arguments, then serves until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[clap(short, long, default_value = "2302")]
        port: u16,
        /// RCon password admins must log in with
        #[clap(long, default_value = DEFAULT_PASSWORD)]
        password: String,
        /// Largest response text per datagram
        #[clap(long, default_value = "1024")]
        fragment_size: usize,
        /// Send multi-part responses in random order
        #[clap(long)]
        shuffle_fragments: bool,
        /// Resend unacknowledged server messages this often (milliseconds)
        #[clap(long, default_value = "1000")]
        retransmit_ms: u64,
        /// Accept logins, then stop answering
        #[clap(long)]
        silent: bool,
        /// Broadcast a server message to admins every N seconds (0 = never)
        #[clap(long, default_value = "0")]
        announce_secs: u64,
    }

    env_logger::init();

    let args = Args::parse();

    let config = MockServerConfig {
        fragment_size: args.fragment_size,
        shuffle_fragments: args.shuffle_fragments,
        retransmit_interval: Duration::from_millis(args.retransmit_ms),
        silent: args.silent,
        ..MockServerConfig::new(&args.password)
    };

    let address = format!("{}:{}", args.host, args.port);
    let server = MockServer::bind(&address, config).await?;
    let (handle, server_task) = server.spawn();

    if args.announce_secs > 0 {
        let handle = handle.clone();
        let period = Duration::from_secs(args.announce_secs);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            // Skip the first tick since it fires immediately
            ticker.tick().await;
            let mut count = 0u32;
            loop {
                ticker.tick().await;
                count += 1;
                handle.announce(&format!("RCon admin #0 says: announcement {}", count));
            }
        });
    }

    // Handle shutdown gracefully
    tokio::select! {
        result = server_task => {
            if let Err(e) = result {
                eprintln!("Server task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.shutdown();
        }
    }

    Ok(())
}
