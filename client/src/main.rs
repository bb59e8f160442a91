use clap::Parser;
use client::input::InputManager;
use client::network::Client;
use client::session::ClientSession;
use log::{error, info};
use shared::{CancelToken, TransportKind};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Transport used to reach the server
    #[arg(long, value_enum, default_value = "udp")]
    transport: TransportKind,

    /// Ready up as soon as the server accepts the connection
    #[arg(long)]
    auto_ready: bool,

    /// Move around randomly during the game
    #[arg(long)]
    wander: bool,

    /// Seconds between scripted shots (0 = never shoot)
    #[arg(long, default_value = "0")]
    shoot_every: u64,

    /// Client loop frequency
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,
}

fn resolve(server: &str) -> std::io::Result<SocketAddr> {
    server.to_socket_addrs()?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} did not resolve to an address", server),
        )
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let shoot_every = (args.shoot_every > 0).then(|| Duration::from_secs(args.shoot_every));
    let session = ClientSession::new(args.auto_ready);
    let input_manager = InputManager::new(args.wander, shoot_every);

    let connected = match resolve(&args.server) {
        Ok(addr) => Client::new(addr, args.transport, session, input_manager, args.tick_rate).await,
        Err(e) => Err(e),
    };
    let client = match connected {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to {}: {}", args.server, e);
            eprintln!("Could not reach server at {}: {}", args.server, e);
            std::process::exit(1);
        }
    };

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, disconnecting...");
                cancel.cancel();
            }
        });
    }

    let session = client.run(cancel).await?;
    info!("Session finished in phase {:?}", session.phase());
    Ok(())
}
