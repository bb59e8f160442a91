use clap::Parser;
use log::{error, info};
use server::engine::ServerConfig;
use server::network::Server;
use shared::{CancelToken, TransportKind};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Transport to listen on
    #[arg(long, value_enum, default_value = "udp")]
    transport: TransportKind,

    /// Maximum number of concurrent players
    #[arg(short, long, default_value = "4")]
    max_players: usize,

    /// Tick rate while a game is running (updates per second)
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Tick rate while waiting in the lobby
    #[arg(long, default_value = "5")]
    lobby_tick_rate: u32,

    /// Milliseconds between player snapshots
    #[arg(long, default_value = "16")]
    player_snapshot_ms: u64,

    /// Milliseconds between enemy snapshots
    #[arg(long, default_value = "50")]
    enemy_snapshot_ms: u64,

    /// Milliseconds between projectile snapshots
    #[arg(long, default_value = "33")]
    projectile_snapshot_ms: u64,

    /// Seconds between enemy waves
    #[arg(long, default_value = "10")]
    wave_interval_secs: u64,

    /// Seconds of silence before a peer is dropped
    #[arg(long, default_value = "10")]
    client_timeout_secs: u64,

    /// Packets handled per tick at most
    #[arg(long, default_value = "64")]
    recv_budget: usize,

    /// Received packets buffered ahead of the loop; extra datagrams are dropped
    #[arg(long, default_value = "1024")]
    recv_queue: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            transport: args.transport,
            max_players: args.max_players,
            tick_rate: args.tick_rate,
            lobby_tick_rate: args.lobby_tick_rate,
            player_snapshot_every: Duration::from_millis(args.player_snapshot_ms),
            enemy_snapshot_every: Duration::from_millis(args.enemy_snapshot_ms),
            projectile_snapshot_every: Duration::from_millis(args.projectile_snapshot_ms),
            wave_interval: Duration::from_secs(args.wave_interval_secs),
            client_timeout: Duration::from_secs(args.client_timeout_secs),
            recv_budget: args.recv_budget,
            recv_queue: args.recv_queue,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from(Args::parse());
    let address = config.bind_addr();

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to bind {}: {}", address, e);
            eprintln!("Could not start server on {}: {}", address, e);
            std::process::exit(1);
        }
    };

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down gracefully...");
                cancel.cancel();
            }
        });
    }

    server.run(cancel).await?;
    Ok(())
}
