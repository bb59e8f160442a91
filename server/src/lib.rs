//! # Synchronization Server Library
//!
//! Authoritative side of the arcade shooter's networking layer. The server
//! owns the canonical entity set, runs the lobby and game lifecycle, and
//! broadcasts per-category snapshots that clients reconcile against.
//!
//! ## Core Responsibilities
//!
//! ### Connection Lifecycle
//! Peers are identified by their remote address. A connection request spawns
//! a player entity and a readiness record; a disconnection notice, a closed
//! stream or a silent timeout removes both again. Requests beyond the player
//! limit are answered with a server-full packet and leave no trace.
//!
//! ### Session State Machine
//! `Waiting -> Running -> Ended`. The game starts once every connected player
//! has readied up and ends on an explicit stop or when nobody is left alive.
//!
//! ### Snapshot Broadcasting
//! While running, players, enemies and projectiles are each broadcast on their
//! own timer. Each snapshot carries every live entity whose id falls inside
//! that category's id band.
//!
//! ### Wave Spawning
//! A canonical table of enemy waves is replayed in order on a fixed interval
//! and wraps around forever.
//!
//! ## Architecture Design
//!
//! All tables live in [`engine::SyncEngine`], which performs no I/O. The
//! [`network::Server`] wraps it in a single fixed-cadence loop: socket tasks
//! push received packets into a channel, the loop drains a bounded number of
//! them per tick, advances the engine and queues outgoing packets for the
//! sender task. Nothing is shared between threads, so nothing needs locking.
//!
//! ## Module Organization
//!
//! - `client_manager`: connection records keyed by address, latest input, timeouts
//! - `session`: lobby, ready-up handshake and end condition
//! - `game`: authoritative entity store and per-band id allocation
//! - `waves`: enemy kinds, the wave table and its cycling scheduler
//! - `timers`: independent periodic tasks polled once per tick
//! - `engine`: packet handling and tick logic tying the above together
//! - `network`: UDP and TCP transports around the engine
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::engine::ServerConfig;
//! use server::network::Server;
//! use shared::CancelToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server.run(CancelToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod engine;
pub mod game;
pub mod network;
pub mod session;
pub mod timers;
pub mod waves;
