//! # Synchronization Client Library
//!
//! Client side of the arcade shooter's networking layer. The client never
//! simulates anything authoritative: it connects, readies up, sends its
//! input, and keeps a local mirror of whatever the server's snapshots say
//! exists right now.
//!
//! ## Reconciliation
//!
//! Each snapshot covers exactly one entity category and lists every live
//! entity of that category. The client diffs it against what it already
//! mirrors:
//! - ids seen for the first time become new mirror entities
//! - ids already mirrored are overwritten in place
//! - ids missing from the snapshot are destroyed, except the local player
//!
//! Remote players are mapped to fresh local ids. Enemies and projectiles keep
//! the server id, which the server guarantees to be unique within its band.
//!
//! ## Module Organization
//!
//! - `game`: mirror entities and the presence-diff reconciliation
//! - `session`: connection phases, packet handling and outgoing controls
//! - `latency`: periodic ping and a short round-trip history
//! - `input`: scripted headless input with keep-alive resends
//! - `network`: UDP and TCP connections and the fixed-cadence loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::InputManager;
//! use client::network::Client;
//! use client::session::ClientSession;
//! use shared::{CancelToken, TransportKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(
//!         "127.0.0.1:8080".parse()?,
//!         TransportKind::Udp,
//!         ClientSession::new(true),
//!         InputManager::new(true, None),
//!         60,
//!     )
//!     .await?;
//!
//!     let session = client.run(CancelToken::new()).await?;
//!     println!("Finished in phase {:?}", session.phase());
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod latency;
pub mod network;
pub mod session;
