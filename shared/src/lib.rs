//! Protocol pieces shared by the server and the client
//!
//! Holds the wire codec, the packet set, the entity id bands and the handful
//! of arena constants both sides need to agree on.

pub mod events;
pub mod ids;
pub mod packet;
pub mod shutdown;
pub mod transport;
pub mod wire;

pub use events::InputEvents;
pub use ids::{EntityCategory, IdAllocator, IdBand, IdError};
pub use packet::{EntityRecord, Packet, PacketTag, PlayerRecord};
pub use shutdown::CancelToken;
pub use transport::{TransportKind, MAX_PACKET_SIZE};
pub use wire::WireError;

pub const ARENA_WIDTH: f32 = 1600.0;
pub const ARENA_HEIGHT: f32 = 900.0;

pub const PLAYER_SPEED: f32 = 300.0;
pub const PLAYER_START_HEALTH: i64 = 100;
pub const PLAYER_SPAWN_X: f32 = 100.0;

pub const PROJECTILE_SPEED: f32 = 700.0;

/// Entities this far outside the arena are considered gone
pub const DESPAWN_MARGIN: f32 = 600.0;

/// Seconds between client latency probes
pub const PING_INTERVAL_SECS: u64 = 5;

/// Returns true when a point has drifted out of the playable area
pub fn is_out_of_arena(x: f32, y: f32) -> bool {
    x < -DESPAWN_MARGIN
        || x > ARENA_WIDTH + DESPAWN_MARGIN
        || y < -DESPAWN_MARGIN
        || y > ARENA_HEIGHT + DESPAWN_MARGIN
}
