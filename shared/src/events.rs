use crate::wire::WireError;
use serde::{Deserialize, Serialize};

/// Directional input sampled by a client on one frame
///
/// Travels as the opaque payload of a client-event packet. The server only
/// keeps the most recent one per connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvents {
    pub sequence: u32,
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl InputEvents {
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        bincode::serialize(self).map_err(|e| WireError::InvalidEvent(e.to_string()))
    }

    pub fn from_bytes(payload: &[u8]) -> Result<Self, WireError> {
        bincode::deserialize(payload).map_err(|e| WireError::InvalidEvent(e.to_string()))
    }

    pub fn is_idle(&self) -> bool {
        !(self.up || self.down || self.left || self.right)
    }

    /// Unit-ish direction, screen coordinates (y grows downward)
    pub fn direction(&self) -> (f32, f32) {
        let mut dx: f32 = 0.0;
        let mut dy: f32 = 0.0;
        if self.left {
            dx -= 1.0;
        }
        if self.right {
            dx += 1.0;
        }
        if self.up {
            dy -= 1.0;
        }
        if self.down {
            dy += 1.0;
        }

        let magnitude = (dx * dx + dy * dy).sqrt();
        if magnitude > 0.0 {
            (dx / magnitude, dy / magnitude)
        } else {
            (0.0, 0.0)
        }
    }
}
