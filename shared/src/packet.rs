//! Packet tags and the closed set of packets exchanged by client and server
//!
//! Every datagram starts with a one-byte tag followed by a tag-specific
//! payload. Snapshot payloads are runs of fixed-width records; the stride is
//! implied by the tag.

use crate::events::InputEvents;
use crate::wire::{
    decode_records, encode_records, FieldReader, WireError, WireField, WireRecord,
};

/// First byte of every packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketTag {
    ConnectionRequest = 1,
    Disconnection = 2,
    ServerFull = 3,
    ConnectionAccepted = 4,
    Ping = 6,
    Pong = 7,
    WantStart = 8,
    GameStart = 9,
    GameEnded = 10,
    ClientEvent = 50,
    PlayerShot = 51,
    PlayersSnapshot = 60,
    EnemiesSnapshot = 61,
    ProjectilesSnapshot = 62,
    NewWave = 63,
}

impl TryFrom<u8> for PacketTag {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let tag = match value {
            1 => PacketTag::ConnectionRequest,
            2 => PacketTag::Disconnection,
            3 => PacketTag::ServerFull,
            4 => PacketTag::ConnectionAccepted,
            6 => PacketTag::Ping,
            7 => PacketTag::Pong,
            8 => PacketTag::WantStart,
            9 => PacketTag::GameStart,
            10 => PacketTag::GameEnded,
            50 => PacketTag::ClientEvent,
            51 => PacketTag::PlayerShot,
            60 => PacketTag::PlayersSnapshot,
            61 => PacketTag::EnemiesSnapshot,
            62 => PacketTag::ProjectilesSnapshot,
            63 => PacketTag::NewWave,
            other => return Err(WireError::UnknownTag(other)),
        };
        Ok(tag)
    }
}

/// One player in a players snapshot: id, position, health
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerRecord {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub hp: i64,
}

impl WireRecord for PlayerRecord {
    const WIDTH: usize = u32::WIDTH + f32::WIDTH + f32::WIDTH + i64::WIDTH;

    fn encode(&self, out: &mut Vec<u8>) {
        self.id.encode(out);
        self.x.encode(out);
        self.y.encode(out);
        self.hp.encode(out);
    }

    fn decode(reader: &mut FieldReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            id: reader.read()?,
            x: reader.read()?,
            y: reader.read()?,
            hp: reader.read()?,
        })
    }
}

/// One enemy or projectile in a snapshot: id and position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityRecord {
    pub id: u32,
    pub x: f32,
    pub y: f32,
}

impl WireRecord for EntityRecord {
    const WIDTH: usize = u32::WIDTH + f32::WIDTH + f32::WIDTH;

    fn encode(&self, out: &mut Vec<u8>) {
        self.id.encode(out);
        self.x.encode(out);
        self.y.encode(out);
    }

    fn decode(reader: &mut FieldReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            id: reader.read()?,
            x: reader.read()?,
            y: reader.read()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    // Connection management
    ConnectionRequest,
    Disconnection,
    ServerFull,
    ConnectionAccepted { entity_id: u32 },
    Ping,
    Pong,

    // Session flow
    WantStart,
    GameStart,
    GameEnded,

    // Client controls; the event payload stays opaque at this layer
    ClientEvent { payload: Vec<u8> },
    PlayerShot,

    // Category snapshots
    PlayersSnapshot(Vec<PlayerRecord>),
    EnemiesSnapshot(Vec<EntityRecord>),
    ProjectilesSnapshot(Vec<EntityRecord>),
    NewWave { index: i64 },
}

impl Packet {
    pub fn client_event(events: &InputEvents) -> Result<Self, WireError> {
        Ok(Packet::ClientEvent {
            payload: events.to_bytes()?,
        })
    }

    pub fn tag(&self) -> PacketTag {
        match self {
            Packet::ConnectionRequest => PacketTag::ConnectionRequest,
            Packet::Disconnection => PacketTag::Disconnection,
            Packet::ServerFull => PacketTag::ServerFull,
            Packet::ConnectionAccepted { .. } => PacketTag::ConnectionAccepted,
            Packet::Ping => PacketTag::Ping,
            Packet::Pong => PacketTag::Pong,
            Packet::WantStart => PacketTag::WantStart,
            Packet::GameStart => PacketTag::GameStart,
            Packet::GameEnded => PacketTag::GameEnded,
            Packet::ClientEvent { .. } => PacketTag::ClientEvent,
            Packet::PlayerShot => PacketTag::PlayerShot,
            Packet::PlayersSnapshot(_) => PacketTag::PlayersSnapshot,
            Packet::EnemiesSnapshot(_) => PacketTag::EnemiesSnapshot,
            Packet::ProjectilesSnapshot(_) => PacketTag::ProjectilesSnapshot,
            Packet::NewWave { .. } => PacketTag::NewWave,
        }
    }

    /// Serializes the packet into a fresh datagram
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.tag() as u8];

        match self {
            Packet::ConnectionAccepted { entity_id } => entity_id.encode(&mut out),
            Packet::ClientEvent { payload } => out.extend_from_slice(payload),
            Packet::PlayersSnapshot(records) => encode_records(records, &mut out),
            Packet::EnemiesSnapshot(records) | Packet::ProjectilesSnapshot(records) => {
                encode_records(records, &mut out)
            }
            Packet::NewWave { index } => index.encode(&mut out),
            Packet::ConnectionRequest
            | Packet::Disconnection
            | Packet::ServerFull
            | Packet::Ping
            | Packet::Pong
            | Packet::WantStart
            | Packet::GameStart
            | Packet::GameEnded
            | Packet::PlayerShot => {}
        }

        out
    }

    /// Parses a datagram
    ///
    /// Fails without partial results: either the whole packet decodes or the
    /// caller gets an error and should drop it.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let (&tag_byte, payload) = data.split_first().ok_or(WireError::EmptyPacket)?;
        let tag = PacketTag::try_from(tag_byte)?;

        let packet = match tag {
            PacketTag::ConnectionRequest => Packet::ConnectionRequest,
            PacketTag::Disconnection => Packet::Disconnection,
            PacketTag::ServerFull => Packet::ServerFull,
            PacketTag::ConnectionAccepted => Packet::ConnectionAccepted {
                entity_id: u32::decode(payload, 0)?,
            },
            PacketTag::Ping => Packet::Ping,
            PacketTag::Pong => Packet::Pong,
            PacketTag::WantStart => Packet::WantStart,
            PacketTag::GameStart => Packet::GameStart,
            PacketTag::GameEnded => Packet::GameEnded,
            PacketTag::ClientEvent => {
                if payload.is_empty() {
                    return Err(WireError::MalformedPayload {
                        tag: tag_byte,
                        len: 0,
                    });
                }
                Packet::ClientEvent {
                    payload: payload.to_vec(),
                }
            }
            PacketTag::PlayerShot => Packet::PlayerShot,
            PacketTag::PlayersSnapshot => {
                Packet::PlayersSnapshot(decode_records(tag_byte, payload)?)
            }
            PacketTag::EnemiesSnapshot => {
                Packet::EnemiesSnapshot(decode_records(tag_byte, payload)?)
            }
            PacketTag::ProjectilesSnapshot => {
                Packet::ProjectilesSnapshot(decode_records(tag_byte, payload)?)
            }
            PacketTag::NewWave => Packet::NewWave {
                index: i64::decode(payload, 0)?,
            },
        };

        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_widths() {
        assert_eq!(PlayerRecord::WIDTH, 20);
        assert_eq!(EntityRecord::WIDTH, 12);
    }

    #[test]
    fn test_tag_byte_roundtrip() {
        let tags = [
            PacketTag::ConnectionRequest,
            PacketTag::Disconnection,
            PacketTag::ServerFull,
            PacketTag::ConnectionAccepted,
            PacketTag::Ping,
            PacketTag::Pong,
            PacketTag::WantStart,
            PacketTag::GameStart,
            PacketTag::GameEnded,
            PacketTag::ClientEvent,
            PacketTag::PlayerShot,
            PacketTag::PlayersSnapshot,
            PacketTag::EnemiesSnapshot,
            PacketTag::ProjectilesSnapshot,
            PacketTag::NewWave,
        ];

        for tag in tags {
            assert_eq!(PacketTag::try_from(tag as u8).unwrap(), tag);
        }
        assert_eq!(PacketTag::try_from(5), Err(WireError::UnknownTag(5)));
    }

    #[test]
    fn test_connection_accepted_layout() {
        let bytes = Packet::ConnectionAccepted { entity_id: 42 }.encode();
        assert_eq!(bytes, vec![4, 42, 0, 0, 0]);
        assert_eq!(
            Packet::decode(&bytes).unwrap(),
            Packet::ConnectionAccepted { entity_id: 42 }
        );
    }

    #[test]
    fn test_connection_accepted_max_id() {
        let packet = Packet::ConnectionAccepted {
            entity_id: u32::MAX,
        };
        assert_eq!(Packet::decode(&packet.encode()).unwrap(), packet);
    }

    #[test]
    fn test_players_snapshot_roundtrip() {
        let packet = Packet::PlayersSnapshot(vec![
            PlayerRecord {
                id: 101,
                x: 10.5,
                y: -3.25,
                hp: 100,
            },
            PlayerRecord {
                id: u32::MAX,
                x: f32::MAX,
                y: f32::MIN,
                hp: i64::MIN,
            },
        ]);

        let bytes = packet.encode();
        assert_eq!(bytes.len(), 1 + 2 * PlayerRecord::WIDTH);
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_entity_snapshots_roundtrip() {
        let records = vec![
            EntityRecord {
                id: 151,
                x: 1550.0,
                y: 50.0,
            },
            EntityRecord {
                id: 152,
                x: 0.0,
                y: -0.0,
            },
        ];

        let enemies = Packet::EnemiesSnapshot(records.clone());
        let projectiles = Packet::ProjectilesSnapshot(records);
        assert_eq!(Packet::decode(&enemies.encode()).unwrap(), enemies);
        assert_eq!(Packet::decode(&projectiles.encode()).unwrap(), projectiles);
    }

    #[test]
    fn test_empty_snapshot_is_valid() {
        let bytes = Packet::EnemiesSnapshot(Vec::new()).encode();
        assert_eq!(bytes, vec![61]);
        assert_eq!(
            Packet::decode(&bytes).unwrap(),
            Packet::EnemiesSnapshot(Vec::new())
        );
    }

    #[test]
    fn test_misaligned_snapshot_keeps_complete_records() {
        let mut bytes = Packet::EnemiesSnapshot(vec![EntityRecord {
            id: 151,
            x: 1.0,
            y: 2.0,
        }])
        .encode();
        bytes.extend_from_slice(&[9, 9, 9, 9, 9]);

        match Packet::decode(&bytes).unwrap() {
            Packet::EnemiesSnapshot(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].id, 151);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_new_wave_roundtrip() {
        for index in [0i64, 2, i64::MAX] {
            let packet = Packet::NewWave { index };
            assert_eq!(Packet::decode(&packet.encode()).unwrap(), packet);
        }
    }

    #[test]
    fn test_truncated_packets_fail() {
        assert_eq!(Packet::decode(&[]), Err(WireError::EmptyPacket));
        assert!(matches!(
            Packet::decode(&[4, 1, 2]),
            Err(WireError::TruncatedField { .. })
        ));
        assert!(matches!(
            Packet::decode(&[63, 0, 0, 0, 0]),
            Err(WireError::TruncatedField { .. })
        ));
        assert!(matches!(
            Packet::decode(&[50]),
            Err(WireError::MalformedPayload { tag: 50, len: 0 })
        ));
    }

    #[test]
    fn test_snapshot_shorter_than_one_record_fails() {
        assert_eq!(
            Packet::decode(&[60, 1, 2, 3]),
            Err(WireError::MalformedPayload { tag: 60, len: 3 })
        );
        assert_eq!(
            Packet::decode(&[61, 1]),
            Err(WireError::MalformedPayload { tag: 61, len: 1 })
        );
        assert_eq!(
            Packet::decode(&[62; 12]),
            Err(WireError::MalformedPayload { tag: 62, len: 11 })
        );
        // A bare tag is still a valid empty snapshot
        assert_eq!(Packet::decode(&[60]), Ok(Packet::PlayersSnapshot(vec![])));
    }

    #[test]
    fn test_client_event_roundtrip() {
        let events = InputEvents {
            sequence: 3,
            left: true,
            ..Default::default()
        };
        let packet = Packet::client_event(&events).unwrap();
        match Packet::decode(&packet.encode()).unwrap() {
            Packet::ClientEvent { payload } => {
                assert_eq!(InputEvents::from_bytes(&payload).unwrap(), events);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_tag_only_packets_ignore_trailing_bytes() {
        assert_eq!(Packet::decode(&[6, 1, 2, 3]).unwrap(), Packet::Ping);
        assert_eq!(Packet::decode(&[8]).unwrap(), Packet::WantStart);
    }
}
