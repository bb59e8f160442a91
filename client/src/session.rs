//! Client protocol state
//!
//! [`ClientSession`] interprets every packet coming from the server, keeps the
//! mirror world reconciled and decides which packets to send back. It never
//! touches a socket; the network loop hands it bytes and sends what it
//! returns.

use crate::game::{MirrorWorld, ReconcileEvent};
use crate::latency::LatencyProbe;
use log::{debug, info, warn};
use shared::{EntityCategory, InputEvents, Packet};
use std::time::{Duration, Instant};

/// How long to wait for the server to answer a connection request
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    /// Connection request sent, no answer yet
    Connecting,
    /// Accepted, waiting for the game to start
    Lobby,
    InGame,
    /// The server announced the end of the game
    Ended,
    /// Either side closed the connection, or the server never answered
    Disconnected,
    /// The server was full
    Rejected,
}

#[derive(Debug)]
pub struct ClientSession {
    phase: ClientPhase,
    entity_id: Option<u32>,
    auto_ready: bool,
    world: MirrorWorld,
    latency: LatencyProbe,
    connect_started: Option<Instant>,
    current_wave: Option<i64>,
}

impl ClientSession {
    pub fn new(auto_ready: bool) -> Self {
        Self {
            phase: ClientPhase::Connecting,
            entity_id: None,
            auto_ready,
            world: MirrorWorld::new(),
            latency: LatencyProbe::default(),
            connect_started: None,
            current_wave: None,
        }
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    /// Server-side id of the local player, once accepted
    pub fn entity_id(&self) -> Option<u32> {
        self.entity_id
    }

    pub fn world(&self) -> &MirrorWorld {
        &self.world
    }

    pub fn latency(&self) -> &LatencyProbe {
        &self.latency
    }

    pub fn current_wave(&self) -> Option<i64> {
        self.current_wave
    }

    fn is_connected(&self) -> bool {
        matches!(self.phase, ClientPhase::Lobby | ClientPhase::InGame)
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.phase,
            ClientPhase::Ended | ClientPhase::Disconnected | ClientPhase::Rejected
        )
    }

    /// Starts the handshake
    pub fn connect(&mut self, now: Instant) -> Packet {
        info!("Connecting to server...");
        self.phase = ClientPhase::Connecting;
        self.connect_started = Some(now);
        Packet::ConnectionRequest
    }

    /// Decodes one datagram from the server; malformed ones are dropped
    pub fn handle_datagram(&mut self, data: &[u8], now: Instant) -> Vec<Packet> {
        match Packet::decode(data) {
            Ok(packet) => self.handle_packet(packet, now),
            Err(e) => {
                warn!("Dropping malformed packet from server: {}", e);
                Vec::new()
            }
        }
    }

    pub fn handle_packet(&mut self, packet: Packet, now: Instant) -> Vec<Packet> {
        match packet {
            Packet::ConnectionAccepted { entity_id } => {
                if self.phase != ClientPhase::Connecting {
                    debug!("Duplicate connection-accepted ignored");
                    return Vec::new();
                }
                info!("Connected! Player entity {}", entity_id);
                self.entity_id = Some(entity_id);
                self.phase = ClientPhase::Lobby;
                self.latency.reset();

                if self.auto_ready {
                    vec![Packet::WantStart]
                } else {
                    Vec::new()
                }
            }

            Packet::ServerFull => {
                warn!("Server is full");
                self.phase = ClientPhase::Rejected;
                Vec::new()
            }

            Packet::Ping => vec![Packet::Pong],

            Packet::Pong => {
                if let Some(rtt) = self.latency.on_pong(now) {
                    debug!("Ping: {}ms", rtt.as_millis());
                }
                Vec::new()
            }

            Packet::GameStart => {
                let Some(entity_id) = self.entity_id else {
                    warn!("Game start before connection was accepted");
                    return Vec::new();
                };
                info!("Game started");
                self.phase = ClientPhase::InGame;
                log_events(self.world.ensure_own_player(entity_id).as_slice());
                Vec::new()
            }

            Packet::GameEnded => {
                info!("Game ended");
                self.phase = ClientPhase::Ended;
                Vec::new()
            }

            Packet::Disconnection => {
                warn!("Disconnected by server");
                self.phase = ClientPhase::Disconnected;
                self.world.clear();
                Vec::new()
            }

            Packet::PlayersSnapshot(records) => {
                if self.accepts_snapshots() {
                    log_events(&self.world.apply_players(&records));
                }
                Vec::new()
            }

            Packet::EnemiesSnapshot(records) => {
                if self.accepts_snapshots() {
                    log_events(&self.world.apply_entities(EntityCategory::Enemy, &records));
                }
                Vec::new()
            }

            Packet::ProjectilesSnapshot(records) => {
                if self.accepts_snapshots() {
                    log_events(
                        &self
                            .world
                            .apply_entities(EntityCategory::Projectile, &records),
                    );
                }
                Vec::new()
            }

            Packet::NewWave { index } => {
                info!("Wave {} incoming", index);
                self.current_wave = Some(index);
                Vec::new()
            }

            Packet::ConnectionRequest
            | Packet::WantStart
            | Packet::ClientEvent { .. }
            | Packet::PlayerShot => {
                warn!("Unexpected {:?} from server", packet.tag());
                Vec::new()
            }
        }
    }

    fn accepts_snapshots(&self) -> bool {
        self.entity_id.is_some() && self.is_connected()
    }

    /// Periodic work: connection timeout and latency pings
    pub fn tick(&mut self, now: Instant) -> Vec<Packet> {
        if self.phase == ClientPhase::Connecting {
            if let Some(started) = self.connect_started {
                if now.saturating_duration_since(started) >= CONNECT_TIMEOUT {
                    warn!("No answer from server after {:?}", CONNECT_TIMEOUT);
                    self.phase = ClientPhase::Disconnected;
                }
            }
            return Vec::new();
        }

        if self.is_connected() && self.latency.poll(now) {
            return vec![Packet::Ping];
        }
        Vec::new()
    }

    pub fn want_start(&self) -> Option<Packet> {
        (self.phase == ClientPhase::Lobby).then_some(Packet::WantStart)
    }

    /// Wraps an input sample for sending; only meaningful in game
    pub fn input(&self, events: &InputEvents) -> Option<Packet> {
        if self.phase != ClientPhase::InGame {
            return None;
        }
        match Packet::client_event(events) {
            Ok(packet) => Some(packet),
            Err(e) => {
                warn!("Could not encode input: {}", e);
                None
            }
        }
    }

    pub fn shoot(&self) -> Option<Packet> {
        (self.phase == ClientPhase::InGame).then_some(Packet::PlayerShot)
    }

    /// Leaves the server; returns the notice to send if the server still knows us
    ///
    /// A rejected or already disconnected session keeps its phase.
    pub fn disconnect(&mut self) -> Option<Packet> {
        let notify = matches!(
            self.phase,
            ClientPhase::Lobby | ClientPhase::InGame | ClientPhase::Ended
        );
        if notify {
            self.phase = ClientPhase::Disconnected;
            self.world.clear();
        }
        notify.then_some(Packet::Disconnection)
    }
}

fn log_events(events: &[ReconcileEvent]) {
    for event in events {
        match event {
            ReconcileEvent::Spawned {
                local_id,
                server_id,
                category,
            } => debug!("Spawned {} {} as local {}", category, server_id, local_id),
            ReconcileEvent::Despawned {
                local_id,
                server_id,
                category,
            } => debug!("Removed {} {} (local {})", category, server_id, local_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{EntityRecord, PlayerRecord};

    fn accepted(auto_ready: bool) -> (ClientSession, Instant) {
        let mut session = ClientSession::new(auto_ready);
        let now = Instant::now();
        session.connect(now);
        session.handle_packet(Packet::ConnectionAccepted { entity_id: 42 }, now);
        (session, now)
    }

    #[test]
    fn test_accept_moves_to_lobby() {
        let mut session = ClientSession::new(false);
        let now = Instant::now();
        assert_eq!(session.connect(now), Packet::ConnectionRequest);

        let replies = session.handle_packet(Packet::ConnectionAccepted { entity_id: 42 }, now);
        assert!(replies.is_empty());
        assert_eq!(session.phase(), ClientPhase::Lobby);
        assert_eq!(session.entity_id(), Some(42));
        assert_eq!(session.want_start(), Some(Packet::WantStart));
    }

    #[test]
    fn test_auto_ready_replies_want_start() {
        let mut session = ClientSession::new(true);
        let now = Instant::now();
        session.connect(now);
        let replies = session.handle_packet(Packet::ConnectionAccepted { entity_id: 42 }, now);
        assert_eq!(replies, vec![Packet::WantStart]);
    }

    #[test]
    fn test_game_start_creates_own_mirror() {
        let (mut session, now) = accepted(false);
        assert!(session.world().own_player().is_none());

        session.handle_packet(Packet::GameStart, now);
        assert_eq!(session.phase(), ClientPhase::InGame);
        assert_eq!(session.world().own_player().unwrap().server_id, 42);
    }

    #[test]
    fn test_server_full_rejects() {
        let mut session = ClientSession::new(false);
        let now = Instant::now();
        session.connect(now);
        session.handle_packet(Packet::ServerFull, now);

        assert_eq!(session.phase(), ClientPhase::Rejected);
        assert!(session.is_finished());
        assert!(session.disconnect().is_none());
    }

    #[test]
    fn test_connect_times_out() {
        let mut session = ClientSession::new(false);
        let now = Instant::now();
        session.connect(now);

        session.tick(now + Duration::from_secs(1));
        assert_eq!(session.phase(), ClientPhase::Connecting);
        session.tick(now + CONNECT_TIMEOUT);
        assert_eq!(session.phase(), ClientPhase::Disconnected);
    }

    #[test]
    fn test_ping_answered_and_own_ping_sent() {
        let (mut session, now) = accepted(false);
        assert_eq!(session.handle_packet(Packet::Ping, now), vec![Packet::Pong]);

        assert_eq!(session.tick(now), vec![Packet::Ping]);
        assert!(session.tick(now + Duration::from_secs(1)).is_empty());
        session.handle_packet(Packet::Pong, now + Duration::from_millis(30));
        assert_eq!(session.latency().last(), Some(Duration::from_millis(30)));
    }

    #[test]
    fn test_snapshots_reconcile_world() {
        let (mut session, now) = accepted(false);
        session.handle_packet(Packet::GameStart, now);

        session.handle_packet(
            Packet::PlayersSnapshot(vec![
                PlayerRecord { id: 42, x: 1.0, y: 2.0, hp: 100 },
                PlayerRecord { id: 43, x: 3.0, y: 4.0, hp: 100 },
            ]),
            now,
        );
        session.handle_packet(
            Packet::EnemiesSnapshot(vec![EntityRecord { id: 151, x: 0.0, y: 0.0 }]),
            now,
        );

        let world = session.world();
        assert_eq!(world.count(EntityCategory::Player), 2);
        assert_eq!(world.count(EntityCategory::Enemy), 1);
    }

    #[test]
    fn test_short_snapshot_leaves_mirrors_alone() {
        let (mut session, now) = accepted(false);
        session.handle_packet(Packet::GameStart, now);
        session.handle_packet(
            Packet::PlayersSnapshot(vec![
                PlayerRecord { id: 42, x: 1.0, y: 2.0, hp: 100 },
                PlayerRecord { id: 102, x: 3.0, y: 4.0, hp: 100 },
            ]),
            now,
        );
        session.handle_packet(
            Packet::EnemiesSnapshot(vec![EntityRecord { id: 151, x: 0.0, y: 0.0 }]),
            now,
        );

        assert!(session.handle_datagram(&[60, 1, 2, 3], now).is_empty());
        assert!(session.handle_datagram(&[61, 1], now).is_empty());

        let world = session.world();
        assert_eq!(world.count(EntityCategory::Player), 2);
        assert!(world.player(102).is_some());
        assert_eq!(world.count(EntityCategory::Enemy), 1);
    }

    #[test]
    fn test_controls_only_in_game() {
        let (mut session, now) = accepted(false);
        let events = InputEvents::default();
        assert!(session.input(&events).is_none());
        assert!(session.shoot().is_none());

        session.handle_packet(Packet::GameStart, now);
        assert!(matches!(
            session.input(&events),
            Some(Packet::ClientEvent { .. })
        ));
        assert_eq!(session.shoot(), Some(Packet::PlayerShot));
        assert!(session.want_start().is_none());
    }

    #[test]
    fn test_game_ended_then_disconnect_notice() {
        let (mut session, now) = accepted(false);
        session.handle_packet(Packet::GameStart, now);
        session.handle_packet(Packet::GameEnded, now);

        assert!(session.is_finished());
        assert_eq!(session.disconnect(), Some(Packet::Disconnection));
        assert!(session.world().is_empty());
    }

    #[test]
    fn test_new_wave_tracked() {
        let (mut session, now) = accepted(false);
        session.handle_packet(Packet::NewWave { index: 3 }, now);
        assert_eq!(session.current_wave(), Some(3));
    }
}
