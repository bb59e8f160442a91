//! Server synchronization engine
//!
//! Owns every table the server keeps (connections, readiness, entities, wave
//! and broadcast timers) and turns incoming packets and clock ticks into
//! outgoing messages. It does no I/O itself: the network loop feeds it
//! datagrams, calls [`SyncEngine::tick`] at the configured cadence and
//! delivers whatever [`GameMessage`]s come back.

use crate::client_manager::ClientManager;
use crate::game::GameState;
use crate::session::{PlayerState, ReadyOutcome, Session, SessionState};
use crate::timers::{TaskKind, TaskTable};
use crate::waves::WaveScheduler;
use log::{debug, info, warn};
use shared::{EntityCategory, InputEvents, Packet, TransportKind};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Largest simulation step; longer stalls are clamped to keep physics stable
const MAX_DELTA_TIME: f32 = 1.0 / 20.0;

/// Plain server parameters, filled from the command line
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub transport: TransportKind,
    pub max_players: usize,
    /// Loop frequency while a game is running
    pub tick_rate: u32,
    /// Loop frequency in the lobby and after the game ended
    pub lobby_tick_rate: u32,
    pub player_snapshot_every: Duration,
    pub enemy_snapshot_every: Duration,
    pub projectile_snapshot_every: Duration,
    pub wave_interval: Duration,
    pub client_timeout: Duration,
    /// Packets drained from the transport per tick
    pub recv_budget: usize,
    /// Capacity of the queue between the socket tasks and the loop
    pub recv_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            transport: TransportKind::Udp,
            max_players: 4,
            tick_rate: 60,
            lobby_tick_rate: 5,
            player_snapshot_every: Duration::from_millis(16),
            enemy_snapshot_every: Duration::from_millis(50),
            projectile_snapshot_every: Duration::from_millis(33),
            wave_interval: Duration::from_secs(10),
            client_timeout: Duration::from_secs(10),
            recv_budget: 64,
            recv_queue: 1024,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn task_table(&self) -> TaskTable {
        TaskTable::new(
            self.player_snapshot_every,
            self.enemy_snapshot_every,
            self.projectile_snapshot_every,
            self.wave_interval,
        )
    }
}

/// Messages from the engine to the network tasks
#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    /// Deliver to every connected peer
    BroadcastPacket { packet: Packet },
}

pub struct SyncEngine {
    config: ServerConfig,
    clients: ClientManager,
    session: Session,
    game: GameState,
    waves: WaveScheduler,
    tasks: TaskTable,
    last_update: Option<Instant>,
}

impl SyncEngine {
    pub fn new(config: ServerConfig) -> Self {
        let mut game = GameState::new();
        if let Err(e) = game.spawn_boundaries() {
            warn!("Could not create arena boundaries: {}", e);
        }

        Self {
            clients: ClientManager::new(config.max_players),
            session: Session::new(),
            game,
            waves: WaveScheduler::default(),
            tasks: config.task_table(),
            last_update: None,
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// The loop stops once the game has ended
    pub fn is_finished(&self) -> bool {
        self.session.state() == SessionState::Ended
    }

    /// Loop period for the current session state
    pub fn tick_interval(&self) -> Duration {
        let rate = match self.session.state() {
            SessionState::Running => self.config.tick_rate,
            SessionState::Waiting | SessionState::Ended => self.config.lobby_tick_rate,
        };
        Duration::from_secs_f64(1.0 / f64::from(rate.max(1)))
    }

    /// Decodes and dispatches one datagram; malformed input is logged and dropped
    pub fn handle_datagram(
        &mut self,
        addr: SocketAddr,
        data: &[u8],
        now: Instant,
    ) -> Vec<GameMessage> {
        match Packet::decode(data) {
            Ok(packet) => self.handle_packet(addr, packet, now),
            Err(e) => {
                warn!("Dropping malformed packet from {}: {}", addr, e);
                Vec::new()
            }
        }
    }

    pub fn handle_packet(
        &mut self,
        addr: SocketAddr,
        packet: Packet,
        now: Instant,
    ) -> Vec<GameMessage> {
        let known = self.clients.touch(&addr, now);

        match packet {
            Packet::ConnectionRequest => self.handle_connect(addr, now),

            Packet::Ping => vec![GameMessage::SendPacket {
                packet: Packet::Pong,
                addr,
            }],

            Packet::Pong => {
                debug!("Pong from {}", addr);
                Vec::new()
            }

            Packet::Disconnection if known => {
                info!("Peer {} sent a disconnection notice", addr);
                self.disconnect_peer(&addr, now)
            }

            Packet::WantStart if known => self.handle_ready(addr, now),

            Packet::ClientEvent { payload } if known => {
                match InputEvents::from_bytes(&payload) {
                    Ok(input) => {
                        self.clients.set_input(&addr, input);
                    }
                    Err(e) => warn!("Dropping client event from {}: {}", addr, e),
                }
                Vec::new()
            }

            Packet::PlayerShot if known => {
                self.handle_shot(addr);
                Vec::new()
            }

            Packet::Disconnection
            | Packet::WantStart
            | Packet::ClientEvent { .. }
            | Packet::PlayerShot => {
                warn!("Dropping {:?} from unknown sender {}", packet.tag(), addr);
                Vec::new()
            }

            Packet::ServerFull
            | Packet::ConnectionAccepted { .. }
            | Packet::GameStart
            | Packet::GameEnded
            | Packet::PlayersSnapshot(_)
            | Packet::EnemiesSnapshot(_)
            | Packet::ProjectilesSnapshot(_)
            | Packet::NewWave { .. } => {
                warn!("Unexpected {:?} from {}", packet.tag(), addr);
                Vec::new()
            }
        }
    }

    fn handle_connect(&mut self, addr: SocketAddr, now: Instant) -> Vec<GameMessage> {
        let mut messages = Vec::new();

        // Same address again means a new session
        if self.clients.contains(&addr) {
            info!("Peer {} reconnected, dropping its previous session", addr);
            messages.extend(self.disconnect_peer(&addr, now));
        }

        if self.clients.is_full() {
            info!(
                "Rejecting {}: server full ({}/{})",
                addr,
                self.clients.len(),
                self.clients.max_clients()
            );
            messages.push(GameMessage::SendPacket {
                packet: Packet::ServerFull,
                addr,
            });
            return messages;
        }

        let entity_id = match self.game.spawn_player() {
            Ok(id) => id,
            Err(e) => {
                warn!("Rejecting {}: {}", addr, e);
                messages.push(GameMessage::SendPacket {
                    packet: Packet::ServerFull,
                    addr,
                });
                return messages;
            }
        };

        self.clients.add_client(addr, entity_id, now);
        let state = self.session.add_player(entity_id);
        messages.push(GameMessage::SendPacket {
            packet: Packet::ConnectionAccepted { entity_id },
            addr,
        });

        // Joining a running game skips the lobby
        if state == PlayerState::Alive {
            info!("Player {} joined the running game", entity_id);
            messages.push(GameMessage::SendPacket {
                packet: Packet::GameStart,
                addr,
            });
        }
        messages
    }

    fn handle_ready(&mut self, addr: SocketAddr, now: Instant) -> Vec<GameMessage> {
        let Some(entity_id) = self.clients.find_entity_by_addr(&addr) else {
            return Vec::new();
        };

        match self.session.ready_up(entity_id) {
            ReadyOutcome::Started => self.start_game(now),
            ReadyOutcome::Waiting { ready, total } => {
                info!("{}/{} players ready", ready, total);
                Vec::new()
            }
            outcome => {
                debug!("Ready-up from {} ignored: {:?}", entity_id, outcome);
                Vec::new()
            }
        }
    }

    fn handle_shot(&mut self, addr: SocketAddr) {
        if self.session.state() != SessionState::Running {
            debug!("Ignoring shot from {} outside of a running game", addr);
            return;
        }

        let Some(entity_id) = self.clients.find_entity_by_addr(&addr) else {
            return;
        };

        match self.game.spawn_projectile(entity_id) {
            Ok(Some(id)) => debug!("Player {} fired projectile {}", entity_id, id),
            Ok(None) => debug!("Player {} has no entity to shoot from", entity_id),
            Err(e) => warn!("Shot from {} dropped: {}", entity_id, e),
        }
    }

    /// Called after the session flipped to running
    fn start_game(&mut self, now: Instant) -> Vec<GameMessage> {
        // Lobby inputs do not leak into the first tick
        self.clients.take_inputs();
        self.tasks.arm();
        self.last_update = Some(now);

        info!("Game started with {} players", self.clients.len());
        vec![GameMessage::BroadcastPacket {
            packet: Packet::GameStart,
        }]
    }

    /// Removes a peer with all side effects of a disconnection notice
    ///
    /// Also used by the network layer when a stream connection closes.
    pub fn disconnect_peer(&mut self, addr: &SocketAddr, now: Instant) -> Vec<GameMessage> {
        let Some(client) = self.clients.remove_client(addr) else {
            return Vec::new();
        };
        self.forget_player(client.entity_id);

        if self.session.state() == SessionState::Waiting && self.session.try_start() {
            return self.start_game(now);
        }
        Vec::new()
    }

    fn forget_player(&mut self, entity_id: u32) {
        self.session.remove_player(entity_id);
        self.game.remove_entity(entity_id);
    }

    /// Advances the engine by one loop iteration
    pub fn tick(&mut self, now: Instant) -> Vec<GameMessage> {
        let mut messages = Vec::new();

        let evicted = self.clients.check_timeouts(now, self.config.client_timeout);
        for client in &evicted {
            self.forget_player(client.entity_id);
        }
        if !evicted.is_empty()
            && self.session.state() == SessionState::Waiting
            && self.session.try_start()
        {
            messages.extend(self.start_game(now));
        }

        if self.session.state() == SessionState::Running {
            messages.extend(self.run_tick(now));
        }

        self.game.tick = self.game.tick.wrapping_add(1);
        messages
    }

    fn run_tick(&mut self, now: Instant) -> Vec<GameMessage> {
        let mut messages = Vec::new();

        let last = self.last_update.unwrap_or(now);
        let mut delta_time = now.saturating_duration_since(last).as_secs_f32();
        self.last_update = Some(now);
        if delta_time > MAX_DELTA_TIME {
            debug!(
                "Large delta time detected ({:.3}s), capping to {:.3}s",
                delta_time, MAX_DELTA_TIME
            );
            delta_time = MAX_DELTA_TIME;
        }

        for (entity_id, input) in self.clients.take_inputs() {
            self.game.apply_input(entity_id, input.as_ref());
        }

        let culled = self.game.update_positions(delta_time);
        if !culled.is_empty() {
            debug!("Culled {} entities that left the arena", culled.len());
        }

        for task in self.tasks.poll(now) {
            messages.push(self.run_task(task));
        }

        if self.session.should_end() && self.session.end() {
            messages.push(GameMessage::BroadcastPacket {
                packet: Packet::GameEnded,
            });
        }

        messages
    }

    fn run_task(&mut self, task: TaskKind) -> GameMessage {
        let packet = match task {
            TaskKind::BroadcastPlayers => Packet::PlayersSnapshot(self.game.players_snapshot()),
            TaskKind::BroadcastEnemies => {
                Packet::EnemiesSnapshot(self.game.entity_snapshot(EntityCategory::Enemy))
            }
            TaskKind::BroadcastProjectiles => {
                Packet::ProjectilesSnapshot(self.game.entity_snapshot(EntityCategory::Projectile))
            }
            TaskKind::SpawnWave => self.spawn_next_wave(),
        };
        GameMessage::BroadcastPacket { packet }
    }

    fn spawn_next_wave(&mut self) -> Packet {
        let (index, entries) = match self.waves.next_wave() {
            Some(wave) => (wave.sequence, wave.entries.to_vec()),
            None => (self.waves.launched(), Vec::new()),
        };

        let spawned = self.game.spawn_wave(&entries);
        info!("Wave {} launched with {} enemies", index, spawned.len());
        Packet::NewWave { index }
    }

    /// Lowers a player's health, marking them dead at zero
    ///
    /// The session end itself is detected on the next tick.
    pub fn damage_player(&mut self, entity_id: u32, amount: i64) -> Option<i64> {
        if EntityCategory::classify(entity_id) != Some(EntityCategory::Player) {
            return None;
        }

        let hp = self.game.damage(entity_id, amount)?;
        if hp == 0 {
            self.session.mark_dead(entity_id);
        }
        Some(hp)
    }

    /// Administrative stop; only a running game can end
    pub fn end_game(&mut self) -> Vec<GameMessage> {
        if self.session.end() {
            vec![GameMessage::BroadcastPacket {
                packet: Packet::GameEnded,
            }]
        } else {
            Vec::new()
        }
    }

    /// Farewell sent to every peer when the server stops
    pub fn shutdown_messages(&self) -> Vec<GameMessage> {
        if self.clients.is_empty() {
            return Vec::new();
        }
        vec![GameMessage::BroadcastPacket {
            packet: Packet::Disconnection,
        }]
    }
}
