//! Lobby, ready-up handshake and game lifecycle
//!
//! The session moves through exactly two transitions:
//! `Waiting -> Running` once every connected player has readied up, and
//! `Running -> Ended` when an end condition is signalled. Everything else is a
//! no-op that gets logged.

use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Waiting,
    Running,
    Ended,
}

/// Progress of one player through the handshake and the game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Awaiting,
    Ready,
    Alive,
    Dead,
}

/// Result of a ready-up message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// This ready-up was the last one needed; the game is now running
    Started,
    /// Player marked ready, others still pending
    Waiting { ready: usize, total: usize },
    /// Player had already readied up
    AlreadyReady,
    /// The session is past the lobby
    Ignored(SessionState),
    /// No readiness record for this entity
    UnknownPlayer,
}

/// Session state plus the readiness table, in join order
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    players: Vec<(u32, PlayerState)>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Waiting,
            players: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn players(&self) -> &[(u32, PlayerState)] {
        &self.players
    }

    pub fn player_state(&self, entity_id: u32) -> Option<PlayerState> {
        self.players
            .iter()
            .find(|(id, _)| *id == entity_id)
            .map(|(_, state)| *state)
    }

    /// Adds a readiness record and returns the state it starts in
    ///
    /// Players joining the lobby start `Awaiting`. Once the game is running
    /// there is no handshake left to complete, so they join `Alive`.
    pub fn add_player(&mut self, entity_id: u32) -> PlayerState {
        if let Some(state) = self.player_state(entity_id) {
            return state;
        }

        let state = match self.state {
            SessionState::Running => PlayerState::Alive,
            SessionState::Waiting | SessionState::Ended => PlayerState::Awaiting,
        };
        self.players.push((entity_id, state));
        state
    }

    pub fn remove_player(&mut self, entity_id: u32) -> bool {
        let before = self.players.len();
        self.players.retain(|(id, _)| *id != entity_id);
        before != self.players.len()
    }

    pub fn ready_up(&mut self, entity_id: u32) -> ReadyOutcome {
        if self.state != SessionState::Waiting {
            debug!(
                "Ignoring ready-up from {} while {:?}",
                entity_id, self.state
            );
            return ReadyOutcome::Ignored(self.state);
        }

        let Some(entry) = self.players.iter_mut().find(|(id, _)| *id == entity_id) else {
            return ReadyOutcome::UnknownPlayer;
        };

        if entry.1 != PlayerState::Awaiting {
            return ReadyOutcome::AlreadyReady;
        }
        entry.1 = PlayerState::Ready;
        info!("Player {} is ready", entity_id);

        if self.try_start() {
            ReadyOutcome::Started
        } else {
            ReadyOutcome::Waiting {
                ready: self.ready_count(),
                total: self.players.len(),
            }
        }
    }

    /// Starts the game if at least one player is connected and all are ready
    ///
    /// On success every readiness record flips to `Alive`.
    pub fn try_start(&mut self) -> bool {
        if self.state != SessionState::Waiting || self.players.is_empty() {
            return false;
        }

        if !self
            .players
            .iter()
            .all(|(_, state)| *state == PlayerState::Ready)
        {
            return false;
        }

        for (_, state) in &mut self.players {
            *state = PlayerState::Alive;
        }
        self.state = SessionState::Running;
        info!("All {} players ready, session running", self.players.len());
        true
    }

    pub fn ready_count(&self) -> usize {
        self.players
            .iter()
            .filter(|(_, state)| *state == PlayerState::Ready)
            .count()
    }

    pub fn mark_dead(&mut self, entity_id: u32) -> bool {
        match self.players.iter_mut().find(|(id, _)| *id == entity_id) {
            Some(entry) if entry.1 == PlayerState::Alive => {
                entry.1 = PlayerState::Dead;
                info!("Player {} died", entity_id);
                true
            }
            _ => false,
        }
    }

    /// True while running with nobody left alive
    pub fn should_end(&self) -> bool {
        self.state == SessionState::Running
            && !self
                .players
                .iter()
                .any(|(_, state)| *state == PlayerState::Alive)
    }

    /// Moves a running session to `Ended`; returns true only on the transition
    pub fn end(&mut self) -> bool {
        if self.state != SessionState::Running {
            debug!("End requested while {:?}, ignoring", self.state);
            return false;
        }
        self.state = SessionState::Ended;
        info!("Session ended");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_waits() {
        let session = Session::new();
        assert_eq!(session.state(), SessionState::Waiting);
        assert!(session.players().is_empty());
    }

    #[test]
    fn test_players_start_awaiting() {
        let mut session = Session::new();
        session.add_player(101);
        assert_eq!(session.player_state(101), Some(PlayerState::Awaiting));
    }

    #[test]
    fn test_all_ready_starts_once() {
        let mut session = Session::new();
        session.add_player(101);
        session.add_player(102);

        assert_eq!(
            session.ready_up(101),
            ReadyOutcome::Waiting { ready: 1, total: 2 }
        );
        assert_eq!(session.state(), SessionState::Waiting);

        assert_eq!(session.ready_up(102), ReadyOutcome::Started);
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.player_state(101), Some(PlayerState::Alive));
        assert_eq!(session.player_state(102), Some(PlayerState::Alive));

        assert_eq!(
            session.ready_up(101),
            ReadyOutcome::Ignored(SessionState::Running)
        );
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn test_duplicate_ready_up() {
        let mut session = Session::new();
        session.add_player(101);
        session.add_player(102);

        session.ready_up(101);
        assert_eq!(session.ready_up(101), ReadyOutcome::AlreadyReady);
        assert_eq!(session.ready_up(999), ReadyOutcome::UnknownPlayer);
    }

    #[test]
    fn test_empty_lobby_never_starts() {
        let mut session = Session::new();
        assert!(!session.try_start());
        assert_eq!(session.state(), SessionState::Waiting);
    }

    #[test]
    fn test_leaving_player_can_unblock_start() {
        let mut session = Session::new();
        session.add_player(101);
        session.add_player(102);
        session.ready_up(101);

        assert!(session.remove_player(102));
        assert!(session.try_start());
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn test_end_only_from_running() {
        let mut session = Session::new();
        assert!(!session.end());

        session.add_player(101);
        session.ready_up(101);
        assert!(session.end());
        assert_eq!(session.state(), SessionState::Ended);
        assert!(!session.end());
        assert_eq!(
            session.ready_up(101),
            ReadyOutcome::Ignored(SessionState::Ended)
        );
    }

    #[test]
    fn test_should_end_when_everyone_dead() {
        let mut session = Session::new();
        session.add_player(101);
        session.add_player(102);
        session.ready_up(101);
        session.ready_up(102);

        assert!(session.mark_dead(101));
        assert!(!session.should_end());
        assert!(session.mark_dead(102));
        assert!(session.should_end());
        assert!(!session.mark_dead(102));
    }

    #[test]
    fn test_late_joiner_is_alive_and_can_die() {
        let mut session = Session::new();
        session.add_player(101);
        session.ready_up(101);

        assert_eq!(session.add_player(102), PlayerState::Alive);
        assert_eq!(session.add_player(102), PlayerState::Alive);
        assert_eq!(session.players().len(), 2);

        session.mark_dead(101);
        assert!(!session.should_end());
        assert!(session.mark_dead(102));
        assert!(session.should_end());
    }

    #[test]
    fn test_should_end_when_running_empty() {
        let mut session = Session::new();
        session.add_player(101);
        session.ready_up(101);
        session.remove_player(101);
        assert!(session.should_end());
    }
}
