//! Headless input source with sequencing and change detection
//!
//! Rendering and keyboard polling live outside this crate, so movement comes
//! from a small script: either standing still or wandering in a random
//! direction that changes every so often. Shots fire on a fixed cadence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::InputEvents;
use std::time::{Duration, Instant};

/// Resend interval for unchanged input, doubles as a keep-alive
const KEEP_ALIVE: Duration = Duration::from_millis(16);

/// Produces the input samples the client sends to the server
pub struct InputManager {
    next_sequence: u32,
    current_input: InputEvents,
    last_input_sent: Option<Instant>,

    wander: bool,
    next_turn: Option<Instant>,
    shoot_every: Option<Duration>,
    last_shot: Option<Instant>,
    rng: StdRng,
}

impl InputManager {
    /// `shoot_every` of `None` never shoots
    pub fn new(wander: bool, shoot_every: Option<Duration>) -> Self {
        Self::with_rng(wander, shoot_every, StdRng::from_entropy())
    }

    /// Deterministic variant for tests and replays
    pub fn with_seed(wander: bool, shoot_every: Option<Duration>, seed: u64) -> Self {
        Self::with_rng(wander, shoot_every, StdRng::seed_from_u64(seed))
    }

    fn with_rng(wander: bool, shoot_every: Option<Duration>, rng: StdRng) -> Self {
        Self {
            next_sequence: 1,
            current_input: InputEvents::default(),
            last_input_sent: None,
            wander,
            next_turn: None,
            shoot_every,
            last_shot: None,
            rng,
        }
    }

    /// Samples the script and returns input to send, if any
    ///
    /// Input is sent when it changed or when the keep-alive interval passed.
    pub fn update(&mut self, now: Instant) -> Option<InputEvents> {
        let (up, down, left, right) = self.sample_direction(now);

        let input_changed = up != self.current_input.up
            || down != self.current_input.down
            || left != self.current_input.left
            || right != self.current_input.right;
        let time_to_send = self
            .last_input_sent
            .map_or(true, |last| now.saturating_duration_since(last) >= KEEP_ALIVE);

        if !(input_changed || time_to_send) {
            return None;
        }

        self.current_input = InputEvents {
            sequence: self.next_sequence,
            up,
            down,
            left,
            right,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.last_input_sent = Some(now);
        Some(self.current_input)
    }

    fn sample_direction(&mut self, now: Instant) -> (bool, bool, bool, bool) {
        if !self.wander {
            return (false, false, false, false);
        }

        let turn_due = self.next_turn.map_or(true, |at| now >= at);
        if !turn_due {
            let input = &self.current_input;
            return (input.up, input.down, input.left, input.right);
        }

        self.next_turn = Some(now + Duration::from_millis(self.rng.gen_range(300..1500)));
        let vertical = self.rng.gen_range(0..3);
        let horizontal = self.rng.gen_range(0..3);
        (vertical == 1, vertical == 2, horizontal == 1, horizontal == 2)
    }

    /// True when a scripted shot is due; marks it fired
    pub fn should_shoot(&mut self, now: Instant) -> bool {
        let Some(every) = self.shoot_every else {
            return false;
        };

        let due = self
            .last_shot
            .map_or(true, |last| now.saturating_duration_since(last) >= every);
        if due {
            self.last_shot = Some(now);
        }
        due
    }

    /// Returns the current input state
    pub fn get_current_input(&self) -> &InputEvents {
        &self.current_input
    }
}
