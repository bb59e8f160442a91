//! Round-trip latency probe
//!
//! Sends a ping on a fixed interval while connected and turns the matching
//! pong into a round-trip sample. Samples are kept for observability only and
//! never influence the protocol.

use log::debug;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of round-trip samples kept
pub const HISTORY_LEN: usize = 100;

#[derive(Debug, Clone)]
pub struct LatencyProbe {
    interval: Duration,
    last_ping: Option<Instant>,
    /// Send time of the ping still waiting for its pong
    outstanding: Option<Instant>,
    history: VecDeque<Duration>,
}

impl Default for LatencyProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(shared::PING_INTERVAL_SECS))
    }
}

impl LatencyProbe {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_ping: None,
            outstanding: None,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Returns true when a ping should go out now, and records it as sent
    pub fn poll(&mut self, now: Instant) -> bool {
        let due = match self.last_ping {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };

        if due {
            self.last_ping = Some(now);
            // A lost pong is simply superseded by the next ping
            self.outstanding = Some(now);
        }
        due
    }

    /// Matches a pong to the outstanding ping; stray pongs are ignored
    pub fn on_pong(&mut self, now: Instant) -> Option<Duration> {
        let sent = self.outstanding.take()?;
        let rtt = now.saturating_duration_since(sent);

        self.history.push_back(rtt);
        while self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }

        debug!("Round trip {:.1}ms", rtt.as_secs_f32() * 1000.0);
        Some(rtt)
    }

    pub fn last(&self) -> Option<Duration> {
        self.history.back().copied()
    }

    pub fn average(&self) -> Option<Duration> {
        if self.history.is_empty() {
            return None;
        }
        let total: Duration = self.history.iter().sum();
        Some(total / self.history.len() as u32)
    }

    pub fn samples(&self) -> impl Iterator<Item = &Duration> {
        self.history.iter()
    }

    pub fn reset(&mut self) {
        self.last_ping = None;
        self.outstanding = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_poll_is_due() {
        let mut probe = LatencyProbe::new(Duration::from_secs(5));
        let now = Instant::now();
        assert!(probe.poll(now));
        assert!(!probe.poll(now + Duration::from_secs(1)));
        assert!(probe.poll(now + Duration::from_secs(5)));
    }

    #[test]
    fn test_pong_produces_sample() {
        let mut probe = LatencyProbe::default();
        let now = Instant::now();
        probe.poll(now);

        let rtt = probe.on_pong(now + Duration::from_millis(40)).unwrap();
        assert_eq!(rtt, Duration::from_millis(40));
        assert_eq!(probe.last(), Some(rtt));

        // Nothing outstanding anymore
        assert!(probe.on_pong(now + Duration::from_millis(50)).is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut probe = LatencyProbe::new(Duration::from_millis(1));
        let start = Instant::now();

        for i in 0..(HISTORY_LEN as u64 + 20) {
            let sent = start + Duration::from_millis(i * 10);
            probe.poll(sent);
            probe.on_pong(sent + Duration::from_millis(2));
        }

        assert_eq!(probe.samples().count(), HISTORY_LEN);
        assert_eq!(probe.average(), Some(Duration::from_millis(2)));
    }

    #[test]
    fn test_average_empty() {
        assert!(LatencyProbe::default().average().is_none());
    }
}
