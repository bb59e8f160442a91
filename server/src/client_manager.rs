//! Connection records for the synchronization server
//!
//! This module tracks every peer that completed the connection handshake:
//! - Connection lifecycle (accept, disconnect notice, silent timeout)
//! - The authoritative entity each peer controls
//! - The most recent input event received from each peer
//! - Capacity limits and address lookup
//!
//! Peers are keyed by their remote address. A connection request from an
//! address that already has a record starts a brand new session.

use log::info;
use shared::InputEvents;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected peer and the entity it drives
#[derive(Debug, Clone)]
pub struct Client {
    /// Network address used as the session key
    pub addr: SocketAddr,
    /// Player entity spawned for this peer
    pub entity_id: u32,
    /// Last time any packet arrived from this peer
    pub last_seen: Instant,
    /// Latest input since the previous tick; later events overwrite earlier ones
    pub latest_input: Option<InputEvents>,
}

impl Client {
    pub fn new(addr: SocketAddr, entity_id: u32, now: Instant) -> Self {
        Self {
            addr,
            entity_id,
            last_seen: now,
            latest_input: None,
        }
    }

    /// Checks if the peer has been silent for longer than `timeout`
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

/// Table of connected peers with a hard capacity
///
/// All access happens on the server loop thread, so the table needs no
/// internal locking.
pub struct ClientManager {
    clients: HashMap<SocketAddr, Client>,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// Returns true when another connection would exceed the configured maximum
    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Records a new connection
    ///
    /// Returns false without touching the table if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, entity_id: u32, now: Instant) -> bool {
        if self.is_full() {
            return false;
        }

        info!(
            "Peer {} connected as entity {} ({}/{})",
            addr,
            entity_id,
            self.clients.len() + 1,
            self.max_clients
        );
        self.clients.insert(addr, Client::new(addr, entity_id, now));
        true
    }

    /// Drops the record for `addr`, returning it if it existed
    pub fn remove_client(&mut self, addr: &SocketAddr) -> Option<Client> {
        let removed = self.clients.remove(addr);
        if let Some(client) = &removed {
            info!("Peer {} (entity {}) removed", addr, client.entity_id);
        }
        removed
    }

    pub fn find_entity_by_addr(&self, addr: &SocketAddr) -> Option<u32> {
        self.clients.get(addr).map(|client| client.entity_id)
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.clients.contains_key(addr)
    }

    /// Marks the peer as alive; returns false for unknown addresses
    pub fn touch(&mut self, addr: &SocketAddr, now: Instant) -> bool {
        match self.clients.get_mut(addr) {
            Some(client) => {
                client.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Stores the latest input for a peer, replacing any earlier one
    pub fn set_input(&mut self, addr: &SocketAddr, input: InputEvents) -> bool {
        match self.clients.get_mut(addr) {
            Some(client) => {
                client.latest_input = Some(input);
                true
            }
            None => false,
        }
    }

    /// Takes this tick's inputs, one entry per connected entity
    ///
    /// Peers that sent nothing since the previous call yield `None`.
    pub fn take_inputs(&mut self) -> Vec<(u32, Option<InputEvents>)> {
        let mut inputs: Vec<(u32, Option<InputEvents>)> = self
            .clients
            .values_mut()
            .map(|client| (client.entity_id, client.latest_input.take()))
            .collect();
        inputs.sort_by_key(|(entity_id, _)| *entity_id);
        inputs
    }

    /// Removes and returns every peer silent for longer than `timeout`
    pub fn check_timeouts(&mut self, now: Instant, timeout: Duration) -> Vec<Client> {
        let timed_out: Vec<SocketAddr> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(now, timeout))
            .map(|client| client.addr)
            .collect();

        timed_out
            .iter()
            .filter_map(|addr| self.clients.remove(addr))
            .inspect(|client| info!("Peer {} timed out", client.addr))
            .collect()
    }

    pub fn get_client_addrs(&self) -> Vec<SocketAddr> {
        let mut addrs: Vec<SocketAddr> = self.clients.keys().copied().collect();
        addrs.sort();
        addrs
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_timeout() {
        let now = Instant::now();
        let client = Client::new(test_addr(), 101, now);

        assert!(!client.is_timed_out(now + Duration::from_millis(500), Duration::from_secs(1)));
        assert!(client.is_timed_out(now + Duration::from_secs(2), Duration::from_secs(1)));
    }

    #[test]
    fn test_add_and_find_client() {
        let mut manager = ClientManager::new(2);
        let now = Instant::now();

        assert!(manager.add_client(test_addr(), 101, now));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.find_entity_by_addr(&test_addr()), Some(101));
        assert_eq!(manager.find_entity_by_addr(&test_addr2()), None);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);
        let now = Instant::now();

        assert!(manager.add_client(test_addr(), 101, now));
        assert!(manager.is_full());
        assert!(!manager.add_client(test_addr2(), 102, now));
        assert_eq!(manager.len(), 1);
        assert!(!manager.contains(&test_addr2()));
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        manager.add_client(test_addr(), 101, Instant::now());

        let removed = manager.remove_client(&test_addr()).unwrap();
        assert_eq!(removed.entity_id, 101);
        assert!(manager.is_empty());
        assert!(manager.remove_client(&test_addr()).is_none());
    }

    #[test]
    fn test_latest_input_wins() {
        let mut manager = ClientManager::new(2);
        manager.add_client(test_addr(), 101, Instant::now());

        let first = InputEvents {
            sequence: 1,
            left: true,
            ..Default::default()
        };
        let second = InputEvents {
            sequence: 2,
            right: true,
            ..Default::default()
        };

        assert!(manager.set_input(&test_addr(), first));
        assert!(manager.set_input(&test_addr(), second));
        assert!(!manager.set_input(&test_addr2(), first));

        let inputs = manager.take_inputs();
        assert_eq!(inputs, vec![(101, Some(second))]);

        // Inputs do not carry over to the next tick
        assert_eq!(manager.take_inputs(), vec![(101, None)]);
    }

    #[test]
    fn test_check_timeouts_removes_silent_peers() {
        let mut manager = ClientManager::new(4);
        let start = Instant::now();
        manager.add_client(test_addr(), 101, start);
        manager.add_client(test_addr2(), 102, start);

        let later = start + Duration::from_secs(3);
        assert!(manager.touch(&test_addr2(), later));

        let evicted =
            manager.check_timeouts(later + Duration::from_millis(100), Duration::from_secs(2));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].entity_id, 101);
        assert_eq!(manager.get_client_addrs(), vec![test_addr2()]);
    }
}
