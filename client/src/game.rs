//! Client-side mirror of the server's entities
//!
//! Snapshots only ever describe who is present right now, so creation,
//! update and removal of mirror entities are all derived from presence:
//! an id seen for the first time is spawned, a known id is updated in place,
//! and a previously known id missing from the latest snapshot of its
//! category is destroyed.
//!
//! Remote players get a fresh local id through a translation table. Enemies
//! and projectiles keep the server's id as their local id because the server
//! already keeps those unique inside their bands.

use log::{debug, warn};
use shared::ids::LOCAL_MIRROR_BAND;
use shared::{
    EntityCategory, EntityRecord, IdAllocator, PlayerRecord, ARENA_HEIGHT, PLAYER_SPAWN_X,
    PLAYER_START_HEALTH,
};
use std::collections::{HashMap, HashSet};

/// A local stand-in for one server-owned entity
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorEntity {
    pub local_id: u32,
    pub server_id: u32,
    pub category: EntityCategory,
    pub x: f32,
    pub y: f32,
    /// Only players carry health on the wire
    pub hp: Option<i64>,
}

/// What a reconciliation pass did to the local entity set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileEvent {
    Spawned {
        local_id: u32,
        server_id: u32,
        category: EntityCategory,
    },
    Despawned {
        local_id: u32,
        server_id: u32,
        category: EntityCategory,
    },
}

#[derive(Debug)]
pub struct MirrorWorld {
    entities: HashMap<u32, MirrorEntity>,
    /// Server player id to local mirror id
    player_ids: HashMap<u32, u32>,
    local_ids: IdAllocator,
    own_server_id: Option<u32>,
}

impl Default for MirrorWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorWorld {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            player_ids: HashMap::new(),
            local_ids: IdAllocator::new("mirror", LOCAL_MIRROR_BAND),
            own_server_id: None,
        }
    }

    pub fn get(&self, local_id: u32) -> Option<&MirrorEntity> {
        self.entities.get(&local_id)
    }

    pub fn local_id_for(&self, server_id: u32) -> Option<u32> {
        self.player_ids.get(&server_id).copied()
    }

    pub fn player(&self, server_id: u32) -> Option<&MirrorEntity> {
        self.local_id_for(server_id)
            .and_then(|local_id| self.entities.get(&local_id))
    }

    pub fn own_server_id(&self) -> Option<u32> {
        self.own_server_id
    }

    pub fn own_player(&self) -> Option<&MirrorEntity> {
        self.own_server_id.and_then(|id| self.player(id))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn count(&self, category: EntityCategory) -> usize {
        self.entities
            .values()
            .filter(|entity| entity.category == category)
            .count()
    }

    pub fn entities(&self) -> impl Iterator<Item = &MirrorEntity> {
        self.entities.values()
    }

    /// Creates the local player's mirror if it does not exist yet
    pub fn ensure_own_player(&mut self, server_id: u32) -> Option<ReconcileEvent> {
        self.own_server_id = Some(server_id);
        if self.player_ids.contains_key(&server_id) {
            return None;
        }

        self.spawn_player(&PlayerRecord {
            id: server_id,
            x: PLAYER_SPAWN_X,
            y: ARENA_HEIGHT / 2.0,
            hp: PLAYER_START_HEALTH,
        })
    }

    fn spawn_player(&mut self, record: &PlayerRecord) -> Option<ReconcileEvent> {
        let local_id = match self.local_ids.allocate() {
            Ok(id) => id,
            Err(e) => {
                warn!("No local id for player {}: {}", record.id, e);
                return None;
            }
        };

        self.player_ids.insert(record.id, local_id);
        self.entities.insert(
            local_id,
            MirrorEntity {
                local_id,
                server_id: record.id,
                category: EntityCategory::Player,
                x: record.x,
                y: record.y,
                hp: Some(record.hp),
            },
        );
        debug!("Mirrored player {} as local {}", record.id, local_id);

        Some(ReconcileEvent::Spawned {
            local_id,
            server_id: record.id,
            category: EntityCategory::Player,
        })
    }

    /// Reconciles the player mirrors against one players snapshot
    pub fn apply_players(&mut self, records: &[PlayerRecord]) -> Vec<ReconcileEvent> {
        let mut events = Vec::new();
        let present: HashSet<u32> = records.iter().map(|r| r.id).collect();

        for record in records {
            let existing = self
                .player_ids
                .get(&record.id)
                .and_then(|local_id| self.entities.get_mut(local_id));

            match existing {
                Some(entity) => {
                    entity.x = record.x;
                    entity.y = record.y;
                    entity.hp = Some(record.hp);
                }
                None => events.extend(self.spawn_player(record)),
            }
        }

        let stale: Vec<u32> = self
            .player_ids
            .keys()
            .filter(|id| !present.contains(id) && Some(**id) != self.own_server_id)
            .copied()
            .collect();

        for server_id in stale {
            if let Some(local_id) = self.player_ids.remove(&server_id) {
                self.entities.remove(&local_id);
                self.local_ids.release(local_id);
                events.push(ReconcileEvent::Despawned {
                    local_id,
                    server_id,
                    category: EntityCategory::Player,
                });
            }
        }

        events
    }

    /// Reconciles enemies or projectiles, reusing the server id locally
    ///
    /// Records whose id falls outside the category's band are ignored.
    pub fn apply_entities(
        &mut self,
        category: EntityCategory,
        records: &[EntityRecord],
    ) -> Vec<ReconcileEvent> {
        let band = category.band();
        let mut events = Vec::new();
        let mut present = HashSet::with_capacity(records.len());

        for record in records {
            if !band.contains(record.id) {
                debug!("Ignoring id {} in {} snapshot", record.id, category);
                continue;
            }
            present.insert(record.id);

            match self.entities.get_mut(&record.id) {
                Some(entity) => {
                    entity.x = record.x;
                    entity.y = record.y;
                }
                None => {
                    self.entities.insert(
                        record.id,
                        MirrorEntity {
                            local_id: record.id,
                            server_id: record.id,
                            category,
                            x: record.x,
                            y: record.y,
                            hp: None,
                        },
                    );
                    events.push(ReconcileEvent::Spawned {
                        local_id: record.id,
                        server_id: record.id,
                        category,
                    });
                }
            }
        }

        let stale: Vec<u32> = self
            .entities
            .values()
            .filter(|entity| entity.category == category && !present.contains(&entity.local_id))
            .map(|entity| entity.local_id)
            .collect();

        for id in stale {
            self.entities.remove(&id);
            events.push(ReconcileEvent::Despawned {
                local_id: id,
                server_id: id,
                category,
            });
        }

        events
    }

    /// Drops every mirror, own player included
    pub fn clear(&mut self) -> Vec<ReconcileEvent> {
        let events = self
            .entities
            .drain()
            .map(|(local_id, entity)| ReconcileEvent::Despawned {
                local_id,
                server_id: entity.server_id,
                category: entity.category,
            })
            .collect();

        for local_id in self.player_ids.drain().map(|(_, local_id)| local_id) {
            self.local_ids.release(local_id);
        }
        events
    }
}
