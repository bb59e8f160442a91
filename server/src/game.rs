use crate::waves::{EnemyKind, WaveEntry};
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    is_out_of_arena, EntityCategory, EntityRecord, IdAllocator, IdError, InputEvents,
    PlayerRecord, ARENA_HEIGHT, ARENA_WIDTH, PLAYER_SPAWN_X, PLAYER_SPEED, PLAYER_START_HEALTH,
    PROJECTILE_SPEED,
};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Boundary,
    Player,
    Enemy(EnemyKind),
    Projectile { owner: u32 },
}

/// An authoritative simulation entity
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: u32,
    pub kind: EntityKind,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub hp: i64,
}

impl Entity {
    fn new(id: u32, kind: EntityKind, x: f32, y: f32, hp: i64) -> Self {
        Self {
            id,
            kind,
            x,
            y,
            vel_x: 0.0,
            vel_y: 0.0,
            hp,
        }
    }
}

/// Entity store owned by the server, with one id allocator per band
#[derive(Debug, Clone)]
pub struct GameState {
    pub tick: u32,
    entities: HashMap<u32, Entity>,
    allocators: HashMap<EntityCategory, IdAllocator>,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        let allocators = EntityCategory::ALL
            .into_iter()
            .map(|category| (category, IdAllocator::for_category(category)))
            .collect();

        Self {
            tick: 0,
            entities: HashMap::new(),
            allocators,
        }
    }

    fn allocate(&mut self, category: EntityCategory) -> Result<u32, IdError> {
        self.allocators
            .get_mut(&category)
            .ok_or(IdError::BandExhausted {
                category: category.to_string(),
            })?
            .allocate()
    }

    fn insert(
        &mut self,
        category: EntityCategory,
        kind: EntityKind,
        x: f32,
        y: f32,
        hp: i64,
    ) -> Result<u32, IdError> {
        let id = self.allocate(category)?;
        self.entities.insert(id, Entity::new(id, kind, x, y, hp));
        Ok(id)
    }

    /// Creates the four arena walls in the map band
    pub fn spawn_boundaries(&mut self) -> Result<Vec<u32>, IdError> {
        let walls = [
            (0.0, ARENA_HEIGHT / 2.0),
            (ARENA_WIDTH / 2.0, 0.0),
            (ARENA_WIDTH, ARENA_HEIGHT / 2.0),
            (ARENA_WIDTH / 2.0, ARENA_HEIGHT),
        ];

        let mut ids = Vec::with_capacity(walls.len());
        for (x, y) in walls {
            ids.push(self.insert(EntityCategory::Map, EntityKind::Boundary, x, y, 0)?);
        }
        debug!("Arena boundaries spawned as {:?}", ids);
        Ok(ids)
    }

    pub fn spawn_player(&mut self) -> Result<u32, IdError> {
        let spawn_y = rand::thread_rng().gen_range(ARENA_HEIGHT * 0.2..ARENA_HEIGHT * 0.8);
        let id = self.insert(
            EntityCategory::Player,
            EntityKind::Player,
            PLAYER_SPAWN_X,
            spawn_y,
            PLAYER_START_HEALTH,
        )?;

        info!("Added player {} at ({}, {})", id, PLAYER_SPAWN_X, spawn_y);
        Ok(id)
    }

    pub fn spawn_enemy(&mut self, entry: &WaveEntry) -> Result<u32, IdError> {
        let id = self.insert(
            EntityCategory::Enemy,
            EntityKind::Enemy(entry.kind),
            entry.x,
            entry.y,
            entry.kind.health(),
        )?;

        if let Some(enemy) = self.entities.get_mut(&id) {
            enemy.vel_x = -entry.kind.speed();
        }
        Ok(id)
    }

    /// Spawns every entry of a wave, skipping entries once the band is full
    pub fn spawn_wave(&mut self, entries: &[WaveEntry]) -> Vec<u32> {
        let mut spawned = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.spawn_enemy(entry) {
                Ok(id) => spawned.push(id),
                Err(e) => warn!(
                    "Skipping {} at ({}, {}): {}",
                    entry.kind.name(),
                    entry.x,
                    entry.y,
                    e
                ),
            }
        }
        spawned
    }

    /// Fires a projectile from the shooter's current position
    pub fn spawn_projectile(&mut self, owner: u32) -> Result<Option<u32>, IdError> {
        let Some((x, y)) = self.entities.get(&owner).map(|e| (e.x, e.y)) else {
            return Ok(None);
        };

        let id = self.insert(
            EntityCategory::Projectile,
            EntityKind::Projectile { owner },
            x,
            y,
            1,
        )?;
        if let Some(projectile) = self.entities.get_mut(&id) {
            projectile.vel_x = PROJECTILE_SPEED;
        }
        Ok(Some(id))
    }

    /// Destroys an entity and frees its id
    pub fn remove_entity(&mut self, id: u32) -> Option<Entity> {
        let removed = self.entities.remove(&id)?;
        if let Some(category) = EntityCategory::classify(id) {
            if let Some(allocator) = self.allocators.get_mut(&category) {
                allocator.release(id);
            }
        }
        Some(removed)
    }

    pub fn get(&self, id: u32) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn count(&self, category: EntityCategory) -> usize {
        let band = category.band();
        self.entities.keys().filter(|id| band.contains(**id)).count()
    }

    /// Sets a player's velocity from this tick's input; no input means standing still
    pub fn apply_input(&mut self, player_id: u32, input: Option<&InputEvents>) {
        if let Some(player) = self.entities.get_mut(&player_id) {
            let (dx, dy) = input.map(InputEvents::direction).unwrap_or((0.0, 0.0));
            player.vel_x = dx * PLAYER_SPEED;
            player.vel_y = dy * PLAYER_SPEED;
        }
    }

    /// Integrates velocities and destroys non-player entities that left the arena
    ///
    /// Players are clamped to the arena instead. Returns the ids destroyed.
    pub fn update_positions(&mut self, dt: f32) -> Vec<u32> {
        let mut gone = Vec::new();

        for entity in self.entities.values_mut() {
            if entity.kind == EntityKind::Boundary {
                continue;
            }

            entity.x += entity.vel_x * dt;
            entity.y += entity.vel_y * dt;

            match entity.kind {
                EntityKind::Player => {
                    entity.x = entity.x.clamp(0.0, ARENA_WIDTH);
                    entity.y = entity.y.clamp(0.0, ARENA_HEIGHT);
                }
                _ if is_out_of_arena(entity.x, entity.y) => gone.push(entity.id),
                _ => {}
            }
        }

        for id in &gone {
            self.remove_entity(*id);
        }
        gone
    }

    /// Lowers a player's health; returns the new value
    pub fn damage(&mut self, id: u32, amount: i64) -> Option<i64> {
        let entity = self.entities.get_mut(&id)?;
        entity.hp = entity.hp.saturating_sub(amount).max(0);
        Some(entity.hp)
    }

    fn in_band(&self, category: EntityCategory) -> Vec<&Entity> {
        let band = category.band();
        let mut matches: Vec<&Entity> = self
            .entities
            .values()
            .filter(|entity| band.contains(entity.id))
            .collect();
        matches.sort_by_key(|entity| entity.id);
        matches
    }

    pub fn players_snapshot(&self) -> Vec<PlayerRecord> {
        self.in_band(EntityCategory::Player)
            .into_iter()
            .map(|e| PlayerRecord {
                id: e.id,
                x: e.x,
                y: e.y,
                hp: e.hp,
            })
            .collect()
    }

    /// Position-only records for every entity in the category's band
    pub fn entity_snapshot(&self, category: EntityCategory) -> Vec<EntityRecord> {
        self.in_band(category)
            .into_iter()
            .map(|e| EntityRecord {
                id: e.id,
                x: e.x,
                y: e.y,
            })
            .collect()
    }
}
