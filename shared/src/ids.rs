//! Entity id bands and per-band allocation
//!
//! The id space is split into disjoint half-open ranges, one per remote
//! object category. A receiver classifies an id purely by the band it falls
//! in, so the bands must never overlap.

use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Category of a simulation entity, implied by its id band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityCategory {
    Map,
    Player,
    Enemy,
    Projectile,
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityCategory::Map => "map",
            EntityCategory::Player => "player",
            EntityCategory::Enemy => "enemy",
            EntityCategory::Projectile => "projectile",
        };
        f.write_str(name)
    }
}

/// Half-open range `[begin, end)` of entity ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdBand {
    pub begin: u32,
    pub end: u32,
}

impl IdBand {
    pub const fn new(begin: u32, end: u32) -> Self {
        Self { begin, end }
    }

    pub fn contains(&self, id: u32) -> bool {
        self.begin <= id && id < self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &IdBand) -> bool {
        self.begin < other.end && other.begin < self.end
    }
}

pub const MAP_BAND: IdBand = IdBand::new(51, 101);
pub const PLAYER_BAND: IdBand = IdBand::new(101, 151);
pub const ENEMY_BAND: IdBand = IdBand::new(151, 251);
pub const PROJECTILE_BAND: IdBand = IdBand::new(251, 1251);

/// Ids handed out by the client for its own mirror entities. Sits below every
/// server band so mirror ids never collide with ids reused verbatim.
pub const LOCAL_MIRROR_BAND: IdBand = IdBand::new(1, 51);

impl EntityCategory {
    pub const ALL: [EntityCategory; 4] = [
        EntityCategory::Map,
        EntityCategory::Player,
        EntityCategory::Enemy,
        EntityCategory::Projectile,
    ];

    pub fn band(&self) -> IdBand {
        match self {
            EntityCategory::Map => MAP_BAND,
            EntityCategory::Player => PLAYER_BAND,
            EntityCategory::Enemy => ENEMY_BAND,
            EntityCategory::Projectile => PROJECTILE_BAND,
        }
    }

    /// Returns the category whose band holds `id`, if any
    pub fn classify(id: u32) -> Option<EntityCategory> {
        Self::ALL.into_iter().find(|category| category.band().contains(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("no free id left in the {category} band")]
    BandExhausted { category: String },
}

/// Hands out ids from one band, tracking which are live
///
/// The cursor walks forward and wraps back to the band start. A slot that is
/// still live is skipped rather than reused, and allocation fails once every
/// slot in the band is taken.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    label: String,
    band: IdBand,
    cursor: u32,
    live: BTreeSet<u32>,
}

impl IdAllocator {
    pub fn new(label: impl Into<String>, band: IdBand) -> Self {
        Self {
            label: label.into(),
            band,
            cursor: band.begin,
            live: BTreeSet::new(),
        }
    }

    pub fn for_category(category: EntityCategory) -> Self {
        Self::new(category.to_string(), category.band())
    }

    pub fn band(&self) -> IdBand {
        self.band
    }

    /// Reserves the next free id in the band
    pub fn allocate(&mut self) -> Result<u32, IdError> {
        if self.live.len() >= self.band.len() {
            return Err(IdError::BandExhausted {
                category: self.label.clone(),
            });
        }

        loop {
            let candidate = self.cursor;
            self.cursor = if self.cursor + 1 >= self.band.end {
                self.band.begin
            } else {
                self.cursor + 1
            };

            if self.live.insert(candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Returns `id` to the pool. Ids outside the band are ignored.
    pub fn release(&mut self, id: u32) -> bool {
        self.live.remove(&id)
    }

    pub fn is_live(&self, id: u32) -> bool {
        self.live.contains(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
