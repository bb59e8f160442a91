//! Canonical enemy waves and the cycling scheduler that walks them

/// Enemy archetypes used by the wave table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnemyKind {
    Enemy1,
    Enemy2,
    Enemy3,
    Enemy4,
}

impl EnemyKind {
    pub fn name(&self) -> &'static str {
        match self {
            EnemyKind::Enemy1 => "enemy1",
            EnemyKind::Enemy2 => "enemy2",
            EnemyKind::Enemy3 => "enemy3",
            EnemyKind::Enemy4 => "enemy4",
        }
    }

    /// Horizontal drift in pixels per second; enemies travel right to left
    pub fn speed(&self) -> f32 {
        match self {
            EnemyKind::Enemy1 => 120.0,
            EnemyKind::Enemy2 => 160.0,
            EnemyKind::Enemy3 => 90.0,
            EnemyKind::Enemy4 => 200.0,
        }
    }

    pub fn health(&self) -> i64 {
        match self {
            EnemyKind::Enemy1 => 10,
            EnemyKind::Enemy2 => 20,
            EnemyKind::Enemy3 => 40,
            EnemyKind::Enemy4 => 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveEntry {
    pub kind: EnemyKind,
    pub x: f32,
    pub y: f32,
}

const fn entry(kind: EnemyKind, x: f32, y: f32) -> WaveEntry {
    WaveEntry { kind, x, y }
}

use EnemyKind::{Enemy1, Enemy2, Enemy3, Enemy4};

const WAVE_ONE: &[WaveEntry] = &[
    entry(Enemy1, 1550.0, 50.0),
    entry(Enemy1, 1550.0, 150.0),
    entry(Enemy1, 1550.0, 250.0),
    entry(Enemy1, 1550.0, 350.0),
    entry(Enemy1, 1550.0, 450.0),
    entry(Enemy2, 1650.0, 100.0),
    entry(Enemy2, 1650.0, 200.0),
    entry(Enemy2, 1650.0, 300.0),
    entry(Enemy2, 1650.0, 400.0),
];

const WAVE_TWO: &[WaveEntry] = &[
    // Chevron
    entry(Enemy1, 1550.0, 10.0),
    entry(Enemy1, 1550.0, 500.0),
    entry(Enemy2, 1500.0, 200.0),
    entry(Enemy2, 1460.0, 250.0),
    entry(Enemy2, 1420.0, 300.0),
    entry(Enemy2, 1380.0, 350.0),
    entry(Enemy2, 1420.0, 400.0),
    entry(Enemy2, 1460.0, 450.0),
    entry(Enemy2, 1500.0, 500.0),
    // Trailing column
    entry(Enemy1, 1800.0, 100.0),
    entry(Enemy1, 1800.0, 150.0),
    entry(Enemy1, 1800.0, 200.0),
    entry(Enemy1, 1800.0, 250.0),
    entry(Enemy1, 1800.0, 300.0),
    entry(Enemy1, 1800.0, 350.0),
    entry(Enemy1, 1800.0, 400.0),
];

const WAVE_THREE: &[WaveEntry] = &[
    entry(Enemy3, 1500.0, 25.0),
    entry(Enemy3, 1460.0, 125.0),
    entry(Enemy3, 1420.0, 225.0),
    entry(Enemy3, 1380.0, 325.0),
    entry(Enemy3, 1420.0, 425.0),
    entry(Enemy3, 1460.0, 525.0),
    entry(Enemy3, 1500.0, 625.0),
    entry(Enemy4, 2000.0, 100.0),
    entry(Enemy4, 1500.0, 100.0),
    entry(Enemy4, 1500.0, 400.0),
    entry(Enemy4, 2000.0, 400.0),
];

/// The predefined waves, played in order and then repeated
pub fn canonical_waves() -> Vec<Vec<WaveEntry>> {
    vec![WAVE_ONE.to_vec(), WAVE_TWO.to_vec(), WAVE_THREE.to_vec()]
}

/// A wave picked by the scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledWave<'a> {
    /// Position in the wave table
    pub table_index: usize,
    /// How many waves were launched before this one
    pub sequence: i64,
    pub entries: &'a [WaveEntry],
}

/// Walks the wave table modulo its length so waves cycle forever
#[derive(Debug, Clone)]
pub struct WaveScheduler {
    table: Vec<Vec<WaveEntry>>,
    next_index: usize,
    launched: i64,
}

impl Default for WaveScheduler {
    fn default() -> Self {
        Self::new(canonical_waves())
    }
}

impl WaveScheduler {
    pub fn new(table: Vec<Vec<WaveEntry>>) -> Self {
        Self {
            table,
            next_index: 0,
            launched: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn launched(&self) -> i64 {
        self.launched
    }

    /// Returns the next wave and advances the index; `None` for an empty table
    pub fn next_wave(&mut self) -> Option<ScheduledWave<'_>> {
        if self.table.is_empty() {
            return None;
        }

        let table_index = self.next_index;
        let sequence = self.launched;
        self.next_index = (self.next_index + 1) % self.table.len();
        self.launched += 1;

        Some(ScheduledWave {
            table_index,
            sequence,
            entries: &self.table[table_index],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_table_shape() {
        let waves = canonical_waves();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0].len(), 9);
        assert_eq!(waves[1].len(), 16);
        assert_eq!(waves[2].len(), 11);
    }

    #[test]
    fn test_waves_cycle_in_order() {
        let mut scheduler = WaveScheduler::default();
        let order: Vec<usize> = (0..6)
            .map(|_| scheduler.next_wave().unwrap().table_index)
            .collect();

        assert_eq!(order, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(scheduler.launched(), 6);
    }

    #[test]
    fn test_sequence_keeps_counting() {
        let mut scheduler = WaveScheduler::new(vec![vec![entry(Enemy1, 0.0, 0.0)]]);
        assert_eq!(scheduler.next_wave().unwrap().sequence, 0);
        assert_eq!(scheduler.next_wave().unwrap().sequence, 1);
        assert_eq!(scheduler.next_wave().unwrap().table_index, 0);
    }

    #[test]
    fn test_empty_table() {
        let mut scheduler = WaveScheduler::new(Vec::new());
        assert!(scheduler.is_empty());
        assert!(scheduler.next_wave().is_none());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Enemy1.name(), "enemy1");
        assert_eq!(Enemy4.name(), "enemy4");
        assert!(Enemy4.speed() > Enemy3.speed());
    }
}
