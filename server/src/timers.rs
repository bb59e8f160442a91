//! Independent repeating actions polled once per server tick

use std::time::{Duration, Instant};

/// Repeating jobs the server runs while a game is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    BroadcastPlayers,
    BroadcastEnemies,
    BroadcastProjectiles,
    SpawnWave,
}

#[derive(Debug, Clone)]
pub struct PeriodicTask {
    pub kind: TaskKind,
    pub interval: Duration,
    last_fired: Option<Instant>,
}

impl PeriodicTask {
    pub fn new(kind: TaskKind, interval: Duration) -> Self {
        Self {
            kind,
            interval,
            last_fired: None,
        }
    }

    /// A task that has never fired is due immediately
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_fired {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }
}

/// Fixed set of periodic tasks, each on its own cadence
#[derive(Debug, Clone)]
pub struct TaskTable {
    tasks: [PeriodicTask; 4],
}

impl TaskTable {
    pub fn new(
        players_every: Duration,
        enemies_every: Duration,
        projectiles_every: Duration,
        wave_every: Duration,
    ) -> Self {
        Self {
            tasks: [
                PeriodicTask::new(TaskKind::BroadcastPlayers, players_every),
                PeriodicTask::new(TaskKind::BroadcastEnemies, enemies_every),
                PeriodicTask::new(TaskKind::BroadcastProjectiles, projectiles_every),
                PeriodicTask::new(TaskKind::SpawnWave, wave_every),
            ],
        }
    }

    /// Makes every task due on the next poll
    pub fn arm(&mut self) {
        for task in &mut self.tasks {
            task.last_fired = None;
        }
    }

    /// Returns the tasks due at `now`, in table order, and marks them fired
    pub fn poll(&mut self, now: Instant) -> Vec<TaskKind> {
        let mut due = Vec::new();
        for task in &mut self.tasks {
            if task.is_due(now) {
                task.last_fired = Some(now);
                due.push(task.kind);
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TaskTable {
        TaskTable::new(
            Duration::from_millis(10),
            Duration::from_millis(50),
            Duration::from_millis(30),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_everything_due_after_arm() {
        let mut tasks = table();
        tasks.arm();
        let now = Instant::now();
        assert_eq!(
            tasks.poll(now),
            vec![
                TaskKind::BroadcastPlayers,
                TaskKind::BroadcastEnemies,
                TaskKind::BroadcastProjectiles,
                TaskKind::SpawnWave
            ]
        );
        assert!(tasks.poll(now).is_empty());
    }

    #[test]
    fn test_tasks_fire_on_their_own_cadence() {
        let mut tasks = table();
        let start = Instant::now();
        tasks.poll(start);

        assert_eq!(
            tasks.poll(start + Duration::from_millis(10)),
            vec![TaskKind::BroadcastPlayers]
        );
        assert_eq!(
            tasks.poll(start + Duration::from_millis(30)),
            vec![TaskKind::BroadcastPlayers, TaskKind::BroadcastProjectiles]
        );
        assert_eq!(
            tasks.poll(start + Duration::from_millis(50)),
            vec![TaskKind::BroadcastPlayers, TaskKind::BroadcastEnemies]
        );
        assert_eq!(
            tasks.poll(start + Duration::from_secs(5)),
            vec![
                TaskKind::BroadcastPlayers,
                TaskKind::BroadcastEnemies,
                TaskKind::BroadcastProjectiles,
                TaskKind::SpawnWave
            ]
        );
    }
}
