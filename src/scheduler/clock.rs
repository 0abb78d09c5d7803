/// Scheduler
///
/// One owner for every timer the studio runs: the ~100 ms analyser/sync push,
/// the Auto-DJ pass, position polling and one-shot timeouts. Time only moves
/// when `advance` is called, so tests step it deterministically and the binary
/// drives it from a single tokio interval.
use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

// Task names shared by the studio and its driver
pub const TASK_POSITION: &str = "position";
pub const TASK_SYNC: &str = "playback-sync";
pub const TASK_AUTODJ: &str = "autodj";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub sync_interval_ms: u64,
    pub autodj_interval_ms: u64,
    /// Playhead polling; fades and loop regions advance on this tick
    pub position_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: 100,
            autodj_interval_ms: 1_000,
            position_interval_ms: 50,
        }
    }
}

impl SchedulerConfig {
    /// Base tick for the driver: the fastest task period.
    pub fn tick(&self) -> Duration {
        let ms = [
            self.sync_interval_ms,
            self.autodj_interval_ms,
            self.position_interval_ms,
        ]
        .into_iter()
        .filter(|ms| *ms > 0)
        .min()
        .unwrap_or(50);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TaskKind {
    Every(Duration),
    Once,
}

#[derive(Debug, Clone)]
struct Task {
    kind: TaskKind,
    next_due: Duration,
    enabled: bool,
}

/// Named periodic and one-shot tasks on a virtual clock.
#[derive(Debug, Default)]
pub struct Scheduler {
    now: Duration,
    tasks: BTreeMap<String, Task>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Register (or replace) a periodic task; first run one period from now.
    pub fn schedule_every(&mut self, name: &str, period: Duration) {
        let period = period.max(Duration::from_millis(1));
        self.tasks.insert(
            name.to_string(),
            Task {
                kind: TaskKind::Every(period),
                next_due: self.now + period,
                enabled: true,
            },
        );
    }

    /// Register (or re-arm) a task that fires once after `delay`.
    pub fn schedule_once(&mut self, name: &str, delay: Duration) {
        self.tasks.insert(
            name.to_string(),
            Task {
                kind: TaskKind::Once,
                next_due: self.now + delay,
                enabled: true,
            },
        );
    }

    pub fn cancel(&mut self, name: &str) -> bool {
        self.tasks.remove(name).is_some()
    }

    /// Pause or resume a task without forgetting it. A resumed periodic task
    /// restarts its period from now.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) {
        let now = self.now;
        if let Some(task) = self.tasks.get_mut(name) {
            if enabled && !task.enabled {
                if let TaskKind::Every(period) = task.kind {
                    task.next_due = now + period;
                }
            }
            task.enabled = enabled;
        }
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.tasks.get(name).is_some_and(|t| t.enabled)
    }

    /// Time until `name` next fires, if it is armed.
    pub fn remaining(&self, name: &str) -> Option<Duration> {
        self.tasks
            .get(name)
            .filter(|t| t.enabled)
            .map(|t| t.next_due.saturating_sub(self.now))
    }

    /// Move the clock forward and return the names of tasks that came due,
    /// earliest first. A periodic task fires at most once per call; missed
    /// periods are skipped rather than replayed.
    pub fn advance(&mut self, dt: Duration) -> Vec<String> {
        self.now += dt;
        let now = self.now;

        let mut due: Vec<(Duration, String)> = self
            .tasks
            .iter()
            .filter(|(_, t)| t.enabled && t.next_due <= now)
            .map(|(name, t)| (t.next_due, name.clone()))
            .collect();
        due.sort();

        for (_, name) in &due {
            let Some(task) = self.tasks.get_mut(name) else {
                continue;
            };
            match task.kind {
                TaskKind::Every(period) => {
                    while task.next_due <= now {
                        task.next_due += period;
                    }
                }
                TaskKind::Once => {
                    self.tasks.remove(name);
                }
            }
        }
        due.into_iter().map(|(_, name)| name).collect()
    }
}
