//! Periodic task registry.
//!
//! All recurring work (heartbeat, elapsed-time display, playback tick) is
//! registered here under a task kind. Each kind has at most one registration:
//! starting a kind that is already running replaces it instead of adding a
//! second timer that would fire twice.
//!
//! The registry never sleeps by itself. A driver asks for the
//! [`next_deadline`](PeriodicTasks::next_deadline), waits, and then collects
//! the [`due`](PeriodicTasks::due) kinds.

use std::fmt::Debug;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct PeriodicTask<K> {
    kind: K,
    period: Duration,
    next_due: Instant,
}

/// Registry of independent periodic tasks.
#[derive(Clone, Debug)]
pub struct PeriodicTasks<K> {
    tasks: Vec<PeriodicTask<K>>,
}

impl<K> Default for PeriodicTasks<K> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<K: Copy + Eq + Debug> PeriodicTasks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `kind` to fire every `period`, first at `now + period`.
    ///
    /// An existing registration of the same kind is replaced.
    pub fn start(&mut self, kind: K, period: Duration, now: Instant) {
        let period = period.max(Duration::from_millis(1));
        if self.cancel(kind) {
            log::trace!("restarting periodic task {:?}", kind);
        }
        self.tasks.push(PeriodicTask {
            kind,
            period,
            next_due: now + period,
        });
    }

    /// Remove `kind`. Returns whether it was registered.
    pub fn cancel(&mut self, kind: K) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.kind != kind);
        self.tasks.len() != before
    }

    pub fn is_running(&self, kind: K) -> bool {
        self.tasks.iter().any(|task| task.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Earliest instant at which some task becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.iter().map(|task| task.next_due).min()
    }

    /// Collect every kind due at `now` and schedule its next run.
    ///
    /// A task that fell behind by several periods fires once, not once per
    /// missed period.
    pub fn due(&mut self, now: Instant) -> Vec<K> {
        let mut fired = Vec::new();
        for task in &mut self.tasks {
            if task.next_due > now {
                continue;
            }
            fired.push(task.kind);
            task.next_due += task.period;
            if task.next_due <= now {
                task.next_due = now + task.period;
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Task {
        Heartbeat,
        Tick,
    }

    #[test]
    fn test_tasks_fire_at_their_period() {
        let t0 = Instant::now();
        let mut tasks = PeriodicTasks::new();
        tasks.start(Task::Heartbeat, Duration::from_secs(1), t0);
        tasks.start(Task::Tick, Duration::from_millis(100), t0);

        assert!(tasks.due(t0).is_empty());
        assert_eq!(tasks.next_deadline(), Some(t0 + Duration::from_millis(100)));
        assert_eq!(tasks.due(t0 + Duration::from_millis(100)), vec![Task::Tick]);
        assert_eq!(
            tasks.due(t0 + Duration::from_secs(1)),
            vec![Task::Heartbeat, Task::Tick]
        );
    }

    #[test]
    fn test_restart_never_duplicates() {
        let t0 = Instant::now();
        let mut tasks = PeriodicTasks::new();
        tasks.start(Task::Tick, Duration::from_millis(100), t0);
        tasks.start(Task::Tick, Duration::from_millis(100), t0 + Duration::from_millis(50));
        assert_eq!(tasks.len(), 1);
        assert!(tasks.due(t0 + Duration::from_millis(100)).is_empty());
        assert_eq!(tasks.due(t0 + Duration::from_millis(150)), vec![Task::Tick]);
    }

    #[test]
    fn test_missed_periods_fire_once() {
        let t0 = Instant::now();
        let mut tasks = PeriodicTasks::new();
        tasks.start(Task::Tick, Duration::from_millis(10), t0);
        let late = t0 + Duration::from_millis(95);
        assert_eq!(tasks.due(late), vec![Task::Tick]);
        assert_eq!(tasks.next_deadline(), Some(late + Duration::from_millis(10)));
    }

    #[test]
    fn test_cancel() {
        let t0 = Instant::now();
        let mut tasks = PeriodicTasks::new();
        tasks.start(Task::Heartbeat, Duration::from_secs(1), t0);
        assert!(tasks.is_running(Task::Heartbeat));
        assert!(tasks.cancel(Task::Heartbeat));
        assert!(!tasks.cancel(Task::Heartbeat));
        assert!(tasks.is_empty());
        assert_eq!(tasks.next_deadline(), None);
    }
}
