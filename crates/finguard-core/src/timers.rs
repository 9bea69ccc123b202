//! Purpose-keyed timer registry

use finguard_util::MonotonicInstant;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct Timer {
    deadline: MonotonicInstant,
    period: Option<Duration>,
}

/// Timers keyed by what they are for.
///
/// Arming a key replaces whatever was armed under it, so a stale timer can
/// never fire after a re-arm. Deadlines are monotonic; the owner drives the
/// registry with [`TimerRegistry::take_due`].
#[derive(Debug)]
pub struct TimerRegistry<K> {
    timers: HashMap<K, Timer>,
}

impl<K> Default for TimerRegistry<K> {
    fn default() -> Self {
        Self {
            timers: HashMap::new(),
        }
    }
}

impl<K> TimerRegistry<K>
where
    K: Clone + Eq + Hash + Ord,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot timer `delay` from `now`
    pub fn arm(&mut self, key: K, now: MonotonicInstant, delay: Duration) {
        self.timers.insert(
            key,
            Timer {
                deadline: now + delay,
                period: None,
            },
        );
    }

    /// Arm a repeating timer whose first deadline is one `period` from `now`
    pub fn arm_interval(&mut self, key: K, now: MonotonicInstant, period: Duration) {
        self.timers.insert(
            key,
            Timer {
                deadline: now + period,
                period: Some(period).filter(|p| !p.is_zero()),
            },
        );
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        self.timers.remove(key).is_some()
    }

    /// Cancel every timer, returning how many were armed
    pub fn cancel_all(&mut self) -> usize {
        let count = self.timers.len();
        self.timers.clear();
        count
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.timers.contains_key(key)
    }

    pub fn deadline(&self, key: &K) -> Option<MonotonicInstant> {
        self.timers.get(key).map(|t| t.deadline)
    }

    /// Time left before `key` fires, zero if overdue
    pub fn remaining(&self, key: &K, now: MonotonicInstant) -> Option<Duration> {
        self.deadline(key)
            .map(|deadline| deadline.saturating_duration_until(now))
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.timers.keys()
    }

    /// Remove one-shot timers that are due and advance repeating ones.
    ///
    /// Returned keys are ordered by deadline, then key. A repeating timer
    /// that fell several periods behind fires once and skips ahead.
    pub fn take_due(&mut self, now: MonotonicInstant) -> Vec<K> {
        let mut due: Vec<(MonotonicInstant, K)> = self
            .timers
            .iter()
            .filter(|(_, t)| t.deadline <= now)
            .map(|(k, t)| (t.deadline, k.clone()))
            .collect();
        due.sort();

        for (_, key) in &due {
            let Some(timer) = self.timers.get_mut(key) else {
                continue;
            };
            match timer.period {
                Some(period) => {
                    while timer.deadline <= now {
                        timer.deadline = timer.deadline + period;
                    }
                }
                None => {
                    self.timers.remove(key);
                }
            }
        }

        due.into_iter().map(|(_, key)| key).collect()
    }
}
