//! One running replica's bookkeeping: restart history and health counters.
//!
//! Restart budget is tracked as a small ring buffer of restart timestamps
//! rather than a monotonic counter, per the spec's design notes: "restarts
//! within window" must be computed as "count of timestamps >= now -
//! restart_window", which a growing counter alone cannot answer.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::launcher::InstanceRef;

pub struct PhaseInstance {
    pub instance: InstanceRef,
    pub start_time: Instant,
    pub consecutive_health_failures: u32,
    pub current_backoff: Duration,
    restart_timestamps: VecDeque<Instant>,
}

impl PhaseInstance {
    pub fn new(instance: InstanceRef, backoff_initial: Duration) -> Self {
        Self {
            instance,
            start_time: Instant::now(),
            consecutive_health_failures: 0,
            current_backoff: backoff_initial,
            restart_timestamps: VecDeque::new(),
        }
    }

    /// Total restarts ever observed for this replica slot (the ring buffer
    /// only prunes entries outside the window on read, so this count keeps
    /// growing even as `restarts_within_window` shrinks).
    pub fn total_restarts(&self) -> usize {
        self.restart_timestamps.len()
    }

    /// How many restarts fall within `window` of `now`. Prunes older
    /// entries from the buffer as a side effect.
    pub fn restarts_within_window(&mut self, window: Duration, now: Instant) -> usize {
        while let Some(&front) = self.restart_timestamps.front() {
            if now.saturating_duration_since(front) > window {
                self.restart_timestamps.pop_front();
            } else {
                break;
            }
        }
        self.restart_timestamps.len()
    }

    pub fn record_restart(&mut self, now: Instant) {
        self.restart_timestamps.push_back(now);
        self.start_time = now;
    }

    pub fn record_health_failure(&mut self, backoff_max: Duration) {
        self.consecutive_health_failures += 1;
        self.current_backoff = (self.current_backoff * 2).min(backoff_max);
    }

    pub fn reset_health(&mut self, backoff_initial: Duration) {
        self.consecutive_health_failures = 0;
        self.current_backoff = backoff_initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_prunes_stale_restarts() {
        let mut instance = PhaseInstance::new(InstanceRef::new("p", 0), Duration::from_secs(1));
        let t0 = Instant::now();
        instance.record_restart(t0);
        instance.record_restart(t0 + Duration::from_secs(10));

        let later = t0 + Duration::from_secs(400);
        assert_eq!(instance.restarts_within_window(Duration::from_secs(300), later), 0);
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        let mut instance = PhaseInstance::new(InstanceRef::new("p", 0), Duration::from_secs(1));
        let max = Duration::from_secs(4);
        instance.record_health_failure(max);
        assert_eq!(instance.current_backoff, Duration::from_secs(2));
        instance.record_health_failure(max);
        assert_eq!(instance.current_backoff, Duration::from_secs(4));
        instance.record_health_failure(max);
        assert_eq!(instance.current_backoff, Duration::from_secs(4));
    }
}
