//! Per-router counters surfaced through the status snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct RouterMetrics {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    packets_routed: AtomicU64,
    bytes_routed: AtomicU64,
    dropped: AtomicU64,
    latency_sum_micros: AtomicU64,
    latency_count: AtomicU64,
    latency_max_micros: AtomicU64,
}

#[derive(Clone, Debug, Default)]
pub struct RouterMetricsSnapshot {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub packets_routed: u64,
    pub bytes_routed: u64,
    pub dropped: u64,
    pub consumer_count: usize,
    pub avg_egress_latency: Option<Duration>,
    pub max_egress_latency: Option<Duration>,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Called once per consumer a packet was successfully enqueued to.
    pub fn record_routed(&self, bytes: usize) {
        self.packets_routed.fetch_add(1, Ordering::Relaxed);
        self.bytes_routed.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_egress_latency(&self, latency: Duration) {
        let micros = latency.as_micros() as u64;
        self.latency_sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self, consumer_count: usize) -> RouterMetricsSnapshot {
        let count = self.latency_count.load(Ordering::Relaxed);
        let avg = if count == 0 {
            None
        } else {
            Some(Duration::from_micros(
                self.latency_sum_micros.load(Ordering::Relaxed) / count,
            ))
        };
        let max = if count == 0 {
            None
        } else {
            Some(Duration::from_micros(self.latency_max_micros.load(Ordering::Relaxed)))
        };

        RouterMetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_routed: self.packets_routed.load(Ordering::Relaxed),
            bytes_routed: self.bytes_routed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            consumer_count,
            avg_egress_latency: avg,
            max_egress_latency: max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_across_recorded_latencies() {
        let metrics = RouterMetrics::new();
        metrics.record_egress_latency(Duration::from_millis(10));
        metrics.record_egress_latency(Duration::from_millis(20));
        let snap = metrics.snapshot(2);
        assert_eq!(snap.avg_egress_latency, Some(Duration::from_millis(15)));
        assert_eq!(snap.max_egress_latency, Some(Duration::from_millis(20)));
        assert_eq!(snap.consumer_count, 2);
    }
}
