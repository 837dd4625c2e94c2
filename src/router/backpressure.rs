//! Per-consumer bounded queue and backpressure policies (spec §4.3).
//!
//! `drop_oldest` is implemented as a small critical section ("pop head,
//! then push tail") rather than anything lock-free, per the design notes:
//! the queue is short-lived contention (one ingress writer, one consumer
//! writer) and correctness matters far more than avoiding a mutex here.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::router::packet::StreamPacket;

/// Policy applied when a consumer's queue is full. Selected per consumer
/// at registration time; consumers of the same stream may differ.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Evict the head (oldest packet), then enqueue the arriving one.
    DropOldest,
    /// Drop the arriving packet; the queue is left untouched.
    DropNewest,
    /// Wait (bounded by the producer's own writer budget) for space.
    Block,
    /// Sleep proportional to queue depth before retrying, bounded.
    Throttle,
}

/// Outcome of attempting to hand a packet to a consumer's queue.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    Dropped,
}

/// A bounded FIFO queue with one producer path (the router's ingress) and
/// one consumer path (that session's writer).
pub struct ConsumerQueue {
    inner: Mutex<VecDeque<StreamPacket>>,
    capacity: usize,
    policy: BackpressurePolicy,
    not_empty: Notify,
    not_full: Notify,
    dropped: AtomicU64,
    enqueued: AtomicU64,
}

const THROTTLE_SLEEP_PER_ITEM: Duration = Duration::from_millis(2);
const THROTTLE_SLEEP_MAX: Duration = Duration::from_millis(200);

impl ConsumerQueue {
    pub fn new(capacity: usize, policy: BackpressurePolicy) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            policy,
            not_empty: Notify::new(),
            not_full: Notify::new(),
            dropped: AtomicU64::new(0),
            enqueued: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn enqueued_count(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Hand a packet to this consumer, applying the queue's policy if full.
    /// `writer_budget` bounds how long `block`/`throttle` are allowed to
    /// wait before the packet is dropped anyway.
    pub async fn enqueue(&self, packet: StreamPacket, writer_budget: Duration) -> EnqueueOutcome {
        self.enqueued.fetch_add(1, Ordering::Relaxed);

        let outcome = match self.policy {
            BackpressurePolicy::DropOldest => self.enqueue_drop_oldest(packet).await,
            BackpressurePolicy::DropNewest => self.enqueue_drop_newest(packet).await,
            BackpressurePolicy::Block => self.enqueue_block(packet, writer_budget).await,
            BackpressurePolicy::Throttle => self.enqueue_throttle(packet, writer_budget).await,
        };

        if outcome == EnqueueOutcome::Dropped {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        } else {
            self.not_empty.notify_one();
        }
        outcome
    }

    async fn enqueue_drop_oldest(&self, packet: StreamPacket) -> EnqueueOutcome {
        let mut queue = self.inner.lock().await;
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(packet);
        EnqueueOutcome::Enqueued
    }

    async fn enqueue_drop_newest(&self, packet: StreamPacket) -> EnqueueOutcome {
        let mut queue = self.inner.lock().await;
        if queue.len() >= self.capacity {
            return EnqueueOutcome::Dropped;
        }
        queue.push_back(packet);
        EnqueueOutcome::Enqueued
    }

    async fn enqueue_block(&self, packet: StreamPacket, budget: Duration) -> EnqueueOutcome {
        let deadline = Instant::now() + budget;
        loop {
            {
                let mut queue = self.inner.lock().await;
                if queue.len() < self.capacity {
                    queue.push_back(packet);
                    return EnqueueOutcome::Enqueued;
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return EnqueueOutcome::Dropped;
            }
            // Wait for the writer to drain something, or the budget to run out.
            let _ = tokio::time::timeout(remaining, self.not_full.notified()).await;
        }
    }

    async fn enqueue_throttle(&self, packet: StreamPacket, budget: Duration) -> EnqueueOutcome {
        let deadline = Instant::now() + budget;
        loop {
            let depth = {
                let mut queue = self.inner.lock().await;
                if queue.len() < self.capacity {
                    queue.push_back(packet);
                    return EnqueueOutcome::Enqueued;
                }
                queue.len()
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return EnqueueOutcome::Dropped;
            }
            let sleep = (THROTTLE_SLEEP_PER_ITEM * depth as u32)
                .min(THROTTLE_SLEEP_MAX)
                .min(remaining);
            tokio::time::sleep(sleep).await;
        }
    }

    /// Dequeue the next packet, waiting for one to arrive.
    pub async fn dequeue(&self) -> Option<StreamPacket> {
        loop {
            {
                let mut queue = self.inner.lock().await;
                if let Some(packet) = queue.pop_front() {
                    drop(queue);
                    self.not_full.notify_one();
                    return Some(packet);
                }
            }
            self.not_empty.notified().await;
        }
    }

    /// Discard all queued packets without delivering them (router shutdown).
    pub async fn drain_discard(&self) {
        self.inner.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;

    fn packet(seq: u64) -> StreamPacket {
        StreamPacket {
            sequence: seq,
            timestamp: 0.0,
            metadata: HashMap::new(),
            payload: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn drop_oldest_keeps_newest_n() {
        let queue = ConsumerQueue::new(4, BackpressurePolicy::DropOldest);
        for seq in 1..=10 {
            queue.enqueue(packet(seq), Duration::from_millis(10)).await;
        }
        let mut remaining = Vec::new();
        while let Ok(Some(p)) = tokio::time::timeout(Duration::from_millis(5), queue.dequeue()).await {
            remaining.push(p.sequence);
        }
        assert_eq!(remaining, vec![7, 8, 9, 10]);
        assert_eq!(queue.dropped_count(), 6);
        assert_eq!(queue.dropped_count() + remaining.len() as u64, queue.enqueued_count());
    }

    #[tokio::test]
    async fn drop_newest_keeps_oldest_n() {
        let queue = ConsumerQueue::new(4, BackpressurePolicy::DropNewest);
        for seq in 1..=10 {
            queue.enqueue(packet(seq), Duration::from_millis(10)).await;
        }
        let mut remaining = Vec::new();
        while let Ok(Some(p)) = tokio::time::timeout(Duration::from_millis(5), queue.dequeue()).await {
            remaining.push(p.sequence);
        }
        assert_eq!(remaining, vec![1, 2, 3, 4]);
        assert_eq!(queue.dropped_count(), 6);
    }

    #[tokio::test]
    async fn buffer_one_never_queues_more_than_one() {
        let queue = ConsumerQueue::new(1, BackpressurePolicy::DropOldest);
        queue.enqueue(packet(1), Duration::from_millis(10)).await;
        queue.enqueue(packet(2), Duration::from_millis(10)).await;
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn block_unblocks_once_space_frees_up() {
        let queue = ConsumerQueue::new(1, BackpressurePolicy::Block);
        queue.enqueue(packet(1), Duration::from_millis(50)).await;

        let dequeued = queue.dequeue();
        let enqueued = queue.enqueue(packet(2), Duration::from_millis(200));
        let (_, outcome) = tokio::join!(dequeued, enqueued);
        assert_eq!(outcome, EnqueueOutcome::Enqueued);
    }
}
