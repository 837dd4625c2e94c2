//! A single consumer's connection: its bounded queue, its dedicated writer
//! task, and the counters the status snapshot reports.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::router::backpressure::{BackpressurePolicy, ConsumerQueue};
use crate::router::protocol::{ConsumerEndpoint, Egress, egress_for};

/// Snapshot of one consumer session's counters, used by the status facade.
#[derive(Clone, Debug)]
pub struct SessionMetrics {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub dropped: u64,
    pub last_latency: Option<Duration>,
    pub alive: bool,
}

pub struct ConsumerSession {
    pub consumer_id: String,
    pub endpoint: ConsumerEndpoint,
    queue: Arc<ConsumerQueue>,
    packets_sent: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    last_latency_micros: Arc<AtomicU64>,
    alive: Arc<std::sync::atomic::AtomicBool>,
    last_activity: Arc<Mutex<Instant>>,
    writer: JoinHandle<()>,
}

impl ConsumerSession {
    /// Registers a consumer: spawns its writer task, which dials the
    /// consumer with retry (bounded by `dial_timeout` per attempt, spaced by
    /// `redial_interval`) and then drains its queue forever.
    pub fn spawn(
        consumer_id: String,
        stream_name: String,
        endpoint: ConsumerEndpoint,
        buffer_size: usize,
        policy: BackpressurePolicy,
        dial_timeout: Duration,
        redial_interval: Duration,
    ) -> Self {
        let queue = Arc::new(ConsumerQueue::new(buffer_size, policy));
        let packets_sent = Arc::new(AtomicU64::new(0));
        let bytes_sent = Arc::new(AtomicU64::new(0));
        let last_latency_micros = Arc::new(AtomicU64::new(0));
        let alive = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let last_activity = Arc::new(Mutex::new(Instant::now()));

        let writer = tokio::spawn(writer_loop(
            consumer_id.clone(),
            stream_name,
            endpoint.clone(),
            Arc::clone(&queue),
            dial_timeout,
            redial_interval,
            Arc::clone(&packets_sent),
            Arc::clone(&bytes_sent),
            Arc::clone(&last_latency_micros),
            Arc::clone(&alive),
            Arc::clone(&last_activity),
        ));

        Self {
            consumer_id,
            endpoint,
            queue,
            packets_sent,
            bytes_sent,
            last_latency_micros,
            alive,
            last_activity,
            writer,
        }
    }

    pub fn queue(&self) -> &Arc<ConsumerQueue> {
        &self.queue
    }

    pub fn metrics(&self) -> SessionMetrics {
        let micros = self.last_latency_micros.load(Ordering::Relaxed);
        SessionMetrics {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            dropped: self.queue.dropped_count(),
            last_latency: if micros == 0 {
                None
            } else {
                Some(Duration::from_micros(micros))
            },
            alive: self.alive.load(Ordering::Relaxed),
        }
    }

    /// Tears down the writer task and discards anything still queued.
    pub async fn shutdown(self) {
        self.writer.abort();
        self.queue.drain_discard().await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn writer_loop(
    consumer_id: String,
    stream_name: String,
    endpoint: ConsumerEndpoint,
    queue: Arc<ConsumerQueue>,
    dial_timeout: Duration,
    redial_interval: Duration,
    packets_sent: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    last_latency_micros: Arc<AtomicU64>,
    alive: Arc<std::sync::atomic::AtomicBool>,
    last_activity: Arc<Mutex<Instant>>,
) {
    let mut egress = egress_for(endpoint.clone(), stream_name.clone());

    loop {
        match egress.connect(dial_timeout).await {
            Ok(()) => {
                alive.store(true, Ordering::Relaxed);
                tracing::info!(consumer = %consumer_id, stream = %stream_name, "consumer connected");
                break;
            }
            Err(e) => {
                tracing::warn!(consumer = %consumer_id, stream = %stream_name, error = %e, "dial failed, retrying");
                tokio::time::sleep(redial_interval).await;
            }
        }
    }

    loop {
        let Some(packet) = queue.dequeue().await else {
            continue;
        };
        let started = Instant::now();
        match egress.write_packet(&packet).await {
            Ok(()) => {
                packets_sent.fetch_add(1, Ordering::Relaxed);
                bytes_sent.fetch_add(packet.payload.len() as u64, Ordering::Relaxed);
                last_latency_micros.store(started.elapsed().as_micros() as u64, Ordering::Relaxed);
                *last_activity.lock().await = Instant::now();
            }
            Err(e) => {
                alive.store(false, Ordering::Relaxed);
                tracing::warn!(consumer = %consumer_id, stream = %stream_name, error = %e, "write failed, redialing");
                loop {
                    match egress.connect(dial_timeout).await {
                        Ok(()) => {
                            alive.store(true, Ordering::Relaxed);
                            break;
                        }
                        Err(_) => tokio::time::sleep(redial_interval).await,
                    }
                }
            }
        }
    }
}
