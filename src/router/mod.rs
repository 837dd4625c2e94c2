//! Stream router: per-stream server accepting one producer ingress,
//! fanning packets out to a dynamic set of consumer sessions (spec §4.3).

pub mod backpressure;
pub mod metrics;
pub mod packet;
pub mod protocol;
pub mod session;
pub mod sync;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};

use crate::router::backpressure::{BackpressurePolicy, EnqueueOutcome};
use crate::router::metrics::{RouterMetrics, RouterMetricsSnapshot};
use crate::router::packet::StreamPacket;
use crate::router::protocol::{ConsumerEndpoint, Ingress, ingress_for};
use crate::router::session::{ConsumerSession, SessionMetrics};
use crate::topology::Stream;

const REACCEPT_BACKOFF: Duration = Duration::from_millis(500);

/// Owns one stream's ingress and its consumer sessions. A router never
/// returns from `run` except on shutdown: producer disconnects and frame
/// errors are logged and re-accepted, never fatal.
pub struct StreamRouter {
    stream: Stream,
    ingress: Mutex<Box<dyn Ingress>>,
    sessions: Mutex<HashMap<String, ConsumerSession>>,
    sequence: AtomicU64,
    metrics: RouterMetrics,
    enqueue_budget: Duration,
}

impl StreamRouter {
    pub fn new(stream: Stream, enqueue_budget: Duration) -> Self {
        let ingress = ingress_for(stream.protocol, &stream.name, stream.port);
        Self {
            stream,
            ingress: Mutex::new(ingress),
            sessions: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(1),
            metrics: RouterMetrics::new(),
            enqueue_budget,
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream.name
    }

    /// Registers a consumer and starts its writer. Dialing happens in the
    /// background; a consumer that cannot currently be reached is kept and
    /// redialed rather than rejected (spec §4.3 connection lifecycle).
    pub async fn register_consumer(
        &self,
        consumer_id: String,
        endpoint: ConsumerEndpoint,
        policy: BackpressurePolicy,
        dial_timeout: Duration,
        redial_interval: Duration,
    ) {
        let session = ConsumerSession::spawn(
            consumer_id.clone(),
            self.stream.name.clone(),
            endpoint,
            self.stream.buffer_size,
            policy,
            dial_timeout,
            redial_interval,
        );
        self.sessions.lock().await.insert(consumer_id, session);
    }

    pub async fn deregister_consumer(&self, consumer_id: &str) {
        if let Some(session) = self.sessions.lock().await.remove(consumer_id) {
            session.shutdown().await;
        }
    }

    pub async fn consumer_metrics(&self) -> HashMap<String, SessionMetrics> {
        self.sessions
            .lock()
            .await
            .iter()
            .map(|(id, session)| (id.clone(), session.metrics()))
            .collect()
    }

    /// Router-level counters plus egress latency aggregated live from each
    /// consumer session's own last-observed latency.
    pub async fn metrics_snapshot(&self) -> RouterMetricsSnapshot {
        let sessions = self.sessions.lock().await;
        let mut snapshot = self.metrics.snapshot(sessions.len());

        let latencies: Vec<Duration> = sessions
            .values()
            .filter_map(|session| session.metrics().last_latency)
            .collect();
        if !latencies.is_empty() {
            let total: Duration = latencies.iter().sum();
            snapshot.avg_egress_latency = Some(total / latencies.len() as u32);
            snapshot.max_egress_latency = latencies.into_iter().max();
        }
        snapshot
    }

    /// Runs the ingress loop until `shutdown` fires. Never returns early on
    /// a producer disconnect or a malformed frame.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        'accept: loop {
            if *shutdown.borrow() {
                break;
            }

            {
                let mut ingress = self.ingress.lock().await;
                tokio::select! {
                    result = ingress.accept() => {
                        if let Err(e) = result {
                            tracing::warn!(stream = %self.stream.name, error = %e, "ingress accept failed");
                            drop(ingress);
                            tokio::time::sleep(REACCEPT_BACKOFF).await;
                            continue 'accept;
                        }
                    }
                    _ = shutdown.changed() => break 'accept,
                }
            }

            loop {
                if *shutdown.borrow() {
                    break 'accept;
                }

                let packet = {
                    let mut ingress = self.ingress.lock().await;
                    tokio::select! {
                        result = ingress.read_packet() => result,
                        _ = shutdown.changed() => break 'accept,
                    }
                };

                match packet {
                    Ok(Some(mut packet)) => {
                        packet.sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
                        self.metrics.record_received(packet.payload.len());
                        self.fan_out(packet).await;
                    }
                    Ok(None) => {
                        tracing::info!(stream = %self.stream.name, "producer disconnected, awaiting reconnection");
                        continue 'accept;
                    }
                    Err(e) => {
                        tracing::warn!(stream = %self.stream.name, error = %e, "frame error, re-accepting ingress");
                        continue 'accept;
                    }
                }
            }
        }

        self.shutdown_all_sessions().await;
    }

    async fn fan_out(&self, packet: StreamPacket) {
        let sessions = self.sessions.lock().await;
        for session in sessions.values() {
            let outcome = session
                .queue()
                .enqueue(packet.clone(), self.enqueue_budget)
                .await;
            match outcome {
                EnqueueOutcome::Enqueued => self.metrics.record_routed(packet.payload.len()),
                EnqueueOutcome::Dropped => self.metrics.record_dropped(),
            }
        }
    }

    async fn shutdown_all_sessions(&self) {
        let mut sessions = self.sessions.lock().await;
        for (_, session) in sessions.drain() {
            session.shutdown().await;
        }
    }
}
