//! Orchestrator facade: glues the topology, launcher, routers, and
//! supervisor coordinator together (spec §4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::callback::{Callback, CallbackRegistry, TransitionObserver};
use crate::config::{ConsumerEndpointSpec, OrchestratorOptions};
use crate::error::OrchestratorError;
use crate::launcher::Launcher;
use crate::router::StreamRouter;
use crate::supervisor::{PhaseState, SupervisorCoordinator};
use crate::topology::Topology;

/// Bounds how long a router's fan-out will wait for a `block`/`throttle`
/// consumer to free up space before giving up on that one delivery. Not
/// part of spec §6's knob table (which only fixes the consumer *dial*
/// timeout); kept as an internal constant tuned for interactive pipelines.
const DEFAULT_ENQUEUE_BUDGET: Duration = Duration::from_millis(100);
const CONSUMER_REDIAL_INTERVAL: Duration = Duration::from_secs(2);

pub struct Orchestrator {
    topology: Arc<Topology>,
    options: OrchestratorOptions,
    coordinator: SupervisorCoordinator,
    routers: HashMap<String, Arc<StreamRouter>>,
    router_shutdown: watch::Sender<bool>,
    consumer_endpoints: Vec<ConsumerEndpointSpec>,
    callbacks: Arc<CallbackRegistry>,
}

impl Orchestrator {
    pub fn new(
        topology: Topology,
        launcher: Arc<dyn Launcher>,
        options: OrchestratorOptions,
        consumer_endpoints: Vec<ConsumerEndpointSpec>,
    ) -> Self {
        let topology = Arc::new(topology);
        let callbacks = Arc::new(CallbackRegistry::new());
        let observer: Arc<dyn TransitionObserver> = Arc::clone(&callbacks) as Arc<dyn TransitionObserver>;
        let coordinator =
            SupervisorCoordinator::new(Arc::clone(&topology), launcher, options.clone(), observer);

        let routers = topology
            .streams()
            .map(|stream| {
                let router = Arc::new(StreamRouter::new(stream.clone(), DEFAULT_ENQUEUE_BUDGET));
                (stream.name.clone(), router)
            })
            .collect();

        let (router_shutdown, _) = watch::channel(false);

        Self {
            topology,
            options,
            coordinator,
            routers,
            router_shutdown,
            consumer_endpoints,
            callbacks,
        }
    }

    /// Registers a callback invoked whenever any phase enters `state`.
    pub async fn on_state(&self, state: PhaseState, callback: Callback) {
        self.callbacks.register(state, callback).await;
    }

    /// Launches one router task per stream, registers declared consumers,
    /// then drives phase startup in dependency order.
    pub async fn start_pipeline(&self) -> Result<(), OrchestratorError> {
        for router in self.routers.values() {
            let shutdown_rx = self.router_shutdown.subscribe();
            let router = Arc::clone(router);
            tokio::spawn(async move {
                router.run(shutdown_rx).await;
            });
        }

        for spec in &self.consumer_endpoints {
            let Some(router) = self.routers.get(&spec.stream) else {
                tracing::warn!(stream = %spec.stream, "consumer_endpoint references unknown stream");
                continue;
            };
            let Some(stream) = self.topology.stream(&spec.stream) else {
                continue;
            };
            let policy = spec.backpressure.unwrap_or(self.options.default_backpressure);
            router
                .register_consumer(
                    spec.consumer.clone(),
                    spec.endpoint(stream.protocol),
                    policy,
                    self.options.consumer_dial_timeout,
                    CONSUMER_REDIAL_INTERVAL,
                )
                .await;
        }

        self.coordinator.start_pipeline().await
    }

    pub async fn stop_pipeline(&self) -> Result<(), OrchestratorError> {
        self.coordinator.stop_pipeline().await?;
        let _ = self.router_shutdown.send(true);
        Ok(())
    }

    pub async fn scale(&self, phase: &str, target: u32) -> Result<(), OrchestratorError> {
        match self.coordinator.phase(phase) {
            Some(supervisor) => supervisor.scale(target).await,
            None => Err(OrchestratorError::ConfigInvalid(format!("unknown phase '{phase}'"))),
        }
    }

    pub async fn restart(&self, phase: &str, replica_id: u32) -> Result<(), OrchestratorError> {
        match self.coordinator.phase(phase) {
            Some(supervisor) => supervisor.restart_replica(replica_id).await,
            None => Err(OrchestratorError::ConfigInvalid(format!("unknown phase '{phase}'"))),
        }
    }

    pub async fn status(&self) -> StatusSnapshot {
        let mut running = false;
        let mut phases = Vec::new();
        for supervisor in self.coordinator.phases() {
            let state = supervisor.state().await;
            if matches!(
                state,
                PhaseState::Active | PhaseState::Starting | PhaseState::Preparing | PhaseState::Ready
            ) {
                running = true;
            }
            phases.push(PhaseStatus {
                name: supervisor.name().to_string(),
                kind: format!("{:?}", supervisor.phase.kind),
                state,
                target_replicas: supervisor.target_replicas().await,
                running_replicas: supervisor.running_replicas().await,
                inputs: supervisor.phase.inputs.clone(),
                outputs: supervisor.phase.outputs.clone(),
            });
        }

        let mut streams = Vec::new();
        for stream in self.topology.streams() {
            let router = self.routers.get(&stream.name);
            let metrics = match router {
                Some(r) => Some(r.metrics_snapshot().await),
                None => None,
            };
            streams.push(StreamStatus {
                name: stream.name.clone(),
                protocol: format!("{:?}", stream.protocol),
                port: stream.port,
                producer: self.topology.producer_of(&stream.name).map(str::to_string),
                consumers: self.topology.consumers_of(&stream.name).into_iter().collect(),
                metrics,
            });
        }

        let hyperedges = self
            .topology
            .hyperedges()
            .map(|edge| HyperedgeStatus {
                name: edge.name.clone(),
                source: edge.source.clone(),
                targets: edge.targets.iter().cloned().collect(),
                streams: edge.streams.clone(),
            })
            .collect();

        StatusSnapshot {
            running,
            phases,
            streams,
            hyperedges,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub phases: Vec<PhaseStatus>,
    pub streams: Vec<StreamStatus>,
    pub hyperedges: Vec<HyperedgeStatus>,
}

#[derive(Debug, Serialize)]
pub struct PhaseStatus {
    pub name: String,
    pub kind: String,
    pub state: PhaseState,
    pub target_replicas: u32,
    pub running_replicas: u32,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StreamStatus {
    pub name: String,
    pub protocol: String,
    pub port: u16,
    pub producer: Option<String>,
    pub consumers: Vec<String>,
    #[serde(skip)]
    pub metrics: Option<crate::router::metrics::RouterMetricsSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct HyperedgeStatus {
    pub name: String,
    pub source: String,
    pub targets: Vec<String>,
    pub streams: Vec<String>,
}
