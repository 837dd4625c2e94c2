//! Per-phase supervisor: owns one phase's instances and state machine.
//!
//! Everything here runs under `inner`'s mutex -- "finer-grained than a
//! global lock so independent phases can move concurrently" (spec §4.4
//! step 1). The pipeline-wide coordinator holds its own separate lock for
//! cross-phase ordering; the two are never merged (spec DESIGN NOTES).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, watch};

use crate::callback::TransitionObserver;
use crate::config::OrchestratorOptions;
use crate::error::OrchestratorError;
use crate::launcher::{Launcher, build_env};
use crate::supervisor::instance::PhaseInstance;
use crate::supervisor::state::PhaseState;
use crate::topology::{Phase, Topology};

const TRANSITION_HISTORY_CAPACITY: usize = 64;

struct PhaseInner {
    state: PhaseState,
    target_replicas: u32,
    instances: HashMap<u32, PhaseInstance>,
    health_tasks: HashMap<u32, watch::Sender<bool>>,
    transition_history: VecDeque<(PhaseState, PhaseState, Instant)>,
}

pub struct PhaseSupervisor {
    pub phase: Phase,
    topology: Arc<Topology>,
    launcher: Arc<dyn Launcher>,
    options: OrchestratorOptions,
    observer: Arc<dyn TransitionObserver>,
    inner: Mutex<PhaseInner>,
}

impl PhaseSupervisor {
    pub fn new(
        phase: Phase,
        topology: Arc<Topology>,
        launcher: Arc<dyn Launcher>,
        options: OrchestratorOptions,
        observer: Arc<dyn TransitionObserver>,
    ) -> Arc<Self> {
        let target_replicas = phase.replicas;
        Arc::new(Self {
            phase,
            topology,
            launcher,
            options,
            observer,
            inner: Mutex::new(PhaseInner {
                state: PhaseState::Idle,
                target_replicas,
                instances: HashMap::new(),
                health_tasks: HashMap::new(),
                transition_history: VecDeque::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.phase.name
    }

    pub async fn state(&self) -> PhaseState {
        self.inner.lock().await.state
    }

    pub async fn running_replicas(&self) -> u32 {
        self.inner.lock().await.instances.len() as u32
    }

    pub async fn target_replicas(&self) -> u32 {
        self.inner.lock().await.target_replicas
    }

    pub async fn transition_history(&self) -> Vec<(PhaseState, PhaseState, Instant)> {
        self.inner.lock().await.transition_history.iter().cloned().collect()
    }

    async fn transition(&self, inner: &mut PhaseInner, to: PhaseState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        inner.transition_history.push_back((from, to, Instant::now()));
        if inner.transition_history.len() > TRANSITION_HISTORY_CAPACITY {
            inner.transition_history.pop_front();
        }
        tracing::info!(phase = %self.phase.name, ?from, ?to, "phase transition");
        self.observer.on_transition(&self.phase.name, from, to).await;
    }

    /// Starts the phase, given a closure telling it whether each of its
    /// non-optional dependencies is currently `ACTIVE`.
    pub async fn start(
        self: &Arc<Self>,
        is_dependency_active: impl Fn(&str) -> bool,
    ) -> Result<(), OrchestratorError> {
        let mut inner = self.inner.lock().await;

        for dependency in self.topology.ordering_dependencies_of(&self.phase.name) {
            if !is_dependency_active(&dependency) {
                self.transition(&mut inner, PhaseState::Failed).await;
                return Err(OrchestratorError::DependencyNotReady {
                    phase: self.phase.name.clone(),
                    dependency,
                    timeout_secs: self.options.dependency_wait_timeout.as_secs(),
                });
            }
        }

        self.transition(&mut inner, PhaseState::Preparing).await;
        self.transition(&mut inner, PhaseState::Starting).await;

        let target = inner.target_replicas;
        for replica_id in 0..target {
            if let Err(e) = self.spawn_replica(&mut inner, replica_id).await {
                self.transition(&mut inner, PhaseState::Failed).await;
                return Err(e);
            }
        }

        self.transition(&mut inner, PhaseState::Ready).await;
        self.transition(&mut inner, PhaseState::Active).await;
        Ok(())
    }

    async fn spawn_replica(
        &self,
        inner: &mut PhaseInner,
        replica_id: u32,
    ) -> Result<(), OrchestratorError> {
        let env = build_env(&self.topology, &self.phase, replica_id);
        let instance_ref = self.launcher.spawn(&self.phase, replica_id, env).await?;
        let mut instance = PhaseInstance::new(instance_ref, self.options.backoff_initial);
        instance.start_time = Instant::now();
        inner.instances.insert(replica_id, instance);
        Ok(())
    }

    /// Stops the phase. `graceful` governs whether the launcher is given
    /// `graceful_stop_timeout` to wind down or is told to act immediately
    /// (used during rollback).
    pub async fn stop(self: &Arc<Self>, graceful: bool) -> Result<(), OrchestratorError> {
        let mut inner = self.inner.lock().await;
        self.transition(&mut inner, PhaseState::Stopping).await;

        for (_, cancel) in inner.health_tasks.drain() {
            let _ = cancel.send(true);
        }

        let timeout = if graceful {
            self.options.graceful_stop_timeout
        } else {
            Duration::from_secs(0)
        };
        for (_, instance) in inner.instances.drain() {
            if let Err(e) = self.launcher.terminate(&instance.instance, timeout).await {
                tracing::warn!(phase = %self.phase.name, error = %e, "terminate failed during stop");
            }
        }

        self.transition(&mut inner, PhaseState::Stopped).await;
        Ok(())
    }

    /// Scales to `target` replicas. Spawns `current..target` or tears down
    /// `target..current` as needed.
    pub async fn scale(self: &Arc<Self>, target: u32) -> Result<(), OrchestratorError> {
        let mut inner = self.inner.lock().await;
        let current = inner.instances.len() as u32;
        inner.target_replicas = target;

        if target > current {
            for replica_id in current..target {
                self.spawn_replica(&mut inner, replica_id).await?;
            }
        } else if target < current {
            for replica_id in target..current {
                if let Some(instance) = inner.instances.remove(&replica_id) {
                    let _ = self
                        .launcher
                        .terminate(&instance.instance, self.options.graceful_stop_timeout)
                        .await;
                }
                if let Some(cancel) = inner.health_tasks.remove(&replica_id) {
                    let _ = cancel.send(true);
                }
            }
        }
        Ok(())
    }

    /// Rolling update in batches of `batch_size`. Aborts without rolling
    /// back completed batches on failure (spec §9 open question a): the
    /// caller is told exactly how many batches landed so it can decide what
    /// to do next.
    pub async fn rolling_update(self: &Arc<Self>, batch_size: u32) -> RollingUpdateOutcome {
        let replica_ids: Vec<u32> = {
            let inner = self.inner.lock().await;
            inner.instances.keys().copied().collect()
        };
        let batch_size = batch_size.max(1);
        let mut completed_batches = 0;

        for batch in replica_ids.chunks(batch_size as usize) {
            let mut inner = self.inner.lock().await;
            self.transition(&mut inner, PhaseState::RollingBack).await;

            for &replica_id in batch {
                if let Some(instance) = inner.instances.remove(&replica_id) {
                    let _ = self
                        .launcher
                        .terminate(&instance.instance, self.options.graceful_stop_timeout)
                        .await;
                }
                if let Some(cancel) = inner.health_tasks.remove(&replica_id) {
                    let _ = cancel.send(true);
                }
            }

            for &replica_id in batch {
                if let Err(e) = self.spawn_replica(&mut inner, replica_id).await {
                    tracing::error!(phase = %self.phase.name, error = %e, "rolling update batch failed");
                    self.transition(&mut inner, PhaseState::Failed).await;
                    return RollingUpdateOutcome::PartiallyUpdated { completed_batches };
                }
            }

            self.transition(&mut inner, PhaseState::Active).await;
            completed_batches += 1;
        }

        RollingUpdateOutcome::Complete
    }

    /// Stops then restarts the target replica, incrementing its restart
    /// bookkeeping. `wait_settled` bounds how long to wait for the old
    /// instance to reach a stopped state before respawning (spec §4.4
    /// "restart a phase or replica").
    pub async fn restart_replica(self: &Arc<Self>, replica_id: u32) -> Result<(), OrchestratorError> {
        let mut inner = self.inner.lock().await;
        if let Some(instance) = inner.instances.remove(&replica_id) {
            let _ = self
                .launcher
                .terminate(&instance.instance, self.options.graceful_stop_timeout)
                .await;
        }
        if let Some(cancel) = inner.health_tasks.remove(&replica_id) {
            let _ = cancel.send(true);
        }

        self.spawn_replica(&mut inner, replica_id).await?;
        if let Some(instance) = inner.instances.get_mut(&replica_id) {
            instance.record_restart(Instant::now());
        }
        Ok(())
    }

    /// Health-probes one instance; triggers restart-with-backoff on
    /// threshold, or settles the phase `FAILED` once the restart budget is
    /// exhausted (spec §4.4 health loop).
    pub(crate) async fn handle_health_tick(self: &Arc<Self>, replica_id: u32) {
        let alive = {
            let inner = self.inner.lock().await;
            let Some(instance) = inner.instances.get(&replica_id) else {
                return;
            };
            self.launcher.is_alive(&instance.instance).await
        };

        let mut inner = self.inner.lock().await;
        let Some(instance) = inner.instances.get_mut(&replica_id) else {
            return;
        };

        if alive {
            instance.reset_health(self.options.backoff_initial);
            return;
        }

        instance.record_health_failure(self.options.backoff_max);
        if instance.consecutive_health_failures < self.health_failure_threshold() {
            return;
        }

        let within_window = instance.restarts_within_window(self.options.restart_window, Instant::now());
        if within_window as u32 >= self.options.max_restarts {
            tracing::error!(phase = %self.phase.name, replica_id, "restart budget exhausted");
            self.transition(&mut inner, PhaseState::Failed).await;
            return;
        }

        let backoff = instance.current_backoff;
        drop(inner);
        tokio::time::sleep(backoff).await;

        if let Err(e) = self.restart_replica(replica_id).await {
            tracing::error!(phase = %self.phase.name, replica_id, error = %e, "auto-restart failed");
        }
    }

    /// Spawns the per-instance health loop task for every currently running
    /// replica. Returns the cancel senders so the caller (the coordinator)
    /// doesn't need to reach back into phase internals.
    pub async fn start_health_loops(self: &Arc<Self>) {
        let replica_ids: Vec<u32> = {
            let inner = self.inner.lock().await;
            inner.instances.keys().copied().collect()
        };

        for replica_id in replica_ids {
            let cancel_tx = crate::supervisor::health::spawn_health_loop(
                Arc::clone(self),
                replica_id,
                self.health_interval(),
            );
            self.inner.lock().await.health_tasks.insert(replica_id, cancel_tx);
        }
    }

    /// Effective health-probe interval: the phase's own override, or the
    /// pipeline-wide default (spec §6 `health_check_interval`).
    fn health_interval(&self) -> Duration {
        self.phase.health.interval.unwrap_or(self.options.health_check_interval)
    }

    /// Effective consecutive-failure threshold before a restart is
    /// triggered: the phase's own override, or the pipeline-wide default
    /// (spec §6 `health_failure_threshold`).
    fn health_failure_threshold(&self) -> u32 {
        self.phase.health.failure_threshold.unwrap_or(self.options.health_failure_threshold)
    }
}

/// Result of [`PhaseSupervisor::rolling_update`] (spec §9 open question a).
#[derive(Debug, PartialEq, Eq)]
pub enum RollingUpdateOutcome {
    Complete,
    PartiallyUpdated { completed_batches: usize },
}
