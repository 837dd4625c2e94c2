//! Pipeline-wide coordinator: dependency-aware startup/shutdown across all
//! phases, holding the global sequencer lock (spec §4.4 "start/stop the
//! pipeline", spec DESIGN NOTES "per-phase vs global locks").

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::callback::TransitionObserver;
use crate::config::OrchestratorOptions;
use crate::error::OrchestratorError;
use crate::launcher::Launcher;
use crate::supervisor::phase::PhaseSupervisor;
use crate::supervisor::state::PhaseState;
use crate::topology::Topology;

const DEPENDENCY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Serializes pipeline-wide start/stop ordering. Independent of each
/// `PhaseSupervisor`'s own per-phase lock: this lock only ever guards the
/// sequencing loop, never an individual phase operation, so scaling a
/// later phase can still proceed while an earlier one is mid-startup.
pub struct SupervisorCoordinator {
    topology: Arc<Topology>,
    options: OrchestratorOptions,
    phases: HashMap<String, Arc<PhaseSupervisor>>,
    sequencer: Mutex<()>,
}

impl SupervisorCoordinator {
    pub fn new(
        topology: Arc<Topology>,
        launcher: Arc<dyn Launcher>,
        options: OrchestratorOptions,
        observer: Arc<dyn TransitionObserver>,
    ) -> Self {
        let phases = topology
            .phases()
            .map(|phase| {
                let supervisor = PhaseSupervisor::new(
                    phase.clone(),
                    Arc::clone(&topology),
                    Arc::clone(&launcher),
                    options.clone(),
                    Arc::clone(&observer),
                );
                (phase.name.clone(), supervisor)
            })
            .collect();

        Self {
            topology,
            options,
            phases,
            sequencer: Mutex::new(()),
        }
    }

    pub fn phase(&self, name: &str) -> Option<&Arc<PhaseSupervisor>> {
        self.phases.get(name)
    }

    pub fn phases(&self) -> impl Iterator<Item = &Arc<PhaseSupervisor>> {
        self.phases.values()
    }

    /// Starts every phase in topological order, staggered by
    /// `startup_stagger`, rolling back (in reverse startup order,
    /// non-graceful) on the first failure.
    pub async fn start_pipeline(&self) -> Result<(), OrchestratorError> {
        let _guard = self.sequencer.lock().await;
        let order = self.topology.topological_order()?;
        let mut started = Vec::new();

        for phase_name in &order {
            let Some(supervisor) = self.phases.get(phase_name) else {
                continue;
            };

            let deps = self.topology.ordering_dependencies_of(phase_name);
            if !self
                .wait_for_dependencies(&deps, self.options.dependency_wait_timeout)
                .await
            {
                let dependency = deps.into_iter().next().unwrap_or_default();
                tracing::error!(phase = %phase_name, %dependency, "dependency wait timed out");
                self.rollback(&started).await;
                return Err(OrchestratorError::DependencyNotReady {
                    phase: phase_name.clone(),
                    dependency,
                    timeout_secs: self.options.dependency_wait_timeout.as_secs(),
                });
            }

            if let Err(e) = supervisor.start(|_dep| true).await {
                tracing::error!(phase = %phase_name, error = %e, "phase start failed, rolling back pipeline");
                self.rollback(&started).await;
                return Err(e);
            }
            supervisor.start_health_loops().await;
            started.push(phase_name.clone());

            tokio::time::sleep(self.options.startup_stagger).await;
        }

        Ok(())
    }

    /// Stops every phase in reverse topological order, staggered the same
    /// as startup.
    pub async fn stop_pipeline(&self) -> Result<(), OrchestratorError> {
        let _guard = self.sequencer.lock().await;
        let order = self.topology.reverse_topological_order()?;

        for phase_name in order {
            if let Some(supervisor) = self.phases.get(&phase_name) {
                if let Err(e) = supervisor.stop(true).await {
                    tracing::warn!(phase = %phase_name, error = %e, "stop failed");
                }
            }
            tokio::time::sleep(self.options.startup_stagger).await;
        }

        Ok(())
    }

    async fn wait_for_dependencies(&self, deps: &HashSet<String>, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let mut all_active = true;
            for dep in deps {
                let Some(supervisor) = self.phases.get(dep) else {
                    continue;
                };
                if supervisor.state().await != PhaseState::Active {
                    all_active = false;
                    break;
                }
            }
            if all_active {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DEPENDENCY_POLL_INTERVAL).await;
        }
    }

    async fn rollback(&self, started: &[String]) {
        for phase_name in started.iter().rev() {
            if let Some(supervisor) = self.phases.get(phase_name) {
                if let Err(e) = supervisor.stop(false).await {
                    tracing::warn!(phase = %phase_name, error = %e, "rollback stop failed");
                }
            }
        }
    }
}
