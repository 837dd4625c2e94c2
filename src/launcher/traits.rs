//! Launcher capability: spawn, signal, inspect, and reap a phase instance.
//!
//! Two variants share this trait (host process, container); the supervisor
//! talks only to `dyn Launcher` and never downcasts. Instance handles are
//! owned exclusively by whichever launcher created them — callers pass the
//! lightweight [`InstanceRef`] identifier across component boundaries
//! instead of a raw handle (spec DESIGN NOTES, "ownership of instance
//! handles").

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use flume::Receiver;

use crate::error::OrchestratorError;
use crate::topology::Phase;

/// Identifies one running instance by phase name and replica id. Never
/// carries a process handle or container id directly.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceRef {
    pub phase_name: String,
    pub replica_id: u32,
}

impl InstanceRef {
    pub fn new(phase_name: impl Into<String>, replica_id: u32) -> Self {
        Self {
            phase_name: phase_name.into(),
            replica_id,
        }
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.phase_name, self.replica_id)
    }
}

#[async_trait]
pub trait Launcher: Send + Sync {
    /// Create a new instance of `phase`, with `env` injected as described
    /// in the environment-injection contract (see `launcher::env`).
    async fn spawn(
        &self,
        phase: &Phase,
        replica_id: u32,
        env: HashMap<String, String>,
    ) -> Result<InstanceRef, OrchestratorError>;

    /// Whether the instance is still running. Never errors: an instance the
    /// launcher has lost track of is simply not alive.
    async fn is_alive(&self, instance: &InstanceRef) -> bool;

    /// Ask the instance to stop, waiting up to `graceful_timeout` before
    /// escalating to a hard kill.
    async fn terminate(
        &self,
        instance: &InstanceRef,
        graceful_timeout: Duration,
    ) -> Result<(), OrchestratorError>;

    /// A bounded stream of log lines drained off the instance, if the
    /// launcher captures them (host process does; container launches rely
    /// on the container runtime's own log sink and return `None`).
    async fn log_receiver(&self, instance: &InstanceRef) -> Option<Receiver<String>>;
}
