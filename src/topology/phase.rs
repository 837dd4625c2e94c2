//! Phase declarations: the hypergraph's nodes.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// How a phase's instances are launched.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseKind {
    HostProcess {
        /// Argv for the child process; `command[0]` is the executable.
        command: Vec<String>,
    },
    Container {
        image: String,
        #[serde(default)]
        volumes: Vec<VolumeMount>,
        #[serde(default)]
        resources: ResourceLimits,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Default)]
pub struct ResourceLimits {
    pub cpus: Option<f64>,
    pub memory: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
}

/// Liveness probe parameters for a phase's instances. Either field left
/// unset falls back to the pipeline-wide `health_check_interval` /
/// `health_failure_threshold` option (spec §6); a phase only needs this
/// block at all when it wants to deviate from that default.
#[derive(Clone, Debug, Deserialize, PartialEq, Default)]
pub struct HealthSpec {
    #[serde(default, deserialize_with = "opt_secs::deserialize")]
    pub interval: Option<Duration>,
    #[serde(default)]
    pub failure_threshold: Option<u32>,
}

/// A processing phase: a named unit of work, spawned as one or more
/// replicated instances, declaring the stream names it consumes and
/// produces.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Phase {
    pub name: String,
    pub kind: PhaseKind,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default = "Phase::default_replicas")]
    pub replicas: u32,
    #[serde(default)]
    pub health: HealthSpec,
    /// `requires`/`consumes_from`/`produces_for`/`sequential` edges to
    /// other phases, keyed by the other phase's name.
    #[serde(default)]
    pub dependencies: HashMap<String, DependencyKind>,
}

impl Phase {
    fn default_replicas() -> u32 {
        1
    }
}

/// Kind of supervisor-internal dependency edge between two phases.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Source must reach `ACTIVE` before target may start.
    Requires,
    /// Same ordering requirement as `Requires`, implied by a stream edge.
    ConsumesFrom,
    /// Informational only; does not add a startup-ordering edge.
    ProducesFor,
    /// Same ordering requirement as `Requires`, declared explicitly.
    Sequential,
}

impl DependencyKind {
    /// Whether this dependency kind constrains startup ordering.
    pub fn orders_startup(self) -> bool {
        !matches!(self, DependencyKind::ProducesFor)
    }
}

/// Deserializes an optional plain-integer-seconds field as `Option<Duration>`,
/// matching the plain-integer style used throughout the spec's knob table.
mod opt_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_kind_orders_startup() {
        assert!(DependencyKind::Requires.orders_startup());
        assert!(DependencyKind::ConsumesFrom.orders_startup());
        assert!(DependencyKind::Sequential.orders_startup());
        assert!(!DependencyKind::ProducesFor.orders_startup());
    }
}
