//! Immutable description of phases, streams and hyperedges, plus the
//! derived adjacency/ordering the supervisor and routers are built on.
//!
//! A [`Topology`] is validated eagerly at construction: duplicate names,
//! dangling stream references, streams with more than one producer, and
//! dependency cycles are all caught here, before anything is started.

pub mod graph;
pub mod hyperedge;
pub mod phase;
pub mod stream;

use std::collections::{HashMap, HashSet};

pub use hyperedge::Hyperedge;
pub use phase::{DependencyKind, HealthSpec, Phase, PhaseKind};
pub use stream::{Protocol, Stream};

use crate::error::OrchestratorError;
use graph::DependencyGraph;

/// A fully-validated, immutable hypergraph topology.
#[derive(Debug)]
pub struct Topology {
    phases: HashMap<String, Phase>,
    streams: HashMap<String, Stream>,
    hyperedges: HashMap<String, Hyperedge>,
    /// stream name -> producer phase name, precomputed at validation time.
    producers: HashMap<String, String>,
    /// stream name -> consumer phase names, deduplicated across edges.
    consumers: HashMap<String, HashSet<String>>,
    graph: DependencyGraph,
}

impl Topology {
    /// Validate and construct a topology from its raw declarative parts.
    /// Fails with `ConfigInvalid` at the first invariant violation found.
    pub fn build(
        phases: Vec<Phase>,
        streams: Vec<Stream>,
        hyperedges: Vec<Hyperedge>,
    ) -> Result<Self, OrchestratorError> {
        let mut phase_map = HashMap::new();
        for phase in phases {
            if phase_map.insert(phase.name.clone(), phase).is_some() {
                return Err(OrchestratorError::ConfigInvalid(format!(
                    "duplicate phase name '{}'",
                    phase_map.keys().last().unwrap()
                )));
            }
        }

        let mut stream_map = HashMap::new();
        for stream in streams {
            if stream_map.insert(stream.name.clone(), stream).is_some() {
                return Err(OrchestratorError::ConfigInvalid(format!(
                    "duplicate stream name '{}'",
                    stream_map.keys().last().unwrap()
                )));
            }
        }

        let mut edge_map = HashMap::new();
        for edge in hyperedges {
            if edge_map.insert(edge.name.clone(), edge).is_some() {
                return Err(OrchestratorError::ConfigInvalid(format!(
                    "duplicate hyperedge name '{}'",
                    edge_map.keys().last().unwrap()
                )));
            }
        }

        Self::validate_stream_declarations(&phase_map, &stream_map)?;
        let (producers, consumers) = Self::derive_producers_and_consumers(&phase_map, &edge_map)?;
        Self::validate_hyperedge_declarations(&phase_map, &stream_map, &edge_map)?;

        let mut graph = DependencyGraph::new(phase_map.keys().cloned());
        for phase in phase_map.values() {
            for (dep_name, kind) in &phase.dependencies {
                if !kind.orders_startup() {
                    continue;
                }
                if !phase_map.contains_key(dep_name) {
                    return Err(OrchestratorError::ConfigInvalid(format!(
                        "phase '{}' depends on unknown phase '{}'",
                        phase.name, dep_name
                    )));
                }
                graph.add_edge(dep_name, &phase.name);
            }
        }
        // A hyperedge's streams are a `consumes_from`-equivalent ordering
        // constraint even when not spelled out under `dependencies`.
        for edge in edge_map.values() {
            for target in &edge.targets {
                graph.add_edge(&edge.source, target);
            }
        }

        // Eagerly fail fast on cycles rather than discovering this lazily
        // the first time a caller asks for the startup order.
        graph.topological_order()?;

        Ok(Self {
            phases: phase_map,
            streams: stream_map,
            hyperedges: edge_map,
            producers,
            consumers,
            graph,
        })
    }

    fn validate_stream_declarations(
        phases: &HashMap<String, Phase>,
        streams: &HashMap<String, Stream>,
    ) -> Result<(), OrchestratorError> {
        for phase in phases.values() {
            for stream_name in phase.inputs.iter().chain(phase.outputs.iter()) {
                if !streams.contains_key(stream_name) {
                    return Err(OrchestratorError::ConfigInvalid(format!(
                        "phase '{}' references unknown stream '{}'",
                        phase.name, stream_name
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_hyperedge_declarations(
        phases: &HashMap<String, Phase>,
        streams: &HashMap<String, Stream>,
        edges: &HashMap<String, Hyperedge>,
    ) -> Result<(), OrchestratorError> {
        for edge in edges.values() {
            let source = phases.get(&edge.source).ok_or_else(|| {
                OrchestratorError::ConfigInvalid(format!(
                    "hyperedge '{}' source '{}' is not a declared phase",
                    edge.name, edge.source
                ))
            })?;

            for stream_name in &edge.streams {
                if !streams.contains_key(stream_name) {
                    return Err(OrchestratorError::ConfigInvalid(format!(
                        "hyperedge '{}' references unknown stream '{}'",
                        edge.name, stream_name
                    )));
                }
                if !source.outputs.contains(stream_name) {
                    return Err(OrchestratorError::ConfigInvalid(format!(
                        "hyperedge '{}' source '{}' does not declare output '{}'",
                        edge.name, edge.source, stream_name
                    )));
                }
                for target_name in &edge.targets {
                    let target = phases.get(target_name).ok_or_else(|| {
                        OrchestratorError::ConfigInvalid(format!(
                            "hyperedge '{}' target '{}' is not a declared phase",
                            edge.name, target_name
                        ))
                    })?;
                    if !target.inputs.contains(stream_name) {
                        return Err(OrchestratorError::ConfigInvalid(format!(
                            "hyperedge '{}' target '{}' does not declare input '{}'",
                            edge.name, target_name, stream_name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Compute `producer_of`/`consumers_of` from hyperedges, enforcing
    /// "exactly one producer per stream that appears on any hyperedge".
    fn derive_producers_and_consumers(
        phases: &HashMap<String, Phase>,
        edges: &HashMap<String, Hyperedge>,
    ) -> Result<(HashMap<String, String>, HashMap<String, HashSet<String>>), OrchestratorError>
    {
        let _ = phases;
        let mut producers: HashMap<String, String> = HashMap::new();
        let mut consumers: HashMap<String, HashSet<String>> = HashMap::new();

        for edge in edges.values() {
            for stream_name in &edge.streams {
                match producers.get(stream_name) {
                    Some(existing) if existing != &edge.source => {
                        return Err(OrchestratorError::ConfigInvalid(format!(
                            "stream '{stream_name}' has multiple producers: '{existing}' and '{}'",
                            edge.source
                        )));
                    }
                    _ => {
                        producers.insert(stream_name.clone(), edge.source.clone());
                    }
                }
                consumers
                    .entry(stream_name.clone())
                    .or_default()
                    .extend(edge.targets.iter().cloned());
            }
        }

        Ok((producers, consumers))
    }

    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.phases.get(name)
    }

    pub fn phases(&self) -> impl Iterator<Item = &Phase> {
        self.phases.values()
    }

    pub fn stream(&self, name: &str) -> Option<&Stream> {
        self.streams.get(name)
    }

    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.values()
    }

    pub fn hyperedge(&self, name: &str) -> Option<&Hyperedge> {
        self.hyperedges.get(name)
    }

    pub fn hyperedges(&self) -> impl Iterator<Item = &Hyperedge> {
        self.hyperedges.values()
    }

    /// The single producer phase for a stream, or `None` if the stream is
    /// not carried by any hyperedge.
    pub fn producer_of(&self, stream: &str) -> Option<&str> {
        self.producers.get(stream).map(String::as_str)
    }

    /// Consumer phases for a stream, deduplicated across hyperedges.
    pub fn consumers_of(&self, stream: &str) -> HashSet<String> {
        self.consumers.get(stream).cloned().unwrap_or_default()
    }

    /// Phases reachable via any edge the given phase sources.
    pub fn downstream(&self, phase: &str) -> HashSet<String> {
        self.graph.downstream(phase)
    }

    /// Inverse of [`Topology::downstream`].
    pub fn upstream(&self, phase: &str) -> HashSet<String> {
        self.graph.upstream(phase)
    }

    /// Non-optional dependency phase names for `phase` that constrain
    /// startup ordering (i.e. not `produces_for`).
    pub fn ordering_dependencies_of(&self, phase: &str) -> HashSet<String> {
        self.phases
            .get(phase)
            .map(|p| {
                p.dependencies
                    .iter()
                    .filter(|(_, kind)| kind.orders_startup())
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn topological_order(&self) -> Result<Vec<String>, OrchestratorError> {
        self.graph.topological_order()
    }

    pub fn reverse_topological_order(&self) -> Result<Vec<String>, OrchestratorError> {
        let mut order = self.graph.topological_order()?;
        order.reverse();
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::phase::PhaseKind;

    fn host_phase(name: &str, inputs: &[&str], outputs: &[&str]) -> Phase {
        Phase {
            name: name.to_string(),
            kind: PhaseKind::HostProcess {
                command: vec![name.to_string()],
            },
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            replicas: 1,
            health: HealthSpec::default(),
            dependencies: HashMap::new(),
        }
    }

    fn stream(name: &str) -> Stream {
        Stream {
            name: name.to_string(),
            protocol: Protocol::Tcp,
            port: 9000,
            buffer_size: 128,
            schema: None,
        }
    }

    fn edge(name: &str, source: &str, targets: &[&str], streams: &[&str]) -> Hyperedge {
        Hyperedge {
            name: name.to_string(),
            source: source.to_string(),
            targets: targets.iter().map(|s| s.to_string()).collect(),
            streams: streams.iter().map(|s| s.to_string()).collect(),
            multicast: true,
        }
    }

    #[test]
    fn linear_three_stage_topology() {
        let phases = vec![
            host_phase("a", &[], &["s1"]),
            host_phase("b", &["s1"], &["s2"]),
            host_phase("c", &["s2"], &[]),
        ];
        let streams = vec![stream("s1"), stream("s2")];
        let edges = vec![
            edge("e1", "a", &["b"], &["s1"]),
            edge("e2", "b", &["c"], &["s2"]),
        ];
        let topo = Topology::build(phases, streams, edges).unwrap();

        assert_eq!(topo.producer_of("s1"), Some("a"));
        assert_eq!(
            topo.consumers_of("s1"),
            HashSet::from(["b".to_string()])
        );
        assert_eq!(topo.topological_order().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(
            topo.reverse_topological_order().unwrap(),
            vec!["c", "b", "a"]
        );
    }

    #[test]
    fn fan_out_consumers_deduplicate() {
        let phases = vec![
            host_phase("a", &[], &["s1"]),
            host_phase("b", &["s1"], &[]),
            host_phase("c", &["s1"], &[]),
            host_phase("d", &["s1"], &[]),
        ];
        let streams = vec![stream("s1")];
        let edges = vec![edge("e1", "a", &["b", "c", "d"], &["s1"])];
        let topo = Topology::build(phases, streams, edges).unwrap();
        let mut consumers: Vec<_> = topo.consumers_of("s1").into_iter().collect();
        consumers.sort();
        assert_eq!(consumers, vec!["b", "c", "d"]);
    }

    #[test]
    fn cycle_between_phases_is_rejected() {
        let phases = vec![host_phase("a", &["s2"], &["s1"]), host_phase("b", &["s1"], &["s2"])];
        let streams = vec![stream("s1"), stream("s2")];
        let edges = vec![
            edge("e1", "a", &["b"], &["s1"]),
            edge("e2", "b", &["a"], &["s2"]),
        ];
        assert!(Topology::build(phases, streams, edges).is_err());
    }

    #[test]
    fn multiple_producers_for_one_stream_is_rejected() {
        let phases = vec![
            host_phase("a", &[], &["s1"]),
            host_phase("b", &[], &["s1"]),
            host_phase("c", &["s1"], &[]),
        ];
        let streams = vec![stream("s1")];
        let edges = vec![
            edge("e1", "a", &["c"], &["s1"]),
            edge("e2", "b", &["c"], &["s1"]),
        ];
        assert!(Topology::build(phases, streams, edges).is_err());
    }

    #[test]
    fn dangling_stream_reference_is_rejected() {
        let phases = vec![host_phase("a", &["missing"], &[])];
        assert!(Topology::build(phases, vec![], vec![]).is_err());
    }
}
