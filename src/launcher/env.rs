//! Environment injection for spawned instances (spec §4.2 data flow: stream
//! endpoints are handed to each phase instance as environment variables).

use std::collections::HashMap;

use crate::topology::{Phase, Topology};

/// Builds the environment a phase instance is launched with: its own
/// identity, the stream names it declares, and a `STREAM_<NAME>_PORT` /
/// `STREAM_<NAME>_PROTOCOL` pair for every stream it references so the
/// instance's own client code can dial the right router without consulting
/// the topology file itself.
pub fn build_env(topology: &Topology, phase: &Phase, replica_id: u32) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("PHASE_NAME".to_string(), phase.name.clone());
    env.insert("REPLICA_ID".to_string(), replica_id.to_string());
    env.insert(
        "INPUT_STREAMS".to_string(),
        serde_json::to_string(&phase.inputs).expect("string vec always serializes"),
    );
    env.insert(
        "OUTPUT_STREAMS".to_string(),
        serde_json::to_string(&phase.outputs).expect("string vec always serializes"),
    );

    for stream_name in phase.inputs.iter().chain(phase.outputs.iter()) {
        let Some(stream) = topology.stream(stream_name) else {
            continue;
        };
        let prefix = format!("STREAM_{}", stream_name.to_uppercase());
        env.insert(format!("{prefix}_PORT"), stream.port.to_string());
        env.insert(
            format!("{prefix}_PROTOCOL"),
            serde_json::to_value(stream.protocol)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
        );
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Hyperedge, Stream};

    #[test]
    fn injects_identity_and_stream_endpoints() {
        let phases = vec![
            Phase {
                name: "producer".to_string(),
                kind: crate::topology::PhaseKind::HostProcess {
                    command: vec!["producer".to_string()],
                },
                inputs: vec![],
                outputs: vec!["eeg".to_string()],
                replicas: 1,
                health: Default::default(),
                dependencies: HashMap::new(),
            },
            Phase {
                name: "consumer".to_string(),
                kind: crate::topology::PhaseKind::HostProcess {
                    command: vec!["consumer".to_string()],
                },
                inputs: vec!["eeg".to_string()],
                outputs: vec![],
                replicas: 1,
                health: Default::default(),
                dependencies: HashMap::new(),
            },
        ];
        let streams = vec![Stream {
            name: "eeg".to_string(),
            protocol: crate::topology::Protocol::Tcp,
            port: 9100,
            buffer_size: 128,
            schema: None,
        }];
        let edges = vec![Hyperedge {
            name: "e1".to_string(),
            source: "producer".to_string(),
            targets: ["consumer".to_string()].into_iter().collect(),
            streams: vec!["eeg".to_string()],
            multicast: true,
        }];
        let topology = Topology::build(phases, streams, edges).unwrap();

        let env = build_env(&topology, topology.phase("consumer").unwrap(), 0);
        assert_eq!(env.get("PHASE_NAME"), Some(&"consumer".to_string()));
        assert_eq!(env.get("REPLICA_ID"), Some(&"0".to_string()));
        assert_eq!(env.get("STREAM_EEG_PORT"), Some(&"9100".to_string()));
        assert_eq!(env.get("STREAM_EEG_PROTOCOL"), Some(&"tcp".to_string()));
    }
}
