//! Loading a topology description from TOML, mirroring
//! `liminal::config::loader`'s file/string split.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::types::{ConsumerEndpointSpec, OrchestratorOptions, RawTopology};
use crate::topology::Topology;

/// Everything parsed out of one config file: the validated topology, the
/// knob table, and the externally-supplied consumer dial targets.
pub struct LoadedConfig {
    pub topology: Topology,
    pub options: OrchestratorOptions,
    pub consumer_endpoints: Vec<ConsumerEndpointSpec>,
}

/// Load and validate a topology from a TOML file on disk.
pub fn load_topology<P: AsRef<Path>>(path: P) -> Result<LoadedConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    load_topology_from_str(&content)
}

/// Load and validate a topology from TOML content already in memory.
/// Useful for tests and for configuration sourced outside the filesystem.
pub fn load_topology_from_str(content: &str) -> Result<LoadedConfig> {
    let raw: RawTopology = toml::from_str(content).context("failed to parse config TOML")?;
    let topology = Topology::build(raw.phases, raw.streams, raw.hyperedges)
        .context("topology failed validation")?;
    Ok(LoadedConfig {
        topology,
        options: raw.options,
        consumer_endpoints: raw.consumer_endpoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[phases]]
        name = "acquire"
        outputs = ["raw"]
        [phases.kind]
        kind = "host_process"
        command = ["acquire-bin"]

        [[phases]]
        name = "filter"
        inputs = ["raw"]
        outputs = ["clean"]
        [phases.kind]
        kind = "host_process"
        command = ["filter-bin"]

        [[streams]]
        name = "raw"
        protocol = "tcp"
        port = 9001

        [[streams]]
        name = "clean"
        protocol = "tcp"
        port = 9002

        [[hyperedges]]
        name = "e1"
        source = "acquire"
        targets = ["filter"]
        streams = ["raw"]

        [options]
        max_restarts = 7
    "#;

    #[test]
    fn loads_and_validates_a_minimal_topology() {
        let loaded = load_topology_from_str(SAMPLE).unwrap();
        assert_eq!(
            loaded.topology.topological_order().unwrap(),
            vec!["acquire", "filter"]
        );
        assert_eq!(loaded.options.max_restarts, 7);
        // Unset options fall back to spec defaults.
        assert_eq!(loaded.options.health_failure_threshold, 3);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(load_topology_from_str("not valid [[[ toml").is_err());
    }
}
