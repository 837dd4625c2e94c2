//! Configuration surface: TOML topology description plus the
//! [`OrchestratorOptions`] knob table (spec §6).

pub mod loader;
pub mod types;

pub use loader::{LoadedConfig, load_topology, load_topology_from_str};
pub use types::{ConsumerEndpointSpec, OrchestratorOptions, RawTopology};
