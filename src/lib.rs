//! Hypergraph pipeline orchestrator: phases (nodes) supervised for
//! lifecycle/health, streams (hyperedges) routed with multicast
//! backpressure, all driven from a validated topology description.

pub mod callback;
pub mod config;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod orchestrator;
pub mod router;
pub mod supervisor;
pub mod topology;

pub use config::{LoadedConfig, OrchestratorOptions, load_topology, load_topology_from_str};
pub use error::OrchestratorError;
pub use orchestrator::Orchestrator;
pub use topology::Topology;
