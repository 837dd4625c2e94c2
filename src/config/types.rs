//! Raw TOML configuration shape.
//!
//! Deserialised directly by serde, then handed to [`crate::topology::Topology::build`]
//! for validation. Kept deliberately "dumb" (no invariant checking here) so
//! the parse step and the validate step stay independently testable, the
//! way `liminal::config::loader`/`validation` are split.

use std::time::Duration;

use serde::Deserialize;

use crate::router::protocol::ConsumerEndpoint;
use crate::topology::{Hyperedge, Phase, Protocol, Stream};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct RawTopology {
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub streams: Vec<Stream>,
    #[serde(default)]
    pub hyperedges: Vec<Hyperedge>,
    #[serde(default)]
    pub options: OrchestratorOptions,
    /// Network endpoints for declared consumers. The topology names
    /// consumer *phases*; it has no notion of where that phase's instance
    /// listens. This is the "external concern" spec §4.3 says the core
    /// exposes a hook for.
    #[serde(default)]
    pub consumer_endpoints: Vec<ConsumerEndpointSpec>,
}

/// One `(protocol, host, port, buffer_size, policy)` consumer registration,
/// read straight from config and handed to `StreamRouter::register_consumer`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ConsumerEndpointSpec {
    pub stream: String,
    pub consumer: String,
    pub host: String,
    pub port: u16,
    /// Defaults to the stream's own protocol when omitted.
    pub protocol: Option<Protocol>,
    /// Defaults to `options.default_backpressure` when omitted.
    pub backpressure: Option<crate::router::backpressure::BackpressurePolicy>,
}

impl ConsumerEndpointSpec {
    pub fn endpoint(&self, stream_protocol: Protocol) -> ConsumerEndpoint {
        ConsumerEndpoint {
            protocol: self.protocol.unwrap_or(stream_protocol),
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// The knob table from spec §6, one field per row, defaults matching the
/// spec's default column exactly.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorOptions {
    #[serde(with = "secs")]
    pub startup_stagger: Duration,
    #[serde(with = "secs")]
    pub dependency_wait_timeout: Duration,
    #[serde(with = "secs")]
    pub graceful_stop_timeout: Duration,
    #[serde(with = "secs")]
    pub health_check_interval: Duration,
    pub health_failure_threshold: u32,
    pub max_restarts: u32,
    #[serde(with = "secs")]
    pub restart_window: Duration,
    #[serde(with = "secs")]
    pub backoff_initial: Duration,
    #[serde(with = "secs")]
    pub backoff_max: Duration,
    #[serde(with = "secs")]
    pub consumer_dial_timeout: Duration,
    pub default_backpressure: crate::router::backpressure::BackpressurePolicy,
    #[serde(with = "millis")]
    pub sync_window: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            startup_stagger: Duration::from_millis(500),
            dependency_wait_timeout: Duration::from_secs(60),
            graceful_stop_timeout: Duration::from_secs(10),
            health_check_interval: Duration::from_secs(10),
            health_failure_threshold: 3,
            max_restarts: 5,
            restart_window: Duration::from_secs(300),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            consumer_dial_timeout: Duration::from_secs(5),
            default_backpressure: crate::router::backpressure::BackpressurePolicy::DropOldest,
            sync_window: Duration::from_millis(10),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
