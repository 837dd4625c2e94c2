//! Error kinds shared across the orchestrator.
//!
//! Component-internal plumbing (config parsing, shelling out to a launcher
//! CLI, wire decoding) uses `anyhow::Result` with added context, same as
//! `replidev`'s podman wrappers. At the supervisor/orchestrator boundary,
//! errors that the spec requires callers to recognise by kind are converted
//! into [`OrchestratorError`].

use thiserror::Error;

/// The fixed set of error kinds a caller of the orchestrator may need to
/// branch on. See spec §7 for the propagation rules of each variant.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The topology violates an invariant (duplicate names, dangling stream
    /// reference, multiple producers, a cycle). Fatal at load time.
    #[error("invalid topology: {0}")]
    ConfigInvalid(String),

    /// The launcher could not create an instance.
    #[error("phase '{phase}' replica {replica_id}: spawn failed: {source}")]
    SpawnFailed {
        phase: String,
        replica_id: u32,
        #[source]
        source: anyhow::Error,
    },

    /// A prerequisite did not reach `ACTIVE` within the configured timeout.
    #[error("phase '{phase}' dependency '{dependency}' not ready within {timeout_secs}s")]
    DependencyNotReady {
        phase: String,
        dependency: String,
        timeout_secs: u64,
    },

    /// A health probe failed and the instance's restart budget is
    /// exhausted; the phase has settled in `FAILED`.
    #[error("phase '{phase}' replica {replica_id}: health checks exhausted restart budget")]
    HealthFailed { phase: String, replica_id: u32 },

    /// Dialing a consumer failed, or its writer broke. Never fatal to the
    /// router; the consumer is simply absent.
    #[error("stream '{stream}' consumer '{consumer}' unreachable: {reason}")]
    ConsumerUnreachable {
        stream: String,
        consumer: String,
        reason: String,
    },

    /// A malformed ingress frame. The ingress session is closed and
    /// re-accepted; never fatal to the router.
    #[error("stream '{stream}' frame decode error: {reason}")]
    FrameDecodeError { stream: String, reason: String },

    /// Normal operation, not a failure: a `drop_*` backpressure policy
    /// discarded a packet. Carried as a typed value so callers can count it
    /// without treating it as an error path.
    #[error("stream '{stream}' consumer '{consumer}': packet dropped under backpressure")]
    Backpressure { stream: String, consumer: String },

    /// Raised through suspension points during shutdown; recovered by
    /// orderly close at whichever component observes it.
    #[error("operation cancelled")]
    CancelRequested,
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
