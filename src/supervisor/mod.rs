//! Phase supervisor / coordinator: per-phase state machine, health-driven
//! restart, rolling updates, and pipeline-wide dependency ordering
//! (spec §4.4).

pub mod coordinator;
pub mod health;
pub mod instance;
pub mod phase;
pub mod state;

pub use coordinator::SupervisorCoordinator;
pub use phase::{PhaseSupervisor, RollingUpdateOutcome};
pub use state::PhaseState;
