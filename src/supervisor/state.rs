//! Per-phase state machine (spec §4.4).

use serde::Serialize;

/// `IDLE -> PREPARING -> STARTING -> READY -> ACTIVE -> (PAUSING -> PAUSED
/// -> STARTING -> ACTIVE)* -> STOPPING -> STOPPED`, with `FAILED` and
/// `ROLLING_BACK` reachable from any non-terminal state.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseState {
    Idle,
    Preparing,
    Starting,
    Ready,
    Active,
    Pausing,
    Paused,
    Stopping,
    Stopped,
    Failed,
    RollingBack,
}

impl PhaseState {
    /// `STOPPED`/`FAILED` are terminal and idempotent: re-entering them from
    /// themselves is always allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseState::Stopped | PhaseState::Failed)
    }

    /// Whether `self -> next` is a legal transition under the state machine
    /// above. `Failed` and `RollingBack` are reachable from anywhere
    /// non-terminal; terminal states only accept re-entry into themselves.
    pub fn can_transition_to(self, next: PhaseState) -> bool {
        use PhaseState::*;

        if self.is_terminal() {
            return next == self;
        }
        if matches!(next, Failed | RollingBack) {
            return true;
        }

        matches!(
            (self, next),
            (Idle, Preparing)
                | (Preparing, Starting)
                | (Starting, Ready)
                | (Starting, Active) // grace-period fallthrough, see §4.4 step 3
                | (Ready, Active)
                | (Active, Pausing)
                | (Pausing, Paused)
                | (Paused, Starting)
                | (Active, Stopping)
                | (Ready, Stopping)
                | (Starting, Stopping)
                | (Preparing, Stopping)
                | (Stopping, Stopped)
                | (RollingBack, Stopped)
                | (RollingBack, Preparing)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_legal() {
        assert!(PhaseState::Idle.can_transition_to(PhaseState::Preparing));
        assert!(PhaseState::Preparing.can_transition_to(PhaseState::Starting));
        assert!(PhaseState::Starting.can_transition_to(PhaseState::Ready));
        assert!(PhaseState::Ready.can_transition_to(PhaseState::Active));
        assert!(PhaseState::Active.can_transition_to(PhaseState::Stopping));
        assert!(PhaseState::Stopping.can_transition_to(PhaseState::Stopped));
    }

    #[test]
    fn failed_reachable_from_any_non_terminal_state() {
        for state in [
            PhaseState::Idle,
            PhaseState::Preparing,
            PhaseState::Starting,
            PhaseState::Ready,
            PhaseState::Active,
            PhaseState::Pausing,
            PhaseState::Paused,
            PhaseState::Stopping,
        ] {
            assert!(state.can_transition_to(PhaseState::Failed));
        }
    }

    #[test]
    fn terminal_states_only_self_transition() {
        assert!(PhaseState::Stopped.can_transition_to(PhaseState::Stopped));
        assert!(!PhaseState::Stopped.can_transition_to(PhaseState::Preparing));
        assert!(PhaseState::Failed.can_transition_to(PhaseState::Failed));
        assert!(!PhaseState::Failed.can_transition_to(PhaseState::Active));
    }

    #[test]
    fn pause_resume_cycle_returns_to_active() {
        assert!(PhaseState::Active.can_transition_to(PhaseState::Pausing));
        assert!(PhaseState::Pausing.can_transition_to(PhaseState::Paused));
        assert!(PhaseState::Paused.can_transition_to(PhaseState::Starting));
        assert!(PhaseState::Starting.can_transition_to(PhaseState::Active));
    }
}
