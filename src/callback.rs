//! Lifecycle callback registry (spec §4.5, DESIGN NOTES "dynamic callbacks
//! for state transitions").
//!
//! Expressed as an explicit observer trait plus a registry keyed by the
//! state being entered, not as ad-hoc reflective hooks. Callbacks run on
//! their own task; a panicking callback is logged and otherwise swallowed,
//! never propagated to the supervisor that raised the transition.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::supervisor::state::PhaseState;

pub type Callback =
    Arc<dyn Fn(String, PhaseState, PhaseState) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[async_trait]
pub trait TransitionObserver: Send + Sync {
    async fn on_transition(&self, phase: &str, from: PhaseState, to: PhaseState);
}

/// Callbacks registered per notable/terminal state (`ACTIVE`, `FAILED`,
/// `STOPPED` are the ones the orchestrator wires up by default, but any
/// state can be registered against).
#[derive(Default)]
pub struct CallbackRegistry {
    by_state: Mutex<HashMap<PhaseState, Vec<Callback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, state: PhaseState, callback: Callback) {
        self.by_state.lock().await.entry(state).or_default().push(callback);
    }
}

#[async_trait]
impl TransitionObserver for CallbackRegistry {
    async fn on_transition(&self, phase: &str, from: PhaseState, to: PhaseState) {
        let callbacks = {
            let by_state = self.by_state.lock().await;
            by_state.get(&to).cloned().unwrap_or_default()
        };

        for callback in callbacks {
            let phase = phase.to_string();
            let handle = tokio::spawn(callback(phase.clone(), from, to));
            tokio::spawn(async move {
                if let Err(e) = handle.await {
                    tracing::error!(phase = %phase, error = %e, "lifecycle callback panicked");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn registered_callback_fires_on_matching_state() {
        let registry = CallbackRegistry::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);

        registry
            .register(
                PhaseState::Active,
                Arc::new(move |_phase, _from, _to| {
                    let fired = Arc::clone(&fired_clone);
                    Box::pin(async move {
                        fired.store(true, Ordering::SeqCst);
                    })
                }),
            )
            .await;

        registry
            .on_transition("producer", PhaseState::Ready, PhaseState::Active)
            .await;

        for _ in 0..20 {
            if fired.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(fired.load(Ordering::SeqCst));
    }
}
