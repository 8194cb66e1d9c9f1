use crate::config::validate_target;
use crate::error::ConfigError;
use startreact_core::{SequencerState, TrialOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Snapshot of a running session for live display
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStatus {
    pub state: SequencerState,
    pub trial_index: Option<usize>,
    pub total_trials: usize,
    pub outcomes: Vec<TrialOutcome>,
    pub target: (f64, f64),
    /// Set when the session ended on a fatal error
    pub fatal: Option<String>,
}

impl SessionStatus {
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_final()).count()
    }

    pub fn count(&self, outcome: TrialOutcome) -> usize {
        self.outcomes.iter().filter(|&&o| o == outcome).count()
    }
}

/// Operator side of a session. Cheap to clone and safe to use from other
/// threads; requests are latched and applied at the next tick.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    abort: Arc<AtomicBool>,
    target: Arc<Mutex<Option<(f64, f64)>>>,
    status: Arc<RwLock<SessionStatus>>,
}

impl SessionHandle {
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub fn move_target(&self, min: f64, max: f64) -> Result<(), ConfigError> {
        validate_target(min, max)?;
        *self.target.lock().unwrap_or_else(PoisonError::into_inner) = Some((min, max));
        Ok(())
    }

    pub(crate) fn take_target_request(&self) -> Option<(f64, f64)> {
        self.target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn current_state(&self) -> SessionStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn publish(&self, status: SessionStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }
}
