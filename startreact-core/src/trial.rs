use crate::CueType;
use serde::{Deserialize, Serialize};

/// Outcome of one trial
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    #[default]
    Pending,
    Success,
    Fail,
    /// Not run because the operator aborted the session.
    Skipped,
    /// Not run because the event sink failed.
    Aborted,
}

impl TrialOutcome {
    pub fn is_final(&self) -> bool {
        !matches!(self, TrialOutcome::Pending)
    }
}

/// Recorded result per trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_index: usize,
    pub cue_type: CueType,
    pub outcome: TrialOutcome,
    pub pause_ms: u64,
    pub cue_onset_ns: Option<u64>,
    /// First sample inside the target window, relative to cue onset
    pub reaction_time_ns: Option<u64>,
    pub exit_ns: Option<u64>,
}
