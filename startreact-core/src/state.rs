use serde::{Deserialize, Serialize};
use std::fmt;

/// States of the trial sequencer
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencerState {
    #[default]
    Idle,
    InterTrialPause,
    AwaitingCue,
    Monitoring,
    Evaluating,
    Success,
    Fail,
    SessionComplete,
}

impl SequencerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionComplete)
    }

    /// Prompt shown to the subject while in this state.
    pub fn prompt(&self) -> &'static str {
        use SequencerState::*;
        match self {
            Idle | InterTrialPause => "Get ready!",
            AwaitingCue | Monitoring | Evaluating => "Reach the target!",
            Success => "Success! Return to rest.",
            Fail => "Too slow. Return to rest.",
            SessionComplete => "All done!",
        }
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SequencerState::*;
        let s = match self {
            Idle => "idle",
            InterTrialPause => "inter_trial_pause",
            AwaitingCue => "awaiting_cue",
            Monitoring => "monitoring",
            Evaluating => "evaluating",
            Success => "success",
            Fail => "fail",
            SessionComplete => "session_complete",
        };
        f.write_str(s)
    }
}
