use crate::config::{SessionConfig, SubjectMetadata};
use serde::{Deserialize, Serialize};
use startreact_core::{CueType, SequencerState, TrialOutcome};

/// One line of the session event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp_ns: u64,
    pub trial_index: Option<usize>,
    pub cue_type: Option<CueType>,
    pub channel_value: Option<f64>,
    /// Sequencer state after the event was applied
    pub state: SequencerState,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted {
        trials: usize,
    },
    Sample,
    Transition {
        from: SequencerState,
    },
    /// The subject entered the re-arm window and the pause started counting
    SubjectReady,
    CueTriggered,
    TrialEnded {
        outcome: TrialOutcome,
    },
    Warning {
        warning: Warning,
    },
    TargetMoved {
        min: f64,
        max: f64,
    },
    AbortRequested,
    SessionEnded {
        success: usize,
        fail: usize,
        skipped: usize,
    },
}

/// Recoverable conditions, logged inline without stopping the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum Warning {
    #[error("No signal sample for {silent_ms}ms, hold streak reset")]
    SignalGap { silent_ms: u64 },
    #[error("Cue playback not acknowledged after {waited_ms}ms, monitoring anyway")]
    CueAckTimeout { waited_ms: u64 },
}

/// Written once per session before the first event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(flatten)]
    pub subject: SubjectMetadata,
    pub config: SessionConfig,
    pub trial_order: Vec<CueType>,
}
