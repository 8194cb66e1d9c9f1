use std::path::PathBuf;

/// Invalid session parameters. Always reported before the first trial starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Trials per cue must be at least 1")]
    NoTrials,
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("Target window must satisfy min < max with finite bounds, got [{min}, {max}]")]
    InvalidTarget { min: f64, max: f64 },
    #[error("Maximum trial duration must be greater than 0ms")]
    ZeroTrialDuration,
    #[error("Hold time of {hold_ms}ms can never be reached within a {max_trial_ms}ms trial")]
    HoldExceedsDeadline { hold_ms: u64, max_trial_ms: u64 },
    #[error("Signal gap threshold must be greater than 0ms")]
    ZeroSignalGap,
    #[error("Tick interval must be greater than 0ms")]
    ZeroTickInterval,
    #[error("A channel must be selected")]
    NoChannel,
    #[error("Subject id must not be empty")]
    NoSubjectId,
    #[error("Max range of motion must be finite, got {0}")]
    InvalidMaxRom(f64),
    #[error("{name} must be between 1 and 100, got {value}")]
    InvalidVolume { name: &'static str, value: u8 },
    #[error("Failed to read config file {}", .0.display())]
    Read(PathBuf, #[source] std::io::Error),
    #[error("Failed to write config file {}", .0.display())]
    Write(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file")]
    Parse(#[from] serde_json::Error),
}

/// Loss of the event log. Fatal for the running session.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error while {0}")]
    Io(&'static str, #[source] std::io::Error),
    #[error("Failed to write event record")]
    Write(#[from] serde_json::Error),
    #[error("Event writer stopped: {0}")]
    WriterGone(String),
    #[error("Session metadata was already written")]
    MetadataRewritten,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Event log failed, session aborted")]
    Sink(#[from] SinkError),
}
