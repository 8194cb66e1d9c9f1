pub mod config;
pub mod error;
pub mod event;
pub mod recorder;
pub mod session;
pub mod sink;
pub mod source;
pub mod state;
pub mod summary;
pub mod trial;

pub use config::{
    CueConfig, SessionConfig, SubjectMetadata, TaskKind, TrialConfig, load_config, save_config,
};
pub use error::{ConfigError, SessionError, SinkError};
pub use event::{EventKind, EventRecord, SessionMetadata, Warning};
pub use recorder::SessionDir;
pub use session::{SessionHandle, SessionStatus};
pub use sink::{EventSink, JsonLinesSink, MemorySink, QueuedSink};
pub use source::{CueDispatcher, Sample, SignalSource};
pub use state::{TrialSequencer, start_session};
pub use summary::{Summary, summarize};
pub use trial::{Trial, TrialTimestamps, build_trial_list};
