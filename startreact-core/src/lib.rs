pub mod cue;
pub mod state;
pub mod trial;

pub use cue::CueType;
pub use state::SequencerState;
pub use trial::{TrialOutcome, TrialResult};
