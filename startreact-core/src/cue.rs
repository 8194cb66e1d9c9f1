use serde::{Deserialize, Serialize};
use std::fmt;

/// Stimulus presented at the start of a trial.
///
/// Every cue is visual; auditory and startling cues add a tone played at
/// the auditory or startle volume respectively.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueType {
    Visual,
    Auditory,
    Startling,
}

impl CueType {
    pub const ALL: [CueType; 3] = [CueType::Visual, CueType::Auditory, CueType::Startling];

    pub fn has_tone(&self) -> bool {
        !matches!(self, CueType::Visual)
    }

    /// Name used in the task history, e.g. `begin_visual_startling`.
    pub fn task_name(&self) -> &'static str {
        match self {
            CueType::Visual => "visual",
            CueType::Auditory => "visual_auditory",
            CueType::Startling => "visual_startling",
        }
    }
}

impl fmt::Display for CueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CueType::Visual => "visual",
            CueType::Auditory => "auditory",
            CueType::Startling => "startling",
        })
    }
}
