use crate::config::TrialConfig;
use rand::Rng;
use rand::seq::SliceRandom;
use startreact_core::{CueType, TrialOutcome, TrialResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub index: usize,
    pub cue: CueType,
    pub pause_ms: u64,
    pub outcome: TrialOutcome,
    pub timestamps: TrialTimestamps,
}

/// Clock readings in nanoseconds, filled in as the trial progresses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialTimestamps {
    pub pause_start: Option<u64>,
    pub cue_onset: Option<u64>,
    pub monitoring_start: Option<u64>,
    pub first_in_target: Option<u64>,
    pub exit: Option<u64>,
}

impl Trial {
    /// Sets the outcome once. Returns false if an outcome was already recorded.
    pub fn record_outcome(&mut self, outcome: TrialOutcome, now_ns: u64) -> bool {
        if self.outcome.is_final() || !outcome.is_final() {
            return false;
        }
        self.outcome = outcome;
        self.timestamps.exit = Some(now_ns);
        true
    }

    pub fn reaction_time_ns(&self) -> Option<u64> {
        let onset = self.timestamps.cue_onset?;
        self.timestamps
            .first_in_target
            .map(|t| t.saturating_sub(onset))
    }

    pub fn to_result(&self) -> TrialResult {
        TrialResult {
            trial_index: self.index,
            cue_type: self.cue,
            outcome: self.outcome,
            pause_ms: self.pause_ms,
            cue_onset_ns: self.timestamps.cue_onset,
            reaction_time_ns: self.reaction_time_ns(),
            exit_ns: self.timestamps.exit,
        }
    }
}

/// Builds the session's trial list: `trials_per_cue` of each cue type in
/// shuffled order, each with its own randomized pause.
pub fn build_trial_list<R: Rng>(config: &TrialConfig, rng: &mut R) -> Vec<Trial> {
    let mut cues: Vec<CueType> = CueType::ALL
        .iter()
        .flat_map(|&cue| std::iter::repeat_n(cue, config.trials_per_cue))
        .collect();
    cues.shuffle(rng);

    cues.into_iter()
        .enumerate()
        .map(|(index, cue)| Trial {
            index,
            cue,
            pause_ms: config
                .pause_min_ms
                .saturating_add(rng.random_range(0..=config.pause_random_ms)),
            outcome: TrialOutcome::Pending,
            timestamps: TrialTimestamps::default(),
        })
        .collect()
}
