use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const MAX_HOLD_MS: u64 = 5000;
pub const MAX_PAUSE_MS: u64 = 5000;
pub const MAX_TRIALS_PER_CUE: usize = 40;
pub const MAX_TRIAL_MS: u64 = 60_000;
pub const MAX_WATCHDOG_MS: u64 = 10_000;
pub const MAX_TICK_INTERVAL_MS: u64 = 1000;

/// Timing and target parameters of a StartReact session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    /// Time the signal must stay inside the target window
    pub hold_ms: u64,
    pub pause_min_ms: u64,
    /// Upper bound of the uniform extra pause added to `pause_min_ms`
    pub pause_random_ms: u64,
    pub trials_per_cue: usize,
    pub target_min: f64,
    pub target_max: f64,
    pub channel: String,
    pub sensor: Option<String>,
    /// Deadline measured from the start of monitoring
    pub max_trial_ms: u64,
    pub cue_ack_timeout_ms: u64,
    pub signal_gap_ms: u64,
    /// Rest position. In the rest task each pause starts counting only once
    /// the signal is back inside this window
    pub base_window: Option<(f64, f64)>,
    /// Preparation position that arms each pause in the active task
    pub prep_window: Option<(f64, f64)>,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            hold_ms: 250,
            pause_min_ms: 2000,
            pause_random_ms: 1000,
            trials_per_cue: 10,
            target_min: 5.0,
            target_max: 15.0,
            channel: "Torque".to_string(),
            sensor: None,
            max_trial_ms: 3000,
            cue_ack_timeout_ms: 500,
            signal_gap_ms: 100,
            base_window: None,
            prep_window: None,
        }
    }
}

impl TrialConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trials_per_cue < 1 {
            return Err(ConfigError::NoTrials);
        }
        check_range(
            "Trials per cue",
            self.trials_per_cue as u64,
            1,
            MAX_TRIALS_PER_CUE as u64,
        )?;
        validate_target(self.target_min, self.target_max)?;
        for (min, max) in self.base_window.into_iter().chain(self.prep_window) {
            validate_target(min, max)?;
        }
        if self.max_trial_ms == 0 {
            return Err(ConfigError::ZeroTrialDuration);
        }
        check_range("Maximum trial duration", self.max_trial_ms, 1, MAX_TRIAL_MS)?;
        check_range("Hold time", self.hold_ms, 0, MAX_HOLD_MS)?;
        check_range("Minimum pause", self.pause_min_ms, 0, MAX_PAUSE_MS)?;
        check_range("Random pause", self.pause_random_ms, 0, MAX_PAUSE_MS)?;
        check_range("Cue ack timeout", self.cue_ack_timeout_ms, 0, MAX_WATCHDOG_MS)?;
        if self.hold_ms > self.max_trial_ms {
            return Err(ConfigError::HoldExceedsDeadline {
                hold_ms: self.hold_ms,
                max_trial_ms: self.max_trial_ms,
            });
        }
        if self.signal_gap_ms == 0 {
            return Err(ConfigError::ZeroSignalGap);
        }
        check_range("Signal gap threshold", self.signal_gap_ms, 1, MAX_WATCHDOG_MS)?;
        if self.channel.trim().is_empty() {
            return Err(ConfigError::NoChannel);
        }
        Ok(())
    }

    pub fn total_trials(&self) -> usize {
        self.trials_per_cue * 3
    }

    /// Window the subject must enter before the pause of `task` counts down.
    pub fn rearm_window(&self, task: TaskKind) -> Option<(f64, f64)> {
        match task {
            TaskKind::Rest => self.base_window,
            TaskKind::Active => self.prep_window,
        }
    }
}

fn check_range(name: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        return Ok(());
    }
    Err(ConfigError::OutOfRange {
        name,
        value,
        min,
        max,
    })
}

pub fn validate_target(min: f64, max: f64) -> Result<(), ConfigError> {
    if !min.is_finite() || !max.is_finite() || min >= max {
        return Err(ConfigError::InvalidTarget { min, max });
    }
    Ok(())
}

/// Tone parameters handed to cue dispatchers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CueConfig {
    pub tone_duration_ms: u64,
    pub tone_frequency_hz: u32,
    pub auditory_volume: u8,
    pub startle_volume: u8,
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            tone_duration_ms: 50,
            tone_frequency_hz: 500,
            auditory_volume: 1,
            startle_volume: 100,
        }
    }
}

impl CueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("Auditory volume", self.auditory_volume),
            ("Startle volume", self.startle_volume),
        ] {
            if !(1..=100).contains(&value) {
                return Err(ConfigError::InvalidVolume { name, value });
            }
        }
        check_range("Tone duration", self.tone_duration_ms, 10, 500)?;
        check_range("Tone frequency", self.tone_frequency_hz as u64, 1, 1000)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub trial: TrialConfig,
    pub cue: CueConfig,
    /// Host polling period; the source is sampled once per tick
    pub tick_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            trial: TrialConfig::default(),
            cue: CueConfig::default(),
            tick_interval_ms: 10,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.trial.validate()?;
        self.cue.validate()?;
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        check_range("Tick interval", self.tick_interval_ms, 1, MAX_TICK_INTERVAL_MS)?;
        Ok(())
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Rest,
    Active,
}

impl TaskKind {
    pub fn title(&self) -> &'static str {
        match self {
            TaskKind::Rest => "Rest",
            TaskKind::Active => "Active",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectMetadata {
    pub subject_id: String,
    pub joint: String,
    pub max_rom: f64,
    pub stim: bool,
    #[serde(default)]
    pub task: TaskKind,
}

impl SubjectMetadata {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subject_id.trim().is_empty() {
            return Err(ConfigError::NoSubjectId);
        }
        if !self.max_rom.is_finite() {
            return Err(ConfigError::InvalidMaxRom(self.max_rom));
        }
        Ok(())
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SessionConfig, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    let config: SessionConfig = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(config: &SessionConfig, path: P) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json).map_err(|e| ConfigError::Write(path.to_path_buf(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SessionConfig::default().validate().is_ok());
        assert_eq!(TrialConfig::default().total_trials(), 30);
    }

    #[test]
    fn rejects_empty_or_inverted_target() {
        let mut c = TrialConfig::default();
        c.target_min = 20.0;
        c.target_max = 20.0;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidTarget { .. })
        ));
        c.target_max = f64::NAN;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_zero_trials_per_cue() {
        let c = TrialConfig {
            trials_per_cue: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::NoTrials)));
    }

    #[test]
    fn rejects_unreachable_hold() {
        let c = TrialConfig {
            hold_ms: 4000,
            max_trial_ms: 3000,
            ..Default::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::HoldExceedsDeadline { .. })
        ));
    }

    #[test]
    fn zero_hold_and_pauses_are_allowed() {
        let c = TrialConfig {
            hold_ms: 0,
            pause_min_ms: 0,
            pause_random_ms: 0,
            ..Default::default()
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejects_durations_past_their_limits() {
        let cases: [(&str, fn(&mut SessionConfig)); 9] = [
            ("Hold time", |c| c.trial.hold_ms = 5001),
            ("Minimum pause", |c| c.trial.pause_min_ms = u64::MAX / 1000),
            ("Random pause", |c| c.trial.pause_random_ms = 5001),
            ("Trials per cue", |c| c.trial.trials_per_cue = 41),
            ("Maximum trial duration", |c| c.trial.max_trial_ms = u64::MAX),
            ("Cue ack timeout", |c| c.trial.cue_ack_timeout_ms = 10_001),
            ("Signal gap threshold", |c| c.trial.signal_gap_ms = u64::MAX),
            ("Tone duration", |c| c.cue.tone_duration_ms = 9),
            ("Tone frequency", |c| c.cue.tone_frequency_hz = 1001),
        ];
        for (expected, edit) in cases {
            let mut c = SessionConfig::default();
            edit(&mut c);
            match c.validate() {
                Err(ConfigError::OutOfRange { name, .. }) => assert_eq!(name, expected),
                other => panic!("{expected}: {other:?}"),
            }
        }

        let c = SessionConfig {
            tick_interval_ms: 1001,
            ..Default::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::OutOfRange { name: "Tick interval", .. })
        ));
    }

    #[test]
    fn limits_themselves_are_accepted() {
        let mut c = SessionConfig::default();
        c.trial.hold_ms = MAX_HOLD_MS;
        c.trial.pause_min_ms = MAX_PAUSE_MS;
        c.trial.pause_random_ms = MAX_PAUSE_MS;
        c.trial.trials_per_cue = MAX_TRIALS_PER_CUE;
        c.trial.max_trial_ms = MAX_TRIAL_MS;
        c.cue.tone_duration_ms = 500;
        c.cue.tone_frequency_hz = 1;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rearm_window_follows_task() {
        let c = TrialConfig {
            base_window: Some((-2.0, 2.0)),
            prep_window: Some((20.0, 30.0)),
            ..Default::default()
        };
        assert_eq!(c.rearm_window(TaskKind::Rest), Some((-2.0, 2.0)));
        assert_eq!(c.rearm_window(TaskKind::Active), Some((20.0, 30.0)));
        assert_eq!(TrialConfig::default().rearm_window(TaskKind::Active), None);

        let bad = TrialConfig {
            prep_window: Some((5.0, 1.0)),
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_volume() {
        let c = CueConfig {
            startle_volume: 0,
            ..Default::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidVolume { name: "Startle volume", value: 0 })
        ));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let c: SessionConfig =
            serde_json::from_str(r#"{"trial": {"hold_ms": 2000, "trials_per_cue": 2}}"#).unwrap();
        assert_eq!(c.trial.hold_ms, 2000);
        assert_eq!(c.trial.pause_min_ms, 2000);
        assert_eq!(c.tick_interval_ms, 10);
    }

    #[test]
    fn subject_requires_id() {
        let s = SubjectMetadata {
            subject_id: "  ".into(),
            joint: "ankle".into(),
            max_rom: 30.0,
            stim: false,
            task: TaskKind::Rest,
        };
        assert!(matches!(s.validate(), Err(ConfigError::NoSubjectId)));
    }
}
