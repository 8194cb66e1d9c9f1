use startreact_core::{CueType, TrialOutcome, TrialResult};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct CueSummary {
    pub cue: CueType,
    pub trials: usize,
    pub success: usize,
    pub fail: usize,
    pub not_run: usize,
    pub mean_rt_ms: Option<f64>,
    pub min_rt_ms: Option<f64>,
    pub max_rt_ms: Option<f64>,
}

impl CueSummary {
    /// Share of run trials that succeeded, in percent
    pub fn success_rate(&self) -> f64 {
        let run = self.success + self.fail;
        if run == 0 {
            0.0
        } else {
            self.success as f64 / run as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub per_cue: Vec<CueSummary>,
}

pub fn summarize(results: &[TrialResult]) -> Summary {
    let per_cue = CueType::ALL
        .iter()
        .map(|&cue| {
            let of_cue: Vec<&TrialResult> = results.iter().filter(|r| r.cue_type == cue).collect();
            let rts: Vec<f64> = of_cue
                .iter()
                .filter(|r| r.outcome == TrialOutcome::Success)
                .filter_map(|r| r.reaction_time_ns)
                .map(|ns| ns as f64 / 1_000_000.0)
                .collect();
            let count = |o: TrialOutcome| of_cue.iter().filter(|r| r.outcome == o).count();
            let (mean, min, max) = if rts.is_empty() {
                (None, None, None)
            } else {
                (
                    Some(rts.iter().sum::<f64>() / rts.len() as f64),
                    Some(rts.iter().cloned().fold(f64::INFINITY, f64::min)),
                    Some(rts.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
                )
            };
            CueSummary {
                cue,
                trials: of_cue.len(),
                success: count(TrialOutcome::Success),
                fail: count(TrialOutcome::Fail),
                not_run: count(TrialOutcome::Skipped) + count(TrialOutcome::Aborted),
                mean_rt_ms: mean,
                min_rt_ms: min,
                max_rt_ms: max,
            }
        })
        .collect();
    Summary { per_cue }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.per_cue {
            write!(
                f,
                "{:>9}: {}/{} success ({:.1}%), {} not run",
                c.cue.to_string(),
                c.success,
                c.trials,
                c.success_rate(),
                c.not_run
            )?;
            if let (Some(mean), Some(min), Some(max)) = (c.mean_rt_ms, c.min_rt_ms, c.max_rt_ms) {
                write!(f, ", RT mean {mean:.1} ms, min {min:.1} ms, max {max:.1} ms")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(i: usize, cue: CueType, outcome: TrialOutcome, rt_ms: Option<u64>) -> TrialResult {
        TrialResult {
            trial_index: i,
            cue_type: cue,
            outcome,
            pause_ms: 2000,
            cue_onset_ns: Some(0),
            reaction_time_ns: rt_ms.map(|ms| ms * 1_000_000),
            exit_ns: Some(0),
        }
    }

    #[test]
    fn startle_summary_only_counts_successful_reaction_times() {
        let results = vec![
            result(0, CueType::Startling, TrialOutcome::Success, Some(120)),
            result(1, CueType::Startling, TrialOutcome::Success, Some(80)),
            result(2, CueType::Startling, TrialOutcome::Fail, Some(60)),
            result(3, CueType::Startling, TrialOutcome::Skipped, None),
            result(4, CueType::Visual, TrialOutcome::Fail, None),
        ];
        let s = summarize(&results);
        let startle = s.per_cue.iter().find(|c| c.cue == CueType::Startling).unwrap();
        assert_eq!(startle.trials, 4);
        assert_eq!(startle.success, 2);
        assert_eq!(startle.fail, 1);
        assert_eq!(startle.not_run, 1);
        assert_eq!(startle.mean_rt_ms, Some(100.0));
        assert_eq!(startle.min_rt_ms, Some(80.0));
        assert!((startle.success_rate() - 66.666).abs() < 0.01);

        let visual = s.per_cue.iter().find(|c| c.cue == CueType::Visual).unwrap();
        assert_eq!(visual.mean_rt_ms, None);
        assert_eq!(visual.success_rate(), 0.0);
    }
}
