use crate::cue::CueNotice;
use anyhow::{Context, Result, anyhow};
use crossbeam_channel::Receiver;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use startreact_core::CueType;
use startreact_experiment::{Sample, SignalSource, TrialConfig};
use startreact_timing::Timer;
use std::path::Path;
use tracing::debug;

const NS_PER_MS: u64 = 1_000_000;

#[derive(Debug, Clone, Copy)]
struct Reach {
    start_ns: u64,
    arrive_ns: u64,
    leave_ns: u64,
    rest_ns: u64,
}

/// Joint angle of a subject who reaches for the target after each cue.
///
/// Reaction times are shortest for startling cues. With probability
/// `miss_rate` the subject ignores a cue and the trial times out.
pub struct SimulatedSubject<T> {
    timer: T,
    cues: Receiver<CueNotice>,
    rng: StdRng,
    rest: f64,
    target: f64,
    noise: f64,
    hold_ms: u64,
    miss_rate: f64,
    reach: Option<Reach>,
}

impl<T: Timer<Timestamp = u64>> SimulatedSubject<T> {
    pub fn new(
        timer: T,
        cues: Receiver<CueNotice>,
        config: &TrialConfig,
        seed: u64,
        miss_rate: f64,
    ) -> Self {
        Self {
            timer,
            cues,
            rng: StdRng::seed_from_u64(seed),
            rest: 0.0,
            target: (config.target_min + config.target_max) / 2.0,
            noise: (config.target_max - config.target_min) / 20.0,
            hold_ms: config.hold_ms,
            miss_rate: miss_rate.clamp(0.0, 1.0),
            reach: None,
        }
    }

    fn plan(&mut self, cue: CueType, onset_ns: u64) {
        if self.rng.random_bool(self.miss_rate) {
            debug!("Simulated subject misses the {cue} cue");
            return;
        }
        let rt_ms = match cue {
            CueType::Startling => self.rng.random_range(70..=110),
            CueType::Auditory => self.rng.random_range(130..=180),
            CueType::Visual => self.rng.random_range(180..=260),
        };
        let move_ms = self.rng.random_range(150..=300);
        let dwell_ms = self.hold_ms + self.rng.random_range(100..=800);

        let start_ns = onset_ns + rt_ms * NS_PER_MS;
        let arrive_ns = start_ns + move_ms * NS_PER_MS;
        let leave_ns = arrive_ns + dwell_ms * NS_PER_MS;
        self.reach = Some(Reach {
            start_ns,
            arrive_ns,
            leave_ns,
            rest_ns: leave_ns + move_ms * NS_PER_MS,
        });
    }

    fn angle(&mut self, now: u64) -> f64 {
        let Some(r) = self.reach else {
            return self.rest;
        };
        let lerp = |from: f64, to: f64, t0: u64, t1: u64| {
            let f = (now - t0) as f64 / (t1 - t0) as f64;
            from + (to - from) * f
        };
        if now < r.start_ns {
            self.rest
        } else if now < r.arrive_ns {
            lerp(self.rest, self.target, r.start_ns, r.arrive_ns)
        } else if now < r.leave_ns {
            self.target + self.rng.random_range(-self.noise..=self.noise)
        } else if now < r.rest_ns {
            lerp(self.target, self.rest, r.leave_ns, r.rest_ns)
        } else {
            self.reach = None;
            self.rest
        }
    }
}

impl<T: Timer<Timestamp = u64>> SignalSource for SimulatedSubject<T> {
    fn latest(&mut self) -> Option<Sample> {
        while let Ok((cue, onset)) = self.cues.try_recv() {
            self.plan(cue, onset);
        }
        let now = self.timer.now();
        Some(Sample {
            value: self.angle(now),
            timestamp_ns: now,
        })
    }
}

/// Plays back one column of a recorded CSV, one row per tick.
///
/// Empty cells are treated as dropped samples. Once the recording runs
/// out the source stays silent.
pub struct ReplaySource<T> {
    timer: T,
    values: std::vec::IntoIter<Option<f64>>,
}

impl<T: Timer<Timestamp = u64>> ReplaySource<T> {
    pub fn from_csv(path: &Path, channel: &str, timer: T) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open recording {}", path.display()))?;
        let column = rdr
            .headers()?
            .iter()
            .position(|h| h.trim() == channel)
            .ok_or_else(|| anyhow!("Channel {channel:?} not found in {}", path.display()))?;

        let mut values = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            let value = match record.get(column).map(str::trim) {
                None | Some("") => None,
                Some(cell) => Some(
                    cell.parse::<f64>()
                        .with_context(|| format!("Bad {channel} value on row {}", row + 1))?,
                ),
            };
            values.push(value);
        }
        debug!("Loaded {} samples of {channel} for replay", values.len());

        Ok(Self {
            timer,
            values: values.into_iter(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

impl<T: Timer<Timestamp = u64>> SignalSource for ReplaySource<T> {
    fn latest(&mut self) -> Option<Sample> {
        let value = self.values.next().flatten()?;
        Some(Sample {
            value,
            timestamp_ns: self.timer.now(),
        })
    }
}
