#![allow(dead_code)]

use rand::SeedableRng;
use rand::rngs::StdRng;
use startreact_core::{CueType, SequencerState, TrialOutcome};
use startreact_experiment::{
    CueDispatcher, EventKind, EventRecord, MemorySink, Sample, SessionConfig, SignalSource,
    SubjectMetadata, TaskKind, TrialConfig, TrialSequencer,
};
use startreact_timing::{ManualClock, Timer};
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

pub const TICK_MS: u64 = 10;

pub fn unique_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "startreact_{}_{}",
        name,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    path
}

/// Yields whatever value the test set for the coming tick, once.
pub struct SharedSource {
    value: Rc<Cell<Option<f64>>>,
    clock: ManualClock,
}

impl SignalSource for SharedSource {
    fn latest(&mut self) -> Option<Sample> {
        self.value.take().map(|value| Sample {
            value,
            timestamp_ns: self.clock.now(),
        })
    }
}

/// Subject at rest: a fresh sample of 0.0 on every tick.
pub struct FlatSource {
    pub clock: ManualClock,
}

impl SignalSource for FlatSource {
    fn latest(&mut self) -> Option<Sample> {
        Some(Sample {
            value: 0.0,
            timestamp_ns: self.clock.now(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AckMode {
    Immediate,
    Never,
}

pub struct TestDispatcher {
    pub triggered: Vec<CueType>,
    mode: AckMode,
    pending: bool,
}

impl TestDispatcher {
    pub fn new(mode: AckMode) -> Self {
        Self {
            triggered: Vec::new(),
            mode,
            pending: false,
        }
    }
}

impl CueDispatcher for TestDispatcher {
    fn trigger(&mut self, cue: CueType) {
        self.triggered.push(cue);
        self.pending = true;
    }

    fn poll_ack(&mut self) -> bool {
        match self.mode {
            AckMode::Immediate => std::mem::take(&mut self.pending),
            AckMode::Never => false,
        }
    }
}

pub type TestSequencer = TrialSequencer<ManualClock, SharedSource, TestDispatcher, MemorySink>;

pub struct Harness {
    pub seq: TestSequencer,
    pub clock: ManualClock,
    pub sink: MemorySink,
    signal: Rc<Cell<Option<f64>>>,
}

pub fn subject() -> SubjectMetadata {
    SubjectMetadata {
        subject_id: "S001".into(),
        joint: "ankle".into(),
        max_rom: 32.5,
        stim: false,
        task: TaskKind::Rest,
    }
}

pub fn config(trial: TrialConfig) -> SessionConfig {
    SessionConfig {
        trial,
        tick_interval_ms: TICK_MS,
        ..Default::default()
    }
}

impl Harness {
    pub fn new(config: SessionConfig, seed: u64, ack: AckMode) -> Self {
        Self::with_subject(config, subject(), seed, ack)
    }

    pub fn with_subject(
        config: SessionConfig,
        who: SubjectMetadata,
        seed: u64,
        ack: AckMode,
    ) -> Self {
        let clock = ManualClock::new();
        let signal = Rc::new(Cell::new(None));
        let sink = MemorySink::new();
        let source = SharedSource {
            value: signal.clone(),
            clock: clock.clone(),
        };
        let dispatcher = TestDispatcher::new(ack);
        let mut seq = TrialSequencer::new(
            config,
            who,
            clock.clone(),
            &mut StdRng::seed_from_u64(seed),
            source,
            dispatcher,
            sink.clone(),
        )
        .expect("valid config");
        seq.start().expect("memory sink never fails");
        Self {
            seq,
            clock,
            sink,
            signal,
        }
    }

    /// Ticks once with `value` as the fresh sample (or none), then advances the clock.
    pub fn step(&mut self, value: Option<f64>) -> SequencerState {
        self.signal.set(value);
        let state = self.seq.tick().expect("memory sink never fails");
        self.clock.advance_ms(TICK_MS);
        state
    }

    /// Milliseconds since the current trial entered Monitoring.
    pub fn monitoring_ms(&self) -> Option<u64> {
        if self.seq.state() != SequencerState::Monitoring {
            return None;
        }
        let start = self.seq.current_trial()?.timestamps.monitoring_start?;
        Some((self.clock.now() - start) / 1_000_000)
    }

    /// Runs until the session completes or `max_ticks` ticks have passed.
    /// `policy` picks the sample for each tick.
    pub fn run<F>(&mut self, max_ticks: usize, mut policy: F) -> usize
    where
        F: FnMut(&Harness) -> Option<f64>,
    {
        for n in 0..max_ticks {
            if self.seq.state().is_terminal() {
                return n;
            }
            let v = policy(self);
            self.step(v);
        }
        max_ticks
    }

    pub fn outcomes(&self) -> Vec<TrialOutcome> {
        self.seq.trials().iter().map(|t| t.outcome).collect()
    }

    /// Monitoring time at which trial `i` ended, in milliseconds.
    pub fn trial_duration_ms(&self, i: usize) -> u64 {
        let ts = &self.seq.trials()[i].timestamps;
        (ts.exit.unwrap() - ts.monitoring_start.unwrap()) / 1_000_000
    }

    pub fn records_of(&self, pred: impl Fn(&EventKind) -> bool) -> Vec<EventRecord> {
        self.sink
            .records()
            .into_iter()
            .filter(|r| pred(&r.kind))
            .collect()
    }
}

/// In the window while monitoring, outside it otherwise.
pub fn reach_on_cue(target: f64) -> impl FnMut(&Harness) -> Option<f64> {
    move |h| match h.monitoring_ms() {
        Some(_) => Some(target),
        None => Some(0.0),
    }
}
