use crate::config::{SessionConfig, SubjectMetadata, TrialConfig};
use crate::error::{SessionError, SinkError};
use crate::event::{EventKind, EventRecord, SessionMetadata, Warning};
use crate::session::{SessionHandle, SessionStatus};
use crate::sink::EventSink;
use crate::source::{CueDispatcher, Sample, SignalSource};
use crate::trial::{Trial, build_trial_list};
use rand::Rng;
use startreact_core::{SequencerState, TrialOutcome, TrialResult};
use startreact_timing::Timer;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const NS_PER_MS: u64 = 1_000_000;

fn ms_to_ns(ms: u64) -> u64 {
    ms.saturating_mul(NS_PER_MS)
}

/// Drives one StartReact session, one tick at a time.
///
/// All timing is measured against `timer.now()`; the sequencer never sleeps.
/// Each call to [`tick`](Self::tick) samples the signal once, logs it, and
/// applies at most one trial's worth of transitions.
pub struct TrialSequencer<T, S, C, K>
where
    T: Timer<Timestamp = u64>,
    S: SignalSource,
    C: CueDispatcher,
    K: EventSink,
{
    pub timer: T,
    source: S,
    dispatcher: C,
    sink: K,
    config: TrialConfig,
    metadata: SessionMetadata,
    trials: Vec<Trial>,
    current: usize,
    state: SequencerState,
    state_entered_ns: u64,
    started_ns: u64,
    target: (f64, f64),
    streak_start_ns: Option<u64>,
    last_sample_ns: Option<u64>,
    gap_reported: bool,
    /// When the current pause began counting down
    armed_ns: Option<u64>,
    handle: SessionHandle,
    fatal: Option<String>,
}

impl<T, S, C, K> TrialSequencer<T, S, C, K>
where
    T: Timer<Timestamp = u64>,
    S: SignalSource,
    C: CueDispatcher,
    K: EventSink,
{
    pub fn new<R: Rng>(
        config: SessionConfig,
        subject: SubjectMetadata,
        timer: T,
        rng: &mut R,
        source: S,
        dispatcher: C,
        sink: K,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        subject.validate()?;

        let trials = build_trial_list(&config.trial, rng);
        let metadata = SessionMetadata {
            subject,
            trial_order: trials.iter().map(|t| t.cue).collect(),
            config: config.clone(),
        };

        let sequencer = Self {
            timer,
            source,
            dispatcher,
            sink,
            target: (config.trial.target_min, config.trial.target_max),
            config: config.trial,
            metadata,
            trials,
            current: 0,
            state: SequencerState::Idle,
            state_entered_ns: 0,
            started_ns: 0,
            streak_start_ns: None,
            last_sample_ns: None,
            gap_reported: false,
            armed_ns: None,
            handle: SessionHandle::default(),
            fatal: None,
        };
        sequencer.publish();
        Ok(sequencer)
    }

    /// Writes the session metadata and schedules the first trial.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SequencerState::Idle {
            return Ok(());
        }
        let now = self.timer.now();
        self.started_ns = now;
        self.state_entered_ns = now;

        let res = self.start_inner(now);
        if let Err(e) = &res {
            self.fail_session(now, e);
        }
        self.publish();
        res.map_err(Into::into)
    }

    fn start_inner(&mut self, now: u64) -> Result<(), SinkError> {
        self.sink.write_metadata(&self.metadata)?;
        self.emit(
            now,
            EventKind::SessionStarted {
                trials: self.trials.len(),
            },
            None,
        )?;
        info!(
            "Session started for subject {} ({} trials, channel {})",
            self.metadata.subject.subject_id,
            self.trials.len(),
            self.config.channel
        );
        self.begin_pause(now)
    }

    /// Advances the session by one tick and returns the resulting state.
    ///
    /// A sink failure ends the session and is returned as an error; every
    /// later call is a no-op returning `SessionComplete`.
    pub fn tick(&mut self) -> Result<SequencerState, SessionError> {
        if matches!(
            self.state,
            SequencerState::Idle | SequencerState::SessionComplete
        ) {
            return Ok(self.state);
        }
        let now = self.timer.now();
        let res = self.step(now);
        if let Err(e) = &res {
            self.fail_session(now, e);
        }
        self.publish();
        res.map(|_| self.state).map_err(Into::into)
    }

    /// Ticks every `interval` until the session completes, sleeping on the
    /// sequencer's timer in between.
    pub fn run_until_complete(&mut self, interval: Duration) -> Result<(), SessionError> {
        self.start()?;
        while !self.state.is_terminal() {
            let tick_start = self.timer.now();
            self.tick()?;
            if self.state.is_terminal() {
                break;
            }
            let spent = self.timer.elapsed(tick_start);
            if spent < interval {
                self.timer.sleep(interval - spent);
            }
            let period = self.timer.elapsed(tick_start);
            self.timer.record_tick(period);
        }
        Ok(())
    }

    fn step(&mut self, now: u64) -> Result<(), SinkError> {
        if let Some((min, max)) = self.handle.take_target_request() {
            self.apply_target(now, min, max)?;
        }
        if self.handle.abort_requested() {
            return self.abort(now);
        }

        let sample = self.source.latest();
        self.track_signal(now, sample)?;

        match self.state {
            SequencerState::InterTrialPause => self.pause(now, sample)?,
            SequencerState::AwaitingCue => self.await_ack(now)?,
            SequencerState::Monitoring => self.monitor(now, sample)?,
            _ => {}
        }
        Ok(())
    }

    fn track_signal(&mut self, now: u64, sample: Option<Sample>) -> Result<(), SinkError> {
        if let Some(s) = sample {
            self.last_sample_ns = Some(now);
            self.gap_reported = false;
            return self.emit(s.timestamp_ns, EventKind::Sample, Some(s.value));
        }

        let silent_ns = now.saturating_sub(self.last_sample_ns.unwrap_or(self.started_ns));
        if self.gap_reported || silent_ns <= ms_to_ns(self.config.signal_gap_ms) {
            return Ok(());
        }
        self.gap_reported = true;
        self.streak_start_ns = None;
        let warning = Warning::SignalGap {
            silent_ms: silent_ns / NS_PER_MS,
        };
        warn!("{warning}");
        self.emit(now, EventKind::Warning { warning }, None)
    }

    fn begin_pause(&mut self, now: u64) -> Result<(), SinkError> {
        self.trials[self.current].timestamps.pause_start = Some(now);
        self.armed_ns = match self.rearm_window() {
            Some(_) => None,
            None => Some(now),
        };
        self.transition(now, SequencerState::InterTrialPause)
    }

    fn rearm_window(&self) -> Option<(f64, f64)> {
        self.config.rearm_window(self.metadata.subject.task)
    }

    fn pause(&mut self, now: u64, sample: Option<Sample>) -> Result<(), SinkError> {
        let armed = match (self.armed_ns, self.rearm_window(), sample) {
            (Some(at), _, _) => at,
            (None, Some((min, max)), Some(s)) if min <= s.value && s.value <= max => {
                self.armed_ns = Some(now);
                debug!("Subject in position, pause counting down");
                self.emit(now, EventKind::SubjectReady, Some(s.value))?;
                now
            }
            _ => return Ok(()),
        };
        let pause_ns = ms_to_ns(self.trials[self.current].pause_ms);
        if now.saturating_sub(armed) >= pause_ns {
            self.trigger_cue(now)?;
        }
        Ok(())
    }

    fn trigger_cue(&mut self, now: u64) -> Result<(), SinkError> {
        let trial = &mut self.trials[self.current];
        trial.timestamps.cue_onset = Some(now);
        let cue = trial.cue;

        self.transition(now, SequencerState::AwaitingCue)?;
        self.dispatcher.trigger(cue);
        info!(
            "Trial {}/{}: {} cue",
            self.current + 1,
            self.trials.len(),
            cue
        );
        self.emit(now, EventKind::CueTriggered, None)
    }

    fn await_ack(&mut self, now: u64) -> Result<(), SinkError> {
        if self.dispatcher.poll_ack() {
            return self.begin_monitoring(now);
        }
        let waited_ns = now.saturating_sub(self.state_entered_ns);
        if waited_ns < ms_to_ns(self.config.cue_ack_timeout_ms) {
            return Ok(());
        }
        let warning = Warning::CueAckTimeout {
            waited_ms: waited_ns / NS_PER_MS,
        };
        warn!("{warning}");
        self.emit(now, EventKind::Warning { warning }, None)?;
        self.begin_monitoring(now)
    }

    fn begin_monitoring(&mut self, now: u64) -> Result<(), SinkError> {
        self.streak_start_ns = None;
        self.trials[self.current].timestamps.monitoring_start = Some(now);
        self.transition(now, SequencerState::Monitoring)
    }

    fn monitor(&mut self, now: u64, sample: Option<Sample>) -> Result<(), SinkError> {
        if let Some(s) = sample {
            if self.in_target(s.value) {
                let streak_start = *self.streak_start_ns.get_or_insert(now);
                let ts = &mut self.trials[self.current].timestamps;
                if ts.first_in_target.is_none() {
                    ts.first_in_target = Some(now);
                }
                // Hold wins over the deadline when both are met on this tick
                if now.saturating_sub(streak_start) >= ms_to_ns(self.config.hold_ms) {
                    return self.finish_trial(now, TrialOutcome::Success);
                }
            } else {
                self.streak_start_ns = None;
            }
        }

        let monitoring_start = self.trials[self.current]
            .timestamps
            .monitoring_start
            .unwrap_or(self.state_entered_ns);
        if now.saturating_sub(monitoring_start) >= ms_to_ns(self.config.max_trial_ms) {
            return self.finish_trial(now, TrialOutcome::Fail);
        }
        Ok(())
    }

    fn in_target(&self, value: f64) -> bool {
        self.target.0 <= value && value <= self.target.1
    }

    fn finish_trial(&mut self, now: u64, outcome: TrialOutcome) -> Result<(), SinkError> {
        self.transition(now, SequencerState::Evaluating)?;
        self.trials[self.current].record_outcome(outcome, now);
        let next = match outcome {
            TrialOutcome::Success => SequencerState::Success,
            _ => SequencerState::Fail,
        };
        self.transition(now, next)?;
        self.emit(now, EventKind::TrialEnded { outcome }, None)?;

        let trial = &self.trials[self.current];
        match trial.reaction_time_ns() {
            Some(rt) => info!(
                "Trial {} {:?}, RT = {:.3} ms",
                self.current + 1,
                outcome,
                rt as f64 / NS_PER_MS as f64
            ),
            None => info!("Trial {} {:?}, target never reached", self.current + 1, outcome),
        }

        self.streak_start_ns = None;
        if self.current + 1 < self.trials.len() {
            self.current += 1;
            self.begin_pause(now)
        } else {
            self.complete(now)
        }
    }

    fn apply_target(&mut self, now: u64, min: f64, max: f64) -> Result<(), SinkError> {
        self.target = (min, max);
        self.streak_start_ns = None;
        info!("Target moved to [{min}, {max}]");
        self.emit(now, EventKind::TargetMoved { min, max }, None)
    }

    fn abort(&mut self, now: u64) -> Result<(), SinkError> {
        info!("Abort requested during {}", self.state);
        self.emit(now, EventKind::AbortRequested, None)?;
        for trial in self.trials.iter_mut() {
            trial.record_outcome(TrialOutcome::Skipped, now);
        }
        self.complete(now)
    }

    fn complete(&mut self, now: u64) -> Result<(), SinkError> {
        self.transition(now, SequencerState::SessionComplete)?;
        let kind = EventKind::SessionEnded {
            success: self.count(TrialOutcome::Success),
            fail: self.count(TrialOutcome::Fail),
            skipped: self.count(TrialOutcome::Skipped),
        };
        self.emit(now, kind, None)?;
        self.sink.flush()?;
        info!(
            "Session complete: {} success, {} fail, {} skipped",
            self.count(TrialOutcome::Success),
            self.count(TrialOutcome::Fail),
            self.count(TrialOutcome::Skipped)
        );
        Ok(())
    }

    fn fail_session(&mut self, now: u64, err: &SinkError) {
        let mut reason = err.to_string();
        let mut source = std::error::Error::source(err);
        while let Some(s) = source {
            reason.push_str(": ");
            reason.push_str(&s.to_string());
            source = s.source();
        }
        error!("Event log lost, aborting session: {reason}");

        for trial in self.trials.iter_mut() {
            trial.record_outcome(TrialOutcome::Aborted, now);
        }
        self.state = SequencerState::SessionComplete;
        self.state_entered_ns = now;
        self.fatal = Some(reason);
    }

    fn transition(&mut self, now: u64, to: SequencerState) -> Result<(), SinkError> {
        let from = self.state;
        self.state = to;
        self.state_entered_ns = now;
        debug!("{from} -> {to}");
        self.emit(now, EventKind::Transition { from }, None)
    }

    fn emit(&mut self, ts: u64, kind: EventKind, value: Option<f64>) -> Result<(), SinkError> {
        let trial = self.active_trial();
        let record = EventRecord {
            timestamp_ns: ts,
            trial_index: trial.map(|t| t.index),
            cue_type: trial.map(|t| t.cue),
            channel_value: value,
            state: self.state,
            kind,
        };
        self.sink.append(&record)
    }

    fn active_trial(&self) -> Option<&Trial> {
        match self.state {
            SequencerState::Idle | SequencerState::SessionComplete => None,
            _ => self.trials.get(self.current),
        }
    }

    fn count(&self, outcome: TrialOutcome) -> usize {
        self.trials.iter().filter(|t| t.outcome == outcome).count()
    }

    fn publish(&self) {
        self.handle.publish(SessionStatus {
            state: self.state,
            trial_index: self.active_trial().map(|t| t.index),
            total_trials: self.trials.len(),
            outcomes: self.trials.iter().map(|t| t.outcome).collect(),
            target: self.target,
            fatal: self.fatal.clone(),
        });
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn current_trial(&self) -> Option<&Trial> {
        self.active_trial()
    }

    pub fn results(&self) -> Vec<TrialResult> {
        self.trials.iter().map(Trial::to_result).collect()
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    pub fn target(&self) -> (f64, f64) {
        self.target
    }

    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    pub fn dispatcher(&self) -> &C {
        &self.dispatcher
    }
}

/// Builds a sequencer from validated parameters and starts it.
pub fn start_session<T, S, C, K, R>(
    config: SessionConfig,
    subject: SubjectMetadata,
    timer: T,
    rng: &mut R,
    source: S,
    dispatcher: C,
    sink: K,
) -> Result<(TrialSequencer<T, S, C, K>, SessionHandle), SessionError>
where
    T: Timer<Timestamp = u64>,
    S: SignalSource,
    C: CueDispatcher,
    K: EventSink,
    R: Rng,
{
    let mut sequencer = TrialSequencer::new(config, subject, timer, rng, source, dispatcher, sink)?;
    let handle = sequencer.handle();
    sequencer.start()?;
    Ok((sequencer, handle))
}
