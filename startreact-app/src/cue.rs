use crossbeam_channel::Sender;
use startreact_core::CueType;
use startreact_experiment::{CueConfig, CueDispatcher};
use startreact_timing::Timer;
use tracing::{debug, info};

/// Cue onset as seen by whoever is watching the cues.
pub type CueNotice = (CueType, u64);

/// Presents cues on the console. Tone cues are acknowledged once the tone
/// duration has elapsed, visual cues immediately.
pub struct ConsoleCue<T> {
    timer: T,
    config: CueConfig,
    ack_at: Option<u64>,
    watcher: Option<Sender<CueNotice>>,
}

impl<T: Timer<Timestamp = u64>> ConsoleCue<T> {
    pub fn new(timer: T, config: CueConfig) -> Self {
        Self {
            timer,
            config,
            ack_at: None,
            watcher: None,
        }
    }

    /// Forwards every cue onset to `tx`, e.g. to drive a simulated subject.
    pub fn with_watcher(mut self, tx: Sender<CueNotice>) -> Self {
        self.watcher = Some(tx);
        self
    }

    fn volume(&self, cue: CueType) -> u8 {
        match cue {
            CueType::Startling => self.config.startle_volume,
            _ => self.config.auditory_volume,
        }
    }
}

impl<T: Timer<Timestamp = u64>> CueDispatcher for ConsoleCue<T> {
    fn trigger(&mut self, cue: CueType) {
        let now = self.timer.now();
        if cue.has_tone() {
            info!(
                "begin_{}: {} Hz tone for {} ms at {}% volume",
                cue.task_name(),
                self.config.tone_frequency_hz,
                self.config.tone_duration_ms,
                self.volume(cue)
            );
            let tone_ns = self.config.tone_duration_ms.saturating_mul(1_000_000);
            self.ack_at = Some(now.saturating_add(tone_ns));
        } else {
            info!("begin_{}", cue.task_name());
            self.ack_at = Some(now);
        }

        if let Some(tx) = &self.watcher {
            if tx.send((cue, now)).is_err() {
                debug!("Cue watcher is gone");
                self.watcher = None;
            }
        }
    }

    fn poll_ack(&mut self) -> bool {
        match self.ack_at {
            Some(at) if self.timer.now() >= at => {
                self.ack_at = None;
                true
            }
            _ => false,
        }
    }
}
