use startreact_core::CueType;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub timestamp_ns: u64,
}

/// Live reading of the selected channel.
pub trait SignalSource {
    /// Returns the newest sample, or `None` when nothing arrived since the last call.
    fn latest(&mut self) -> Option<Sample>;
}

/// Plays cues. Playback is fire-and-forget; completion is polled.
pub trait CueDispatcher {
    fn trigger(&mut self, cue: CueType);
    /// True once the most recently triggered cue has been presented.
    fn poll_ack(&mut self) -> bool;
}

impl<S: SignalSource + ?Sized> SignalSource for Box<S> {
    fn latest(&mut self) -> Option<Sample> {
        (**self).latest()
    }
}

impl<C: CueDispatcher + ?Sized> CueDispatcher for Box<C> {
    fn trigger(&mut self, cue: CueType) {
        (**self).trigger(cue)
    }
    fn poll_ack(&mut self) -> bool {
        (**self).poll_ack()
    }
}
