use crate::error::SinkError;
use crate::event::{EventKind, EventRecord, SessionMetadata};
use crossbeam_channel::{Sender, unbounded};
use std::io::{BufWriter, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Append-only store for one session's log.
pub trait EventSink {
    /// Called exactly once, before the first record.
    fn write_metadata(&mut self, meta: &SessionMetadata) -> Result<(), SinkError>;
    fn append(&mut self, record: &EventRecord) -> Result<(), SinkError>;
    /// Called once when the session ends.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn write_metadata(&mut self, meta: &SessionMetadata) -> Result<(), SinkError> {
        (**self).write_metadata(meta)
    }
    fn append(&mut self, record: &EventRecord) -> Result<(), SinkError> {
        (**self).append(record)
    }
    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

#[derive(Debug, Default)]
struct MemoryLog {
    metadata: Option<SessionMetadata>,
    records: Vec<EventRecord>,
    flushed: bool,
}

/// In-memory sink. Clones share the same log, so one copy can be handed
/// to the sequencer while another is read for display.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clone()
    }

    pub fn metadata(&self) -> Option<SessionMetadata> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .metadata
            .clone()
    }

    pub fn is_flushed(&self) -> bool {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flushed
    }
}

impl EventSink for MemorySink {
    fn write_metadata(&mut self, meta: &SessionMetadata) -> Result<(), SinkError> {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        if log.metadata.is_some() {
            return Err(SinkError::MetadataRewritten);
        }
        log.metadata = Some(meta.clone());
        Ok(())
    }

    fn append(&mut self, record: &EventRecord) -> Result<(), SinkError> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).flushed = true;
        Ok(())
    }
}

/// Writes records as JSON lines to `events` and the metadata as pretty
/// JSON to `metadata`.
///
/// Events are buffered and flushed whenever a trial or the session ends,
/// so a killed process loses at most the trial in progress.
pub struct JsonLinesSink<W: Write, M: Write = W> {
    events: BufWriter<W>,
    metadata: M,
    metadata_written: bool,
}

impl<W: Write, M: Write> JsonLinesSink<W, M> {
    pub fn new(events: W, metadata: M) -> Self {
        Self {
            events: BufWriter::new(events),
            metadata,
            metadata_written: false,
        }
    }

    pub fn into_inner(self) -> Result<(W, M), SinkError> {
        let events = self
            .events
            .into_inner()
            .map_err(|e| SinkError::Io("flushing event log", e.into_error()))?;
        Ok((events, self.metadata))
    }
}

impl<W: Write, M: Write> EventSink for JsonLinesSink<W, M> {
    fn write_metadata(&mut self, meta: &SessionMetadata) -> Result<(), SinkError> {
        if self.metadata_written {
            return Err(SinkError::MetadataRewritten);
        }
        serde_json::to_writer_pretty(&mut self.metadata, meta)?;
        self.metadata
            .flush()
            .map_err(|e| SinkError::Io("writing session metadata", e))?;
        self.metadata_written = true;
        Ok(())
    }

    fn append(&mut self, record: &EventRecord) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.events, record)?;
        self.events
            .write_all(b"\n")
            .map_err(|e| SinkError::Io("appending event record", e))?;
        if matches!(
            record.kind,
            EventKind::TrialEnded { .. } | EventKind::AbortRequested | EventKind::SessionEnded { .. }
        ) {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.events
            .flush()
            .map_err(|e| SinkError::Io("flushing event log", e))
    }
}

enum Message {
    Metadata(Box<SessionMetadata>),
    Record(Box<EventRecord>),
}

/// Moves writes off the tick path: records go over an unbounded channel to
/// a writer thread that owns the inner sink.
///
/// The queue never drops records. A failure in the writer thread is
/// reported by the next `append`, and by `flush`, which drains the queue
/// and joins the thread.
pub struct QueuedSink {
    tx: Option<Sender<Message>>,
    writer: Option<JoinHandle<Result<(), SinkError>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl QueuedSink {
    pub fn spawn<S>(mut inner: S) -> Self
    where
        S: EventSink + Send + 'static,
    {
        let (tx, rx) = unbounded::<Message>();
        let failure = Arc::new(Mutex::new(None));
        let failure_w = failure.clone();

        let writer = std::thread::spawn(move || {
            while let Ok(msg) = rx.recv() {
                let res = match msg {
                    Message::Metadata(meta) => inner.write_metadata(&meta),
                    Message::Record(rec) => inner.append(&rec),
                };
                if let Err(e) = res {
                    tracing::error!("Event writer failed: {e}");
                    *failure_w.lock().unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
                    return Err(e);
                }
            }
            inner.flush()
        });

        Self {
            tx: Some(tx),
            writer: Some(writer),
            failure,
        }
    }

    fn send(&self, msg: Message) -> Result<(), SinkError> {
        if let Some(reason) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(SinkError::WriterGone(reason));
        }
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| SinkError::WriterGone("sink already flushed".into()))?;
        tx.send(msg)
            .map_err(|_| SinkError::WriterGone("writer thread exited".into()))
    }
}

impl EventSink for QueuedSink {
    fn write_metadata(&mut self, meta: &SessionMetadata) -> Result<(), SinkError> {
        self.send(Message::Metadata(Box::new(meta.clone())))
    }

    fn append(&mut self, record: &EventRecord) -> Result<(), SinkError> {
        self.send(Message::Record(Box::new(record.clone())))
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        // Closing the channel lets the writer drain and exit
        self.tx.take();
        match self.writer.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| SinkError::WriterGone("writer thread panicked".into()))?,
            None => Ok(()),
        }
    }
}

impl Drop for QueuedSink {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(e) = self.flush() {
                tracing::warn!("Event log not fully written: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use startreact_core::SequencerState;

    fn record(ts: u64) -> EventRecord {
        EventRecord {
            timestamp_ns: ts,
            trial_index: None,
            cue_type: None,
            channel_value: Some(ts as f64),
            state: SequencerState::InterTrialPause,
            kind: EventKind::Sample,
        }
    }

    #[test]
    fn json_lines_sink_writes_one_line_per_record() {
        let mut sink = JsonLinesSink::new(Vec::new(), Vec::new());
        for ts in 0..3 {
            sink.append(&record(ts)).unwrap();
        }
        sink.flush().unwrap();
        let (events, _) = sink.into_inner().unwrap();
        let text = String::from_utf8(events).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let last: EventRecord = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last, record(2));
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn json_lines_sink_flushes_when_a_trial_ends() {
        let out = SharedBuf::default();
        let mut sink = JsonLinesSink::new(out.clone(), Vec::new());
        sink.append(&record(0)).unwrap();
        sink.append(&record(1)).unwrap();
        assert!(out.0.lock().unwrap().is_empty());

        let mut ended = record(2);
        ended.kind = EventKind::TrialEnded {
            outcome: startreact_core::TrialOutcome::Success,
        };
        sink.append(&ended).unwrap();
        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn queued_sink_preserves_order() {
        let memory = MemorySink::new();
        let mut sink = QueuedSink::spawn(memory.clone());
        for ts in 0..500 {
            sink.append(&record(ts)).unwrap();
        }
        sink.flush().unwrap();
        let recs = memory.records();
        assert_eq!(recs.len(), 500);
        assert!(recs.iter().enumerate().all(|(i, r)| r.timestamp_ns == i as u64));
        assert!(memory.is_flushed());
    }

    struct BrokenSink;

    impl EventSink for BrokenSink {
        fn write_metadata(&mut self, _: &SessionMetadata) -> Result<(), SinkError> {
            Ok(())
        }
        fn append(&mut self, _: &EventRecord) -> Result<(), SinkError> {
            Err(SinkError::Io(
                "appending event record",
                std::io::Error::other("disk full"),
            ))
        }
    }

    #[test]
    fn queued_sink_surfaces_writer_failure() {
        let mut sink = QueuedSink::spawn(BrokenSink);
        let _ = sink.append(&record(0));
        assert!(matches!(sink.flush(), Err(SinkError::Io(..))));
        assert!(matches!(
            sink.append(&record(1)),
            Err(SinkError::WriterGone(_))
        ));
    }
}
