//! Ingestion session: the read loop tying transport, parser, aggregator and storage together.
//!
//! A [`Session`] owns the line source, the sink and the round buffer for its whole
//! life. It shares only the [`SharedAggregator`] with the chart. `run` consumes the
//! session and always ends the same way, whatever stopped it: flush what is still
//! buffered, close the source, report.
//!
//! Per-line failures never stop the loop. A line that is not UTF-8 is skipped with a
//! warning; a malformed data line is dropped and only counted.

use crate::core::{LineRead, LineSource, RecordSink};
use crate::data::{RoundBuffer, SharedAggregator};
use crate::protocol::{LineClassifier, LineKind, SessionState};
use crate::record::parse_record;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, trace, warn};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The source reported end of stream
    EndOfStream,
    /// Shutdown was requested
    Cancelled,
    /// The source failed
    TransportFault(String),
}

/// Counters kept by the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Lines received from the source
    pub lines_read: u64,
    /// Lines skipped because they were not valid UTF-8
    pub decode_failures: u64,
    /// Lines outside a capture, markers excluded
    pub noise_lines: u64,
    /// Data lines turned into records
    pub records_accepted: u64,
    /// Data lines dropped as malformed
    pub dropped_records: u64,
    /// Round boundaries seen
    pub rounds: u64,
    /// Batches written to the sink
    pub flushes: u64,
    /// Rows written to the sink
    pub rows_persisted: u64,
    /// Sink writes that failed
    pub flush_failures: u64,
}

/// Outcome of [`Session::run`].
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Why the loop stopped
    pub reason: ExitReason,
    /// Counters at the end of the session
    pub stats: SessionStats,
    /// Last round number seen
    pub last_round: u32,
    /// Records that could not be persisted
    pub unflushed: usize,
}

enum Next {
    Read(Result<LineRead, crate::error::SinkError>),
    Signal { sender_alive: bool },
}

/// Single ingestion path of the sink.
pub struct Session {
    source: Box<dyn LineSource>,
    sink: Box<dyn RecordSink>,
    aggregator: SharedAggregator,
    classifier: LineClassifier,
    buffer: RoundBuffer,
    stats: SessionStats,
}

impl Session {
    /// Creates a session recording into `aggregator`.
    pub fn new(
        source: Box<dyn LineSource>,
        sink: Box<dyn RecordSink>,
        aggregator: SharedAggregator,
    ) -> Self {
        Self {
            source,
            sink,
            aggregator,
            classifier: LineClassifier::new(),
            buffer: RoundBuffer::new(),
            stats: SessionStats::default(),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Protocol state.
    pub fn state(&self) -> SessionState {
        self.classifier.state()
    }

    /// Current round number, 0 before the first boundary.
    pub fn round(&self) -> u32 {
        self.classifier.round()
    }

    /// Records waiting for the next boundary.
    pub fn pending(&self) -> &RoundBuffer {
        &self.buffer
    }

    /// Reads until the source ends, fails, or `shutdown` becomes `true`.
    ///
    /// Dropping the sender of `shutdown` counts as a shutdown request.
    #[instrument(skip_all, fields(source = %self.source.name()))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SessionReport {
        info!("ingestion started");
        let reason = loop {
            if *shutdown.borrow() {
                break ExitReason::Cancelled;
            }

            let next = tokio::select! {
                biased;
                changed = shutdown.changed() => Next::Signal { sender_alive: changed.is_ok() },
                read = self.source.read_line() => Next::Read(read),
            };

            match next {
                Next::Signal { sender_alive: true } => continue,
                Next::Signal { sender_alive: false } => break ExitReason::Cancelled,
                Next::Read(Ok(LineRead::Line(bytes))) => self.handle_line(&bytes).await,
                Next::Read(Ok(LineRead::Idle)) => trace!("no data within read timeout"),
                Next::Read(Ok(LineRead::EndOfStream)) => break ExitReason::EndOfStream,
                Next::Read(Err(e)) => break ExitReason::TransportFault(e.to_string()),
            }
        };

        self.finish(reason).await
    }

    /// Feeds one raw line through classification, parsing, aggregation and buffering.
    pub async fn handle_line(&mut self, bytes: &[u8]) {
        self.stats.lines_read += 1;
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                self.stats.decode_failures += 1;
                warn!(error = %e, "skipping line that is not valid UTF-8");
                return;
            }
        };
        debug!(line = text.trim(), "received");

        match self.classifier.classify(text) {
            LineKind::RoundBoundary { round } => {
                self.stats.rounds += 1;
                info!(round, "round started");
                self.flush("round boundary").await;
            }
            LineKind::CaptureStart => {
                debug!(round = self.classifier.round(), "capturing round summary");
            }
            LineKind::Header => {}
            LineKind::Data { round, line } => match parse_record(line, round) {
                Ok(record) => {
                    self.aggregator.record(&record);
                    self.buffer.append(record);
                    self.stats.records_accepted += 1;
                }
                Err(e) => {
                    self.stats.dropped_records += 1;
                    debug!(round, error = %e, "dropping malformed record");
                }
            },
            LineKind::Noise => self.stats.noise_lines += 1,
        }
    }

    async fn flush(&mut self, trigger: &'static str) {
        match self.buffer.flush_if_non_empty(self.sink.as_mut()).await {
            Ok(0) => {}
            Ok(rows) => {
                self.stats.flushes += 1;
                self.stats.rows_persisted += rows as u64;
                info!(rows, trigger, "persisted batch");
            }
            Err(e) => {
                self.stats.flush_failures += 1;
                error!(
                    error = %e,
                    pending = self.buffer.len(),
                    trigger,
                    "failed to persist batch, keeping it for the next flush"
                );
            }
        }
    }

    async fn finish(mut self, reason: ExitReason) -> SessionReport {
        match &reason {
            ExitReason::EndOfStream => info!("line source exhausted"),
            ExitReason::Cancelled => info!("shutdown requested"),
            ExitReason::TransportFault(message) => error!(error = %message, "transport fault"),
        }

        self.flush("shutdown").await;
        if let Err(e) = self.source.close().await {
            warn!(error = %e, "failed to close line source");
        }
        self.classifier.close();

        info!(
            rounds = self.stats.rounds,
            records = self.stats.records_accepted,
            dropped = self.stats.dropped_records,
            rows = self.stats.rows_persisted,
            "session closed"
        );

        SessionReport {
            reason,
            last_round: self.classifier.round(),
            unflushed: self.buffer.len(),
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockLineSource;
    use crate::error::SinkError;
    use crate::record::TelemetryRecord;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink {
        batches: Arc<Mutex<Vec<Vec<TelemetryRecord>>>>,
    }

    #[async_trait]
    impl RecordSink for SharedSink {
        async fn write_batch(&mut self, records: &[TelemetryRecord]) -> Result<(), SinkError> {
            self.batches.lock().unwrap().push(records.to_vec());
            Ok(())
        }
    }

    fn session(source: MockLineSource) -> (Session, SharedSink, SharedAggregator) {
        let sink = SharedSink::default();
        let aggregator = SharedAggregator::new();
        let session = Session::new(Box::new(source), Box::new(sink.clone()), aggregator.clone());
        (session, sink, aggregator)
    }

    #[tokio::test]
    async fn malformed_line_changes_nothing() {
        let (mut session, sink, aggregator) = session(MockLineSource::new());
        session.handle_line(b"Starting round 1\n").await;
        session.handle_line(b"Rekap Data:\n").await;
        session.handle_line(b"1, 5, 10.0, 20.0\n").await;
        session
            .handle_line(b"1, 5, 10.0, 20.0, 1.0, 23.40, 60.0, 0.002, 3.00, 0, 1, 5, 9\n")
            .await;

        assert_eq!(session.stats().dropped_records, 2);
        assert!(session.pending().is_empty());
        assert!(aggregator.snapshot().is_empty());
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_utf8_is_skipped() {
        let (mut session, _sink, _aggregator) = session(MockLineSource::new());
        session.handle_line(&[0xc3, 0x28, b'\n']).await;
        session.handle_line(b"Starting round 1\n").await;
        assert_eq!(session.stats().decode_failures, 1);
        assert_eq!(session.round(), 1);
    }

    #[tokio::test]
    async fn boundary_with_empty_batch_writes_nothing() {
        let (mut session, sink, _aggregator) = session(MockLineSource::new());
        session.handle_line(b"Starting round 1\n").await;
        session.handle_line(b"Starting round 2\n").await;
        assert!(sink.batches.lock().unwrap().is_empty());
        assert_eq!(session.stats().flushes, 0);
    }

    #[tokio::test]
    async fn second_boundary_flushes_exactly_buffered_rows() {
        let (mut session, sink, _aggregator) = session(MockLineSource::new());
        for line in [
            "Starting round 1",
            "Rekap Data:",
            "1, 5, 10.0, 20.0, 1.0, 23.40, 60.0, 0.002, 3.00, 0, 1, 5",
            "1, 6, 11.0, 21.0, 1.0, 22.10, 61.0, 0.003, 2.90, 0, 0, 5",
        ] {
            session.handle_line(line.as_bytes()).await;
        }
        assert_eq!(session.pending().len(), 2);

        session.handle_line(b"Starting round 2").await;
        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][1].node_id, 6);
        assert!(session.pending().is_empty());
        assert_eq!(session.state(), SessionState::Active { capturing: false });
    }

    #[tokio::test]
    async fn run_flushes_and_closes_on_end_of_stream() {
        let source = MockLineSource::from_lines([
            "Starting round 1",
            "Rekap Data:",
            "1, 5, 10.0, 20.0, 1.0, 23.40, 60.0, 0.002, 3.00, 0, 1, 5",
        ]);
        let closed = source.closed_flag();
        let (session, sink, _aggregator) = session(source);
        let (_tx, rx) = watch::channel(false);

        let report = session.run(rx).await;
        assert_eq!(report.reason, ExitReason::EndOfStream);
        assert_eq!(report.unflushed, 0);
        assert_eq!(report.stats.rows_persisted, 1);
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    }
}
