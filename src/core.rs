//! Core traits at the edges of the ingestion pipeline.
use crate::error::SinkError;
use crate::record::TelemetryRecord;
use async_trait::async_trait;

/// Result of one read from a [`LineSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// One line, terminator included if the source delivered one.
    Line(Vec<u8>),
    /// The read timed out without data; the source is still open.
    Idle,
    /// The source is exhausted.
    EndOfStream,
}

/// Trait for the transport delivering the device's output line by line.
///
/// Bytes are returned undecoded; the session driver decides what to do with
/// lines that are not valid UTF-8. An `Err` from `read_line` is a fatal
/// transport fault and ends the session.
#[async_trait]
pub trait LineSource: Send {
    /// Human-readable name for logs (e.g. the port path).
    fn name(&self) -> String;

    /// Reads the next line.
    async fn read_line(&mut self) -> Result<LineRead, SinkError>;

    /// Releases the transport. Called exactly once when the session ends.
    async fn close(&mut self) -> Result<(), SinkError>;
}

/// Trait for the append-only store receiving each finished round.
#[async_trait]
pub trait RecordSink: Send {
    /// Appends `records` as one batch. On error nothing may be assumed written.
    async fn write_batch(&mut self, records: &[TelemetryRecord]) -> Result<(), SinkError>;
}
