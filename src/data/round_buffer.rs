//! Records of the round in progress, waiting for the next boundary.
use crate::core::RecordSink;
use crate::error::SinkError;
use crate::record::TelemetryRecord;

/// Batch of records not yet persisted.
#[derive(Debug, Default)]
pub struct RoundBuffer {
    pending: Vec<TelemetryRecord>,
}

impl RoundBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record to the batch.
    pub fn append(&mut self, record: TelemetryRecord) {
        self.pending.push(record);
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Writes the batch to `sink` and clears it, returning the number of rows written.
    ///
    /// An empty buffer never reaches the sink. If the sink fails the batch is kept,
    /// so the next flush writes it together with anything appended meanwhile.
    pub async fn flush_if_non_empty<S>(&mut self, sink: &mut S) -> Result<usize, SinkError>
    where
        S: RecordSink + ?Sized,
    {
        if self.pending.is_empty() {
            return Ok(0);
        }
        sink.write_batch(&self.pending).await?;
        let rows = self.pending.len();
        self.pending.clear();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_record;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingSink {
        batches: Vec<Vec<TelemetryRecord>>,
        fail: bool,
    }

    #[async_trait]
    impl RecordSink for RecordingSink {
        async fn write_batch(&mut self, records: &[TelemetryRecord]) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Storage("disk full".into()));
            }
            self.batches.push(records.to_vec());
            Ok(())
        }
    }

    fn record(node: i64) -> TelemetryRecord {
        let line = format!("1, {node}, 1.0, 2.0, 1.0, 20, 60, 0.1, 3.0, 0, 0, 1");
        parse_record(&line, 1).unwrap()
    }

    #[tokio::test]
    async fn empty_buffer_does_not_touch_sink() {
        let mut buffer = RoundBuffer::new();
        let mut sink = RecordingSink::default();
        assert_eq!(buffer.flush_if_non_empty(&mut sink).await.unwrap(), 0);
        assert!(sink.batches.is_empty());
    }

    #[tokio::test]
    async fn flush_writes_one_batch_and_clears() {
        let mut buffer = RoundBuffer::new();
        let mut sink = RecordingSink::default();
        buffer.append(record(1));
        buffer.append(record(2));

        assert_eq!(buffer.flush_if_non_empty(&mut sink).await.unwrap(), 2);
        assert!(buffer.is_empty());
        assert_eq!(sink.batches.len(), 1);
        assert_eq!(sink.batches[0][1].node_id, 2);

        assert_eq!(buffer.flush_if_non_empty(&mut sink).await.unwrap(), 0);
        assert_eq!(sink.batches.len(), 1);
    }

    #[tokio::test]
    async fn failed_flush_keeps_batch() {
        let mut buffer = RoundBuffer::new();
        let mut sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        buffer.append(record(1));
        assert!(buffer.flush_if_non_empty(&mut sink).await.is_err());
        assert_eq!(buffer.len(), 1);

        sink.fail = false;
        buffer.append(record(2));
        assert_eq!(buffer.flush_if_non_empty(&mut sink).await.unwrap(), 2);
        assert_eq!(sink.batches[0].len(), 2);
    }
}
