//! CSV persistence of accepted records.
use crate::{
    core::RecordSink,
    error::{AppResult, SinkError},
    record::{TelemetryRecord, CSV_HEADER},
};
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Append-only CSV file, one row per record.
///
/// The header goes in front of the first batch written to an empty file, so a file
/// left by an earlier run is appended to as is. A batch lands completely or not at
/// all: on a failed write the file is truncated back to its previous length.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    /// Creates a sink for `path`, creating missing parent directories.
    ///
    /// The file itself is only created by the first write.
    pub fn new(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("CSV sink will append to '{}'.", path.display());
        Ok(Self { path })
    }

    /// Destination file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn encode_header() -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    writer
        .into_inner()
        .map_err(|e| SinkError::Storage(e.to_string()))
}

fn encode_rows(records: &[TelemetryRecord]) -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.write_record(record.to_row())?;
    }
    writer
        .into_inner()
        .map_err(|e| SinkError::Storage(e.to_string()))
}

/// Writes `bytes` and flushes; on failure calls `rollback` before returning the error.
fn write_or_rollback<W, F>(writer: &mut W, bytes: &[u8], rollback: F) -> io::Result<()>
where
    W: Write,
    F: FnOnce(&mut W) -> io::Result<()>,
{
    let result = writer.write_all(bytes).and_then(|_| writer.flush());
    if let Err(e) = result {
        if let Err(rollback_err) = rollback(writer) {
            warn!(error = %rollback_err, "could not roll back partial CSV write");
        }
        return Err(e);
    }
    Ok(())
}

/// Appends one encoded batch, with the header if the file is empty. Returns whether
/// the header was written.
fn append_batch(path: &Path, rows: &[u8]) -> AppResult<bool> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| SinkError::Storage(format!("Failed to open CSV file: {}", e)))?;
    let previous_len = file
        .metadata()
        .map_err(|e| SinkError::Storage(e.to_string()))?
        .len();

    let with_header = previous_len == 0;
    let mut bytes = if with_header { encode_header()? } else { Vec::new() };
    bytes.extend_from_slice(rows);

    write_or_rollback(&mut file, &bytes, |file| file.set_len(previous_len))
        .map_err(|e| SinkError::Storage(e.to_string()))?;
    Ok(with_header)
}

#[async_trait]
impl RecordSink for CsvSink {
    async fn write_batch(&mut self, records: &[TelemetryRecord]) -> Result<(), SinkError> {
        let rows = encode_rows(records)?;
        let path = self.path.clone();

        // Execute blocking file I/O on dedicated thread
        let header = tokio::task::spawn_blocking(move || append_batch(&path, &rows))
            .await
            .map_err(|e| SinkError::Storage(format!("CSV write task panicked: {}", e)))??;

        debug!(rows = records.len(), header, "appended CSV batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_record;
    use tempfile::TempDir;

    fn records(round: u32, count: i64) -> Vec<TelemetryRecord> {
        (0..count)
            .map(|node| {
                let line = format!("{round}, {node}, 1.0, 2.0, 1.0, 23.40, 60.0, 0.002, 3.00, 0, 1, 5");
                parse_record(&line, round).unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn first_write_creates_file_with_header() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvSink::new(dir.path().join("nested/out.csv")).unwrap();
        sink.write_batch(&records(1, 2)).await.unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER.join(","));
        assert_eq!(lines[1], "1,1,0,1.0,2.0,1.0,23.40,60.0,0.002,3.00,0,1,5,12");
    }

    #[tokio::test]
    async fn existing_file_is_appended_without_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut first = CsvSink::new(&path).unwrap();
        first.write_batch(&records(1, 1)).await.unwrap();
        drop(first);

        // Second run against the same file
        let mut second = CsvSink::new(&path).unwrap();
        second.write_batch(&records(2, 2)).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let header_count = text.lines().filter(|l| l.starts_with("Round phase1")).count();
        assert_eq!(header_count, 1);
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().last().unwrap().starts_with("2,2,1,"));
    }

    #[tokio::test]
    async fn empty_leftover_file_still_gets_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        // A failed first write can leave the file created but empty
        std::fs::File::create(&path).unwrap();

        let mut sink = CsvSink::new(&path).unwrap();
        sink.write_batch(&records(1, 1)).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], CSV_HEADER.join(","));
    }

    /// Writer accepting at most `capacity` bytes in total.
    struct CappedWriter {
        data: Vec<u8>,
        capacity: usize,
    }

    impl Write for CappedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.capacity - self.data.len();
            if room == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "No space left on device"));
            }
            let n = room.min(buf.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn partial_write_is_rolled_back() {
        let existing = b"Round phase1\n1,1,0\n".to_vec();
        let previous_len = existing.len();
        let mut writer = CappedWriter {
            data: existing.clone(),
            capacity: previous_len + 10,
        };
        let rows = encode_rows(&records(2, 5)).unwrap();

        let result = write_or_rollback(&mut writer, &rows, |w| {
            w.data.truncate(previous_len);
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(writer.data, existing);
    }

    #[test]
    fn retry_after_rollback_writes_batch_once() {
        let mut writer = CappedWriter {
            data: Vec::new(),
            capacity: 40,
        };
        let rows = encode_rows(&records(1, 3)).unwrap();
        assert!(write_or_rollback(&mut writer, &rows, |w| {
            w.data.clear();
            Ok(())
        })
        .is_err());
        assert!(writer.data.is_empty());

        // Space freed
        writer.capacity = usize::MAX;
        write_or_rollback(&mut writer, &rows, |w| {
            w.data.clear();
            Ok(())
        })
        .unwrap();
        let text = String::from_utf8(writer.data).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
