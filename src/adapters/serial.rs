//! Serial line source for the sink node.
//!
//! Serial reads are blocking, so every read runs on Tokio's blocking pool while the
//! port sits behind an `Arc<Mutex<..>>`. The port is opened with a short read timeout:
//! a timeout surfaces as [`LineRead::Idle`], which keeps blocking tasks short and lets
//! the session notice cancellation between reads.

use crate::config::TransportConfig;
use crate::core::{LineRead, LineSource};
use crate::error::SinkError;
use async_trait::async_trait;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;

/// Assembles lines from a blocking reader, keeping partial lines across timeouts.
struct LineAssembler<R> {
    reader: BufReader<R>,
    partial: Vec<u8>,
}

impl<R: Read> LineAssembler<R> {
    fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            partial: Vec::new(),
        }
    }

    fn next_line(&mut self) -> Result<LineRead, SinkError> {
        match self.reader.read_until(b'\n', &mut self.partial) {
            Ok(0) if self.partial.is_empty() => Ok(LineRead::EndOfStream),
            // Unterminated last line, or a complete one
            Ok(_) => Ok(LineRead::Line(std::mem::take(&mut self.partial))),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                Ok(LineRead::Idle)
            }
            Err(e) => Err(SinkError::Transport(format!("Serial read error: {}", e))),
        }
    }
}

/// Line source over any blocking reader, typically a serial port.
pub struct BlockingLineSource<R> {
    name: String,
    inner: Option<Arc<Mutex<LineAssembler<R>>>>,
}

impl<R: Read + Send + 'static> BlockingLineSource<R> {
    /// Wraps `reader`; `name` identifies it in logs.
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            inner: Some(Arc::new(Mutex::new(LineAssembler::new(reader)))),
        }
    }
}

#[async_trait]
impl<R: Read + Send + 'static> LineSource for BlockingLineSource<R> {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn read_line(&mut self) -> Result<LineRead, SinkError> {
        let inner = self
            .inner
            .as_ref()
            .ok_or(SinkError::SerialPortNotConnected)?
            .clone();

        // Execute blocking serial I/O on dedicated thread
        tokio::task::spawn_blocking(move || {
            let mut assembler = inner.blocking_lock();
            assembler.next_line()
        })
        .await
        .map_err(|e| SinkError::Transport(format!("Serial I/O task panicked: {}", e)))?
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if let Some(inner) = self.inner.take() {
            // Wait for an in-flight read so the port is really released on return
            drop(inner.lock().await);
            info!("Closed line source '{}'.", self.name);
        }
        Ok(())
    }
}

/// Line source reading from a serial port.
#[cfg(feature = "instrument_serial")]
pub type SerialLineSource = BlockingLineSource<Box<dyn SerialPort>>;

/// Opens the configured serial port.
#[cfg(feature = "instrument_serial")]
pub fn open_serial(config: &TransportConfig) -> Result<SerialLineSource, SinkError> {
    let port = serialport::new(&config.port, config.baud_rate)
        .timeout(config.read_timeout())
        .open()
        .map_err(|e| {
            SinkError::Transport(format!("Failed to open serial port '{}': {}", config.port, e))
        })?;
    tracing::debug!(
        port = %config.port,
        baud = config.baud_rate,
        "opened serial port"
    );
    Ok(BlockingLineSource::new(config.port.clone(), port))
}

/// Opens the configured serial port.
#[cfg(not(feature = "instrument_serial"))]
pub fn open_serial(_config: &TransportConfig) -> Result<BlockingLineSource<std::io::Empty>, SinkError> {
    Err(SinkError::SerialFeatureDisabled)
}

/// Names of the serial ports present on this machine.
#[cfg(feature = "instrument_serial")]
pub fn list_ports() -> Result<Vec<String>, SinkError> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .map_err(|e| SinkError::Transport(format!("Failed to enumerate serial ports: {}", e)))
}

/// Names of the serial ports present on this machine.
#[cfg(not(feature = "instrument_serial"))]
pub fn list_ports() -> Result<Vec<String>, SinkError> {
    Err(SinkError::SerialFeatureDisabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// Reader replaying chunks, with `None` standing for a port timeout.
    struct ChunkedReader {
        chunks: VecDeque<Option<&'static [u8]>>,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                None => Ok(0),
                Some(None) => Err(io::Error::new(ErrorKind::TimedOut, "timed out")),
                Some(Some(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
            }
        }
    }

    #[tokio::test]
    async fn reassembles_lines_split_by_timeouts() {
        let reader = ChunkedReader {
            chunks: VecDeque::from(vec![
                Some(&b"Starting ro"[..]),
                None,
                Some(&b"und 1\r\nRekap Data:\n"[..]),
                Some(&b"tail"[..]),
            ]),
        };
        let mut source = BlockingLineSource::new("test", reader);

        assert_eq!(source.read_line().await.unwrap(), LineRead::Idle);
        assert_eq!(
            source.read_line().await.unwrap(),
            LineRead::Line(b"Starting round 1\r\n".to_vec())
        );
        assert_eq!(
            source.read_line().await.unwrap(),
            LineRead::Line(b"Rekap Data:\n".to_vec())
        );
        assert_eq!(source.read_line().await.unwrap(), LineRead::Line(b"tail".to_vec()));
        assert_eq!(source.read_line().await.unwrap(), LineRead::EndOfStream);
    }

    #[tokio::test]
    async fn read_after_close_fails() {
        let mut source = BlockingLineSource::new("cursor", io::Cursor::new(b"a\n".to_vec()));
        source.close().await.unwrap();
        assert!(matches!(
            source.read_line().await,
            Err(SinkError::SerialPortNotConnected)
        ));
        // Closing twice is harmless
        source.close().await.unwrap();
    }

    #[tokio::test]
    async fn hard_read_errors_are_transport_faults() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(ErrorKind::BrokenPipe, "device unplugged"))
            }
        }

        let mut source = BlockingLineSource::new("broken", Broken);
        match source.read_line().await {
            Err(SinkError::Transport(msg)) => assert!(msg.contains("device unplugged")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
