//! Mock line source for testing
//!
//! Replays a scripted sequence of reads without any hardware. It provides:
//! - Lines as text or raw bytes (including invalid UTF-8)
//! - Timeouts and injected transport faults
//! - An optional "hang" once the script is exhausted, to exercise cancellation
//! - A shared flag recording whether the session closed the source

use crate::core::{LineRead, LineSource};
use crate::error::SinkError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One scripted read.
#[derive(Debug, Clone)]
pub enum MockRead {
    /// A line of bytes
    Line(Vec<u8>),
    /// A read timeout
    Idle,
    /// A fatal transport error
    Fault(String),
}

/// Scripted line source
///
/// # Example
///
/// ```
/// use wsn_sink::adapters::MockLineSource;
/// use wsn_sink::core::{LineRead, LineSource};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let mut source = MockLineSource::from_lines(["Starting round 1"]);
/// assert_eq!(source.read_line().await.unwrap(), LineRead::Line(b"Starting round 1\n".to_vec()));
/// assert_eq!(source.read_line().await.unwrap(), LineRead::EndOfStream);
/// # })
/// ```
pub struct MockLineSource {
    script: VecDeque<MockRead>,
    hang_when_exhausted: bool,
    closed: Arc<AtomicBool>,
}

impl MockLineSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            hang_when_exhausted: false,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a source replaying `lines`, each terminated with `\n`
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .fold(Self::new(), |source, line| source.with_line(line.as_ref()))
    }

    /// Append a text line
    pub fn with_line(self, line: &str) -> Self {
        self.with_bytes(format!("{line}\n").into_bytes())
    }

    /// Append a raw line
    pub fn with_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.script.push_back(MockRead::Line(bytes));
        self
    }

    /// Append a read timeout
    pub fn with_idle(mut self) -> Self {
        self.script.push_back(MockRead::Idle);
        self
    }

    /// Append a fatal transport error
    pub fn with_fault(mut self, message: &str) -> Self {
        self.script.push_back(MockRead::Fault(message.to_string()));
        self
    }

    /// Never return once the script is exhausted, instead of reporting end of stream
    pub fn hang_when_exhausted(mut self) -> Self {
        self.hang_when_exhausted = true;
        self
    }

    /// Flag set when the source is closed
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

impl Default for MockLineSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LineSource for MockLineSource {
    fn name(&self) -> String {
        "mock".to_string()
    }

    async fn read_line(&mut self) -> Result<LineRead, SinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SinkError::SerialPortNotConnected);
        }
        match self.script.pop_front() {
            Some(MockRead::Line(bytes)) => Ok(LineRead::Line(bytes)),
            Some(MockRead::Idle) => Ok(LineRead::Idle),
            Some(MockRead::Fault(message)) => Err(SinkError::Transport(message)),
            None if self.hang_when_exhausted => std::future::pending().await,
            None => Ok(LineRead::EndOfStream),
        }
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_script_in_order() {
        let mut source = MockLineSource::new()
            .with_line("a")
            .with_idle()
            .with_bytes(vec![0xff, b'\n'])
            .with_fault("unplugged");

        assert_eq!(source.read_line().await.unwrap(), LineRead::Line(b"a\n".to_vec()));
        assert_eq!(source.read_line().await.unwrap(), LineRead::Idle);
        assert_eq!(source.read_line().await.unwrap(), LineRead::Line(vec![0xff, b'\n']));
        assert!(matches!(source.read_line().await, Err(SinkError::Transport(_))));
        assert_eq!(source.read_line().await.unwrap(), LineRead::EndOfStream);
    }

    #[tokio::test]
    async fn close_sets_flag() {
        let mut source = MockLineSource::from_lines(["x"]);
        let closed = source.closed_flag();
        assert!(!closed.load(Ordering::SeqCst));
        source.close().await.unwrap();
        assert!(closed.load(Ordering::SeqCst));
        assert!(source.read_line().await.is_err());
    }
}
