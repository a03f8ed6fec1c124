//! Line protocol of the sink node.
//!
//! The device prints free-form diagnostics interleaved with a per-round summary:
//!
//! ```text
//! Starting round 3 ...          <- round boundary
//! CH election ...               <- noise
//! Rekap Data:                   <- capture start
//! Ronde, ID, PosisiX, ...       <- header, ignored
//! 3, 5, 10.0, 20.0, ...         <- data lines until the next boundary
//! ```
//!
//! [`LineClassifier`] tracks the round counter and capture flag and tags each
//! line. It never parses data lines; see [`crate::record`].

/// Prefix of the line announcing a new round.
pub const ROUND_MARKER: &str = "Starting round";

/// Prefix of the line announcing the round summary.
pub const CAPTURE_MARKER: &str = "Rekap Data:";

/// Column header printed after the capture marker.
pub const HEADER_LINE: &str =
    "Ronde, ID, PosisiX, PosisiY, Energi Awal, Suhu, Kelembaban, Gas, Tegangan, Cluster, CH, CH ID";

/// Ingestion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No round boundary seen yet
    Idle,
    /// Inside a round
    Active {
        /// Whether lines are data rows
        capturing: bool,
    },
    /// Stream ended, faulted or was cancelled
    Closed,
}

/// Classification of one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// A new round started; the pending batch belongs to the previous round
    RoundBoundary {
        /// Number of the round that just started
        round: u32,
    },
    /// Data lines follow
    CaptureStart,
    /// Column header, ignored
    Header,
    /// Data row of the current round
    Data {
        /// Round the row belongs to
        round: u32,
        /// Trimmed line text
        line: &'a str,
    },
    /// Diagnostic output outside a capture
    Noise,
}

/// Round counter and capture flag of one session.
#[derive(Debug)]
pub struct LineClassifier {
    round: u32,
    state: SessionState,
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LineClassifier {
    /// Creates a classifier that has not seen any round yet.
    pub fn new() -> Self {
        Self {
            round: 0,
            state: SessionState::Idle,
        }
    }

    /// Current round, 0 before the first boundary.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether data lines are currently accepted.
    pub fn is_capturing(&self) -> bool {
        matches!(self.state, SessionState::Active { capturing: true })
    }

    /// Marks the session closed; every later line is noise.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Classifies `line` and advances the state machine.
    ///
    /// Surrounding whitespace (including the `\r\n` terminator) is ignored.
    pub fn classify<'a>(&mut self, line: &'a str) -> LineKind<'a> {
        let line = line.trim();
        if self.state == SessionState::Closed {
            return LineKind::Noise;
        }

        if line.starts_with(ROUND_MARKER) {
            self.round += 1;
            self.state = SessionState::Active { capturing: false };
            return LineKind::RoundBoundary { round: self.round };
        }

        match self.state {
            SessionState::Active { capturing } => {
                if line.starts_with(CAPTURE_MARKER) {
                    self.state = SessionState::Active { capturing: true };
                    LineKind::CaptureStart
                } else if line == HEADER_LINE {
                    LineKind::Header
                } else if capturing {
                    LineKind::Data {
                        round: self.round,
                        line,
                    }
                } else {
                    LineKind::Noise
                }
            }
            SessionState::Idle | SessionState::Closed => LineKind::Noise,
        }
    }
}
