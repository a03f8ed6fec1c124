//! Custom error types for the application.
//!
//! This module defines the primary error type, `SinkError`, for the whole sink.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the kinds of errors that can occur, from configuration problems to serial and
//! storage failures.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type mismatches
//!   in the layered configuration.
//! - **`Configuration`**: Semantic errors found by `SinkConfig::validate`.
//! - **`Io`**: Wraps `std::io::Error`, covering file and transport I/O.
//! - **`Transport`**: Fatal line source failures (port unplugged, read error).
//! - **`Storage`**: Failures while encoding or appending CSV rows.
//! - **`SerialFeatureDisabled`**: Serial support was not compiled in.
//!
//! Record parse failures have their own type, [`crate::record::ParseError`], because they
//! never leave the session driver: a malformed line is dropped, not propagated.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, SinkError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serial port not connected")]
    SerialPortNotConnected,

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("GUI error: {0}")]
    Gui(String),
}

impl From<figment::Error> for SinkError {
    fn from(value: figment::Error) -> Self {
        SinkError::Config(Box::new(value))
    }
}

impl From<csv::Error> for SinkError {
    fn from(value: csv::Error) -> Self {
        SinkError::Storage(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "broken pipe");
        let err: SinkError = csv::Error::from(io).into();
        match err {
            SinkError::Storage(msg) => assert!(msg.contains("broken pipe")),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn serial_feature_message_names_flag() {
        assert_eq!(
            SinkError::SerialFeatureDisabled.to_string(),
            "Serial support not enabled. Rebuild with --features instrument_serial"
        );
    }
}
