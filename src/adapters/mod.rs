//! Line sources feeding the session driver.

pub mod serial;
pub use serial::{list_ports, open_serial, BlockingLineSource};

#[cfg(feature = "instrument_serial")]
pub use serial::SerialLineSource;

pub mod mock;
pub use mock::MockLineSource;
