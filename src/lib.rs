//! # WSN Sink Core Library
//!
//! This crate is the core library of the `wsn-sink` application, which listens to the
//! serial output of a clustered wireless sensor network's sink node. Each round the
//! device prints a summary with one line per node; the library turns those lines into
//! typed records, keeps per-cluster aggregates, appends the records to a CSV log and
//! feeds a live chart.
//!
//! ## Crate Structure
//!
//! - **`adapters`**: Line sources: the serial port and a scripted mock for tests.
//! - **`chart`**: Plot series built from aggregate snapshots, and the headless renderer.
//! - **`config`**: Layered configuration (defaults, TOML, environment). See `config::SinkConfig`.
//! - **`core`**: The `LineSource` and `RecordSink` traits at the pipeline's edges.
//! - **`data`**: The aggregator, the round buffer and the CSV sink.
//! - **`error`**: The `SinkError` enum for centralized error handling.
//! - **`gui`**: The `eframe`/`egui_plot` chart window (feature `gui`).
//! - **`logging`**: `tracing` subscriber setup.
//! - **`protocol`**: Classification of device lines and the round/capture state machine.
//! - **`record`**: Data line parsing and the throughput estimate.
//! - **`session`**: The ingestion loop.

pub mod adapters;
pub mod chart;
pub mod config;
pub mod core;
pub mod data;
pub mod error;
#[cfg(feature = "gui")]
pub mod gui;
pub mod logging;
pub mod protocol;
pub mod record;
pub mod session;
