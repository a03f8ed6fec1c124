//! Aggregation, buffering and storage of accepted records.
pub mod aggregator;
pub mod round_buffer;
pub mod storage;

pub use aggregator::{AggregateSnapshot, Aggregator, ClusterRoundAggregate, SharedAggregator};
pub use round_buffer::RoundBuffer;
pub use storage::CsvSink;
