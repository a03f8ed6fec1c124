//! Per-cluster, per-round aggregates.
//!
//! The [`Aggregator`] keeps every accepted node entry for the life of the process,
//! keyed `round -> cluster -> node`, and derives for each `(cluster, round)` pair
//! the mean voltage and the summed throughput estimate.
//!
//! Only the pair touched by a record can change, so `record` recomputes that pair
//! from its full entry history. The result is the same as recomputing every pair.
//!
//! [`SharedAggregator`] is the handle shared between the ingestion task and the
//! chart. Writers hold the lock for the whole append-and-recompute, so a snapshot
//! never sees an average without its matching total.

use crate::record::TelemetryRecord;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// One node's contribution in one round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeEntry {
    /// Voltage reading
    pub voltage: f64,
    /// Throughput estimate in bytes
    pub throughput: u64,
}

/// Derived values for one `(cluster, round)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterRoundAggregate {
    /// Mean voltage over every entry of every node in the pair
    pub average_voltage: f64,
    /// Sum of throughput estimates over the same entries
    pub total_throughput: u64,
    /// Number of entries behind the values
    pub entries: usize,
}

impl ClusterRoundAggregate {
    /// Aggregates `entries`; `None` when there are none.
    pub fn from_entries<'a, I>(entries: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a NodeEntry>,
    {
        let mut voltage_sum = 0.0;
        let mut total_throughput = 0;
        let mut count = 0usize;
        for entry in entries {
            voltage_sum += entry.voltage;
            total_throughput += entry.throughput;
            count += 1;
        }
        (count > 0).then(|| Self {
            average_voltage: voltage_sum / count as f64,
            total_throughput,
            entries: count,
        })
    }
}

/// One plotted point of a cluster's series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundPoint {
    /// Round number
    pub round: u32,
    /// Mean voltage of the cluster in this round
    pub average_voltage: f64,
    /// Total throughput of the cluster in this round
    pub total_throughput: u64,
}

/// Immutable copy of the aggregates, clusters and rounds ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSnapshot {
    /// Series per cluster id
    pub clusters: BTreeMap<u32, Vec<RoundPoint>>,
}

impl AggregateSnapshot {
    /// Whether no aggregate exists yet.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Latest point of every cluster.
    pub fn latest(&self) -> impl Iterator<Item = (u32, &RoundPoint)> {
        self.clusters
            .iter()
            .filter_map(|(cluster, points)| points.last().map(|p| (*cluster, p)))
    }
}

type History = BTreeMap<u32, BTreeMap<u32, BTreeMap<i64, Vec<NodeEntry>>>>;

/// Node entry history and the aggregates derived from it.
#[derive(Debug, Default)]
pub struct Aggregator {
    history: History,
    aggregates: BTreeMap<u32, BTreeMap<u32, ClusterRoundAggregate>>,
    entry_count: usize,
}

impl Aggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `record` to the history and refreshes its `(cluster, round)` aggregate.
    pub fn record(&mut self, record: &TelemetryRecord) {
        let entry = NodeEntry {
            voltage: record.voltage.value,
            throughput: record.estimated_throughput_bytes,
        };
        let nodes = self
            .history
            .entry(record.round)
            .or_default()
            .entry(record.cluster_id)
            .or_default();
        nodes.entry(record.node_id).or_default().push(entry);
        self.entry_count += 1;

        if let Some(aggregate) = ClusterRoundAggregate::from_entries(nodes.values().flatten()) {
            self.aggregates
                .entry(record.cluster_id)
                .or_default()
                .insert(record.round, aggregate);
        }
    }

    /// Aggregate of one pair, if it has entries.
    pub fn aggregate(&self, cluster_id: u32, round: u32) -> Option<ClusterRoundAggregate> {
        self.aggregates.get(&cluster_id)?.get(&round).copied()
    }

    /// Entries recorded for one node in one cluster and round, in arrival order.
    pub fn node_entries(&self, round: u32, cluster_id: u32, node_id: i64) -> &[NodeEntry] {
        self.history
            .get(&round)
            .and_then(|clusters| clusters.get(&cluster_id))
            .and_then(|nodes| nodes.get(&node_id))
            .map_or(&[], Vec::as_slice)
    }

    /// Total number of entries ever recorded.
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Rebuilds every aggregate from the history.
    pub fn recompute_all(&self) -> BTreeMap<u32, BTreeMap<u32, ClusterRoundAggregate>> {
        let mut aggregates: BTreeMap<u32, BTreeMap<u32, ClusterRoundAggregate>> = BTreeMap::new();
        for (round, clusters) in &self.history {
            for (cluster_id, nodes) in clusters {
                if let Some(aggregate) = ClusterRoundAggregate::from_entries(nodes.values().flatten())
                {
                    aggregates
                        .entry(*cluster_id)
                        .or_default()
                        .insert(*round, aggregate);
                }
            }
        }
        aggregates
    }

    /// Copies the aggregates into a snapshot for the chart.
    pub fn snapshot(&self) -> AggregateSnapshot {
        let clusters = self
            .aggregates
            .iter()
            .map(|(cluster_id, rounds)| {
                let points = rounds
                    .iter()
                    .map(|(round, aggregate)| RoundPoint {
                        round: *round,
                        average_voltage: aggregate.average_voltage,
                        total_throughput: aggregate.total_throughput,
                    })
                    .collect();
                (*cluster_id, points)
            })
            .collect();
        AggregateSnapshot { clusters }
    }
}

/// Cloneable, lock-protected handle to an [`Aggregator`].
#[derive(Debug, Clone, Default)]
pub struct SharedAggregator {
    inner: Arc<RwLock<Aggregator>>,
}

impl SharedAggregator {
    /// Creates a handle to a fresh aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records under the write lock.
    pub fn record(&self, record: &TelemetryRecord) {
        let mut aggregator = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        aggregator.record(record);
    }

    /// Snapshot under the read lock.
    pub fn snapshot(&self) -> AggregateSnapshot {
        self.with(Aggregator::snapshot)
    }

    /// Runs `f` against the aggregator under the read lock.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Aggregator) -> R,
    {
        let aggregator = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&aggregator)
    }
}
