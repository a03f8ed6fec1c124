//! Chart data for the two aggregate panels, and the headless renderer.
//!
//! Panel 1 plots round against average voltage (residual energy) per cluster, panel 2
//! round against total throughput per cluster. A cluster's color is picked from a
//! fixed palette by `cluster_id % PALETTE.len()`, so it never changes during a run.

use crate::data::{AggregateSnapshot, SharedAggregator};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Series colors as RGB.
pub const PALETTE: [[u8; 3]; 3] = [
    [31, 119, 180], // blue
    [44, 160, 44],  // green
    [214, 39, 40],  // red
];

/// Title of the voltage panel.
pub const VOLTAGE_TITLE: &str = "Round vs Residual Energy per Cluster";

/// Title of the throughput panel.
pub const THROUGHPUT_TITLE: &str = "Round vs Throughput per Cluster";

/// Y axis label of the throughput panel.
pub const THROUGHPUT_UNIT: &str = "Throughput (Bytes/round)";

/// Palette entry for `cluster_id`.
pub fn cluster_color(cluster_id: u32) -> [u8; 3] {
    PALETTE[cluster_id as usize % PALETTE.len()]
}

/// Points of one cluster in both panels.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSeries {
    /// Cluster id
    pub cluster_id: u32,
    /// Legend label
    pub label: String,
    /// Line color
    pub color: [u8; 3],
    /// `[round, average voltage]`, rounds ascending
    pub voltage: Vec<[f64; 2]>,
    /// `[round, total throughput]`, rounds ascending
    pub throughput: Vec<[f64; 2]>,
}

/// Turns a snapshot into plottable series, clusters ascending.
pub fn build_series(snapshot: &AggregateSnapshot) -> Vec<ClusterSeries> {
    snapshot
        .clusters
        .iter()
        .map(|(cluster_id, points)| ClusterSeries {
            cluster_id: *cluster_id,
            label: format!("Cluster {cluster_id}"),
            color: cluster_color(*cluster_id),
            voltage: points
                .iter()
                .map(|p| [f64::from(p.round), p.average_voltage])
                .collect(),
            throughput: points
                .iter()
                .map(|p| [f64::from(p.round), p.total_throughput as f64])
                .collect(),
        })
        .collect()
}

/// Logs the latest round of every cluster each `interval` until `shutdown` fires.
///
/// Stands in for the chart window when running without a display.
pub async fn run_headless(
    aggregator: SharedAggregator,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_logged = AggregateSnapshot::default();

    loop {
        let sender_gone = tokio::select! {
            _ = ticker.tick() => false,
            changed = shutdown.changed() => changed.is_err(),
        };
        if sender_gone || *shutdown.borrow() {
            break;
        }

        let snapshot = aggregator.snapshot();
        if snapshot == last_logged {
            continue;
        }
        for (cluster, point) in snapshot.latest() {
            info!(
                cluster,
                round = point.round,
                average_voltage = point.average_voltage,
                total_throughput = point.total_throughput,
                "cluster aggregate"
            );
        }
        last_logged = snapshot;
    }
}
