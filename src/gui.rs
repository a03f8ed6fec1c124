//! The eframe/egui chart window.
//!
//! Two stacked plots fed from [`SharedAggregator`] snapshots. The snapshot is taken
//! once per refresh interval; frames in between redraw the cached series.
use crate::chart::{self, ClusterSeries};
use crate::data::SharedAggregator;
use crate::error::SinkError;
use eframe::egui;
use egui_plot::{Legend, Line, Plot, PlotPoints};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// The main GUI struct.
pub struct ChartApp {
    aggregator: SharedAggregator,
    refresh: Duration,
    shutdown: watch::Receiver<bool>,
    series: Vec<ClusterSeries>,
    last_refresh: Option<Instant>,
}

impl ChartApp {
    /// Creates a window reading from `aggregator` every `refresh`.
    pub fn new(
        aggregator: SharedAggregator,
        refresh: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            aggregator,
            refresh,
            shutdown,
            series: Vec::new(),
            last_refresh: None,
        }
    }

    fn refresh_series(&mut self) {
        let due = self
            .last_refresh
            .map_or(true, |at| at.elapsed() >= self.refresh);
        if due {
            self.series = chart::build_series(&self.aggregator.snapshot());
            self.last_refresh = Some(Instant::now());
        }
    }
}

impl eframe::App for ChartApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if *self.shutdown.borrow() {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
        self.refresh_series();

        egui::CentralPanel::default().show(ctx, |ui| {
            let spacing = ui.spacing().item_spacing.y;
            let panel_height = ((ui.available_height() - 3.0 * spacing) / 2.0 - 24.0).max(120.0);

            ui.heading(chart::VOLTAGE_TITLE);
            series_plot(ui, "voltage", "Residual Energy", panel_height, &self.series, |s| {
                &s.voltage
            });

            ui.separator();

            ui.heading(chart::THROUGHPUT_TITLE);
            series_plot(
                ui,
                "throughput",
                chart::THROUGHPUT_UNIT,
                panel_height,
                &self.series,
                |s| &s.throughput,
            );
        });

        ctx.request_repaint_after(self.refresh);
    }
}

fn series_plot(
    ui: &mut egui::Ui,
    id: &str,
    y_label: &str,
    height: f32,
    series: &[ClusterSeries],
    points: impl Fn(&ClusterSeries) -> &Vec<[f64; 2]>,
) {
    Plot::new(id)
        .height(height)
        .legend(Legend::default())
        .x_axis_label("Round")
        .y_axis_label(y_label)
        .show(ui, |plot_ui| {
            for s in series {
                let [r, g, b] = s.color;
                let line = Line::new(PlotPoints::from(points(s).clone()))
                    .name(&s.label)
                    .color(egui::Color32::from_rgb(r, g, b));
                plot_ui.line(line);
            }
        });
}

/// Opens the chart window and blocks until it is closed.
///
/// Must be called from the main thread. The window closes itself once `shutdown`
/// becomes `true`.
pub fn run_window(
    title: &str,
    aggregator: SharedAggregator,
    refresh: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<(), SinkError> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(title)
            .with_inner_size([1000.0, 800.0]),
        ..Default::default()
    };

    eframe::run_native(
        title,
        options,
        Box::new(move |_cc| Ok(Box::new(ChartApp::new(aggregator, refresh, shutdown)))),
    )
    .map_err(|e| SinkError::Gui(e.to_string()))
}
