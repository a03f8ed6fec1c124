//! CLI Entry Point for wsn-sink
//!
//! Reads the sink node's serial output, logs every accepted record to CSV and
//! charts per-cluster aggregates.
//!
//! # Usage
//!
//! Listen on a port with the chart window:
//! ```bash
//! wsn-sink --port /dev/ttyUSB0 --baud 9600 --output data/sink.csv
//! ```
//!
//! Without a display:
//! ```bash
//! wsn-sink --port COM6 --headless
//! ```
//!
//! List serial ports:
//! ```bash
//! wsn-sink list-ports
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tracing::{info, warn};
use wsn_sink::adapters::{list_ports, open_serial};
use wsn_sink::config::{SinkConfig, DEFAULT_CONFIG_PATH};
use wsn_sink::data::{CsvSink, SharedAggregator};
use wsn_sink::session::{ExitReason, Session};
use wsn_sink::{chart, logging};

#[derive(Parser)]
#[command(name = "wsn-sink")]
#[command(about = "Serial sink for a clustered sensor network: CSV log and live aggregates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serial port (e.g. /dev/ttyUSB0, COM6)
    #[arg(long)]
    port: Option<String>,

    /// Baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// CSV output file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Chart refresh interval in milliseconds
    #[arg(long)]
    refresh_ms: Option<u64>,

    /// Log aggregates instead of opening the chart window
    #[arg(long)]
    headless: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available serial ports
    ListPorts,
}

impl Cli {
    fn apply_overrides(&self, config: &mut SinkConfig) {
        if let Some(port) = &self.port {
            config.transport.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.transport.baud_rate = baud;
        }
        if let Some(output) = &self.output {
            config.storage.output_path = output.clone();
        }
        if let Some(refresh_ms) = self.refresh_ms {
            config.chart.refresh_interval_ms = refresh_ms;
        }
        if self.headless {
            config.chart.headless = true;
        }
        if let Some(level) = &self.log_level {
            config.application.log_level = level.clone();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::ListPorts) = cli.command {
        for port in list_ports()? {
            println!("{port}");
        }
        return Ok(());
    }

    let mut config = SinkConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    logging::init_from_config(&config)?;

    let runtime = Runtime::new().context("starting Tokio runtime")?;
    run(&runtime, config)
}

fn run(runtime: &Runtime, config: SinkConfig) -> Result<()> {
    let source = open_serial(&config.transport)
        .with_context(|| format!("opening serial port {}", config.transport.port))?;
    let sink = CsvSink::new(&config.storage.output_path)?;
    let aggregator = SharedAggregator::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!(
        port = %config.transport.port,
        baud = config.transport.baud_rate,
        output = %config.storage.output_path.display(),
        "sink starting"
    );

    let session = Session::new(Box::new(source), Box::new(sink), aggregator.clone());
    let session_task = runtime.spawn(session.run(shutdown_rx.clone()));

    let signal_tx = shutdown_tx.clone();
    runtime.spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping");
                let _ = signal_tx.send(true);
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl+C"),
        }
    });

    if config.chart.headless || !cfg!(feature = "gui") {
        let renderer = runtime.spawn(chart::run_headless(
            aggregator,
            config.chart.refresh_interval(),
            shutdown_rx,
        ));
        // Ends on end of stream, fault, or Ctrl+C
        let report = runtime.block_on(session_task)?;
        let _ = shutdown_tx.send(true);
        let _ = runtime.block_on(renderer);
        return finish(report.reason);
    }

    #[cfg(feature = "gui")]
    {
        let window = wsn_sink::gui::run_window(
            &config.application.name,
            aggregator,
            config.chart.refresh_interval(),
            shutdown_rx,
        );
        if let Err(e) = &window {
            tracing::error!(error = %e, "chart window failed");
        }
        // Window closed by the user or after Ctrl+C; either way stop ingestion
        let _ = shutdown_tx.send(true);
        let report = runtime.block_on(session_task)?;
        window?;
        finish(report.reason)
    }

    #[cfg(not(feature = "gui"))]
    unreachable!("headless mode is forced without the gui feature")
}

fn finish(reason: ExitReason) -> Result<()> {
    match reason {
        ExitReason::TransportFault(message) => Err(anyhow::anyhow!("transport fault: {message}")),
        ExitReason::EndOfStream | ExitReason::Cancelled => Ok(()),
    }
}
