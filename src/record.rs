//! Telemetry record parsing.
//!
//! Turns a data line from the sink node's round summary into a typed
//! [`TelemetryRecord`]. A data line is twelve fields joined by `", "`:
//!
//! ```text
//! round, id, pos_x, pos_y, initial_energy, temperature, humidity, gas, voltage, cluster, ch, ch_id
//! 1, 5, 10.0, 20.0, 1.0, 23.40, 60.0, 0.002, 3.00, 0, 1, 5
//! ```
//!
//! The four sensor readings keep their original text next to the parsed value:
//! the throughput estimate counts significant characters of that text, and the
//! CSV log stores every field exactly as received.

use thiserror::Error;

/// Number of comma-separated fields in a data line.
pub const FIELD_COUNT: usize = 12;

/// Separator between fields of a data line.
pub const FIELD_SEPARATOR: &str = ", ";

/// Header row of the persisted CSV file.
pub const CSV_HEADER: [&str; FIELD_COUNT + 2] = [
    "Round phase1",
    "Round phase2",
    "Node ID",
    "X Position",
    "Y Position",
    "Initial Energy",
    "Temperature",
    "Humidity",
    "Gas",
    "Voltage",
    "Cluster",
    "CH",
    "CH ID",
    "Throughput",
];

/// Errors that can occur while parsing a data line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The line does not split into exactly twelve fields
    #[error("expected 12 fields, found {found}")]
    FieldCount {
        /// Number of fields found
        found: usize,
    },

    /// A field does not parse as its type
    #[error("field {field} has invalid value '{value}'")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Text as received
        value: String,
    },
}

/// A sensor reading as received, with its parsed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Text exactly as it appeared on the line
    pub raw: String,
    /// Parsed value
    pub value: f64,
}

impl Reading {
    fn parse(field: &'static str, raw: &str) -> Result<Self, ParseError> {
        Ok(Self {
            raw: raw.to_string(),
            value: parse_number(field, raw)?,
        })
    }

    /// Significant characters needed to print this reading at its reported precision.
    pub fn significant_len(&self) -> usize {
        significant_len(&self.raw)
    }
}

/// One node's measurement in one round.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Round assigned by the session's own counter
    pub round: u32,
    /// Node identifier
    pub node_id: i64,
    /// X coordinate of the node
    pub pos_x: f64,
    /// Y coordinate of the node
    pub pos_y: f64,
    /// Energy the node started with
    pub initial_energy: f64,
    /// Temperature reading
    pub temperature: Reading,
    /// Humidity reading
    pub humidity: Reading,
    /// Gas reading
    pub gas: Reading,
    /// Residual voltage reading
    pub voltage: Reading,
    /// Cluster the node belongs to this round
    pub cluster_id: u32,
    /// Whether the node is the cluster-head
    pub is_cluster_head: bool,
    /// Node id of the cluster-head
    pub cluster_head_id: i64,
    /// Estimated payload size in bytes, see [`estimate_throughput`]
    pub estimated_throughput_bytes: u64,
    raw_fields: Vec<String>,
}

impl TelemetryRecord {
    /// Round label as reported by the device (field 0); informational only.
    pub fn round_label(&self) -> &str {
        &self.raw_fields[0]
    }

    /// The twelve fields exactly as received.
    pub fn raw_fields(&self) -> &[String] {
        &self.raw_fields
    }

    /// CSV row: session round, the raw fields, then the throughput estimate.
    pub fn to_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(FIELD_COUNT + 2);
        row.push(self.round.to_string());
        row.extend(self.raw_fields.iter().cloned());
        row.push(self.estimated_throughput_bytes.to_string());
        row
    }
}

/// Parse a data line into a record for `round`.
pub fn parse_record(line: &str, round: u32) -> Result<TelemetryRecord, ParseError> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() != FIELD_COUNT {
        return Err(ParseError::FieldCount {
            found: fields.len(),
        });
    }

    let temperature = Reading::parse("temperature", fields[5])?;
    let humidity = Reading::parse("humidity", fields[6])?;
    let gas = Reading::parse("gas", fields[7])?;
    let voltage = Reading::parse("voltage", fields[8])?;
    let estimated_throughput_bytes = estimate_throughput([&temperature, &humidity, &gas, &voltage]);

    Ok(TelemetryRecord {
        round,
        node_id: parse_integer("node_id", fields[1])?,
        pos_x: parse_number("pos_x", fields[2])?,
        pos_y: parse_number("pos_y", fields[3])?,
        initial_energy: parse_number("initial_energy", fields[4])?,
        temperature,
        humidity,
        gas,
        voltage,
        cluster_id: parse_integer("cluster_id", fields[9])?,
        is_cluster_head: parse_flag("is_cluster_head", fields[10])?,
        cluster_head_id: parse_integer("cluster_head_id", fields[11])?,
        estimated_throughput_bytes,
        raw_fields: fields.into_iter().map(str::to_string).collect(),
    })
}

/// Sum of the significant lengths of the four sensor readings.
pub fn estimate_throughput(readings: [&Reading; 4]) -> u64 {
    readings.iter().map(|r| r.significant_len() as u64).sum()
}

/// Length of `text` once trailing fractional zeros and a dangling point are dropped.
///
/// Text without a decimal point counts at full length, so `"100"` stays 3.
pub fn significant_len(text: &str) -> usize {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').len()
    } else {
        text.len()
    }
}

fn parse_number(field: &'static str, raw: &str) -> Result<f64, ParseError> {
    raw.trim().parse().map_err(|_| invalid(field, raw))
}

fn parse_integer<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, ParseError> {
    raw.trim().parse().map_err(|_| invalid(field, raw))
}

fn parse_flag(field: &'static str, raw: &str) -> Result<bool, ParseError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(invalid(field, raw)),
    }
}

fn invalid(field: &'static str, raw: &str) -> ParseError {
    ParseError::InvalidField {
        field,
        value: raw.to_string(),
    }
}
