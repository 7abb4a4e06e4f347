use crate::error::SampleError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel tag of a recorder line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Ppg,
    HeartRate,
    Other(String),
}

impl Channel {
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "PPG" => Channel::Ppg,
            "HR" => Channel::HeartRate,
            other => Channel::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Ppg => f.write_str("PPG"),
            Channel::HeartRate => f.write_str("HR"),
            Channel::Other(tag) => f.write_str(tag),
        }
    }
}

/// One typed sensor sample.
///
/// The timestamp is kept as the original text token so that peak indices can
/// be mapped back to the exact recorded time without float round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub channel: Channel,
    pub timestamp: String,
    pub value: f64,
    pub precision: i32,
}

impl Sample {
    /// Build a sample from raw timestamp/value tokens, validating both.
    pub fn from_fields(
        channel: Channel,
        timestamp: &str,
        value: &str,
        precision: i32,
    ) -> Result<Self, SampleError> {
        let timestamp = timestamp.trim();
        if !is_numeric(timestamp) {
            return Err(SampleError::InvalidTimestamp(timestamp.to_string()));
        }
        let value = value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| SampleError::InvalidValue(value.trim().to_string()))?;
        Ok(Self {
            channel,
            timestamp: timestamp.to_string(),
            value,
            precision,
        })
    }

    /// Parse a recorder line such as `PPG,5962532563,23040.00,2`.
    pub fn parse_line(line: &str) -> Result<Self, SampleError> {
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() != 4 {
            return Err(SampleError::FieldCount {
                found: fields.len(),
            });
        }
        let channel = Channel::parse(fields[0]);
        if let Channel::Other(tag) = &channel {
            return Err(SampleError::UnknownChannel(tag.clone()));
        }
        let precision = fields[3]
            .trim()
            .parse::<i32>()
            .map_err(|_| SampleError::InvalidPrecision(fields[3].trim().to_string()))?;
        Self::from_fields(channel, fields[1], fields[2], precision)
    }

    pub fn to_line(&self) -> String {
        format!(
            "{},{},{:.*},{}",
            self.channel,
            self.timestamp,
            self.precision.max(0) as usize,
            self.value,
            self.precision
        )
    }
}

fn is_numeric(token: &str) -> bool {
    !token.is_empty() && token.parse::<f64>().map(f64::is_finite).unwrap_or(false)
}

/// Uniformly sampled series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Sampling frequency in Hz
    pub fs: f64,
    pub data: Vec<f64>,
}

/// A heartbeat peak accepted by the tracker, with its HRV interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    /// Position among all PPG samples folded into the buffer this session.
    pub stream_index: u64,
    /// Position inside the processing block.
    pub block_index: usize,
    /// Original timestamp token of the peak sample.
    pub timestamp: String,
    /// Interval to the previous peak in timestamp ticks, 0 when undefined.
    pub hrv: f64,
    /// Whether `hrv` fell inside the plausible range.
    pub valid: bool,
}

impl PeakRecord {
    pub fn hrv_ms(&self, ticks_per_ms: f64) -> f64 {
        self.hrv / ticks_per_ms
    }
}

/// RR intervals (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    /// Collect the in-range intervals of a peak stream.
    pub fn from_records(records: &[PeakRecord], ticks_per_ms: f64) -> Self {
        let rr = records
            .iter()
            .filter(|r| r.valid)
            .map(|r| r.hrv_ms(ticks_per_ms) / 1000.0)
            .collect();
        Self { rr }
    }

    pub fn len(&self) -> usize {
        self.rr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rr.is_empty()
    }
}
