use crate::error::ConfigError;
use crate::wavelet::{decomposition_levels, Wavelet};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Fixed parameters of the streaming pipeline.
///
/// Every field has a default matching a 50 Hz wrist PPG sensor whose
/// timestamps are microseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sampling rate (Hz).
    pub fs: u32,
    /// Samples per processing block.
    pub block_size: usize,
    /// Leading/trailing context kept on each side of a block.
    pub overlap: usize,
    /// Length of a periodicity chunk (seconds).
    pub chunk_seconds: u32,
    /// Low-band DWT coefficients zeroed by the denoiser.
    pub filtered_coefficients: usize,
    /// Daubechies filter length (taps).
    pub wavelet_filter_length: usize,
    /// Coarsest level kept by the transform; depth is `log2(N) - scale`.
    pub wavelet_scale: u32,
    /// Maximum deviation of the second autocorrelation peak from the first (seconds).
    pub period_tolerance_s: f64,
    /// Half-width of the next-beat acceptance neighborhood (seconds).
    pub neighborhood_s: f64,
    /// Shortest plausible beat period (seconds), exclusive.
    pub min_period_s: f64,
    /// Longest plausible beat period (seconds), exclusive.
    pub max_period_s: f64,
    /// Local-maximum window size (samples); even values are bumped to odd.
    pub peak_window: usize,
    pub hrv_lower_limit_ms: f64,
    pub hrv_upper_limit_ms: f64,
    /// Timestamp ticks per millisecond (1000 for microsecond clocks).
    pub ticks_per_ms: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fs: 50,
            block_size: 1024,
            overlap: 112,
            chunk_seconds: 4,
            filtered_coefficients: 32,
            wavelet_filter_length: 8,
            wavelet_scale: 4,
            period_tolerance_s: 0.4,
            neighborhood_s: 0.4,
            min_period_s: 0.3,
            max_period_s: 1.5,
            peak_window: 11,
            hrv_lower_limit_ms: 200.0,
            hrv_upper_limit_ms: 1400.0,
            ticks_per_ms: 1000.0,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fs == 0 {
            return Err(ConfigError::SamplingRate);
        }
        if 2 * self.overlap >= self.block_size {
            return Err(ConfigError::Overlap {
                overlap: self.overlap,
                block_size: self.block_size,
            });
        }
        let chunk = self.chunk_len();
        if chunk == 0 || chunk > self.block_size - 2 * self.overlap {
            return Err(ConfigError::Chunk {
                chunk,
                block_size: self.block_size,
            });
        }
        Wavelet::daubechies(self.wavelet_filter_length)?;
        let padded = self.padded_len();
        decomposition_levels(padded, self.wavelet_scale)?;
        if self.filtered_coefficients > padded {
            return Err(ConfigError::FilteredCoefficients {
                filtered: self.filtered_coefficients,
                len: padded,
            });
        }
        if !(self.min_period_s > 0.0 && self.min_period_s < self.max_period_s) {
            return Err(ConfigError::PeriodBounds {
                min_s: self.min_period_s,
                max_s: self.max_period_s,
            });
        }
        if !(self.hrv_lower_limit_ms >= 0.0 && self.hrv_lower_limit_ms <= self.hrv_upper_limit_ms)
        {
            return Err(ConfigError::HrvLimits {
                lower_ms: self.hrv_lower_limit_ms,
                upper_ms: self.hrv_upper_limit_ms,
            });
        }
        if self.ticks_per_ms <= 0.0 {
            return Err(ConfigError::TicksPerMs);
        }
        Ok(())
    }

    /// Chunk length in samples, saturating for absurd rates.
    pub fn chunk_len(&self) -> usize {
        (self.chunk_seconds as usize).saturating_mul(self.fs as usize)
    }

    /// Block length after padding to a power of two.
    pub fn padded_len(&self) -> usize {
        self.block_size.next_power_of_two()
    }

    /// Stride between the first samples of consecutive blocks.
    pub fn block_stride(&self) -> usize {
        self.block_size - 2 * self.overlap
    }

    pub fn tolerance_samples(&self) -> usize {
        seconds_to_samples(self.period_tolerance_s, self.fs)
    }

    pub fn neighborhood_samples(&self) -> usize {
        seconds_to_samples(self.neighborhood_s, self.fs)
    }

    /// Exclusive lag bounds of a plausible beat period, in samples.
    pub fn period_bounds(&self) -> (f64, f64) {
        let fs = f64::from(self.fs);
        (self.min_period_s * fs, self.max_period_s * fs)
    }

    pub fn odd_peak_window(&self) -> usize {
        if self.peak_window % 2 == 0 {
            self.peak_window + 1
        } else {
            self.peak_window
        }
    }

    /// Moving-average window of the detrender: one second, made odd.
    pub fn trend_window(&self) -> usize {
        let fs = self.fs as usize;
        if fs % 2 == 0 {
            fs + 1
        } else {
            fs
        }
    }
}

fn seconds_to_samples(seconds: f64, fs: u32) -> usize {
    (seconds * f64::from(fs)).round().max(0.0) as usize
}

/// Parse and validate a TOML pipeline configuration.
pub fn parse_config(text: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig = toml::from_str(text).context("parsing pipeline config")?;
    config.validate()?;
    Ok(config)
}

/// Read and validate a TOML pipeline configuration from disk.
pub fn read_config(path: &Path) -> Result<PipelineConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("invalid config {}", path.display()))
}
