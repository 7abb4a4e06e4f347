use crate::config::PipelineConfig;
use crate::signal::{PeakRecord, RRSeries};
use anyhow::{anyhow, Result};
use log::warn;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// HRV bookkeeping carried across blocks for a whole session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HrvState {
    /// Timestamp of the previous peak in ticks, 0 when there is none.
    pub last_peak_timestamp: f64,
    /// Most recent in-range interval in ticks, 0 before the first one.
    pub last_valid_hrv: f64,
}

/// Outcome of feeding one peak timestamp to the calculator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HrvObservation {
    pub timestamp: f64,
    pub hrv: f64,
    pub valid: bool,
}

/// Turns consecutive peak timestamps into beat-to-beat intervals.
#[derive(Debug, Clone)]
pub struct HrvCalculator {
    lower_ms: f64,
    upper_ms: f64,
    ticks_per_ms: f64,
    state: HrvState,
}

impl HrvCalculator {
    pub fn new(lower_ms: f64, upper_ms: f64, ticks_per_ms: f64) -> Self {
        Self {
            lower_ms,
            upper_ms,
            ticks_per_ms,
            state: HrvState::default(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.hrv_lower_limit_ms,
            config.hrv_upper_limit_ms,
            config.ticks_per_ms,
        )
    }

    pub fn state(&self) -> HrvState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = HrvState::default();
    }

    pub fn in_range(&self, hrv_ticks: f64) -> bool {
        let ms = hrv_ticks / self.ticks_per_ms;
        ms >= self.lower_ms && ms <= self.upper_ms
    }

    /// Record a peak at the given timestamp token.
    ///
    /// An unparseable token counts as time 0, which yields no interval.
    /// Out-of-range intervals are reported but leave `last_valid_hrv` alone.
    pub fn observe(&mut self, timestamp: &str) -> HrvObservation {
        let t = timestamp
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .unwrap_or_else(|| {
                warn!("peak timestamp '{timestamp}' is not numeric");
                0.0
            });
        let last = self.state.last_peak_timestamp;
        let (hrv, valid) = if t == 0.0 || last == 0.0 {
            (0.0, false)
        } else {
            let hrv = t - last;
            let valid = self.in_range(hrv);
            if valid {
                self.state.last_valid_hrv = hrv;
            } else {
                warn!(
                    "HRV {:.1} ms outside [{}, {}] ms",
                    hrv / self.ticks_per_ms,
                    self.lower_ms,
                    self.upper_ms
                );
            }
            (hrv, valid)
        };
        self.state.last_peak_timestamp = t;
        HrvObservation {
            timestamp: t,
            hrv,
            valid,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HRVTime {
    pub n: usize,
    pub avnn: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub pnn50: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HRVPsd {
    pub lf: f64,
    pub hf: f64,
    pub vlf: f64,
    pub lf_hf: f64,
    pub total_power: f64,
    pub points: Vec<[f64; 2]>,
}

/// Session-level HRV metrics over the in-range intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrvSummary {
    pub peaks: usize,
    pub valid_intervals: usize,
    pub time: HRVTime,
    pub psd: HRVPsd,
}

pub fn hrv_summary(records: &[PeakRecord], ticks_per_ms: f64) -> Result<HrvSummary> {
    let rr = RRSeries::from_records(records, ticks_per_ms);
    Ok(HrvSummary {
        peaks: records.len(),
        valid_intervals: rr.len(),
        time: hrv_time(&rr),
        psd: hrv_psd(&rr, 4.0)?,
    })
}

pub fn hrv_time(rr: &RRSeries) -> HRVTime {
    let n = rr.rr.len();
    let avnn = if n > 0 {
        rr.rr.iter().sum::<f64>() / n as f64
    } else {
        0.0
    };
    if n < 2 {
        return HRVTime {
            n,
            avnn,
            sdnn: 0.0,
            rmssd: 0.0,
            pnn50: 0.0,
        };
    }
    let dof = n as f64 - 1.0;
    let sdnn = (rr.rr.iter().map(|x| (x - avnn).powi(2)).sum::<f64>() / dof).sqrt();
    let diffs: Vec<f64> = rr.rr.windows(2).map(|w| w[1] - w[0]).collect();
    let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / dof).sqrt();
    let pnn50 = diffs.iter().filter(|d| d.abs() > 0.050).count() as f64 / dof;
    HRVTime {
        n,
        avnn,
        sdnn,
        rmssd,
        pnn50,
    }
}

/// Welch PSD of the instantaneous heart rate resampled at `fs_interp` Hz.
pub fn hrv_psd(rr: &RRSeries, fs_interp: f64) -> Result<HRVPsd> {
    let (freqs, powers) = welch_psd(rr, fs_interp)?;
    let total_power: f64 = powers.iter().sum();
    let lf = integrate_band(&freqs, &powers, (0.04, 0.15));
    let hf = integrate_band(&freqs, &powers, (0.15, 0.4));
    let vlf = integrate_band(&freqs, &powers, (0.003, 0.04));
    let lf_hf = if hf > 0.0 { lf / hf } else { 0.0 };
    Ok(HRVPsd {
        lf,
        hf,
        vlf,
        lf_hf,
        total_power,
        points: freqs.into_iter().zip(powers).map(|(f, p)| [f, p]).collect(),
    })
}

fn integrate_band(freqs: &[f64], powers: &[f64], band: (f64, f64)) -> f64 {
    freqs
        .iter()
        .zip(powers)
        .filter(|(f, _)| **f >= band.0 && **f < band.1)
        .map(|(_, p)| *p)
        .sum()
}

fn welch_psd(rr: &RRSeries, fs_interp: f64) -> Result<(Vec<f64>, Vec<f64>)> {
    let signal = interpolate_rr(rr, fs_interp);
    let n = signal.len();
    if n == 0 {
        return Ok((Vec::new(), Vec::new()));
    }
    let window = (fs_interp * 30.0).max(4.0).min(n as f64) as usize;
    let step = (window / 2).max(1);
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(window);
    let taper = hann(window);
    let scale = 1.0 / window as f64;
    let freqs: Vec<f64> = (0..window / 2 + 1)
        .map(|k| k as f64 * fs_interp / window as f64)
        .collect();
    let mut powers = vec![0.0; freqs.len()];
    let mut spectrum = r2c.make_output_vec();
    let mut segments = 0usize;
    let mut pos = 0;
    while pos + window <= n {
        let mut frame: Vec<f64> = signal[pos..pos + window]
            .iter()
            .zip(&taper)
            .map(|(x, w)| x * w)
            .collect();
        r2c.process(&mut frame, &mut spectrum)
            .map_err(|err| anyhow!("real FFT failed: {err:?}"))?;
        for (k, val) in spectrum.iter().enumerate() {
            let one_sided = k == 0 || (window % 2 == 0 && k == window / 2);
            let weight = if one_sided { 1.0 } else { 2.0 };
            powers[k] += weight * val.norm_sqr() * scale;
        }
        segments += 1;
        pos += step;
    }
    if segments > 0 {
        for p in powers.iter_mut() {
            *p /= segments as f64;
        }
    }
    Ok((freqs, powers))
}

/// Step-interpolated instantaneous heart rate (bpm).
fn interpolate_rr(rr: &RRSeries, fs: f64) -> Vec<f64> {
    let times: Vec<f64> = rr
        .rr
        .iter()
        .scan(0.0, |acc, interval| {
            *acc += interval;
            Some(*acc)
        })
        .collect();
    let Some(&duration) = times.last() else {
        return Vec::new();
    };
    let n = (duration * fs).ceil() as usize;
    let mut signal = Vec::with_capacity(n);
    let mut idx = 0;
    for i in 0..n {
        let t = i as f64 / fs;
        while idx + 1 < times.len() && times[idx] < t {
            idx += 1;
        }
        let delta = rr.rr[idx];
        signal.push(if delta == 0.0 { 60.0 } else { 60.0 / delta });
    }
    signal
}

fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_peak_has_no_interval() {
        let mut calc = HrvCalculator::new(200.0, 1400.0, 1000.0);
        let obs = calc.observe("5000000");
        assert_eq!(obs.hrv, 0.0);
        assert!(!obs.valid);
        assert_eq!(calc.state().last_peak_timestamp, 5_000_000.0);
    }

    #[test]
    fn in_range_interval_becomes_last_valid() {
        let mut calc = HrvCalculator::new(200.0, 1400.0, 1000.0);
        calc.observe("5000000");
        let obs = calc.observe("5850000");
        assert_eq!(obs.hrv, 850_000.0);
        assert!(obs.valid);
        assert_eq!(calc.state().last_valid_hrv, 850_000.0);
    }

    #[test]
    fn out_of_range_interval_leaves_last_valid_untouched() {
        let mut calc = HrvCalculator::new(200.0, 1400.0, 1000.0);
        calc.observe("1000000");
        calc.observe("1900000");
        let before = calc.state().last_valid_hrv;
        for (ts, expected) in [("3900000", 2_000_000.0), ("4000000", 100_000.0)] {
            let obs = calc.observe(ts);
            assert_eq!(obs.hrv, expected);
            assert!(!obs.valid);
            assert_eq!(calc.state().last_valid_hrv, before);
        }
        // Limits are inclusive.
        assert!(calc.observe("4200000").valid);
        assert!(calc.observe("5600000").valid);
        assert_eq!(calc.state().last_peak_timestamp, 5_600_000.0);
    }

    #[test]
    fn unparseable_timestamp_counts_as_zero() {
        let mut calc = HrvCalculator::new(200.0, 1400.0, 1000.0);
        calc.observe("1000000");
        let obs = calc.observe("garbled");
        assert_eq!(obs.hrv, 0.0);
        assert_eq!(calc.state().last_peak_timestamp, 0.0);
        assert_eq!(calc.observe("2000000").hrv, 0.0);
    }

    #[test]
    fn time_domain_metrics() {
        let rr = RRSeries {
            rr: vec![0.8, 0.9, 0.8, 0.9],
        };
        let metrics = hrv_time(&rr);
        assert_eq!(metrics.n, 4);
        assert!((metrics.avnn - 0.85).abs() < 1e-12);
        assert!((metrics.sdnn - (0.01f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((metrics.rmssd - 0.1).abs() < 1e-12);
        assert!((metrics.pnn50 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn respiratory_modulation_lands_in_hf() {
        let mut rr = Vec::new();
        let mut t = 0.0;
        while t < 300.0 {
            let interval = 1.0 + 0.05 * (2.0 * PI * 0.25 * t).sin();
            rr.push(interval);
            t += interval;
        }
        let psd = hrv_psd(&RRSeries { rr }, 4.0).unwrap();
        assert!(psd.hf > psd.lf, "hf {} lf {}", psd.hf, psd.lf);
        assert!(psd.lf_hf < 1.0);
    }

    #[test]
    fn summary_uses_only_valid_intervals() {
        let records: Vec<PeakRecord> = [(0.0, false), (1_000_000.0, true), (3_000_000.0, false)]
            .iter()
            .enumerate()
            .map(|(i, &(hrv, valid))| PeakRecord {
                stream_index: i as u64 * 50,
                block_index: i * 50,
                timestamp: (1_000_000 * (i + 1)).to_string(),
                hrv,
                valid,
            })
            .collect();
        let summary = hrv_summary(&records, 1000.0).unwrap();
        assert_eq!(summary.peaks, 3);
        assert_eq!(summary.valid_intervals, 1);
        assert!((summary.time.avnn - 1.0).abs() < 1e-12);
    }
}
