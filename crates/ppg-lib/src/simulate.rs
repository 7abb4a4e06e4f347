//! Synthetic wrist-PPG recorder logs.

use crate::signal::{Channel, Sample};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticPpg {
    pub seconds: f64,
    pub fs: f64,
    pub bpm: f64,
    /// Standard deviation of the additive noise (raw sensor units).
    pub noise: f64,
    pub seed: u64,
    pub dc: f64,
    /// Pulse height above the DC level.
    pub amplitude: f64,
    /// Slow baseline wander amplitude and frequency.
    pub drift: f64,
    pub drift_hz: f64,
    /// First timestamp (µs).
    pub start_us: u64,
    /// Emit an `HR` line after every N PPG samples (0 disables).
    pub heart_rate_every: usize,
    /// Insert a malformed line after every N PPG samples (0 disables).
    pub malformed_every: usize,
}

impl Default for SyntheticPpg {
    fn default() -> Self {
        Self {
            seconds: 60.0,
            fs: 50.0,
            bpm: 75.0,
            noise: 5.0,
            seed: 7,
            dc: 23000.0,
            amplitude: 600.0,
            drift: 150.0,
            drift_hz: 0.03,
            start_us: 1_000_000,
            heart_rate_every: 0,
            malformed_every: 0,
        }
    }
}

impl SyntheticPpg {
    pub fn sample_count(&self) -> usize {
        (self.seconds * self.fs).round().max(0.0) as usize
    }

    pub fn timestamp_us(&self, k: usize) -> u64 {
        self.start_us + (k as f64 * 1e6 / self.fs).round() as u64
    }

    /// Noise-free waveform value at sample `k`.
    pub fn clean_value(&self, k: usize) -> f64 {
        let t = k as f64 / self.fs;
        let phase = (t * self.bpm / 60.0).fract();
        let pulse = (-((phase - 0.3) / 0.12).powi(2)).exp();
        self.dc + self.amplitude * pulse + self.drift * (2.0 * PI * self.drift_hz * t).sin()
    }

    /// Recorder-log lines in stream order.
    pub fn lines(&self) -> Vec<String> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let n = self.sample_count();
        let mut out = Vec::with_capacity(n + n / 10);
        for k in 0..n {
            let value = self.clean_value(k) + self.noise * gaussian(&mut rng);
            let ts = self.timestamp_us(k);
            out.push(recorder_line(Channel::Ppg, ts, value));
            if self.heart_rate_every > 0 && (k + 1) % self.heart_rate_every == 0 {
                let bpm = self.bpm + rng.gen_range(-1.0..1.0);
                out.push(recorder_line(Channel::HeartRate, ts, bpm));
            }
            if self.malformed_every > 0 && (k + 1) % self.malformed_every == 0 {
                out.push(format!("PPG,{ts},not-a-number,2"));
            }
        }
        out
    }
}

fn recorder_line(channel: Channel, ts: u64, value: f64) -> String {
    Sample {
        channel,
        timestamp: ts.to_string(),
        value,
        precision: 2,
    }
    .to_line()
}

/// Approximately standard normal draw (sum of twelve uniforms).
fn gaussian(rng: &mut StdRng) -> f64 {
    (0..12).map(|_| rng.gen::<f64>()).sum::<f64>() - 6.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::pipeline::{MemorySink, Pipeline};

    #[test]
    fn line_layout_and_timestamps() {
        let sim = SyntheticPpg {
            seconds: 1.0,
            ..SyntheticPpg::default()
        };
        let lines = sim.lines();
        assert_eq!(lines.len(), 50);
        assert!(lines[0].starts_with("PPG,1000000,"));
        assert!(lines[1].starts_with("PPG,1020000,"));
        assert!(lines.iter().all(|l| l.ends_with(",2")));
    }

    #[test]
    fn same_seed_same_log() {
        let sim = SyntheticPpg {
            seconds: 2.0,
            ..SyntheticPpg::default()
        };
        assert_eq!(sim.lines(), sim.lines());
        let other = SyntheticPpg { seed: 8, ..sim.clone() };
        assert_ne!(sim.lines(), other.lines());
    }

    #[test]
    fn interleaves_heart_rate_and_malformed_lines() {
        let sim = SyntheticPpg {
            seconds: 2.0,
            heart_rate_every: 25,
            malformed_every: 50,
            ..SyntheticPpg::default()
        };
        let lines = sim.lines();
        assert_eq!(lines.iter().filter(|l| l.starts_with("HR,")).count(), 4);
        assert_eq!(lines.iter().filter(|l| l.contains("not-a-number")).count(), 2);
        assert_eq!(lines.len(), 106);
    }

    #[test]
    fn pipeline_recovers_the_simulated_rate() {
        let sim = SyntheticPpg::default();
        let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let mut sink = MemorySink::default();
        for line in sim.lines() {
            pipeline.ingest_line(&line, &mut sink);
        }
        let mut hrv: Vec<f64> = sink.valid.iter().map(|r| r.hrv_ms(1000.0)).collect();
        assert!(hrv.len() >= 40, "only {} valid intervals", hrv.len());
        hrv.sort_by(|a, b| a.total_cmp(b));
        let median = hrv[hrv.len() / 2];
        assert!((760.0..=840.0).contains(&median), "median {median}");
    }
}
