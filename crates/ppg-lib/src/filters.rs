use crate::config::PipelineConfig;
use crate::error::TransformError;
use crate::wavelet::{pad_pow2, Dwt};
use std::ops::Range;

/// Wavelet denoiser: forward DWT, zero the low band, inverse DWT.
#[derive(Debug, Clone)]
pub struct Denoiser {
    dwt: Dwt,
    filtered_coefficients: usize,
}

impl Denoiser {
    pub fn new(
        filter_length: usize,
        scale: u32,
        filtered_coefficients: usize,
    ) -> Result<Self, TransformError> {
        Ok(Self {
            dwt: Dwt::new(filter_length, scale)?,
            filtered_coefficients,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, TransformError> {
        Self::new(
            config.wavelet_filter_length,
            config.wavelet_scale,
            config.filtered_coefficients,
        )
    }

    /// Denoise a block. The result has the padded power-of-two length.
    pub fn denoise(&self, block: &[f64]) -> Result<Vec<f64>, TransformError> {
        let padded = pad_pow2(block);
        let mut coefficients = self.dwt.forward(&padded)?;
        zero_low_band(&mut coefficients, self.filtered_coefficients);
        self.dwt.inverse(&coefficients)
    }
}

/// Zero the first `count` coefficients (the coarsest approximation band).
pub fn zero_low_band(coefficients: &mut [f64], count: usize) {
    let count = count.min(coefficients.len());
    coefficients[..count].fill(0.0);
}

/// Centered moving average; the window truncates at the edges.
pub fn moving_average(signal: &[f64], window: usize) -> Vec<f64> {
    let n = signal.len();
    let half = window / 2;
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &x in signal {
        acc += x;
        prefix.push(acc);
    }
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}

/// Subtract the centered moving average from the signal in place.
pub fn detrend(signal: &mut [f64], window: usize) {
    let trend = moving_average(signal, window);
    for (x, t) in signal.iter_mut().zip(trend) {
        *x -= t;
    }
}

/// Span of the denoised block handed to the output sink.
///
/// The leading overlap is only emitted for the first block; later blocks
/// start at `overlap` since their head was already emitted as the previous
/// block's tail.
pub fn emission_range(
    first_block: bool,
    overlap: usize,
    chunks: usize,
    chunk_len: usize,
    len: usize,
) -> Range<usize> {
    let start = if first_block { 0 } else { overlap };
    let end = (overlap + chunks * chunk_len).min(len);
    start.min(end)..end
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn zeroing_twice_matches_zeroing_once() {
        let dwt = Dwt::new(8, 4).unwrap();
        let x: Vec<f64> = (0..256).map(|i| (i as f64 * 0.3).sin() * 10.0 + 5.0).collect();
        let mut once = dwt.forward(&x).unwrap();
        zero_low_band(&mut once, 32);
        let mut twice = once.clone();
        zero_low_band(&mut twice, 32);
        assert_eq!(once, twice);
        assert!(once[..32].iter().all(|c| *c == 0.0));
    }

    #[test]
    fn denoiser_removes_offset_and_drift() {
        let denoiser = Denoiser::new(8, 4, 32).unwrap();
        let block: Vec<f64> = (0..1024)
            .map(|i| {
                let t = i as f64 / 50.0;
                23000.0 + 20.0 * t + 500.0 * (2.0 * PI * t).cos()
            })
            .collect();
        let out = denoiser.denoise(&block).unwrap();
        assert_eq!(out.len(), 1024);
        let mean = out[200..800].iter().sum::<f64>() / 600.0;
        assert!(mean.abs() < 100.0, "mean {mean}");
        let peak = out[200..800].iter().cloned().fold(f64::MIN, f64::max);
        assert!(peak > 300.0, "pulse amplitude lost: {peak}");
    }

    #[test]
    fn denoiser_pads_short_blocks() {
        let denoiser = Denoiser::new(8, 4, 32).unwrap();
        let out = denoiser.denoise(&vec![1.0; 1000]).unwrap();
        assert_eq!(out.len(), 1024);
    }

    #[test]
    fn moving_average_truncates_at_edges() {
        let signal = [1.0, 2.0, 3.0, 4.0, 5.0];
        let avg = moving_average(&signal, 3);
        assert_eq!(avg, vec![1.5, 2.0, 3.0, 4.0, 4.5]);
    }

    #[test]
    fn detrend_removes_linear_ramp_in_the_interior() {
        let mut signal: Vec<f64> = (0..200).map(|i| 3.0 * i as f64 + 7.0).collect();
        detrend(&mut signal, 51);
        for x in &signal[25..175] {
            assert!(x.abs() < 1e-9);
        }
        assert!(signal[0] < 0.0);
        assert!(signal[199] > 0.0);
    }

    #[test]
    fn emission_skips_the_overlap_after_the_first_block() {
        assert_eq!(emission_range(true, 112, 4, 200, 1024), 0..912);
        assert_eq!(emission_range(false, 112, 4, 200, 1024), 112..912);
        assert_eq!(emission_range(false, 112, 0, 200, 1024), 112..112);
    }
}
