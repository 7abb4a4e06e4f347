//! Discrete wavelet transform with orthogonal Daubechies filters.
//!
//! The transform runs the periodized pyramid algorithm in place: each level
//! splits the leading `n` values into `n/2` approximation coefficients
//! followed by `n/2` detail coefficients, then recurses on the
//! approximation. After a full forward pass the coarsest approximation sits
//! at the front of the output, followed by details from coarse to fine.

use crate::error::TransformError;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Analysis/synthesis filter pair of an orthogonal Daubechies wavelet.
#[derive(Debug, Clone)]
pub struct Wavelet {
    lowpass: Vec<f64>,
    highpass: Vec<f64>,
}

impl Wavelet {
    /// Daubechies wavelet with `filter_length` taps (2 = Haar, 8 = db4).
    pub fn daubechies(filter_length: usize) -> Result<Self, TransformError> {
        let lowpass = match filter_length {
            2 => vec![FRAC_1_SQRT_2, FRAC_1_SQRT_2],
            4 => vec![
                0.482_962_913_144_690_25,
                0.836_516_303_737_469,
                0.224_143_868_041_857_35,
                -0.129_409_522_550_921_45,
            ],
            6 => vec![
                0.332_670_552_950_956_9,
                0.806_891_509_313_338_8,
                0.459_877_502_119_331_3,
                -0.135_011_020_010_390_84,
                -0.085_441_273_882_241_49,
                0.035_226_291_882_100_656,
            ],
            8 => vec![
                0.230_377_813_308_896_5,
                0.714_846_570_552_915_7,
                0.630_880_767_929_858_9,
                -0.027_983_769_416_859_85,
                -0.187_034_811_719_093_09,
                0.030_841_381_835_560_764,
                0.032_883_011_666_885_2,
                -0.010_597_401_785_069_032,
            ],
            other => return Err(TransformError::UnsupportedFilterLength(other)),
        };
        // Quadrature mirror: g[k] = (-1)^k h[L-1-k]
        let len = lowpass.len();
        let highpass = (0..len)
            .map(|k| {
                let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                sign * lowpass[len - 1 - k]
            })
            .collect();
        Ok(Self { lowpass, highpass })
    }

    fn analysis_step(&self, data: &mut [f64], scratch: &mut [f64]) {
        let n = data.len();
        let half = n / 2;
        for i in 0..half {
            let mut approx = 0.0;
            let mut detail = 0.0;
            for (k, (&h, &g)) in self.lowpass.iter().zip(&self.highpass).enumerate() {
                let x = data[(2 * i + k) % n];
                approx += h * x;
                detail += g * x;
            }
            scratch[i] = approx;
            scratch[half + i] = detail;
        }
        data.copy_from_slice(&scratch[..n]);
    }

    fn synthesis_step(&self, data: &mut [f64], scratch: &mut [f64]) {
        let n = data.len();
        let half = n / 2;
        scratch[..n].fill(0.0);
        for i in 0..half {
            let approx = data[i];
            let detail = data[half + i];
            for (k, (&h, &g)) in self.lowpass.iter().zip(&self.highpass).enumerate() {
                scratch[(2 * i + k) % n] += h * approx + g * detail;
            }
        }
        data.copy_from_slice(&scratch[..n]);
    }
}

/// Number of pyramid levels for a power-of-two signal: `log2(len) - scale`.
pub fn decomposition_levels(len: usize, scale: u32) -> Result<u32, TransformError> {
    if len == 0 {
        return Err(TransformError::Empty);
    }
    if !len.is_power_of_two() {
        return Err(TransformError::NotPowerOfTwo { len });
    }
    let log2_len = len.trailing_zeros();
    if scale >= log2_len {
        return Err(TransformError::InvalidScale { scale, log2_len });
    }
    Ok(log2_len - scale)
}

/// Zero-pad a signal to the next power of two.
pub fn pad_pow2(signal: &[f64]) -> Vec<f64> {
    let mut padded = signal.to_vec();
    if !signal.is_empty() {
        padded.resize(signal.len().next_power_of_two(), 0.0);
    }
    padded
}

/// A configured transform: wavelet plus coarsest retained scale.
#[derive(Debug, Clone)]
pub struct Dwt {
    wavelet: Wavelet,
    scale: u32,
}

impl Dwt {
    pub fn new(filter_length: usize, scale: u32) -> Result<Self, TransformError> {
        Ok(Self {
            wavelet: Wavelet::daubechies(filter_length)?,
            scale,
        })
    }

    pub fn forward(&self, signal: &[f64]) -> Result<Vec<f64>, TransformError> {
        let levels = decomposition_levels(signal.len(), self.scale)?;
        let mut out = signal.to_vec();
        let mut scratch = vec![0.0; out.len()];
        let mut n = out.len();
        for _ in 0..levels {
            self.wavelet.analysis_step(&mut out[..n], &mut scratch);
            n /= 2;
        }
        Ok(out)
    }

    pub fn inverse(&self, coefficients: &[f64]) -> Result<Vec<f64>, TransformError> {
        let levels = decomposition_levels(coefficients.len(), self.scale)?;
        let mut out = coefficients.to_vec();
        let mut scratch = vec![0.0; out.len()];
        let mut n = out.len() >> (levels - 1);
        for _ in 0..levels {
            self.wavelet.synthesis_step(&mut out[..n], &mut scratch);
            n *= 2;
        }
        Ok(out)
    }

    pub fn transform(
        &self,
        signal: &[f64],
        direction: Direction,
    ) -> Result<Vec<f64>, TransformError> {
        match direction {
            Direction::Forward => self.forward(signal),
            Direction::Reverse => self.inverse(signal),
        }
    }
}

/// One-shot transform of a power-of-two signal.
pub fn transform(
    signal: &[f64],
    filter_length: usize,
    scale: u32,
    direction: Direction,
) -> Result<Vec<f64>, TransformError> {
    Dwt::new(filter_length, scale)?.transform(signal, direction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signal(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / 50.0;
                23000.0 + 500.0 * (2.0 * std::f64::consts::PI * t).sin() + 40.0 * (7.3 * t).cos()
            })
            .collect()
    }

    #[test]
    fn filters_are_orthonormal() {
        for taps in [2, 4, 6, 8] {
            let w = Wavelet::daubechies(taps).unwrap();
            let energy: f64 = w.lowpass.iter().map(|h| h * h).sum();
            let sum: f64 = w.lowpass.iter().sum();
            let cross: f64 = w.lowpass.iter().zip(&w.highpass).map(|(h, g)| h * g).sum();
            assert!((energy - 1.0).abs() < 1e-12, "taps {taps} energy {energy}");
            assert!((sum - 2f64.sqrt()).abs() < 1e-12, "taps {taps} sum {sum}");
            assert!(cross.abs() < 1e-12, "taps {taps} cross {cross}");
        }
    }

    #[test]
    fn db4_round_trip_is_lossless() {
        let x = test_signal(1024);
        let coeffs = transform(&x, 8, 4, Direction::Forward).unwrap();
        let back = transform(&coeffs, 8, 4, Direction::Reverse).unwrap();
        for (a, b) in x.iter().zip(&back) {
            assert!((a - b).abs() < 1e-8, "{a} vs {b}");
        }
    }

    #[test]
    fn round_trip_holds_for_every_filter_and_scale() {
        let x = test_signal(64);
        for taps in [2, 4, 6, 8] {
            for scale in 0..6 {
                let dwt = Dwt::new(taps, scale).unwrap();
                let back = dwt.inverse(&dwt.forward(&x).unwrap()).unwrap();
                let max_err = x
                    .iter()
                    .zip(&back)
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max);
                assert!(max_err < 1e-8, "taps {taps} scale {scale} err {max_err}");
            }
        }
    }

    #[test]
    fn forward_preserves_energy() {
        let x = test_signal(256);
        let coeffs = transform(&x, 8, 2, Direction::Forward).unwrap();
        let ex: f64 = x.iter().map(|v| v * v).sum();
        let ec: f64 = coeffs.iter().map(|v| v * v).sum();
        assert!((ex - ec).abs() / ex < 1e-12);
    }

    #[test]
    fn constant_signal_lives_in_the_approximation() {
        let x = vec![3.0; 128];
        let coeffs = transform(&x, 8, 3, Direction::Forward).unwrap();
        // 128 >> 4 levels = 8 approximation coefficients
        for c in &coeffs[8..] {
            assert!(c.abs() < 1e-9);
        }
        assert!(coeffs[..8].iter().all(|c| *c > 0.0));
    }

    #[test]
    fn rejects_bad_lengths_and_scales() {
        assert_eq!(
            transform(&[1.0; 100], 8, 2, Direction::Forward).unwrap_err(),
            TransformError::NotPowerOfTwo { len: 100 }
        );
        assert_eq!(
            transform(&[1.0; 16], 8, 4, Direction::Forward).unwrap_err(),
            TransformError::InvalidScale {
                scale: 4,
                log2_len: 4
            }
        );
        assert_eq!(
            transform(&[], 8, 0, Direction::Forward).unwrap_err(),
            TransformError::Empty
        );
        assert_eq!(
            Dwt::new(5, 2).unwrap_err(),
            TransformError::UnsupportedFilterLength(5)
        );
    }

    #[test]
    fn padding_extends_with_zeros() {
        let padded = pad_pow2(&[1.0, 2.0, 3.0]);
        assert_eq!(padded, vec![1.0, 2.0, 3.0, 0.0]);
        assert_eq!(pad_pow2(&[1.0; 8]).len(), 8);
        assert!(pad_pow2(&[]).is_empty());
    }
}
