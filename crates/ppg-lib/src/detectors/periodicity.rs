use super::peaks::local_peaks;
use crate::config::PipelineConfig;
use log::debug;

/// Sample span `[left, right)` of one periodicity chunk inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBounds {
    pub index: usize,
    pub left: usize,
    pub right: usize,
}

impl ChunkBounds {
    pub fn len(&self) -> usize {
        self.right - self.left
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left
    }
}

/// Number of whole chunks between the two overlaps of a block.
pub fn chunk_count(len: usize, overlap: usize, chunk_len: usize) -> usize {
    if chunk_len == 0 {
        return 0;
    }
    len.saturating_sub(2 * overlap) / chunk_len
}

/// Bounds of chunk `index`; the right edge never reaches the final sample.
pub fn chunk_bounds(index: usize, len: usize, overlap: usize, chunk_len: usize) -> ChunkBounds {
    let left = overlap + index * chunk_len;
    let right = (overlap + (index + 1) * chunk_len).min(len.saturating_sub(1));
    ChunkBounds {
        index,
        left,
        right: right.max(left),
    }
}

/// `(x - min)^2` over the chunk, emphasising the systolic peaks.
pub fn amplify(chunk: &[f64]) -> Vec<f64> {
    let min = chunk.iter().copied().fold(f64::INFINITY, f64::min);
    chunk.iter().map(|x| (x - min).powi(2)).collect()
}

/// Biased autocorrelation; entry `tau` sums `x[d] * x[d - tau]` for `d` in `tau..len`.
pub fn autocorrelate(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    (0..n)
        .map(|tau| {
            signal[tau..]
                .iter()
                .zip(signal)
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect()
}

/// Picks the fundamental beat period of a chunk from its autocorrelation.
///
/// The first autocorrelation peak with a plausible lag is the candidate
/// period. A chunk is valid once a later peak sits one more period (within
/// tolerance) after it. Until then, a larger peak with a plausible lag
/// replaces the candidate.
#[derive(Debug, Clone, Copy)]
pub struct PeriodEstimator {
    min_lag: f64,
    max_lag: f64,
    tolerance: usize,
    window: usize,
}

impl PeriodEstimator {
    pub fn new(min_lag: f64, max_lag: f64, tolerance: usize, window: usize) -> Self {
        Self {
            min_lag,
            max_lag,
            tolerance,
            window,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let (min_lag, max_lag) = config.period_bounds();
        Self::new(
            min_lag,
            max_lag,
            config.tolerance_samples(),
            config.odd_peak_window(),
        )
    }

    fn plausible(&self, lag: usize) -> bool {
        let lag = lag as f64;
        lag > self.min_lag && lag < self.max_lag
    }

    /// Period in samples, or `None` when the chunk carries no consistent rhythm.
    pub fn estimate(&self, autocor: &[f64]) -> Option<usize> {
        let mut first: Option<usize> = None;
        for k in local_peaks(autocor, self.window) {
            match first {
                None if self.plausible(k) => {
                    debug!("autocorrelation candidate period {k}");
                    first = Some(k);
                }
                None => debug!("autocorrelation peak dismissed, lag {k}"),
                Some(candidate) => {
                    let spacing = k - candidate;
                    if self.plausible(spacing) && spacing.abs_diff(candidate) < self.tolerance {
                        debug!("period {candidate} confirmed by peak at {k}");
                        return Some(candidate);
                    }
                    if autocor[k] > autocor[candidate] && self.plausible(k) {
                        debug!("candidate period replaced by {k}");
                        first = Some(k);
                    } else {
                        debug!("autocorrelation peak dismissed, spacing {spacing}");
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn pulse_chunk(len: usize, period: f64) -> Vec<f64> {
        (0..len)
            .map(|i| 500.0 * (2.0 * PI * i as f64 / period).cos())
            .collect()
    }

    #[test]
    fn chunks_tile_between_the_overlaps() {
        assert_eq!(chunk_count(1024, 112, 200), 4);
        assert_eq!(chunk_count(200, 112, 200), 0);
        let last = chunk_bounds(3, 1024, 112, 200);
        assert_eq!((last.left, last.right), (712, 912));
        let clipped = chunk_bounds(0, 300, 50, 250);
        assert_eq!((clipped.left, clipped.right), (50, 299));
    }

    #[test]
    fn amplify_is_zero_at_the_minimum() {
        let out = amplify(&[3.0, 1.0, 4.0]);
        assert_eq!(out, vec![4.0, 0.0, 9.0]);
    }

    #[test]
    fn autocorrelation_matches_the_direct_sum() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let ac = autocorrelate(&x);
        assert_eq!(ac, vec![30.0, 20.0, 11.0, 4.0]);
    }

    #[test]
    fn sinusoid_period_is_recovered() {
        let estimator = PeriodEstimator::from_config(&PipelineConfig::default());
        let amplified = amplify(&pulse_chunk(200, 50.0));
        let period = estimator.estimate(&autocorrelate(&amplified)).unwrap();
        assert!((47..=52).contains(&period), "period {period}");
    }

    #[test]
    fn faster_rhythm_is_recovered() {
        let estimator = PeriodEstimator::from_config(&PipelineConfig::default());
        let amplified = amplify(&pulse_chunk(200, 30.0));
        let period = estimator.estimate(&autocorrelate(&amplified)).unwrap();
        assert!((28..=31).contains(&period), "period {period}");
    }

    #[test]
    fn flat_chunk_has_no_period() {
        let estimator = PeriodEstimator::from_config(&PipelineConfig::default());
        let amplified = amplify(&[7.0; 200]);
        assert_eq!(estimator.estimate(&autocorrelate(&amplified)), None);
    }

    #[test]
    fn second_peak_must_match_the_candidate() {
        let estimator = PeriodEstimator::new(15.0, 75.0, 20, 11);
        let mut ac = vec![0.0; 200];
        ac[0] = 10.0;
        ac[30] = 5.0;
        // 30 -> 100 spaces 70, too far from the 30-sample candidate
        ac[100] = 4.0;
        assert_eq!(estimator.estimate(&ac), None);
        ac[55] = 3.0;
        assert_eq!(estimator.estimate(&ac), Some(30));
    }

    #[test]
    fn larger_peak_replaces_the_candidate() {
        let estimator = PeriodEstimator::new(15.0, 75.0, 5, 11);
        let mut ac = vec![0.0; 200];
        ac[20] = 2.0;
        ac[50] = 6.0;
        ac[100] = 4.0;
        assert_eq!(estimator.estimate(&ac), Some(50));
    }
}
