pub mod peaks;
pub mod periodicity;

pub use peaks::{is_local_peak, local_peaks, PeakTracker};
pub use periodicity::{
    amplify, autocorrelate, chunk_bounds, chunk_count, ChunkBounds, PeriodEstimator,
};

use crate::config::PipelineConfig;
use log::debug;
use serde::{Deserialize, Serialize};

/// Beats found in one block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockDetection {
    /// Accepted beat positions (block indices), in chunk order.
    pub peaks: Vec<usize>,
    pub chunks: usize,
    pub valid_chunks: usize,
}

/// Chunk-wise beat detection over a detrended block.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    overlap: usize,
    chunk_len: usize,
    neighborhood: usize,
    window: usize,
    estimator: PeriodEstimator,
}

impl BeatDetector {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            overlap: config.overlap,
            chunk_len: config.chunk_len(),
            neighborhood: config.neighborhood_samples(),
            window: config.odd_peak_window(),
            estimator: PeriodEstimator::from_config(config),
        }
    }

    pub fn chunk_count(&self, len: usize) -> usize {
        chunk_count(len, self.overlap, self.chunk_len)
    }

    /// Run the periodicity estimator and the beat tracker chunk by chunk.
    ///
    /// Beat tracking state starts fresh for every block and is reset by any
    /// chunk without a confirmed period.
    pub fn detect(&self, signal: &[f64]) -> BlockDetection {
        let chunks = self.chunk_count(signal.len());
        let mut tracker = PeakTracker::new(self.neighborhood, self.window);
        let mut detection = BlockDetection {
            chunks,
            ..BlockDetection::default()
        };
        for index in 0..chunks {
            let bounds = chunk_bounds(index, signal.len(), self.overlap, self.chunk_len);
            let amplified = amplify(&signal[bounds.left..bounds.right]);
            let autocor = autocorrelate(&amplified);
            match self.estimator.estimate(&autocor) {
                Some(period) => {
                    debug!(
                        "chunk {index} [{}, {}) valid, period {period} samples",
                        bounds.left, bounds.right
                    );
                    detection.valid_chunks += 1;
                    let beats = tracker.track(&amplified, bounds.left, period);
                    detection.peaks.extend(beats);
                }
                None => {
                    debug!("chunk {index} [{}, {}) invalid", bounds.left, bounds.right);
                    tracker.reset();
                }
            }
        }
        detection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn beats(len: usize, period: f64, phase: f64) -> Vec<f64> {
        (0..len)
            .map(|i| 500.0 * (2.0 * PI * (i as f64 - phase) / period).cos())
            .collect()
    }

    #[test]
    fn clean_rhythm_yields_evenly_spaced_beats() {
        let detector = BeatDetector::from_config(&PipelineConfig::default());
        let detection = detector.detect(&beats(1024, 50.0, 37.0));
        assert_eq!(detection.chunks, 4);
        assert_eq!(detection.valid_chunks, 4);
        // Beats sit at 37 mod 50; 137 anchors and is not reported.
        assert_eq!(detection.peaks.first(), Some(&187));
        assert_eq!(detection.peaks.last(), Some(&887));
        assert_eq!(detection.peaks.len(), 15);
        for pair in detection.peaks.windows(2) {
            assert_eq!(pair[1] - pair[0], 50);
        }
    }

    #[test]
    fn invalid_chunk_breaks_continuity() {
        let detector = BeatDetector::from_config(&PipelineConfig::default());
        let mut signal = beats(1024, 50.0, 37.0);
        // Flatten chunk 1 ([312, 512)).
        for x in &mut signal[312..512] {
            *x = 0.0;
        }
        let detection = detector.detect(&signal);
        assert_eq!(detection.valid_chunks, 3);
        // Chunk 2 re-anchors on 537, so its first reported beat is 587.
        assert!(detection.peaks.contains(&287));
        assert!(!detection.peaks.contains(&537));
        assert!(detection.peaks.contains(&587));
    }

    #[test]
    fn beat_on_a_chunk_edge_stalls_the_tracker() {
        let detector = BeatDetector::from_config(&PipelineConfig::default());
        // Beats at 12 mod 50: the one at 312 is the first sample of chunk 1,
        // so it can never be a local peak and the window stays on 262.
        let detection = detector.detect(&beats(1024, 50.0, 12.0));
        assert_eq!(detection.valid_chunks, 4);
        assert_eq!(detection.peaks, vec![212, 262]);
    }

    #[test]
    fn short_block_has_no_chunks() {
        let detector = BeatDetector::from_config(&PipelineConfig::default());
        let detection = detector.detect(&beats(300, 50.0, 0.0));
        assert_eq!(detection.chunks, 0);
        assert!(detection.peaks.is_empty());
    }
}
