use log::debug;

/// Local-maximum test over a window of `2*half + 1` samples clipped to the
/// slice bounds.
///
/// `k` must be the leftmost maximum of its window and strictly larger than
/// both window edges, so a sample sitting on a slice boundary never
/// qualifies.
pub fn is_local_peak(data: &[f64], k: usize, half: usize) -> bool {
    let n = data.len();
    if k >= n {
        return false;
    }
    let left = k.saturating_sub(half);
    let right = (k + half).min(n - 1);
    if left == k || right == k {
        return false;
    }
    let x = data[k];
    data[left..k].iter().all(|&v| v < x)
        && data[k + 1..=right].iter().all(|&v| v <= x)
        && data[right] < x
}

/// Positions of every local peak, scanning left to right.
pub fn local_peaks(data: &[f64], window: usize) -> impl Iterator<Item = usize> + '_ {
    let half = window / 2;
    (0..data.len()).filter(move |&k| is_local_peak(data, k, half))
}

/// Beat tracker constrained to the neighborhood `[last + T - θ, last + T + θ]`
/// of the previous accepted beat.
#[derive(Debug, Clone)]
pub struct PeakTracker {
    neighborhood: usize,
    window: usize,
    last_peak: Option<usize>,
}

impl PeakTracker {
    pub fn new(neighborhood: usize, window: usize) -> Self {
        Self {
            neighborhood,
            window,
            last_peak: None,
        }
    }

    pub fn last_peak(&self) -> Option<usize> {
        self.last_peak
    }

    /// Break period continuity, e.g. after a chunk without a valid period.
    pub fn reset(&mut self) {
        self.last_peak = None;
    }

    /// Scan an amplified chunk starting at block index `left` and return the
    /// accepted beat positions as block indices.
    ///
    /// The first peak after a reset only anchors the neighborhood and is not
    /// returned.
    pub fn track(&mut self, amplified: &[f64], left: usize, period: usize) -> Vec<usize> {
        let mut accepted = Vec::new();
        for local in local_peaks(amplified, self.window) {
            let k = left + local;
            match self.last_peak {
                None => {
                    debug!("anchor beat at {k}");
                    self.last_peak = Some(k);
                }
                Some(last) => {
                    let lo = (last + period).saturating_sub(self.neighborhood);
                    let hi = last + period + self.neighborhood;
                    if (lo..=hi).contains(&k) {
                        debug!("beat accepted at {k} (window {lo}..={hi})");
                        self.last_peak = Some(k);
                        accepted.push(k);
                    } else {
                        debug!("beat dismissed at {k}, outside {lo}..={hi}");
                    }
                }
            }
        }
        accepted
    }
}
