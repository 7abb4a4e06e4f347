//! Baseline and adaptation values for HR/HRV biofeedback sessions.
//!
//! The tracker is driven by sample timestamps rather than a wall clock: it
//! first aggregates a baseline window, then reports one adaptation value per
//! calculation interval from the values gathered since the previous report.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdaptationGoal {
    #[default]
    None,
    /// Bring the mean heart rate below the baseline.
    DecreaseHr,
    /// Widen the HRV range (max - min) beyond the baseline.
    MaximizeHrv,
}

impl AdaptationGoal {
    pub fn aggregation(&self) -> Option<Aggregation> {
        match self {
            AdaptationGoal::None => None,
            AdaptationGoal::DecreaseHr => Some(Aggregation::Mean),
            AdaptationGoal::MaximizeHrv => Some(Aggregation::MaxMinDifference),
        }
    }
}

impl FromStr for AdaptationGoal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(AdaptationGoal::None),
            "decrease-hr" => Ok(AdaptationGoal::DecreaseHr),
            "maximize-hrv" => Ok(AdaptationGoal::MaximizeHrv),
            other => Err(format!(
                "unknown goal '{other}' (expected none, decrease-hr or maximize-hrv)"
            )),
        }
    }
}

impl fmt::Display for AdaptationGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AdaptationGoal::None => "none",
            AdaptationGoal::DecreaseHr => "decrease-hr",
            AdaptationGoal::MaximizeHrv => "maximize-hrv",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    Mean,
    MaxMinDifference,
}

impl Aggregation {
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(match self {
            Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::MaxMinDifference => {
                let max = values.iter().copied().fold(f64::MIN, f64::max);
                let min = values.iter().copied().fold(f64::MAX, f64::min);
                max - min
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiofeedbackConfig {
    pub baseline_s: f64,
    pub interval_s: f64,
    /// Relative HR reduction aimed for by `DecreaseHr`.
    pub decrease_hr_threshold: f64,
    /// Relative HRV range increase aimed for by `MaximizeHrv`.
    pub maximize_hrv_threshold: f64,
}

impl Default for BiofeedbackConfig {
    fn default() -> Self {
        Self {
            baseline_s: 15.0,
            interval_s: 5.0,
            decrease_hr_threshold: 0.1,
            maximize_hrv_threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BiofeedbackEvent {
    BaselineRestarted { at_s: f64 },
    BaselineSet { at_s: f64, baseline: f64, target: f64 },
    Adaptation { at_s: f64, value: f64, baseline: f64, target: f64 },
    NoData { at_s: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Baseline,
    Adapting,
}

#[derive(Debug, Clone)]
pub struct BiofeedbackTracker {
    goal: AdaptationGoal,
    config: BiofeedbackConfig,
    phase: Phase,
    phase_start: Option<f64>,
    values: Vec<f64>,
    baseline: Option<(f64, f64)>,
}

impl BiofeedbackTracker {
    pub fn new(goal: AdaptationGoal, config: BiofeedbackConfig) -> Self {
        Self {
            goal,
            config,
            phase: Phase::Baseline,
            phase_start: None,
            values: Vec::new(),
            baseline: None,
        }
    }

    /// Baseline and target once the baseline window has completed.
    pub fn baseline(&self) -> Option<(f64, f64)> {
        self.baseline
    }

    pub fn observe_heart_rate(&mut self, at_s: f64, bpm: f64) -> Option<BiofeedbackEvent> {
        if self.goal == AdaptationGoal::DecreaseHr {
            self.values.push(bpm);
        }
        self.advance(at_s)
    }

    pub fn observe_hrv(&mut self, at_s: f64, hrv_ms: f64) -> Option<BiofeedbackEvent> {
        if self.goal == AdaptationGoal::MaximizeHrv {
            self.values.push(hrv_ms);
        }
        self.advance(at_s)
    }

    /// Move the clock to `now_s`, closing the current window if it elapsed.
    pub fn advance(&mut self, now_s: f64) -> Option<BiofeedbackEvent> {
        let aggregation = self.goal.aggregation()?;
        let start = *self.phase_start.get_or_insert(now_s);
        let elapsed = now_s - start;
        match self.phase {
            Phase::Baseline if elapsed >= self.config.baseline_s => {
                self.phase_start = Some(now_s);
                let Some(baseline) = aggregation.apply(&self.values) else {
                    warn!("no data for the biofeedback baseline, restarting");
                    return Some(BiofeedbackEvent::BaselineRestarted { at_s: now_s });
                };
                self.values.clear();
                let target = match self.goal {
                    AdaptationGoal::DecreaseHr => {
                        (1.0 - self.config.decrease_hr_threshold) * baseline
                    }
                    _ => (1.0 + self.config.maximize_hrv_threshold) * baseline,
                };
                info!("biofeedback baseline {baseline:.1}, target {target:.1}");
                self.baseline = Some((baseline, target));
                self.phase = Phase::Adapting;
                Some(BiofeedbackEvent::BaselineSet {
                    at_s: now_s,
                    baseline,
                    target,
                })
            }
            Phase::Adapting if elapsed >= self.config.interval_s => {
                self.phase_start = Some(now_s);
                let (baseline, target) = self.baseline?;
                let event = match aggregation.apply(&self.values) {
                    Some(value) => BiofeedbackEvent::Adaptation {
                        at_s: now_s,
                        value,
                        baseline,
                        target,
                    },
                    None => BiofeedbackEvent::NoData { at_s: now_s },
                };
                self.values.clear();
                Some(event)
            }
            _ => None,
        }
    }
}
