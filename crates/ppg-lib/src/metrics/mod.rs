pub mod biofeedback;
pub mod hrv;

pub use biofeedback::{
    AdaptationGoal, Aggregation, BiofeedbackConfig, BiofeedbackEvent, BiofeedbackTracker,
};
pub use hrv::{
    hrv_psd, hrv_summary, hrv_time, HRVPsd, HRVTime, HrvCalculator, HrvObservation, HrvState,
    HrvSummary,
};
