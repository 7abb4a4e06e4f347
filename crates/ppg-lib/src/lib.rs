pub mod buffer;
pub mod config;
pub mod detectors;
pub mod error;
pub mod filters;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod plot;
pub mod queue;
pub mod signal;
pub mod simulate;
pub mod wavelet;

pub use config::PipelineConfig;
pub use detectors::*;
pub use error::*;
pub use metrics::*;
pub use pipeline::{IngestOutcome, MemorySink, Pipeline, PipelineSink, PipelineStats};
pub use signal::*;
