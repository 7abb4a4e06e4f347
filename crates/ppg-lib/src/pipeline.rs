//! The streaming PPG pipeline: buffer, denoise, detrend, detect, HRV.
//!
//! A [`Pipeline`] owns every piece of mutable state (signal buffer, HRV
//! bookkeeping, counters). Samples go in one at a time through
//! [`Pipeline::ingest`]; whenever a block completes it is processed
//! synchronously and results leave through a caller-owned [`PipelineSink`].

use crate::buffer::{ProcessingBlock, SignalBuffer};
use crate::config::PipelineConfig;
use crate::detectors::BeatDetector;
use crate::error::{BlockError, ConfigError, SampleError};
use crate::filters::{detrend, emission_range, Denoiser};
use crate::metrics::hrv::{HrvCalculator, HrvState};
use crate::signal::{Channel, PeakRecord, Sample};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Receiver of everything the pipeline emits.
pub trait PipelineSink {
    /// One denoised sample, in stream order.
    fn on_denoised_sample(&mut self, value: f64);

    /// Every accepted beat, valid HRV or not.
    fn on_peak(&mut self, record: &PeakRecord);

    /// Beats whose interval fell inside the plausible range.
    fn on_valid_hrv(&mut self, _record: &PeakRecord) {}

    /// Heart-rate samples reported by the sensor itself.
    fn on_heart_rate(&mut self, _sample: &Sample) {}
}

impl<S: PipelineSink + ?Sized> PipelineSink for &mut S {
    fn on_denoised_sample(&mut self, value: f64) {
        (**self).on_denoised_sample(value);
    }
    fn on_peak(&mut self, record: &PeakRecord) {
        (**self).on_peak(record);
    }
    fn on_valid_hrv(&mut self, record: &PeakRecord) {
        (**self).on_valid_hrv(record);
    }
    fn on_heart_rate(&mut self, sample: &Sample) {
        (**self).on_heart_rate(sample);
    }
}

impl<S: PipelineSink + ?Sized> PipelineSink for Box<S> {
    fn on_denoised_sample(&mut self, value: f64) {
        (**self).on_denoised_sample(value);
    }
    fn on_peak(&mut self, record: &PeakRecord) {
        (**self).on_peak(record);
    }
    fn on_valid_hrv(&mut self, record: &PeakRecord) {
        (**self).on_valid_hrv(record);
    }
    fn on_heart_rate(&mut self, sample: &Sample) {
        (**self).on_heart_rate(sample);
    }
}

impl<A: PipelineSink, B: PipelineSink> PipelineSink for (A, B) {
    fn on_denoised_sample(&mut self, value: f64) {
        self.0.on_denoised_sample(value);
        self.1.on_denoised_sample(value);
    }
    fn on_peak(&mut self, record: &PeakRecord) {
        self.0.on_peak(record);
        self.1.on_peak(record);
    }
    fn on_valid_hrv(&mut self, record: &PeakRecord) {
        self.0.on_valid_hrv(record);
        self.1.on_valid_hrv(record);
    }
    fn on_heart_rate(&mut self, sample: &Sample) {
        self.0.on_heart_rate(sample);
        self.1.on_heart_rate(sample);
    }
}

/// Sink that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub denoised: Vec<f64>,
    pub peaks: Vec<PeakRecord>,
    pub valid: Vec<PeakRecord>,
    pub heart_rate: Vec<Sample>,
}

impl PipelineSink for MemorySink {
    fn on_denoised_sample(&mut self, value: f64) {
        self.denoised.push(value);
    }
    fn on_peak(&mut self, record: &PeakRecord) {
        self.peaks.push(record.clone());
    }
    fn on_valid_hrv(&mut self, record: &PeakRecord) {
        self.valid.push(record.clone());
    }
    fn on_heart_rate(&mut self, sample: &Sample) {
        self.heart_rate.push(sample.clone());
    }
}

/// Summary of one processed block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockReport {
    pub stream_offset: u64,
    pub first_block: bool,
    pub chunks: usize,
    pub valid_chunks: usize,
    pub emitted_samples: usize,
    pub peaks: usize,
    pub valid_hrv: usize,
}

/// What happened to one ingested sample.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Folded into the buffer; no block completed.
    Buffered,
    /// Heart-rate sample passed through to the sink.
    HeartRate,
    /// Rejected before reaching the buffer.
    Skipped(SampleError),
    /// Completed a block that was processed.
    Processed(BlockReport),
    /// Completed a block that produced no output.
    Dropped(BlockError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub ppg_samples: u64,
    pub heart_rate_samples: u64,
    pub skipped: u64,
    pub blocks: u64,
    pub dropped_blocks: u64,
    pub desyncs: u64,
    pub denoised_samples: u64,
    pub peaks: u64,
    pub valid_hrv: u64,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    buffer: SignalBuffer,
    denoiser: Denoiser,
    detector: BeatDetector,
    hrv: HrvCalculator,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let denoiser = Denoiser::from_config(&config)?;
        Ok(Self {
            buffer: SignalBuffer::new(config.block_size, config.overlap),
            detector: BeatDetector::from_config(&config),
            hrv: HrvCalculator::from_config(&config),
            stats: PipelineStats::default(),
            denoiser,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn hrv_state(&self) -> HrvState {
        self.hrv.state()
    }

    pub fn buffer(&self) -> &SignalBuffer {
        &self.buffer
    }

    /// Start a new session: empty buffer, no previous beat, zeroed counters.
    pub fn reset_session(&mut self) {
        self.buffer = SignalBuffer::new(self.config.block_size, self.config.overlap);
        self.hrv.reset();
        self.stats = PipelineStats::default();
    }

    /// Parse and ingest one recorder line.
    pub fn ingest_line<S: PipelineSink + ?Sized>(
        &mut self,
        line: &str,
        sink: &mut S,
    ) -> IngestOutcome {
        match Sample::parse_line(line) {
            Ok(sample) => self.ingest(sample, sink),
            Err(err) => self.skip(line, err),
        }
    }

    /// Ingest one sample given as raw fields.
    pub fn ingest_fields<S: PipelineSink + ?Sized>(
        &mut self,
        channel: Channel,
        timestamp: &str,
        value: &str,
        precision: i32,
        sink: &mut S,
    ) -> IngestOutcome {
        match Sample::from_fields(channel, timestamp, value, precision) {
            Ok(sample) => self.ingest(sample, sink),
            Err(err) => self.skip(timestamp, err),
        }
    }

    pub fn ingest<S: PipelineSink + ?Sized>(&mut self, sample: Sample, sink: &mut S) -> IngestOutcome {
        match sample.channel {
            Channel::HeartRate => {
                self.stats.heart_rate_samples += 1;
                debug!("HR {} at {}", sample.value, sample.timestamp);
                sink.on_heart_rate(&sample);
                IngestOutcome::HeartRate
            }
            Channel::Other(ref tag) => {
                let err = SampleError::UnknownChannel(tag.clone());
                self.skip(&sample.timestamp, err)
            }
            Channel::Ppg => {
                self.stats.ppg_samples += 1;
                self.buffer.push(sample.timestamp, sample.value);
                match self.buffer.take_block() {
                    None => IngestOutcome::Buffered,
                    Some(Ok(block)) => match self.process_block(&block, sink) {
                        Ok(report) => IngestOutcome::Processed(report),
                        Err(err) => {
                            warn!("block at {} dropped: {err}", block.stream_offset);
                            self.stats.dropped_blocks += 1;
                            self.buffer.reset();
                            IngestOutcome::Dropped(err)
                        }
                    },
                    Some(Err(err)) => {
                        warn!("{err}; buffers cleared");
                        self.stats.desyncs += 1;
                        self.stats.dropped_blocks += 1;
                        IngestOutcome::Dropped(err)
                    }
                }
            }
        }
    }

    fn skip(&mut self, context: &str, err: SampleError) -> IngestOutcome {
        self.stats.skipped += 1;
        warn!("skipping '{context}': {err}");
        IngestOutcome::Skipped(err)
    }

    /// Denoise, detrend and scan one block, then emit its outputs.
    pub fn process_block<S: PipelineSink + ?Sized>(
        &mut self,
        block: &ProcessingBlock,
        sink: &mut S,
    ) -> Result<BlockReport, BlockError> {
        let n = block.len();
        let overlap = self.config.overlap;
        if n < 2 * overlap {
            return Err(BlockError::ShortSignal { len: n, overlap });
        }
        if block.timestamps.len() != n {
            return Err(BlockError::BufferDesync {
                timestamps: block.timestamps.len(),
                values: n,
            });
        }

        let denoised = self.denoiser.denoise(&block.values)?;
        let mut trend_free = denoised[..n].to_vec();
        detrend(&mut trend_free, self.config.trend_window());
        let detection = self.detector.detect(&trend_free);

        let range = emission_range(
            block.first_block,
            overlap,
            detection.chunks,
            self.config.chunk_len(),
            n,
        );
        let emitted_samples = range.len();
        for &value in &denoised[range] {
            sink.on_denoised_sample(value);
        }

        let mut valid_hrv = 0;
        for &k in &detection.peaks {
            let timestamp = &block.timestamps[k];
            let observation = self.hrv.observe(timestamp);
            let record = PeakRecord {
                stream_index: block.stream_offset + k as u64,
                block_index: k,
                timestamp: timestamp.clone(),
                hrv: observation.hrv,
                valid: observation.valid,
            };
            sink.on_peak(&record);
            if record.valid {
                valid_hrv += 1;
                sink.on_valid_hrv(&record);
            }
        }

        let report = BlockReport {
            stream_offset: block.stream_offset,
            first_block: block.first_block,
            chunks: detection.chunks,
            valid_chunks: detection.valid_chunks,
            emitted_samples,
            peaks: detection.peaks.len(),
            valid_hrv,
        };
        self.stats.blocks += 1;
        self.stats.denoised_samples += emitted_samples as u64;
        self.stats.peaks += report.peaks as u64;
        self.stats.valid_hrv += valid_hrv as u64;
        info!(
            "block at {}: {}/{} valid chunks, {} peaks, {} valid HRV",
            report.stream_offset, report.valid_chunks, report.chunks, report.peaks, valid_hrv
        );
        Ok(report)
    }

    #[cfg(test)]
    pub(crate) fn buffer_mut(&mut self) -> &mut SignalBuffer {
        &mut self.buffer
    }
}
