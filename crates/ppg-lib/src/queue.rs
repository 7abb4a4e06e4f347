//! Bounded ingestion queue in front of a [`Pipeline`].
//!
//! The pipeline and its sink move onto a worker thread. Producers push raw
//! recorder lines; the worker ingests them strictly in order, so a block
//! still runs to completion before the next sample is folded in. When the
//! queue is full `push` waits and `try_push` hands the line back.

use crate::error::QueueError;
use crate::pipeline::{Pipeline, PipelineSink, PipelineStats};
use crossbeam_channel::{bounded, Sender, TrySendError};
use log::debug;
use std::thread::JoinHandle;

pub struct QueuedPipeline<S> {
    tx: Sender<String>,
    worker: JoinHandle<(Pipeline, S)>,
}

/// Everything handed back once the queue drained.
pub struct Finished<S> {
    pub pipeline: Pipeline,
    pub sink: S,
    pub stats: PipelineStats,
}

pub fn spawn_pipeline<S>(mut pipeline: Pipeline, mut sink: S, capacity: usize) -> QueuedPipeline<S>
where
    S: PipelineSink + Send + 'static,
{
    let (tx, rx) = bounded::<String>(capacity.max(1));
    let worker = std::thread::spawn(move || {
        for line in rx.iter() {
            pipeline.ingest_line(&line, &mut sink);
        }
        debug!("ingestion queue closed");
        (pipeline, sink)
    });
    QueuedPipeline { tx, worker }
}

impl<S> QueuedPipeline<S> {
    /// Enqueue a line, waiting for room.
    pub fn push(&self, line: impl Into<String>) -> Result<(), QueueError> {
        self.tx
            .send(line.into())
            .map_err(|_| QueueError::Disconnected)
    }

    /// Enqueue a line without waiting; a full queue returns the line.
    pub fn try_push(&self, line: impl Into<String>) -> Result<(), QueueError> {
        self.tx.try_send(line.into()).map_err(|err| match err {
            TrySendError::Full(line) => QueueError::Full(line),
            TrySendError::Disconnected(_) => QueueError::Disconnected,
        })
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Close the queue, wait for the worker to drain it and take back the pipeline.
    pub fn finish(self) -> Result<Finished<S>, QueueError> {
        drop(self.tx);
        let (pipeline, sink) = self.worker.join().map_err(|_| QueueError::WorkerPanicked)?;
        let stats = pipeline.stats().clone();
        Ok(Finished {
            pipeline,
            sink,
            stats,
        })
    }
}
