use crate::error::BlockError;

/// A fixed-size extraction of the signal buffer, ready for processing.
#[derive(Debug, Clone)]
pub struct ProcessingBlock {
    pub values: Vec<f64>,
    pub timestamps: Vec<String>,
    /// Whether the leading overlap has never been emitted before.
    pub first_block: bool,
    /// Stream position of `values[0]`.
    pub stream_offset: u64,
}

impl ProcessingBlock {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Parallel timestamp/value accumulator that triggers fixed-size blocks and
/// keeps a `2*overlap` tail as context for the next one.
#[derive(Debug, Clone)]
pub struct SignalBuffer {
    timestamps: Vec<String>,
    values: Vec<f64>,
    block_size: usize,
    overlap: usize,
    first_block: bool,
    stream_offset: u64,
}

impl SignalBuffer {
    pub fn new(block_size: usize, overlap: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(block_size),
            values: Vec::with_capacity(block_size),
            block_size,
            overlap,
            first_block: true,
            stream_offset: 0,
        }
    }

    pub fn push(&mut self, timestamp: String, value: f64) {
        self.timestamps.push(timestamp);
        self.values.push(value);
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.block_size
    }

    /// Extract a block once `block_size` values are buffered.
    ///
    /// On success only the last `2*overlap` samples stay buffered. If the
    /// timestamp and value sequences disagree in length both are cleared and
    /// the desync is returned.
    pub fn take_block(&mut self) -> Option<Result<ProcessingBlock, BlockError>> {
        if !self.is_full() {
            return None;
        }
        if self.timestamps.len() != self.values.len() {
            let err = BlockError::BufferDesync {
                timestamps: self.timestamps.len(),
                values: self.values.len(),
            };
            self.reset();
            return Some(Err(err));
        }
        let block = ProcessingBlock {
            values: self.values.clone(),
            timestamps: self.timestamps.clone(),
            first_block: self.first_block,
            stream_offset: self.stream_offset,
        };
        let keep = (2 * self.overlap).min(self.values.len());
        let drop = self.values.len() - keep;
        self.values.drain(..drop);
        self.timestamps.drain(..drop);
        self.stream_offset += drop as u64;
        self.first_block = false;
        Some(Ok(block))
    }

    /// Drop all buffered context. The next block emits its leading overlap
    /// again since nothing before it survives.
    pub fn reset(&mut self) {
        self.stream_offset += self.values.len() as u64;
        self.timestamps.clear();
        self.values.clear();
        self.first_block = true;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn timestamps(&self) -> &[String] {
        &self.timestamps
    }

    /// Stream position the next pushed sample will get.
    pub fn next_stream_index(&self) -> u64 {
        self.stream_offset + self.values.len() as u64
    }

    #[cfg(test)]
    pub(crate) fn drop_last_timestamp(&mut self) {
        self.timestamps.pop();
    }
}
