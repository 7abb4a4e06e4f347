use thiserror::Error;

/// Why an incoming line was not folded into the signal buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleError {
    #[error("expected 4 comma-separated fields, found {found}")]
    FieldCount { found: usize },

    #[error("unsupported channel '{0}'")]
    UnknownChannel(String),

    #[error("timestamp is not numeric: '{0}'")]
    InvalidTimestamp(String),

    #[error("value is not numeric: '{0}'")]
    InvalidValue(String),

    #[error("precision is not an integer: '{0}'")]
    InvalidPrecision(String),
}

/// Failures of the discrete wavelet transform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("cannot transform an empty signal")]
    Empty,

    #[error("signal length {len} is not a power of two")]
    NotPowerOfTwo { len: usize },

    #[error("scale {scale} leaves no decomposition level for a signal of 2^{log2_len} samples")]
    InvalidScale { scale: u32, log2_len: u32 },

    #[error("unsupported Daubechies filter length {0} (expected 2, 4, 6 or 8)")]
    UnsupportedFilterLength(usize),
}

/// Reasons a triggered block was dropped without output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("buffer desync: {timestamps} timestamps vs {values} values")]
    BufferDesync { timestamps: usize, values: usize },

    #[error("wavelet transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("signal of {len} samples is too short for a two-sided overlap of {overlap}")]
    ShortSignal { len: usize, overlap: usize },
}

/// Inconsistent pipeline configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sampling rate must be positive")]
    SamplingRate,

    #[error("overlap {overlap} must satisfy 2*overlap < block size {block_size}")]
    Overlap { overlap: usize, block_size: usize },

    #[error("chunk of {chunk} samples does not fit between the overlaps of a {block_size}-sample block")]
    Chunk { chunk: usize, block_size: usize },

    #[error("invalid wavelet settings: {0}")]
    Wavelet(#[from] TransformError),

    #[error("cannot zero {filtered} coefficients of a {len}-sample transform")]
    FilteredCoefficients { filtered: usize, len: usize },

    #[error("period bounds [{min_s}, {max_s}] s are empty")]
    PeriodBounds { min_s: f64, max_s: f64 },

    #[error("HRV limits [{lower_ms}, {upper_ms}] ms are empty")]
    HrvLimits { lower_ms: f64, upper_ms: f64 },

    #[error("timestamp ticks per millisecond must be positive")]
    TicksPerMs,
}

/// Failures of the bounded ingestion queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("ingestion queue is full")]
    Full(String),

    #[error("pipeline worker has stopped")]
    Disconnected,

    #[error("pipeline worker panicked")]
    WorkerPanicked,
}
