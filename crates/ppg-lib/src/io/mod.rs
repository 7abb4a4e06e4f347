pub mod recording;
pub mod sink;

pub use recording::{read_recording, recording_lines, stream_recording, write_recording};
pub use sink::{read_peaks_csv, CsvSink};
