use crate::pipeline::PipelineSink;
use crate::signal::PeakRecord;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, Writer, WriterBuilder};
use log::error;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const PEAK_COLUMNS: [&str; 5] = ["stream_index", "block_index", "timestamp", "hrv", "valid"];

/// Writes the denoised signal and the peak records as CSV.
///
/// Write failures never surface inside a callback; the first one is kept
/// and returned by [`CsvSink::finish`].
pub struct CsvSink<W: Write> {
    denoised: Option<Writer<W>>,
    peaks: Option<Writer<W>>,
    error: Option<csv::Error>,
}

impl CsvSink<File> {
    pub fn create(denoised: Option<&Path>, peaks: Option<&Path>) -> Result<Self> {
        let open = |path: &Path| {
            File::create(path).with_context(|| format!("failed to create {}", path.display()))
        };
        Self::from_writers(
            denoised.map(open).transpose()?,
            peaks.map(open).transpose()?,
        )
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writers(denoised: Option<W>, peaks: Option<W>) -> Result<Self> {
        let builder = {
            let mut b = WriterBuilder::new();
            b.has_headers(false);
            b
        };
        let denoised = match denoised {
            Some(inner) => {
                let mut writer = builder.from_writer(inner);
                writer.write_record(["denoised"])?;
                Some(writer)
            }
            None => None,
        };
        let peaks = match peaks {
            Some(inner) => {
                let mut writer = builder.from_writer(inner);
                writer.write_record(PEAK_COLUMNS)?;
                Some(writer)
            }
            None => None,
        };
        Ok(Self {
            denoised,
            peaks,
            error: None,
        })
    }

    fn keep(&mut self, result: csv::Result<()>) {
        if let Err(err) = result {
            if self.error.is_none() {
                error!("CSV sink write failed: {err}");
                self.error = Some(err);
            }
        }
    }

    /// Flush both outputs and hand back the underlying writers.
    pub fn finish(self) -> Result<(Option<W>, Option<W>)> {
        if let Some(err) = self.error {
            return Err(err).context("writing pipeline output");
        }
        let denoised = self
            .denoised
            .map(|w| w.into_inner().map_err(|e| e.into_error()))
            .transpose()
            .context("flushing denoised output")?;
        let peaks = self
            .peaks
            .map(|w| w.into_inner().map_err(|e| e.into_error()))
            .transpose()
            .context("flushing peaks output")?;
        Ok((denoised, peaks))
    }
}

impl<W: Write> PipelineSink for CsvSink<W> {
    fn on_denoised_sample(&mut self, value: f64) {
        if let Some(writer) = self.denoised.as_mut() {
            let result = writer.serialize(value);
            self.keep(result);
        }
    }

    fn on_peak(&mut self, record: &PeakRecord) {
        if let Some(writer) = self.peaks.as_mut() {
            let result = writer.serialize(record);
            self.keep(result);
        }
    }
}

/// Load peak records written by [`CsvSink`].
pub fn read_peaks_csv(path: &Path) -> Result<Vec<PeakRecord>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening peaks {}", path.display()))?;
    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<PeakRecord>().enumerate() {
        let row = row.with_context(|| format!("parsing peak row {}", idx + 1))?;
        records.push(row);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn record(stream_index: u64, hrv: f64, valid: bool) -> PeakRecord {
        PeakRecord {
            stream_index,
            block_index: stream_index as usize,
            timestamp: format!("{}", 1_000_000 + stream_index * 20_000),
            hrv,
            valid,
        }
    }

    #[test]
    fn writes_headers_and_rows() {
        let mut sink = CsvSink::from_writers(Some(Vec::new()), Some(Vec::new())).unwrap();
        sink.on_denoised_sample(1.5);
        sink.on_denoised_sample(-0.25);
        sink.on_peak(&record(187, 0.0, false));
        sink.on_peak(&record(237, 1_000_000.0, true));
        let (denoised, peaks) = sink.finish().unwrap();
        let denoised = String::from_utf8(denoised.unwrap()).unwrap();
        assert_eq!(denoised, "denoised\n1.5\n-0.25\n");
        let peaks = String::from_utf8(peaks.unwrap()).unwrap();
        let mut lines = peaks.lines();
        assert_eq!(lines.next(), Some("stream_index,block_index,timestamp,hrv,valid"));
        assert_eq!(lines.next(), Some("187,187,4740000,0.0,false"));
        assert_eq!(lines.next(), Some("237,237,5740000,1000000.0,true"));
    }

    #[test]
    fn peaks_round_trip_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peaks.csv");
        let mut sink = CsvSink::create(None, Some(&path)).unwrap();
        let written = vec![record(187, 0.0, false), record(237, 1_000_000.0, true)];
        for r in &written {
            sink.on_peak(r);
        }
        sink.finish().unwrap();
        assert_eq!(read_peaks_csv(&path).unwrap(), written);
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_errors_surface_at_finish() {
        // The header only reaches the inner writer on flush, so build the
        // sink over a writer that fails once the buffer spills.
        let mut sink = CsvSink::from_writers(Some(Broken), None).unwrap();
        for i in 0..100_000 {
            sink.on_denoised_sample(i as f64);
        }
        assert!(sink.finish().is_err());
    }
}
