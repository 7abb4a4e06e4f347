use anyhow::{bail, Context, Result};
use std::fs;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

fn is_sample_line(line: &str) -> bool {
    !line.is_empty() && !line.starts_with('#')
}

/// Sample lines of a recorder log, skipping blank lines and `#` comments.
pub fn recording_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| is_sample_line(line))
}

/// Sample lines pulled from a live reader one at a time, as they arrive.
pub fn stream_recording<R: BufRead>(reader: R) -> impl Iterator<Item = io::Result<String>> {
    reader.lines().filter_map(|line| match line {
        Ok(line) => {
            let line = line.trim();
            is_sample_line(line).then(|| Ok(line.to_string()))
        }
        Err(err) => Some(Err(err)),
    })
}

/// Read a recorder log (`CHANNEL,timestamp,value,precision` per line).
///
/// Lines are returned untouched apart from trimming; malformed ones are left
/// for the pipeline to classify.
pub fn read_recording(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read recording {}", path.display()))?;
    let lines: Vec<String> = recording_lines(&text).map(str::to_string).collect();
    if lines.is_empty() {
        bail!("no samples found in {}", path.display());
    }
    Ok(lines)
}

pub fn write_recording<I, L>(path: &Path, lines: I) -> Result<()>
where
    I: IntoIterator<Item = L>,
    L: AsRef<str>,
{
    let file = fs::File::create(path)
        .with_context(|| format!("failed to create recording {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for line in lines {
        writeln!(out, "{}", line.as_ref())?;
    }
    out.flush()
        .with_context(|| format!("failed to write recording {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_and_comment_lines() {
        let text = "# recorder v2\nPPG,1,2.0,2\n\n  HR,2,70.00,2  \nPPG,123\n";
        let lines: Vec<&str> = recording_lines(text).collect();
        assert_eq!(lines, vec!["PPG,1,2.0,2", "HR,2,70.00,2", "PPG,123"]);
    }

    #[test]
    fn streams_lines_from_a_reader() {
        let reader = io::Cursor::new("# live\nPPG,1,2.0,2\n\n HR,2,70.00,2\n");
        let lines: Vec<String> = stream_recording(reader).collect::<io::Result<_>>().unwrap();
        assert_eq!(lines, vec!["PPG,1,2.0,2", "HR,2,70.00,2"]);
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        write_recording(&path, ["PPG,1,2.00,2", "PPG,2,3.00,2"]).unwrap();
        let lines = read_recording(&path).unwrap();
        assert_eq!(lines, vec!["PPG,1,2.00,2", "PPG,2,3.00,2"]);
    }

    #[test]
    fn empty_recording_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(&path, "# nothing\n\n").unwrap();
        assert!(read_recording(&path).is_err());
    }
}
