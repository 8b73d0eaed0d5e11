//! Session record files.
//!
//! One line per sample, in acquisition order:
//!
//! ```text
//! <unix seconds, 6 decimals>\t<power dBm, 2 decimals>
//! ```

use chrono::Timelike;
use sampler_common::error::{AnalysisError, SamplerError, SamplerResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One timed power measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds since the Unix epoch.
    pub unix_timestamp: f64,
    /// Calibrated total power in dBm.
    pub power_dbm: f64,
}

/// Destination for samples produced by a session.
pub trait SampleSink {
    /// Append one sample.
    fn append(&mut self, sample: &Sample) -> SamplerResult<()>;

    /// Push buffered samples to the backing store.
    fn flush(&mut self) -> SamplerResult<()> {
        Ok(())
    }
}

impl SampleSink for Vec<Sample> {
    fn append(&mut self, sample: &Sample) -> SamplerResult<()> {
        self.push(*sample);
        Ok(())
    }
}

/// Writes samples in the tab-separated record format.
#[derive(Debug)]
pub struct RecordWriter<W: Write> {
    out: W,
    written: u64,
}

impl<W: Write> RecordWriter<W> {
    /// Wrap an arbitrary writer.
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    /// Number of samples appended so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and return the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::Sink`] if the final flush fails.
    pub fn into_inner(mut self) -> SamplerResult<W> {
        self.out.flush().map_err(SamplerError::Sink)?;
        Ok(self.out)
    }
}

impl RecordWriter<BufWriter<File>> {
    /// Create (truncating) a record file.
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::OutputFile`] if the file cannot be created.
    pub fn create(path: &Path) -> SamplerResult<Self> {
        let file = File::create(path).map_err(|source| SamplerError::OutputFile {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Record file created");
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> SampleSink for RecordWriter<W> {
    fn append(&mut self, sample: &Sample) -> SamplerResult<()> {
        writeln!(
            self.out,
            "{:.6}\t{:.2}",
            sample.unix_timestamp, sample.power_dbm
        )
        .map_err(SamplerError::Sink)?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> SamplerResult<()> {
        self.out.flush().map_err(SamplerError::Sink)
    }
}

/// Record file name for a session starting at `start`: `HHMMSS.txt`.
pub fn session_file_name<T: Timelike>(start: &T) -> String {
    format!(
        "{:02}{:02}{:02}.txt",
        start.hour(),
        start.minute(),
        start.second()
    )
}

/// Path of the record file for a session starting now, local time.
pub fn session_file_path(directory: &Path) -> PathBuf {
    directory.join(session_file_name(&chrono::Local::now()))
}

/// Read the timestamp column of a record file.
///
/// # Errors
///
/// See [`parse_timestamps`]; unreadable files give [`AnalysisError::Io`].
pub fn read_timestamps(path: &Path) -> Result<Vec<f64>, AnalysisError> {
    let content = std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_timestamps(&content)
}

/// Parse the timestamp column from record text.
///
/// Blank lines are skipped. A first line that does not parse is taken as a
/// header and skipped; any later bad line is an error.
///
/// # Errors
///
/// Returns [`AnalysisError::Parse`] naming the first malformed line.
pub fn parse_timestamps(content: &str) -> Result<Vec<f64>, AnalysisError> {
    let mut timestamps = Vec::new();
    let mut seen_first = false;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let is_first = !seen_first;
        seen_first = true;

        match parse_line(line) {
            Ok(ts) => timestamps.push(ts),
            Err(_) if is_first => {
                debug!(line = idx + 1, "Skipping header line");
            }
            Err(message) => {
                return Err(AnalysisError::Parse {
                    line: idx + 1,
                    message,
                })
            }
        }
    }

    Ok(timestamps)
}

fn parse_line(line: &str) -> Result<f64, String> {
    let mut fields = line.split('\t').map(str::trim);
    let (Some(ts), Some(power), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err("expected 2 tab-separated fields".into());
    };
    power
        .parse::<f64>()
        .map_err(|e| format!("invalid power {power:?}: {e}"))?;
    ts.parse::<f64>()
        .map_err(|e| format!("invalid timestamp {ts:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_format() {
        let mut writer = RecordWriter::new(Vec::new());
        writer
            .append(&Sample {
                unix_timestamp: 1_700_000_000.123_456_7,
                power_dbm: -95.404,
            })
            .unwrap();
        writer
            .append(&Sample {
                unix_timestamp: 1_700_000_000.143_5,
                power_dbm: -95.0,
            })
            .unwrap();
        assert_eq!(writer.written(), 2);

        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "1700000000.123457\t-95.40\n1700000000.143500\t-95.00\n"
        );
    }

    #[test]
    fn test_session_file_name() {
        let t = chrono::NaiveTime::from_hms_opt(9, 5, 7).unwrap();
        assert_eq!(session_file_name(&t), "090507.txt");
    }

    #[test]
    fn test_parse_timestamps() {
        let text = "100.000000\t-95.40\n100.020000\t-95.41\n\n100.040000\t-95.39\n";
        let ts = parse_timestamps(text).unwrap();
        assert_eq!(ts.len(), 3);
        assert!((ts[2] - 100.04).abs() < 1e-9);
    }

    #[test]
    fn test_parse_skips_header() {
        let text = "timestamp\tpower_dbm\n1.0\t-90.00\n1.02\t-90.00\n";
        let ts = parse_timestamps(text).unwrap();
        assert_eq!(ts, vec![1.0, 1.02]);
    }

    #[test]
    fn test_parse_reports_bad_line() {
        let text = "1.0\t-90.00\n1.02\t-90.00\nnot-a-number\t-90.00\n";
        match parse_timestamps(text) {
            Err(AnalysisError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {other:?}"),
        }

        let text = "1.0\t-90.00\n1.02\n";
        assert!(matches!(
            parse_timestamps(text),
            Err(AnalysisError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("120000.txt");

        let mut writer = RecordWriter::create(&path).unwrap();
        for i in 0..5 {
            writer
                .append(&Sample {
                    unix_timestamp: 10.0 + f64::from(i) * 0.02,
                    power_dbm: -90.0,
                })
                .unwrap();
        }
        writer.flush().unwrap();
        drop(writer);

        let ts = read_timestamps(&path).unwrap();
        assert_eq!(ts.len(), 5);
        assert!((ts[4] - 10.08).abs() < 1e-9);
    }

    #[test]
    fn test_missing_file() {
        let err = read_timestamps(Path::new("/nonexistent/000000.txt")).unwrap_err();
        assert!(matches!(err, AnalysisError::Io { .. }));
    }
}
