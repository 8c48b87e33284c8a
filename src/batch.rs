//! Batch file encoding.
//!
//! A batch is written once, before the worker starts, and read by the worker
//! at startup. Two layouts are supported:
//!
//! - [`BatchFormat::Lines`]: one command per line; a job's id is its
//!   zero-based line index. This is the layout plain command-runner workers
//!   expect.
//! - [`BatchFormat::JsonLines`]: one `{"id":N,"params":"..."}` object per
//!   line, which allows arbitrary ids and parameters containing newlines.
//!
//! Encoding is deterministic: the same job sequence always yields the same
//! bytes.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::error::EncodingError;
use crate::job::{Job, JobId, MAX_JOB_ID};

/// On-disk layout of a batch file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchFormat {
    /// One command per line, id = line index.
    #[default]
    Lines,
    /// One JSON object per line.
    JsonLines,
}

impl FromStr for BatchFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lines" | "text" => Ok(Self::Lines),
            "jsonl" | "json-lines" | "jsonlines" => Ok(Self::JsonLines),
            _ => Err(format!(
                "Unknown batch format: '{}'. Valid options: lines, jsonl",
                s
            )),
        }
    }
}

impl std::fmt::Display for BatchFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lines => write!(f, "lines"),
            Self::JsonLines => write!(f, "jsonl"),
        }
    }
}

/// Serializes job sequences into a batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchEncoder {
    format: BatchFormat,
}

impl BatchEncoder {
    pub fn new(format: BatchFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> BatchFormat {
        self.format
    }

    /// Check that every job can be encoded, without writing anything.
    pub fn validate(&self, jobs: &[Job]) -> Result<(), EncodingError> {
        let mut seen = HashSet::with_capacity(jobs.len());

        for (position, job) in jobs.iter().enumerate() {
            if job.id > MAX_JOB_ID {
                return Err(EncodingError::IdOutOfRange(job.id));
            }
            if !seen.insert(job.id) {
                return Err(EncodingError::DuplicateId(job.id));
            }
            if self.format == BatchFormat::Lines {
                validate_line_job(position as JobId, job)?;
            }
        }
        Ok(())
    }

    /// Encode `jobs` into `sink`.
    ///
    /// The whole sequence is validated before the first byte is written, so
    /// an encoding error never leaves a partial batch behind in the sink.
    pub fn encode<W: Write>(&self, jobs: &[Job], sink: &mut W) -> Result<(), EncodingError> {
        self.validate(jobs)?;

        for job in jobs {
            match self.format {
                BatchFormat::Lines => {
                    sink.write_all(job.params.as_bytes())?;
                }
                BatchFormat::JsonLines => {
                    serde_json::to_writer(&mut *sink, job).map_err(|e| {
                        EncodingError::Unserializable {
                            id: job.id,
                            reason: e.to_string(),
                        }
                    })?;
                }
            }
            sink.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn encode_to_vec(&self, jobs: &[Job]) -> Result<Vec<u8>, EncodingError> {
        let mut out = Vec::new();
        self.encode(jobs, &mut out)?;
        Ok(out)
    }

    /// Create `path` and write the batch into it.
    ///
    /// The file is flushed and closed before returning. If encoding fails
    /// the partially written file is removed.
    pub fn write_file(&self, path: &Path, jobs: &[Job]) -> Result<(), EncodingError> {
        self.validate(jobs)?;

        let result = File::create(path)
            .map_err(EncodingError::from)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                self.encode(jobs, &mut writer)?;
                writer.flush()?;
                Ok(())
            });

        if result.is_err() {
            let _ = fs::remove_file(path);
        } else {
            tracing::debug!(
                path = %path.display(),
                jobs = jobs.len(),
                format = %self.format,
                "Batch file written"
            );
        }
        result
    }
}

/// Write `jobs` to `path` in the given format.
pub fn write_batch_file(path: &Path, format: BatchFormat, jobs: &[Job]) -> Result<(), EncodingError> {
    BatchEncoder::new(format).write_file(path, jobs)
}

fn validate_line_job(position: JobId, job: &Job) -> Result<(), EncodingError> {
    if job.id != position {
        return Err(EncodingError::NonSequentialId {
            expected: position,
            found: job.id,
        });
    }
    if job.params.contains(['\n', '\r']) {
        return Err(EncodingError::Unserializable {
            id: job.id,
            reason: "line batches cannot hold parameters with line breaks".to_string(),
        });
    }
    if job.params.is_empty() {
        return Err(EncodingError::Unserializable {
            id: job.id,
            reason: "line batches cannot hold empty parameters".to_string(),
        });
    }
    Ok(())
}

/// Parse a batch back into jobs.
///
/// Empty lines are skipped in both formats. In line batches a line holding
/// only whitespace is still a job, so numbering matches the line index of
/// every non-empty line.
pub fn read_batch<R: BufRead>(reader: R, format: BatchFormat) -> Result<Vec<Job>, EncodingError> {
    let mut jobs = Vec::new();
    let mut seen = HashSet::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.strip_suffix('\r').unwrap_or(&line);
        let skip = match format {
            BatchFormat::Lines => line.is_empty(),
            BatchFormat::JsonLines => line.trim().is_empty(),
        };
        if skip {
            continue;
        }

        let job = match format {
            BatchFormat::Lines => Job::new(jobs.len() as JobId, line),
            BatchFormat::JsonLines => {
                serde_json::from_str::<Job>(line).map_err(|e| EncodingError::MalformedRecord {
                    line: index + 1,
                    reason: e.to_string(),
                })?
            }
        };

        if !seen.insert(job.id) {
            return Err(EncodingError::DuplicateId(job.id));
        }
        jobs.push(job);
    }
    Ok(jobs)
}

/// Read a batch file from disk.
pub fn read_batch_file(path: &Path, format: BatchFormat) -> Result<Vec<Job>, EncodingError> {
    let file = File::open(path)?;
    read_batch(BufReader::new(file), format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn sample_jobs() -> Vec<Job> {
        Job::sequential(["render 0 100", "render 100 200", "render 200 300"])
    }

    #[test]
    fn test_batch_format_from_str() {
        assert_eq!("lines".parse::<BatchFormat>().unwrap(), BatchFormat::Lines);
        assert_eq!("JSONL".parse::<BatchFormat>().unwrap(), BatchFormat::JsonLines);
        assert!("xml".parse::<BatchFormat>().is_err());
    }

    #[test]
    fn test_lines_layout() {
        let bytes = BatchEncoder::new(BatchFormat::Lines)
            .encode_to_vec(&sample_jobs())
            .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "render 0 100\nrender 100 200\nrender 200 300\n"
        );
    }

    #[test]
    fn test_jsonl_layout() {
        let jobs = vec![Job::new(7, "a\nb"), Job::new(3, "c")];
        let bytes = BatchEncoder::new(BatchFormat::JsonLines)
            .encode_to_vec(&jobs)
            .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\"id\":7,\"params\":\"a\\nb\"}\n{\"id\":3,\"params\":\"c\"}\n"
        );
    }

    #[test]
    fn test_encoding_is_deterministic() {
        for format in [BatchFormat::Lines, BatchFormat::JsonLines] {
            let encoder = BatchEncoder::new(format);
            let first = encoder.encode_to_vec(&sample_jobs()).unwrap();
            let second = encoder.encode_to_vec(&sample_jobs()).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let jobs = vec![Job::new(1, "a"), Job::new(1, "b")];
        let encoder = BatchEncoder::new(BatchFormat::JsonLines);
        let mut sink = Vec::new();
        let err = encoder.encode(&jobs, &mut sink).unwrap_err();
        assert!(matches!(err, EncodingError::DuplicateId(1)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_id_out_of_range_rejected() {
        let jobs = vec![Job::new(MAX_JOB_ID + 1, "a")];
        let err = BatchEncoder::new(BatchFormat::JsonLines)
            .validate(&jobs)
            .unwrap_err();
        assert!(matches!(err, EncodingError::IdOutOfRange(_)));
    }

    #[test]
    fn test_lines_requires_sequential_ids() {
        let jobs = vec![Job::new(0, "a"), Job::new(2, "b")];
        let err = BatchEncoder::new(BatchFormat::Lines)
            .validate(&jobs)
            .unwrap_err();
        assert!(matches!(
            err,
            EncodingError::NonSequentialId {
                expected: 1,
                found: 2
            }
        ));
    }

    #[test]
    fn test_lines_rejects_multiline_params() {
        let jobs = vec![Job::new(0, "echo a\necho b")];
        let err = BatchEncoder::new(BatchFormat::Lines)
            .validate(&jobs)
            .unwrap_err();
        assert!(matches!(err, EncodingError::Unserializable { id: 0, .. }));
    }

    #[test]
    fn test_lines_rejects_empty_params() {
        let jobs = vec![Job::new(0, "")];
        assert!(BatchEncoder::new(BatchFormat::Lines).validate(&jobs).is_err());
    }

    #[test]
    fn test_lines_keep_whitespace_only_jobs() {
        let jobs = Job::sequential(["one", " ", "two"]);
        let bytes = BatchEncoder::new(BatchFormat::Lines)
            .encode_to_vec(&jobs)
            .unwrap();
        assert_eq!(read_batch(Cursor::new(bytes), BatchFormat::Lines).unwrap(), jobs);
    }

    #[test]
    fn test_write_file_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batch.txt");
        let encoder = BatchEncoder::new(BatchFormat::Lines);

        encoder.write_file(&path, &sample_jobs()).unwrap();
        let jobs = read_batch_file(&path, BatchFormat::Lines).unwrap();
        assert_eq!(jobs, sample_jobs());
    }

    #[test]
    fn test_write_file_failure_leaves_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batch.txt");
        let jobs = vec![Job::new(0, "a"), Job::new(0, "b")];

        assert!(
            BatchEncoder::new(BatchFormat::JsonLines)
                .write_file(&path, &jobs)
                .is_err()
        );
        assert!(!path.exists());
    }

    #[test]
    fn test_read_lines_skips_blank_and_crlf() {
        let jobs = read_batch(Cursor::new("one\r\n\r\ntwo"), BatchFormat::Lines).unwrap();
        assert_eq!(jobs, vec![Job::new(0, "one"), Job::new(1, "two")]);
    }

    #[test]
    fn test_read_jsonl_reports_line_number() {
        let input = "{\"id\":1,\"params\":\"a\"}\nnot json\n";
        let err = read_batch(Cursor::new(input), BatchFormat::JsonLines).unwrap_err();
        assert!(matches!(err, EncodingError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn test_read_jsonl_rejects_duplicates() {
        let input = "{\"id\":1,\"params\":\"a\"}\n{\"id\":1,\"params\":\"b\"}\n";
        let err = read_batch(Cursor::new(input), BatchFormat::JsonLines).unwrap_err();
        assert!(matches!(err, EncodingError::DuplicateId(1)));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    proptest! {
        /// Encoding the same jobs twice yields identical bytes.
        #[test]
        fn encoding_is_deterministic(params in proptest::collection::vec("\\PC*", 0..16)) {
            let jobs = Job::sequential(params);
            let encoder = BatchEncoder::new(BatchFormat::JsonLines);
            let first = encoder.encode_to_vec(&jobs).unwrap();
            let second = encoder.encode_to_vec(&jobs).unwrap();
            prop_assert_eq!(first, second);
        }

        /// Line batches of printable commands are deterministic and read back intact.
        #[test]
        fn line_batches_read_back(params in proptest::collection::vec("[a-z][a-z0-9 ]{0,20}", 0..16)) {
            let jobs = Job::sequential(params);
            let encoder = BatchEncoder::new(BatchFormat::Lines);
            let bytes = encoder.encode_to_vec(&jobs).unwrap();
            prop_assert_eq!(&bytes, &encoder.encode_to_vec(&jobs).unwrap());
            prop_assert_eq!(read_batch(Cursor::new(bytes), BatchFormat::Lines).unwrap(), jobs);
        }

        /// Any job sequence with a repeated id is rejected.
        #[test]
        fn duplicate_ids_always_rejected(id in 0..=MAX_JOB_ID, other in "\\PC*") {
            let jobs = vec![Job::new(id, "a"), Job::new(id, other)];
            let err = BatchEncoder::new(BatchFormat::JsonLines).validate(&jobs).unwrap_err();
            prop_assert!(matches!(err, EncodingError::DuplicateId(dup) if dup == id));
        }
    }
}
