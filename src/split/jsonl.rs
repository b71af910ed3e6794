//! JSON-lines input and output

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::{DatasetSplit, Record};
use crate::{Error, Result};

/// Training split file name.
pub const TRAIN_FILE: &str = "train.jsonl";
/// Validation split file name.
pub const VALID_FILE: &str = "valid.jsonl";
/// Test split file name.
pub const TEST_FILE: &str = "test.jsonl";

/// What [`write_splits`] wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitSummary {
    /// Directory holding the three files
    pub output_dir: PathBuf,
    /// Records in `train.jsonl`
    pub train: usize,
    /// Records in `valid.jsonl`
    pub validation: usize,
    /// Records in `test.jsonl`
    pub test: usize,
}

/// Parse JSON-lines from a reader. Blank lines are skipped.
///
/// # Errors
///
/// Returns [`Error::InputFormat`] with the 1-based line number of the first
/// line that is not a JSON object, and [`Error::Io`] on read failure.
pub fn parse_jsonl<R: BufRead>(reader: R) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(trimmed).map_err(|e| Error::InputFormat {
            line: index + 1,
            message: e.to_string(),
        })?;
        match value {
            Value::Object(record) => records.push(record),
            other => {
                return Err(Error::InputFormat {
                    line: index + 1,
                    message: format!("expected a JSON object, found {}", kind(&other)),
                })
            }
        }
    }
    Ok(records)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Read a JSON-lines file.
///
/// # Errors
///
/// See [`parse_jsonl`]; opening the file may also fail with [`Error::Io`].
pub fn read_jsonl(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let file = File::open(path.as_ref())?;
    parse_jsonl(BufReader::new(file))
}

/// Write records as JSON-lines, one compact object per line.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be written.
pub fn write_jsonl(path: impl AsRef<Path>, records: &[Record]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the three partitions into `output_dir`, creating it if needed.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory or any file cannot be written.
pub fn write_splits(output_dir: impl AsRef<Path>, split: &DatasetSplit) -> Result<SplitSummary> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;

    for (name, records) in [
        (TRAIN_FILE, &split.train),
        (VALID_FILE, &split.validation),
        (TEST_FILE, &split.test),
    ] {
        let path = output_dir.join(name);
        write_jsonl(&path, records)?;
        info!(path = %path.display(), records = records.len(), "wrote split");
    }

    Ok(SplitSummary {
        output_dir: output_dir.to_path_buf(),
        train: split.train.len(),
        validation: split.validation.len(),
        test: split.test.len(),
    })
}
