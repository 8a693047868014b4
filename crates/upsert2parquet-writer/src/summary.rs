// Dataset summary
//
// `_dataset.json` describes every partition file of a dataset. It is rebuilt
// in full after each merge call from the files actually present, so it never
// carries stale entries, and it persists the granularity and temporal key
// later calls must agree with.

use crate::encoding::Blake3Hash;
use crate::error::{Result, WriterError};
use arrow::datatypes::Schema;
use bytes::Bytes;
use chrono::SecondsFormat;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use upsert2parquet_core::{from_nanos, key_nanos, resolve_key_column};

pub const SUMMARY_FILE: &str = "_dataset.json";
pub const SUMMARY_FORMAT_VERSION: u32 = 1;

/// Settings recorded alongside the partition list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarySettings {
    pub granularity: String,
    pub temporal_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub format_version: u32,
    pub granularity: String,
    pub temporal_key: String,
    pub schema: Vec<ColumnSummary>,
    pub total_rows: u64,
    pub partitions: Vec<PartitionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub file: String,
    /// Range start in whole seconds since the Unix epoch
    pub range_start: i64,
    pub row_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_key: Option<String>,
    pub file_size: u64,
    pub blake3: String,
}

impl DatasetSummary {
    /// Summarize `files` in the order given
    pub fn build(
        files: &[(PathBuf, i64)],
        settings: &SummarySettings,
    ) -> Result<DatasetSummary> {
        let mut schema = Vec::new();
        let mut partitions = Vec::with_capacity(files.len());
        let mut total_rows = 0u64;

        for (path, range_start) in files {
            let (partition, file_schema) =
                summarize_partition(path, *range_start, &settings.temporal_key)?;
            if schema.is_empty() {
                schema = file_schema
                    .fields()
                    .iter()
                    .map(|f| ColumnSummary {
                        name: f.name().clone(),
                        data_type: f.data_type().to_string(),
                        nullable: f.is_nullable(),
                    })
                    .collect();
            }
            total_rows += partition.row_count;
            partitions.push(partition);
        }

        Ok(DatasetSummary {
            format_version: SUMMARY_FORMAT_VERSION,
            granularity: settings.granularity.clone(),
            temporal_key: settings.temporal_key.clone(),
            schema,
            total_rows,
            partitions,
        })
    }

    /// Read `_dataset.json` from `dir`; `None` when the dataset has none
    pub fn load(dir: &Path) -> Result<Option<DatasetSummary>> {
        let path = dir.join(SUMMARY_FILE);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(WriterError::io(&path, e)),
        };
        let summary: DatasetSummary = serde_json::from_slice(&content)
            .map_err(|e| WriterError::summary(&path, e.to_string()))?;
        if summary.format_version > SUMMARY_FORMAT_VERSION {
            return Err(WriterError::summary(
                &path,
                format!(
                    "format version {} is newer than supported version {}",
                    summary.format_version, SUMMARY_FORMAT_VERSION
                ),
            ));
        }
        Ok(Some(summary))
    }

    /// Write `_dataset.json` into `dir`, replacing any previous summary atomically
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(SUMMARY_FILE);
        let content = serde_json::to_vec_pretty(self)
            .map_err(|e| WriterError::summary(&path, e.to_string()))?;
        write_atomic(&path, &content)?;
        Ok(path)
    }
}

fn summarize_partition(
    path: &Path,
    range_start: i64,
    temporal_key: &str,
) -> Result<(PartitionSummary, Schema)> {
    let content = fs::read(path).map_err(|e| WriterError::io(path, e))?;
    let file_size = content.len() as u64;
    let hash = Blake3Hash::of(&content);

    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(content))
        .map_err(|e| WriterError::parquet(path, e))?;
    let schema = builder.schema().as_ref().clone();
    let row_count = builder.metadata().file_metadata().num_rows().max(0) as u64;

    // Legacy files may lack the recorded key; fall back to the first column
    let key_index = resolve_key_column(&schema, Some(temporal_key))
        .or_else(|_| resolve_key_column(&schema, None))?;
    let mask = ProjectionMask::roots(builder.parquet_schema(), [key_index]);
    let reader = builder
        .with_projection(mask)
        .build()
        .map_err(|e| WriterError::parquet(path, e))?;

    let mut min_key: Option<i64> = None;
    let mut max_key: Option<i64> = None;
    for batch in reader {
        let batch = batch?;
        for key in key_nanos(batch.column(0).as_ref())? {
            min_key = Some(min_key.map_or(key, |m| m.min(key)));
            max_key = Some(max_key.map_or(key, |m| m.max(key)));
        }
    }

    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok((
        PartitionSummary {
            file,
            range_start,
            row_count,
            min_key: min_key.map(rfc3339),
            max_key: max_key.map(rfc3339),
            file_size,
            blake3: hash.to_hex(),
        },
        schema,
    ))
}

fn rfc3339(nanos: i64) -> String {
    from_nanos(nanos)
        .and_utc()
        .to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Write `content` to a hidden temp file next to `path`, fsync it, then
/// persist it over `path`. The temp file is removed if any step fails.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut file = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| WriterError::io(dir, e))?;
    file.write_all(content)
        .map_err(|e| WriterError::io(file.path(), e))?;
    file.as_file()
        .sync_all()
        .map_err(|e| WriterError::io(file.path(), e))?;
    file.persist(path).map_err(|e| WriterError::io(path, e.error))?;

    // Make the rename itself durable
    #[cfg(unix)]
    fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| WriterError::io(dir, e))?;
    Ok(())
}
