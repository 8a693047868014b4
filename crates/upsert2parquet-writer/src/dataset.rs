// Dataset accessor
//
// A dataset is a directory of `part.<epoch-seconds>.parquet` files, one per
// partition, plus the `_dataset.json` summary. Files are replaced by writing a
// hidden temp file in the same directory and renaming it over the final name,
// so readers never observe a half-written partition.

use crate::encoding::{encode_partition, EncodingOptions};
use crate::error::{Result, WriterError};
use crate::summary::{write_atomic, DatasetSummary, SummarySettings};
use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use upsert2parquet_core::{filter_by_key, key_nanos, partition_file_name, resolve_key_column};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Storage operations the merge orchestration needs from a dataset
pub trait DatasetStore {
    /// Partition files, sorted lexicographically by path
    fn list_partitions(&self) -> Result<Vec<PathBuf>>;

    /// Stored rows whose `key` column lies within `[start, end]` (nanoseconds,
    /// both inclusive). `None` when no partition file falls in the bounds.
    fn read_range(&self, key: &str, start: i64, end: i64) -> Result<Option<RecordBatch>>;

    /// Replace the partition starting at `range_start` (epoch seconds) with `rows`
    fn write_partition(&self, range_start: i64, rows: &RecordBatch) -> Result<PathBuf>;

    /// Schema of the stored partitions; `None` for a dataset without files
    fn dataset_schema(&self) -> Result<Option<SchemaRef>>;

    /// Rebuild the dataset summary from `ordered_paths`, in the order given
    fn rebuild_metadata(
        &self,
        ordered_paths: &[PathBuf],
        settings: &SummarySettings,
    ) -> Result<DatasetSummary>;
}

/// Dataset stored in a local directory
#[derive(Debug, Clone)]
pub struct LocalDataset {
    root: PathBuf,
    encoding: EncodingOptions,
    temporal_key: Option<String>,
}

impl LocalDataset {
    /// Open an existing dataset.
    ///
    /// Returns `None` when the directory is missing or holds no partition files.
    pub fn open(root: impl Into<PathBuf>) -> Result<Option<Self>> {
        let dataset = Self::at(root.into());
        if !dataset.root.is_dir() {
            return Ok(None);
        }
        if dataset.list_partitions()?.is_empty() {
            return Ok(None);
        }
        Ok(Some(dataset))
    }

    /// Create the dataset directory (and parents) if needed
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let dataset = Self::at(root.into());
        fs::create_dir_all(&dataset.root).map_err(|e| WriterError::io(&dataset.root, e))?;
        Ok(dataset)
    }

    fn at(root: PathBuf) -> Self {
        Self {
            root,
            encoding: EncodingOptions::default(),
            temporal_key: None,
        }
    }

    pub fn with_encoding(mut self, encoding: EncodingOptions) -> Self {
        self.encoding = encoding;
        self
    }

    /// Record `key` in the metadata of files written from now on
    pub fn with_temporal_key(mut self, key: impl Into<String>) -> Self {
        self.temporal_key = Some(key.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Partition files with the range start parsed from their names
    pub fn partitions_with_start(&self) -> Result<Vec<(PathBuf, i64)>> {
        let entries = fs::read_dir(&self.root).map_err(|e| WriterError::io(&self.root, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| WriterError::io(&self.root, e))?;
            let name = entry.file_name();
            let Some(start) = name.to_str().and_then(parse_partition_name) else {
                continue;
            };
            if entry.path().is_file() {
                files.push((entry.path(), start));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    pub fn load_summary(&self) -> Result<Option<DatasetSummary>> {
        DatasetSummary::load(&self.root)
    }

    /// `read_range` over a partition listing taken earlier with
    /// `partitions_with_start`, so one merge call scans the directory once.
    pub fn read_range_in(
        &self,
        files: &[(PathBuf, i64)],
        key: &str,
        start: i64,
        end: i64,
    ) -> Result<Option<RecordBatch>> {
        let mut batches = Vec::new();
        for (path, range_start) in files {
            let Some(start_nanos) = range_start.checked_mul(NANOS_PER_SECOND) else {
                continue;
            };
            if start_nanos < start || start_nanos > end {
                continue;
            }

            let batch = self.read_file(path)?;
            let key_index = resolve_key_column(batch.schema_ref(), Some(key))?;
            let keys = key_nanos(batch.column(key_index).as_ref())?;
            let rows = filter_by_key(&batch, &keys, start, end)?;
            debug!(
                path = %path.display(),
                stored = batch.num_rows(),
                in_range = rows.num_rows(),
                "Read partition file"
            );
            batches.push(rows);
        }

        match batches.len() {
            0 => Ok(None),
            1 => Ok(batches.pop()),
            _ => {
                let schema = batches[0].schema();
                Ok(Some(concat_batches(&schema, &batches)?))
            }
        }
    }

    fn read_file(&self, path: &Path) -> Result<RecordBatch> {
        let file = fs::File::open(path).map_err(|e| WriterError::io(path, e))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| WriterError::parquet(path, e))?;
        let schema = builder.schema().clone();
        let reader = builder.build().map_err(|e| WriterError::parquet(path, e))?;

        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(concat_batches(&schema, &batches)?)
    }
}

impl DatasetStore for LocalDataset {
    fn list_partitions(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .partitions_with_start()?
            .into_iter()
            .map(|(path, _)| path)
            .collect())
    }

    fn read_range(&self, key: &str, start: i64, end: i64) -> Result<Option<RecordBatch>> {
        self.read_range_in(&self.partitions_with_start()?, key, start, end)
    }

    fn write_partition(&self, range_start: i64, rows: &RecordBatch) -> Result<PathBuf> {
        let path = self.root.join(partition_file_name(range_start));
        let properties = self
            .encoding
            .writer_properties(self.temporal_key.as_deref());
        let encoded = encode_partition(rows, properties, &path)?;

        write_atomic(&path, &encoded.bytes)?;

        debug!(
            path = %path.display(),
            rows = encoded.row_count,
            bytes = encoded.bytes.len(),
            blake3 = %encoded.hash.to_hex(),
            "Wrote partition file"
        );
        Ok(path)
    }

    fn dataset_schema(&self) -> Result<Option<SchemaRef>> {
        let Some(first) = self.list_partitions()?.into_iter().next() else {
            return Ok(None);
        };
        let file = fs::File::open(&first).map_err(|e| WriterError::io(&first, e))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| WriterError::parquet(&first, e))?;
        Ok(Some(builder.schema().clone()))
    }

    fn rebuild_metadata(
        &self,
        ordered_paths: &[PathBuf],
        settings: &SummarySettings,
    ) -> Result<DatasetSummary> {
        let mut files = Vec::with_capacity(ordered_paths.len());
        for path in ordered_paths {
            let start = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_partition_name)
                .ok_or_else(|| {
                    WriterError::summary(path, "not a partition file name (part.<int>.parquet)")
                })?;
            files.push((path.clone(), start));
        }

        let summary = DatasetSummary::build(&files, settings)?;
        summary.save(&self.root)?;
        Ok(summary)
    }
}

/// Range start encoded in a `part.<int>.parquet` file name
pub fn parse_partition_name(name: &str) -> Option<i64> {
    let digits = name.strip_prefix("part.")?.strip_suffix(".parquet")?;
    let unsigned = digits.strip_prefix('-').unwrap_or(digits);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
