//! Per-partition write-or-skip decision

use crate::dataset::DatasetStore;
use crate::error::Result;
use std::path::PathBuf;
use upsert2parquet_core::{MergeOutcome, PartitionRange};

/// What happened to one partition during a merge call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The merged rows replaced the partition file
    Written { path: PathBuf, rows: usize },
    /// Stored rows already matched; no file was touched
    Skipped,
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }
}

/// Write the merged rows for `range`, or skip when nothing changed.
///
/// The file name derives from `range.start`, so a later call computing the
/// same boundaries replaces the same file.
pub fn apply<S: DatasetStore + ?Sized>(
    store: &S,
    range: &PartitionRange,
    outcome: &MergeOutcome,
) -> Result<WriteOutcome> {
    if !outcome.changed {
        return Ok(WriteOutcome::Skipped);
    }

    let path = store.write_partition(range.start_seconds(), &outcome.merged)?;
    Ok(WriteOutcome::Written {
        path,
        rows: outcome.merged.num_rows(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::LocalDataset;
    use arrow::array::{RecordBatch, TimestampNanosecondArray};
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
    use std::sync::Arc;
    use upsert2parquet_core::{from_nanos, Granularity};

    fn batch(keys: Vec<i64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "ts",
            DataType::Timestamp(TimeUnit::Nanosecond, None),
            false,
        )]));
        RecordBatch::try_new(schema, vec![Arc::new(TimestampNanosecondArray::from(keys))]).unwrap()
    }

    #[test]
    fn test_unchanged_partition_is_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        let dataset = LocalDataset::create(dir.path()).unwrap();
        let range = PartitionRange::containing(from_nanos(0), Granularity::Day).unwrap();

        let outcome = MergeOutcome {
            merged: batch(vec![0]),
            changed: false,
        };
        assert_eq!(apply(&dataset, &range, &outcome).unwrap(), WriteOutcome::Skipped);
        assert!(dataset.list_partitions().unwrap().is_empty());
    }

    #[test]
    fn test_changed_partition_is_written_under_range_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let dataset = LocalDataset::create(dir.path()).unwrap();
        let range =
            PartitionRange::containing(from_nanos(90_000_000_000_000), Granularity::Day).unwrap();

        let outcome = MergeOutcome {
            merged: batch(vec![90_000_000_000_000, 90_000_000_000_001]),
            changed: true,
        };
        let written = apply(&dataset, &range, &outcome).unwrap();
        assert_eq!(
            written,
            WriteOutcome::Written {
                path: dir.path().join("part.86400.parquet"),
                rows: 2,
            }
        );
        assert!(written.is_written());
    }
}
