// Merge orchestration
//
// validate inputs -> sort batch by temporal key -> boundary sequence ->
// per partition: read stored rows, merge, write or skip -> rebuild summary.
//
// Every validation error is raised before the first file is written. A failure
// while writing partitions leaves already-written partitions in place; there
// is no cross-partition rollback.

use crate::dataset::{DatasetStore, LocalDataset};
use crate::encoding::EncodingOptions;
use crate::error::{Result, WriterError};
use crate::summary::{DatasetSummary, SummarySettings};
use crate::write::{apply, WriteOutcome};
use arrow::array::{RecordBatch, UInt32Array};
use arrow::compute::take_record_batch;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use upsert2parquet_core::{
    align_to_schema, boundary_sequence, from_nanos, key_nanos, merge, resolve_key_column, slice,
    DuplicatePolicy, Granularity, PartitionRange,
};

/// Whether a merge may add to an existing dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Merge into the dataset, creating it when absent
    #[default]
    Append,
    /// Create a new dataset; fails when partitions already exist
    Create,
}

/// Parameters of one merge call
#[derive(Debug, Clone)]
pub struct MergeRequest<'a> {
    destination: PathBuf,
    batch: &'a RecordBatch,
    granularity: Granularity,
    group_on: Option<String>,
    policy: DuplicatePolicy,
    mode: WriteMode,
    encoding: EncodingOptions,
}

impl<'a> MergeRequest<'a> {
    pub fn new(
        destination: impl Into<PathBuf>,
        batch: &'a RecordBatch,
        granularity: Granularity,
    ) -> Self {
        Self {
            destination: destination.into(),
            batch,
            granularity,
            group_on: None,
            policy: DuplicatePolicy::default(),
            mode: WriteMode::default(),
            encoding: EncodingOptions::default(),
        }
    }

    /// Temporal key column; the first column when unset
    pub fn with_group_on(mut self, column: impl Into<String>) -> Self {
        self.group_on = Some(column.into());
        self
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_encoding(mut self, encoding: EncodingOptions) -> Self {
        self.encoding = encoding;
        self
    }
}

/// Outcome for one partition of the boundary sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionReport {
    pub range: PartitionRange,
    pub outcome: WriteOutcome,
}

/// Result of a merge call
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub dataset: PathBuf,
    /// True when this call created the dataset
    pub created: bool,
    pub partitions: Vec<PartitionReport>,
    /// Rebuilt summary; `None` when the call left no dataset behind
    pub summary: Option<DatasetSummary>,
}

impl MergeReport {
    pub fn written(&self) -> usize {
        self.partitions
            .iter()
            .filter(|p| p.outcome.is_written())
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.partitions.len() - self.written()
    }
}

/// Merge `request.batch` into the dataset at `request.destination`.
pub fn merge_dataset(request: &MergeRequest<'_>) -> Result<MergeReport> {
    let granularity = request.granularity;
    granularity.validate()?;

    // Stored column order wins, so the default key is the dataset's own key
    let existing = LocalDataset::open(&request.destination)?;
    let (batch, stored_summary) = match &existing {
        Some(dataset) => {
            if request.mode == WriteMode::Create {
                return Err(WriterError::configuration(format!(
                    "dataset '{}' already holds partitions; use append mode to merge into it",
                    request.destination.display()
                )));
            }
            let batch = match dataset.dataset_schema()? {
                Some(schema) => align_to_schema(request.batch, &schema)?,
                None => request.batch.clone(),
            };
            (batch, dataset.load_summary()?)
        }
        None => (request.batch.clone(), None),
    };

    let group_on = request
        .group_on
        .as_deref()
        .or(stored_summary.as_ref().map(|s| s.temporal_key.as_str()));
    let key_index = resolve_key_column(batch.schema_ref(), group_on)?;
    let key = batch.schema().field(key_index).name().clone();
    request.policy.resolve(batch.schema_ref(), key_index)?;

    if let Some(dataset) = &existing {
        check_stored_settings(dataset, stored_summary.as_ref(), granularity, &key)?;
    }

    let settings = SummarySettings {
        granularity: granularity.to_string(),
        temporal_key: key.clone(),
    };

    if batch.num_rows() == 0 {
        let summary = match &existing {
            Some(dataset) => Some(rebuild(dataset, &settings)?),
            None => None,
        };
        info!(
            dataset = %request.destination.display(),
            "Empty batch; no partitions touched"
        );
        return Ok(MergeReport {
            dataset: request.destination.clone(),
            created: false,
            partitions: Vec::new(),
            summary,
        });
    }

    let (sorted, keys) = sort_by_key(&batch, &key)?;
    let (Some(&first), Some(&last)) = (keys.first(), keys.last()) else {
        return Err(WriterError::schema("batch has rows but no temporal keys"));
    };
    let ranges = boundary_sequence(from_nanos(first), from_nanos(last), granularity)?;

    let created = existing.is_none();
    let store = match existing {
        Some(dataset) => dataset,
        None => LocalDataset::create(&request.destination)?,
    }
    .with_encoding(request.encoding)
    .with_temporal_key(key.clone());

    let stored_files = if created {
        Vec::new()
    } else {
        store.partitions_with_start()?
    };

    let mut partitions = Vec::with_capacity(ranges.len());
    for range in ranges {
        let new_slice = slice(&sorted, &keys, &range)?;
        if new_slice.num_rows() == 0 {
            partitions.push(PartitionReport {
                range,
                outcome: WriteOutcome::Skipped,
            });
            continue;
        }

        let (start, end) = range.bounds_nanos()?;
        let stored = store.read_range_in(&stored_files, &key, start, end)?;
        let stored = stored.unwrap_or_else(|| new_slice.slice(0, 0));

        let outcome = merge(&stored, &new_slice, &key, &request.policy)?;
        let written = apply(&store, &range, &outcome)?;

        debug!(
            partition = %range.file_name(),
            stored = stored.num_rows(),
            incoming = new_slice.num_rows(),
            merged = outcome.merged.num_rows(),
            written = written.is_written(),
            "Processed partition"
        );
        partitions.push(PartitionReport {
            range,
            outcome: written,
        });
    }

    let summary = rebuild(&store, &settings)?;
    let report = MergeReport {
        dataset: request.destination.clone(),
        created,
        partitions,
        summary: Some(summary),
    };

    info!(
        dataset = %report.dataset.display(),
        granularity = %granularity,
        rows = batch.num_rows(),
        partitions = report.partitions.len(),
        written = report.written(),
        skipped = report.skipped(),
        created = report.created,
        "Merged batch into dataset"
    );
    Ok(report)
}

/// Fail when the stored summary was produced with other settings
fn check_stored_settings(
    dataset: &LocalDataset,
    summary: Option<&DatasetSummary>,
    granularity: Granularity,
    key: &str,
) -> Result<()> {
    let Some(summary) = summary else {
        warn!(
            dataset = %dataset.root().display(),
            "Dataset has no summary; granularity and temporal key cannot be checked"
        );
        return Ok(());
    };

    let stored: Granularity = summary.granularity.parse().map_err(|e| {
        WriterError::summary(
            dataset.root(),
            format!("stored granularity '{}' is invalid: {}", summary.granularity, e),
        )
    })?;
    if stored != granularity {
        return Err(WriterError::configuration(format!(
            "dataset is partitioned by '{}' but '{}' was requested",
            stored, granularity
        )));
    }
    if summary.temporal_key != key {
        return Err(WriterError::configuration(format!(
            "dataset is keyed on column '{}' but the batch uses '{}'",
            summary.temporal_key, key
        )));
    }
    Ok(())
}

/// Stable sort by temporal key; returns the sorted batch and its keys
fn sort_by_key(batch: &RecordBatch, key: &str) -> Result<(RecordBatch, Vec<i64>)> {
    let key_index = resolve_key_column(batch.schema_ref(), Some(key))?;
    let keys = key_nanos(batch.column(key_index).as_ref())?;

    let mut order: Vec<u32> = (0..keys.len() as u32).collect();
    order.sort_by_key(|&i| keys[i as usize]);
    if order.windows(2).all(|w| w[0] < w[1]) {
        return Ok((batch.clone(), keys));
    }

    let sorted_keys = order.iter().map(|&i| keys[i as usize]).collect();
    let sorted = take_record_batch(batch, &UInt32Array::from(order))?;
    Ok((sorted, sorted_keys))
}

fn rebuild(dataset: &LocalDataset, settings: &SummarySettings) -> Result<DatasetSummary> {
    let ordered = dataset.list_partitions()?;
    dataset.rebuild_metadata(&ordered, settings)
}
