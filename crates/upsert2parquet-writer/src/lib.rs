//! Time-partitioned Parquet dataset writer
//!
//! This crate stores partitions on the local filesystem and drives the pure
//! boundary/merge logic of `upsert2parquet-core` to merge new rows into a
//! dataset, rewriting only the partitions whose contents change.

mod dataset;
mod encoding;
mod error;
mod summary;
mod upsert;
mod write;

pub use dataset::{parse_partition_name, DatasetStore, LocalDataset};
pub use encoding::{
    encode_partition, Blake3Hash, EncodedPartition, EncodingOptions, TEMPORAL_KEY_METADATA,
    VERSION_METADATA,
};
pub use error::{ErrorCode, Result, WriterError};
pub use summary::{
    ColumnSummary, DatasetSummary, PartitionSummary, SummarySettings, SUMMARY_FILE,
    SUMMARY_FORMAT_VERSION,
};
pub use upsert::{merge_dataset, MergeReport, MergeRequest, PartitionReport, WriteMode};
pub use write::{apply, WriteOutcome};

// Re-export commonly used types for convenience
pub use upsert2parquet_core;
