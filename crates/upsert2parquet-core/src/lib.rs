// upsert2parquet-core - Platform-agnostic core logic
//
// This crate contains the PURE logic for merging new rows into a
// time-partitioned dataset. No I/O, no async, no runtime dependencies.
//
// - granularity: midnight-anchored partition boundaries
// - slice:       rows of a batch belonging to one partition
// - merge:       per-partition merge/dedup and the write-or-skip signal
//
// Storage (reading and writing partition files, dataset metadata) lives in
// upsert2parquet-writer.

pub mod error;
pub mod granularity;
pub mod merge;
pub mod slice;
pub mod temporal;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use granularity::{
    boundary_sequence, next_boundary, partition_file_name, previous_boundary, Granularity,
    PartitionRange,
};
pub use merge::{align_to_schema, merge, same_rows, DuplicatePolicy, MergeOutcome, INDEX_ALIAS};
pub use slice::{filter_by_key, slice};
pub use temporal::{from_nanos, is_temporal, key_nanos, resolve_key_column, to_nanos};
