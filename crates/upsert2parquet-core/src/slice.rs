// Partition slicing
//
// Selects the rows of a batch whose temporal key lies within a partition.
// Bounds are inclusive on both ends; a partition's upper bound is the last
// nanosecond before the next partition starts, so adjacent partitions never
// share a row.

use crate::error::Result;
use crate::granularity::PartitionRange;
use arrow::array::{BooleanArray, RecordBatch};
use arrow::compute::filter_record_batch;

/// Rows of `batch` falling inside `range`.
///
/// `keys` holds the temporal key of each row in nanoseconds. Returns an empty
/// batch, never an error, when no row qualifies.
pub fn slice(batch: &RecordBatch, keys: &[i64], range: &PartitionRange) -> Result<RecordBatch> {
    let (start, end) = range.bounds_nanos()?;
    filter_by_key(batch, keys, start, end)
}

/// Rows whose key lies within `[start, end]` (nanoseconds, both inclusive)
pub fn filter_by_key(
    batch: &RecordBatch,
    keys: &[i64],
    start: i64,
    end: i64,
) -> Result<RecordBatch> {
    debug_assert_eq!(keys.len(), batch.num_rows());

    let mask: BooleanArray = keys
        .iter()
        .map(|&k| Some(k >= start && k <= end))
        .collect();

    match mask.true_count() {
        0 => Ok(batch.slice(0, 0)),
        n if n == batch.num_rows() => Ok(batch.clone()),
        _ => Ok(filter_record_batch(batch, &mask)?),
    }
}
