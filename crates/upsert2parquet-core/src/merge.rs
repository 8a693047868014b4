// Merge and deduplication of partition contents
//
// Existing rows come first and new rows after them, so after a stable sort on
// the temporal key a new row is always "later" than an existing row with the
// same key. Duplicates under the policy keep their last occurrence: a new row
// supersedes the stored one, and among new rows the one supplied last wins.

use crate::error::{CoreError, Result};
use crate::temporal::{column_names, key_nanos, resolve_key_column};
use arrow::array::{ArrayRef, RecordBatch, UInt32Array};
use arrow::compute::{concat_batches, take_record_batch};
use arrow::datatypes::{Schema, SchemaRef};
use arrow::row::{RowConverter, SortField};
use std::collections::HashSet;

/// Name accepted in a column subset to mean the temporal key itself
pub const INDEX_ALIAS: &str = "index";

/// Which columns must match for two rows to be the same logical record
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Every column, temporal key included
    #[default]
    FullRow,
    /// Temporal key only
    KeyOnly,
    /// The listed columns plus the temporal key; an empty list compares every column
    Columns(Vec<String>),
}

impl DuplicatePolicy {
    /// `None` or an empty list means full-row comparison
    pub fn from_columns(columns: Option<Vec<String>>) -> Self {
        match columns {
            Some(columns) if !columns.is_empty() => Self::Columns(columns),
            _ => Self::FullRow,
        }
    }

    /// Indices of the compared columns in `schema`, temporal key included.
    pub fn resolve(&self, schema: &Schema, key_index: usize) -> Result<Vec<usize>> {
        match self {
            Self::FullRow => Ok((0..schema.fields().len()).collect()),
            Self::Columns(names) if names.is_empty() => Ok((0..schema.fields().len()).collect()),
            Self::KeyOnly => Ok(vec![key_index]),
            Self::Columns(names) => {
                let mut indices = vec![key_index];
                for name in names {
                    let index = match schema.index_of(name) {
                        Ok(index) => index,
                        Err(_) if name == INDEX_ALIAS => key_index,
                        Err(_) => {
                            return Err(CoreError::schema(format!(
                                "duplicate column '{}' is not a column name in {:?}",
                                name,
                                column_names(schema)
                            )));
                        }
                    };
                    if !indices.contains(&index) {
                        indices.push(index);
                    }
                }
                indices.sort_unstable();
                Ok(indices)
            }
        }
    }
}

/// Merged rows for one partition and whether they differ from what is stored
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub merged: RecordBatch,
    pub changed: bool,
}

/// Merge `new_slice` into `existing` for a single partition.
///
/// `key` names the temporal key column. When both inputs hold rows the result
/// is sorted by key and deduplicated under `policy`, keeping the last
/// occurrence; `changed` is false when the result is row-for-row identical to
/// `existing`.
pub fn merge(
    existing: &RecordBatch,
    new_slice: &RecordBatch,
    key: &str,
    policy: &DuplicatePolicy,
) -> Result<MergeOutcome> {
    let new_key = resolve_key_column(new_slice.schema_ref(), Some(key))?;
    policy.resolve(new_slice.schema_ref(), new_key)?;

    if existing.num_rows() == 0 {
        return Ok(MergeOutcome {
            merged: new_slice.clone(),
            changed: new_slice.num_rows() > 0,
        });
    }
    if new_slice.num_rows() == 0 {
        return Ok(MergeOutcome {
            merged: existing.clone(),
            changed: false,
        });
    }

    let schema = existing.schema();
    let aligned = align_to_schema(new_slice, &schema)?;
    let combined = concat_batches(&schema, [existing, &aligned])?;

    let key_index = resolve_key_column(&schema, Some(key))?;
    let keys = key_nanos(combined.column(key_index).as_ref())?;

    // Stable: equal keys keep existing-then-new order
    let mut order: Vec<usize> = (0..combined.num_rows()).collect();
    order.sort_by_key(|&i| keys[i]);

    let compared = policy.resolve(&schema, key_index)?;
    let converter = RowConverter::new(
        compared
            .iter()
            .map(|&i| SortField::new(schema.field(i).data_type().clone()))
            .collect(),
    )?;
    let columns: Vec<ArrayRef> = compared
        .iter()
        .map(|&i| combined.column(i).clone())
        .collect();
    let rows = converter.convert_columns(&columns)?;

    let mut seen = HashSet::with_capacity(order.len());
    let mut keep: Vec<u32> = Vec::with_capacity(order.len());
    for &i in order.iter().rev() {
        if seen.insert(rows.row(i)) {
            keep.push(i as u32);
        }
    }
    keep.reverse();

    tracing::trace!(
        existing = existing.num_rows(),
        incoming = new_slice.num_rows(),
        kept = keep.len(),
        "Merged partition rows"
    );

    let merged = take_record_batch(&combined, &UInt32Array::from(keep))?;
    let changed = !same_rows(existing, &merged);
    Ok(MergeOutcome { merged, changed })
}

/// Reorder `batch` columns to match `schema` by name.
///
/// Column names and types must agree exactly; nullability follows `schema`.
pub fn align_to_schema(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    let incoming = batch.schema();
    if incoming.fields().len() != schema.fields().len() {
        return Err(CoreError::schema(format!(
            "column mismatch: dataset has {:?}, batch has {:?}",
            column_names(schema),
            column_names(&incoming)
        )));
    }

    let mut columns = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let index = incoming.index_of(field.name()).map_err(|_| {
            CoreError::schema(format!(
                "column '{}' is missing from batch columns {:?}",
                field.name(),
                column_names(&incoming)
            ))
        })?;
        let data_type = incoming.field(index).data_type();
        if data_type != field.data_type() {
            return Err(CoreError::schema(format!(
                "column '{}' has type {} but dataset stores {}",
                field.name(),
                data_type,
                field.data_type()
            )));
        }
        columns.push(batch.column(index).clone());
    }

    RecordBatch::try_new(schema.clone(), columns)
        .map_err(|e| CoreError::schema(format!("batch does not fit dataset schema: {}", e)))
}

/// Row-for-row equality of column values, ignoring schema metadata
pub fn same_rows(a: &RecordBatch, b: &RecordBatch) -> bool {
    a.num_rows() == b.num_rows()
        && a.num_columns() == b.num_columns()
        && a
            .columns()
            .iter()
            .zip(b.columns())
            .all(|(x, y)| x.to_data() == y.to_data())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, StringArray, TimestampNanosecondArray};
    use arrow::datatypes::{DataType, Field, TimeUnit};
    use std::sync::Arc;

    const MINUTE: i64 = 60_000_000_000;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("timestamp", DataType::Timestamp(TimeUnit::Nanosecond, None), false),
            Field::new("humidity", DataType::Float64, false),
            Field::new("pressure", DataType::Float64, false),
            Field::new("location", DataType::Utf8, false),
        ]))
    }

    fn rows(data: &[(i64, f64, f64, &str)]) -> RecordBatch {
        RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(TimestampNanosecondArray::from(
                    data.iter().map(|r| r.0 * MINUTE).collect::<Vec<_>>(),
                )),
                Arc::new(Float64Array::from(
                    data.iter().map(|r| r.1).collect::<Vec<_>>(),
                )),
                Arc::new(Float64Array::from(
                    data.iter().map(|r| r.2).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    data.iter().map(|r| r.3).collect::<Vec<_>>(),
                )),
            ],
        )
        .unwrap()
    }

    fn humidity(batch: &RecordBatch) -> Vec<f64> {
        batch
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
            .values()
            .to_vec()
    }

    fn minutes(batch: &RecordBatch) -> Vec<i64> {
        key_nanos(batch.column(0).as_ref())
            .unwrap()
            .into_iter()
            .map(|k| k / MINUTE)
            .collect()
    }

    #[test]
    fn test_empty_existing_takes_new_slice_as_is() {
        let new = rows(&[(5, 0.1, 1.0, "Paris"), (5, 0.1, 1.0, "Paris")]);
        let outcome = merge(&rows(&[]), &new, "timestamp", &DuplicatePolicy::FullRow).unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.merged.num_rows(), 2);

        let nothing = merge(&rows(&[]), &rows(&[]), "timestamp", &DuplicatePolicy::FullRow).unwrap();
        assert!(!nothing.changed);
    }

    #[test]
    fn test_empty_new_slice_changes_nothing() {
        let existing = rows(&[(1, 0.3, 1.0, "Paris")]);
        let outcome = merge(&existing, &rows(&[]), "timestamp", &DuplicatePolicy::KeyOnly).unwrap();
        assert!(!outcome.changed);
        assert!(same_rows(&outcome.merged, &existing));
    }

    #[test]
    fn test_identical_resubmission_is_unchanged() {
        let existing = rows(&[(1, 0.3, 1.0, "Paris"), (3, 0.8, 1.1, "Paris")]);
        let outcome = merge(
            &existing,
            &rows(&[(3, 0.8, 1.1, "Paris")]),
            "timestamp",
            &DuplicatePolicy::FullRow,
        )
        .unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.merged.num_rows(), 2);
    }

    #[test]
    fn test_key_only_new_row_wins() {
        let existing = rows(&[(1, 0.3, 1.0, "Paris"), (2, 0.5, 1.0, "Paris")]);
        let new = rows(&[(1, 0.9, 2.0, "Milan")]);
        let outcome = merge(&existing, &new, "timestamp", &DuplicatePolicy::KeyOnly).unwrap();

        assert!(outcome.changed);
        assert_eq!(minutes(&outcome.merged), vec![1, 2]);
        assert_eq!(humidity(&outcome.merged), vec![0.9, 0.5]);
    }

    #[test]
    fn test_last_new_row_wins_among_duplicates() {
        let existing = rows(&[(1, 0.3, 1.0, "Paris")]);
        let new = rows(&[(1, 0.4, 1.0, "Paris"), (0, 0.1, 1.0, "Paris"), (1, 0.6, 1.0, "Paris")]);
        let outcome = merge(&existing, &new, "timestamp", &DuplicatePolicy::KeyOnly).unwrap();

        assert_eq!(minutes(&outcome.merged), vec![0, 1]);
        assert_eq!(humidity(&outcome.merged), vec![0.1, 0.6]);
    }

    #[test]
    fn test_empty_column_list_compares_full_rows() {
        assert_eq!(DuplicatePolicy::from_columns(Some(Vec::new())), DuplicatePolicy::FullRow);
        assert_eq!(DuplicatePolicy::from_columns(None), DuplicatePolicy::FullRow);

        let existing = rows(&[(1, 0.3, 1.0, "Paris")]);
        let new = rows(&[(1, 0.9, 1.0, "Paris")]);
        let outcome = merge(
            &existing,
            &new,
            "timestamp",
            &DuplicatePolicy::Columns(Vec::new()),
        )
        .unwrap();

        assert!(outcome.changed);
        assert_eq!(humidity(&outcome.merged), vec![0.3, 0.9]);
    }

    #[test]
    fn test_full_row_keeps_rows_differing_in_any_column() {
        let existing = rows(&[(1, 0.3, 1.0, "Paris")]);
        let new = rows(&[(1, 0.3, 1.1, "Paris"), (0, 0.3, 1.0, "Paris")]);
        let outcome = merge(&existing, &new, "timestamp", &DuplicatePolicy::FullRow).unwrap();

        assert!(outcome.changed);
        assert_eq!(minutes(&outcome.merged), vec![0, 1, 1]);
    }

    #[test]
    fn test_column_subset_supersedes_and_keeps() {
        let existing = rows(&[(1, 0.4, 1.0, "Paris")]);
        // Same key, humidity and location: differs only in excluded pressure -> supersedes.
        // Different humidity -> distinct record, kept.
        let new = rows(&[(1, 0.4, 1.1, "Paris"), (1, 0.5, 1.1, "Paris")]);
        let policy = DuplicatePolicy::Columns(vec!["humidity".into(), "location".into()]);
        let outcome = merge(&existing, &new, "timestamp", &policy).unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.merged.num_rows(), 2);
        assert_eq!(humidity(&outcome.merged), vec![0.4, 0.5]);
        let pressure = outcome
            .merged
            .column(2)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(pressure.value(0), 1.1);
    }

    #[test]
    fn test_index_alias_means_temporal_key() {
        let existing = rows(&[(1, 0.3, 1.0, "Paris")]);
        let new = rows(&[(1, 0.4, 1.0, "Paris")]);
        let policy = DuplicatePolicy::Columns(vec![INDEX_ALIAS.into()]);
        let outcome = merge(&existing, &new, "timestamp", &policy).unwrap();
        assert_eq!(humidity(&outcome.merged), vec![0.4]);
    }

    #[test]
    fn test_unknown_policy_column_is_schema_error() {
        let policy = DuplicatePolicy::Columns(vec!["temperature".into()]);
        let err = merge(
            &rows(&[(1, 0.3, 1.0, "Paris")]),
            &rows(&[(1, 0.3, 1.0, "Paris")]),
            "timestamp",
            &policy,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Schema { .. }));
    }

    #[test]
    fn test_merge_converges() {
        let existing = rows(&[(1, 0.3, 1.0, "Paris"), (2, 0.5, 1.0, "Paris")]);
        let new = rows(&[(2, 0.7, 1.0, "Paris"), (3, 0.2, 1.0, "Milan")]);
        let policy = DuplicatePolicy::KeyOnly;

        let once = merge(&existing, &new, "timestamp", &policy).unwrap();
        assert!(once.changed);
        let twice = merge(&once.merged, &new, "timestamp", &policy).unwrap();
        assert!(!twice.changed);
        assert!(same_rows(&once.merged, &twice.merged));
    }

    #[test]
    fn test_column_order_is_aligned_and_types_checked() {
        let existing = rows(&[(1, 0.3, 1.0, "Paris")]);
        let reordered_schema = Arc::new(Schema::new(vec![
            Field::new("location", DataType::Utf8, false),
            Field::new("timestamp", DataType::Timestamp(TimeUnit::Nanosecond, None), false),
            Field::new("pressure", DataType::Float64, false),
            Field::new("humidity", DataType::Float64, false),
        ]));
        let reordered = RecordBatch::try_new(
            reordered_schema,
            vec![
                Arc::new(StringArray::from(vec!["Paris"])),
                Arc::new(TimestampNanosecondArray::from(vec![2 * MINUTE])),
                Arc::new(Float64Array::from(vec![1.0])),
                Arc::new(Float64Array::from(vec![0.6])),
            ],
        )
        .unwrap();
        let outcome = merge(&existing, &reordered, "timestamp", &DuplicatePolicy::FullRow).unwrap();
        assert_eq!(humidity(&outcome.merged), vec![0.3, 0.6]);

        let wrong_type_schema = Arc::new(Schema::new(vec![
            Field::new("timestamp", DataType::Timestamp(TimeUnit::Nanosecond, None), false),
            Field::new("humidity", DataType::Utf8, false),
            Field::new("pressure", DataType::Float64, false),
            Field::new("location", DataType::Utf8, false),
        ]));
        let wrong = RecordBatch::try_new(
            wrong_type_schema,
            vec![
                Arc::new(TimestampNanosecondArray::from(vec![2 * MINUTE])),
                Arc::new(StringArray::from(vec!["wet"])),
                Arc::new(Float64Array::from(vec![1.0])),
                Arc::new(StringArray::from(vec!["Paris"])),
            ],
        )
        .unwrap();
        assert!(matches!(
            merge(&existing, &wrong, "timestamp", &DuplicatePolicy::FullRow),
            Err(CoreError::Schema { .. })
        ));
    }
}
