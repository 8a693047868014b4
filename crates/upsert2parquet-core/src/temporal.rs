// Temporal key handling
//
// The temporal key is either the column named by the caller or, when none is
// given, the first column of the batch. Timestamps of any unit and Date32 /
// Date64 "period" columns are accepted; all are normalized to nanoseconds
// since the Unix epoch (UTC) for comparisons.

use crate::error::{CoreError, Result};
use arrow::array::{Array, AsArray};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Field, Schema, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType,
};
use chrono::{DateTime, NaiveDateTime};

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_DAY: i64 = 86_400 * NANOS_PER_SECOND;

/// True for Arrow types usable as a temporal key
pub fn is_temporal(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
    )
}

/// Index of the temporal key column in `schema`.
///
/// Fails with a schema error when `group_on` names a missing column or when the
/// resolved column is not date-like.
pub fn resolve_key_column(schema: &Schema, group_on: Option<&str>) -> Result<usize> {
    let index = match group_on {
        Some(name) => schema.index_of(name).map_err(|_| {
            CoreError::schema(format!(
                "grouping column '{}' not found in {:?}",
                name,
                column_names(schema)
            ))
        })?,
        None if schema.fields().is_empty() => {
            return Err(CoreError::schema("batch has no columns"));
        }
        None => 0,
    };

    ensure_temporal(schema.field(index))?;
    Ok(index)
}

fn ensure_temporal(field: &Field) -> Result<()> {
    if is_temporal(field.data_type()) {
        Ok(())
    } else {
        Err(CoreError::schema(format!(
            "grouping column '{}' has type {} which is not date-like or period-like",
            field.name(),
            field.data_type()
        )))
    }
}

/// Key values as nanoseconds since the Unix epoch, one per row
pub fn key_nanos(column: &dyn Array) -> Result<Vec<i64>> {
    if column.null_count() > 0 {
        return Err(CoreError::schema(format!(
            "temporal key contains {} null value(s); every row needs an ordered key",
            column.null_count()
        )));
    }

    match column.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => scale(
            &column.as_primitive::<TimestampSecondType>().values()[..],
            NANOS_PER_SECOND,
        ),
        DataType::Timestamp(TimeUnit::Millisecond, _) => scale(
            &column.as_primitive::<TimestampMillisecondType>().values()[..],
            1_000_000,
        ),
        DataType::Timestamp(TimeUnit::Microsecond, _) => scale(
            &column.as_primitive::<TimestampMicrosecondType>().values()[..],
            1_000,
        ),
        DataType::Timestamp(TimeUnit::Nanosecond, _) => Ok(column
            .as_primitive::<TimestampNanosecondType>()
            .values()
            .to_vec()),
        DataType::Date32 => scale(&column.as_primitive::<Date32Type>().values()[..], NANOS_PER_DAY),
        DataType::Date64 => scale(&column.as_primitive::<Date64Type>().values()[..], 1_000_000),
        other => Err(CoreError::schema(format!(
            "temporal key of type {} is not date-like or period-like",
            other
        ))),
    }
}

fn scale<T: Copy + Into<i64>>(values: &[T], factor: i64) -> Result<Vec<i64>> {
    values
        .iter()
        .map(|&v| {
            let v: i64 = v.into();
            v.checked_mul(factor).ok_or_else(|| {
                CoreError::schema(format!(
                    "temporal key value {} cannot be represented in nanoseconds",
                    v
                ))
            })
        })
        .collect()
}

pub fn to_nanos(at: NaiveDateTime) -> Result<i64> {
    at.and_utc().timestamp_nanos_opt().ok_or_else(|| {
        CoreError::schema(format!(
            "timestamp {} cannot be represented in nanoseconds",
            at
        ))
    })
}

pub fn from_nanos(nanos: i64) -> NaiveDateTime {
    DateTime::from_timestamp_nanos(nanos).naive_utc()
}

pub(crate) fn column_names(schema: &Schema) -> Vec<&str> {
    schema.fields().iter().map(|f| f.name().as_str()).collect()
}
