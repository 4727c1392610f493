//! Conversion of accumulation tables to Arrow RecordBatches
//!
//! Column types are inferred from the cells, with fixed dtypes forced onto
//! the standard capsule columns (timestamps stay timestamps even when every
//! cell is null).

use super::capsule::CapsuleTable;
use super::sample::SampleTable;
use super::value::Value;
use crate::error::Result;
use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, NullArray, StringArray,
    TimestampNanosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// The four standard capsule columns, in required order
pub const CAPSULE_FRONT_COLUMNS: [&str; 4] = [
    "Condition",
    "Capsule Start",
    "Capsule End",
    "Capsule Is Uncertain",
];

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into()))
}

/// Infer an Arrow DataType from a single cell
fn infer_cell_type(value: &Value) -> DataType {
    match value {
        Value::Null => DataType::Null,
        Value::Bool(_) => DataType::Boolean,
        Value::Int(_) => DataType::Int64,
        Value::Float(_) => DataType::Float64,
        Value::Str(_) | Value::Enum(..) => DataType::Utf8,
        Value::Timestamp(_) => timestamp_type(),
    }
}

/// Merge two data types into a compatible type
fn merge_types(type1: &DataType, type2: &DataType) -> DataType {
    match (type1, type2) {
        // Same types
        (a, b) if a == b => a.clone(),

        // Null can merge with anything
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),

        // Numbers can merge (prefer Float64 for mixed)
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            DataType::Float64
        }

        // Different types -> fall back to String (most flexible)
        _ => DataType::Utf8,
    }
}

/// Infer a column's type from all of its cells
fn infer_column_type(cells: &[Value]) -> DataType {
    cells.iter().fold(DataType::Null, |acc, cell| {
        merge_types(&acc, &infer_cell_type(cell))
    })
}

/// Build an Arrow array from cells
fn build_array(cells: &[Value], data_type: &DataType) -> Result<ArrayRef> {
    match data_type {
        DataType::Null => Ok(Arc::new(NullArray::new(cells.len()))),

        DataType::Boolean => {
            let arr: BooleanArray = cells
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    Value::Int(i) => Some(*i != 0),
                    _ => None,
                })
                .collect();
            Ok(Arc::new(arr))
        }

        DataType::Int64 => {
            let arr: Int64Array = cells
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect();
            Ok(Arc::new(arr))
        }

        DataType::Float64 => {
            let arr: Float64Array = cells.iter().map(Value::as_f64).collect();
            Ok(Arc::new(arr))
        }

        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            let arr: TimestampNanosecondArray = cells
                .iter()
                .map(|v| match v {
                    Value::Timestamp(ns) | Value::Int(ns) => Some(*ns),
                    _ => None,
                })
                .collect::<TimestampNanosecondArray>()
                .with_timezone("UTC");
            Ok(Arc::new(arr))
        }

        // Utf8 and anything else falls back to a rendered string column
        _ => {
            let arr: StringArray = cells
                .iter()
                .map(|v| if v.is_null() { None } else { Some(v.render()) })
                .collect();
            Ok(Arc::new(arr))
        }
    }
}

/// Convert a samples-shape table into a RecordBatch.
///
/// Column layout: the timestamp index, then the group-by key columns, then
/// the data columns in the table's current order.
pub fn sample_table_to_batch(table: &SampleTable) -> Result<RecordBatch> {
    let mut fields: Vec<Field> = Vec::new();
    let mut arrays: Vec<ArrayRef> = Vec::new();

    let timestamps: TimestampNanosecondArray = table
        .index()
        .iter()
        .map(|(ts, _)| Some(*ts))
        .collect::<TimestampNanosecondArray>()
        .with_timezone("UTC");
    fields.push(Field::new("Timestamp", timestamp_type(), false));
    arrays.push(Arc::new(timestamps));

    for (pos, name) in table.group_columns().iter().enumerate() {
        let arr: StringArray = table
            .index()
            .iter()
            .map(|(_, group)| group.get(pos).cloned())
            .collect();
        fields.push(Field::new(name, DataType::Utf8, true));
        arrays.push(Arc::new(arr));
    }

    for name in table.column_names() {
        let cells = table.column(name).unwrap_or(&[]);
        let dtype = infer_column_type(cells);
        arrays.push(build_array(cells, &dtype)?);
        fields.push(Field::new(name, dtype, true));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Convert a capsules-shape table into a RecordBatch.
///
/// The four standard columns are forced to fixed dtypes regardless of their
/// contents, so an empty pull still yields timestamp-typed Start/End columns.
pub fn capsule_table_to_batch(table: &CapsuleTable) -> Result<RecordBatch> {
    let mut fields: Vec<Field> = Vec::new();
    let mut arrays: Vec<ArrayRef> = Vec::new();

    for (col, name) in table.column_names().iter().enumerate() {
        let cells: Vec<Value> = (0..table.num_rows())
            .map(|row| table.row_cells(row).map_or(Value::Null, |r| r[col].clone()))
            .collect();

        let dtype = match name.as_str() {
            "Condition" => DataType::Utf8,
            "Capsule Start" | "Capsule End" => timestamp_type(),
            "Capsule Is Uncertain" => DataType::Boolean,
            _ => infer_column_type(&cells),
        };

        arrays.push(build_array(&cells, &dtype)?);
        fields.push(Field::new(name, dtype, true));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}
