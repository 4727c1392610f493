//! In-memory accumulation tables and Arrow conversion
//!
//! Pull results accumulate in column-oriented tables keyed the way the
//! output shape demands (timestamp-indexed for samples, row-stacked for
//! capsules), then convert to an Arrow `RecordBatch` at the end.

mod arrow;
mod capsule;
mod sample;
mod value;

pub use self::arrow::{capsule_table_to_batch, sample_table_to_batch, CAPSULE_FRONT_COLUMNS};
pub use capsule::{CapsuleRow, CapsuleTable};
pub use sample::{RowKey, SampleTable};
pub use value::{Series, Value};
