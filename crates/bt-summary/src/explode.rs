//! Flattening of jagged tables into one row per sub-object.
//!
//! Events carrying variable-length sub-arrays (e.g. several jets per event)
//! are exploded so that one output row corresponds to one sub-object, with
//! event-level scalar columns replicated across the exploded rows. Only the
//! outermost nesting level is flattened: a two-level jagged column keeps its
//! inner arrays as single elements and comes out as a one-level jagged
//! column.

use bt_core::column::{Column, DataTable, JaggedCol};
use bt_core::error::{Error, Result};

/// Explode a table's jagged columns into flat rows.
///
/// All jagged columns must agree on per-row lengths; rows where the jagged
/// length is zero contribute no output rows. A table with no jagged columns
/// passes through unchanged.
pub fn explode(table: &DataTable) -> Result<DataTable> {
    let jagged: Vec<(&str, &Column)> =
        table.iter().filter(|(_, c)| c.is_jagged()).collect();

    let Some(&(ref_name, ref_col)) = jagged.first() else {
        return Ok(table.clone());
    };

    let n_rows = table.n_rows();
    let mut lengths = Vec::with_capacity(n_rows);
    for i in 0..n_rows {
        // row_len is Some for every jagged variant
        let len = ref_col.row_len(i).unwrap_or(0);
        for (name, col) in &jagged[1..] {
            let other = col.row_len(i).unwrap_or(0);
            if other != len {
                return Err(Error::Jaggedness(format!(
                    "columns '{ref_name}' and '{name}' have different jaggedness \
                     (row {i}: {len} vs {other})"
                )));
            }
        }
        lengths.push(len);
    }

    let total: usize = lengths.iter().sum();
    let mut out = DataTable::new();
    for (name, col) in table.iter() {
        let exploded = match col {
            Column::Scalar(values) => {
                let mut repl = Vec::with_capacity(total);
                for (v, len) in values.iter().zip(&lengths) {
                    repl.extend(std::iter::repeat_n(*v, *len));
                }
                Column::Scalar(repl)
            }
            // Lockstep lengths mean the flat order is already row-major
            // across exploded rows.
            Column::Jagged(j) => Column::Scalar(j.flat.clone()),
            // Inner arrays become single elements of the exploded rows.
            Column::DoublyJagged(d) => Column::Jagged(JaggedCol {
                flat: d.inner.flat.clone(),
                offsets: d.inner.offsets.clone(),
            }),
        };
        out.push(name, exploded)?;
    }

    Ok(out)
}
