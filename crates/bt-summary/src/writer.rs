//! Output writing collaborators.
//!
//! Persistence stays behind the [`TableWriter`] trait so the merge logic
//! never depends on a concrete format; [`CsvWriter`] is the stock
//! implementation used by `Collector::collect`.

use std::path::Path;

use bt_core::error::{Error, Result};

use crate::collector::MergedTable;

/// Writes a merged table to durable storage.
pub trait TableWriter {
    /// Persist `table` under the given accumulator name and directory.
    fn write(&self, name: &str, out_dir: &Path, table: &MergedTable) -> Result<()>;
}

/// CSV file writer: one file per collected table, named
/// `tbl_<dim0>.<dim1>...--<name>.csv`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvWriter;

impl TableWriter for CsvWriter {
    fn write(&self, name: &str, out_dir: &Path, table: &MergedTable) -> Result<()> {
        std::fs::create_dir_all(out_dir)?;
        let filename = format!("tbl_{}--{}.csv", table.dimensions().join("."), name);
        let path = out_dir.join(filename);

        let mut w = csv::Writer::from_path(&path).map_err(csv_err)?;

        let mut header: Vec<String> = Vec::new();
        if table.has_dataset_level() {
            header.push("dataset".to_string());
        }
        header.extend(table.dimensions().iter().cloned());
        header.extend(table.column_names());
        w.write_record(&header).map_err(csv_err)?;

        for row in table.rows() {
            let mut record: Vec<String> = Vec::new();
            if let Some(dataset) = &row.dataset {
                record.push(dataset.clone());
            }
            for bin in &row.bins {
                record.push(bin.to_string());
            }
            record.push(row.stats.n.to_string());
            for i in 0..row.stats.sumw.len() {
                record.push(row.stats.sumw[i].to_string());
                record.push(row.stats.sumw2[i].to_string());
            }
            w.write_record(&record).map_err(csv_err)?;
        }
        w.flush()?;

        tracing::debug!(table = %name, path = %path.display(), "table written");
        Ok(())
    }
}

fn csv_err(e: csv::Error) -> Error {
    Error::Io(std::io::Error::other(e))
}
