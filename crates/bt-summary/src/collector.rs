//! Merging of accumulated states across readers and datasets.
//!
//! A [`Collector`] consumes an ordered sequence of `(dataset, readers)`
//! pairs, sums each dataset's [`BinnedTable`] states key-by-key (a monoid
//! merge: associative, commutative, identity = the empty state) and builds a
//! [`MergedTable`] according to the `dataset_col` / `pad_missing` policies.
//! Collecting is a pure read of the accumulators; the result is a value,
//! never shared running state.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use bt_core::error::Result;

use crate::accumulator::{BinTuple, BinnedTable, CellStats};
use crate::binning::{BinSpec, Interval};
use crate::writer::{CsvWriter, TableWriter};

/// One `(dataset name, readers)` group handed to the collector.
pub type DatasetReaders<'a> = (&'a str, &'a [&'a BinnedTable]);

/// Combines the states of many accumulators into one output table.
#[derive(Debug, Clone)]
pub struct Collector {
    name: String,
    out_dir: PathBuf,
    binnings: Vec<BinSpec>,
    weight_names: Vec<String>,
    dataset_col: bool,
    pad_missing: bool,
}

impl Collector {
    pub(crate) fn new(
        name: String,
        out_dir: PathBuf,
        binnings: Vec<BinSpec>,
        weight_names: Vec<String>,
        dataset_col: bool,
        pad_missing: bool,
    ) -> Self {
        Collector { name, out_dir, binnings, weight_names, dataset_col, pad_missing }
    }

    /// Merge the given accumulators into a fresh output table.
    ///
    /// Pure: input accumulators are read-only and may be collected again.
    pub fn prepare_output(&self, dataset_readers_list: &[DatasetReaders<'_>]) -> MergedTable {
        let n_weights = self.weight_names.len();

        // Per-dataset monoid merge across that dataset's readers.
        let mut per_dataset: Vec<(String, BTreeMap<BinTuple, CellStats>)> =
            Vec::with_capacity(dataset_readers_list.len());
        for (dataset, readers) in dataset_readers_list {
            let mut merged: BTreeMap<BinTuple, CellStats> = BTreeMap::new();
            for reader in *readers {
                for (key, stats) in reader.state() {
                    merged
                        .entry(key.clone())
                        .or_insert_with(|| CellStats::zeroed(n_weights))
                        .merge(stats);
                }
            }
            per_dataset.push((dataset.to_string(), merged));
        }

        let mut rows = Vec::new();
        if self.dataset_col {
            // Union of bins populated in any dataset, for padding.
            let union: BTreeSet<&BinTuple> =
                per_dataset.iter().flat_map(|(_, m)| m.keys()).collect();
            for (dataset, merged) in &per_dataset {
                if self.pad_missing {
                    for &key in &union {
                        let stats = merged
                            .get(key)
                            .cloned()
                            .unwrap_or_else(|| CellStats::zeroed(n_weights));
                        rows.push(self.make_row(Some(dataset.clone()), key, stats));
                    }
                } else {
                    for (key, stats) in merged {
                        rows.push(self.make_row(Some(dataset.clone()), key, stats.clone()));
                    }
                }
            }
        } else {
            // Sum datasets together; the populated union is the bin space.
            let mut total: BTreeMap<BinTuple, CellStats> = BTreeMap::new();
            for (_, merged) in &per_dataset {
                for (key, stats) in merged {
                    total
                        .entry(key.clone())
                        .or_insert_with(|| CellStats::zeroed(n_weights))
                        .merge(stats);
                }
            }
            for (key, stats) in total {
                rows.push(self.make_row(None, &key, stats));
            }
        }

        tracing::debug!(
            table = %self.name,
            datasets = per_dataset.len(),
            rows = rows.len(),
            "output prepared"
        );

        MergedTable {
            dimensions: self.binnings.iter().map(|b| b.out().to_string()).collect(),
            weight_names: self.weight_names.clone(),
            has_dataset_level: self.dataset_col,
            rows,
        }
    }

    /// Merge and, when `write_files` is set, persist the table as CSV into
    /// the configured output directory.
    pub fn collect(
        &self,
        dataset_readers_list: &[DatasetReaders<'_>],
        write_files: bool,
    ) -> Result<MergedTable> {
        if write_files {
            self.collect_with(dataset_readers_list, &CsvWriter)
        } else {
            Ok(self.prepare_output(dataset_readers_list))
        }
    }

    /// Merge and persist through a caller-supplied writer.
    pub fn collect_with(
        &self,
        dataset_readers_list: &[DatasetReaders<'_>],
        writer: &dyn TableWriter,
    ) -> Result<MergedTable> {
        let table = self.prepare_output(dataset_readers_list);
        writer.write(&self.name, &self.out_dir, &table)?;
        Ok(table)
    }

    fn make_row(&self, dataset: Option<String>, key: &BinTuple, stats: CellStats) -> MergedRow {
        let bins =
            self.binnings.iter().zip(key).map(|(spec, &b)| spec.interval(b)).collect();
        MergedRow { dataset, bins, stats }
    }
}

/// One row of a merged output table.
#[derive(Debug, Clone)]
pub struct MergedRow {
    /// Dataset identity, present when the collector emits a dataset level.
    pub dataset: Option<String>,
    /// The bin interval of each dimension, in binning order.
    pub bins: Vec<Interval>,
    /// Summed statistics for this cell.
    pub stats: CellStats,
}

/// An immutable merged output table.
///
/// Rows are ordered by dataset (input order), then by bin tuple; columns are
/// `n` plus `<weight>:sumw` / `<weight>:sumw2` per weight, summable across
/// rows to get run totals.
#[derive(Debug, Clone)]
pub struct MergedTable {
    dimensions: Vec<String>,
    weight_names: Vec<String>,
    has_dataset_level: bool,
    rows: Vec<MergedRow>,
}

impl MergedTable {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of index levels: one per dimension, plus the dataset level.
    pub fn nlevels(&self) -> usize {
        self.dimensions.len() + usize::from(self.has_dataset_level)
    }

    /// Dimension labels, in binning order.
    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    /// Weight names, in weight-spec order.
    pub fn weight_names(&self) -> &[String] {
        &self.weight_names
    }

    /// Whether rows carry a dataset label.
    pub fn has_dataset_level(&self) -> bool {
        self.has_dataset_level
    }

    /// Table rows in output order.
    pub fn rows(&self) -> &[MergedRow] {
        &self.rows
    }

    /// Stat column names: `n`, then `<weight>:sumw` / `<weight>:sumw2`.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec!["n".to_string()];
        for w in &self.weight_names {
            names.push(format!("{w}:sumw"));
            names.push(format!("{w}:sumw2"));
        }
        names
    }

    /// Values of one stat column, by name. `None` for unknown columns.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        if name == "n" {
            return Some(self.rows.iter().map(|r| r.stats.n as f64).collect());
        }
        for (i, w) in self.weight_names.iter().enumerate() {
            if name == format!("{w}:sumw") {
                return Some(self.rows.iter().map(|r| r.stats.sumw[i]).collect());
            }
            if name == format!("{w}:sumw2") {
                return Some(self.rows.iter().map(|r| r.stats.sumw2[i]).collect());
            }
        }
        None
    }

    /// Sum of every stat column over all rows.
    pub fn totals(&self) -> BTreeMap<String, f64> {
        self.column_names()
            .into_iter()
            .map(|name| {
                let sum = self.column(&name).map(|c| c.iter().sum()).unwrap_or(0.0);
                (name, sum)
            })
            .collect()
    }
}
