//! Per-reader accumulation of binned, weighted statistics.
//!
//! A [`BinnedTable`] owns one [`AccumulatorState`](BTreeMap) mapping the
//! multi-dimensional bin tuple of each populated cell to its running
//! statistics. Each `event()` call buckets one chunk; the state grows
//! monotonically and is only ever read (never reset) by collection.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use bt_core::column::DataTable;
use bt_core::error::{Error, Result};
use bt_core::traits::ChunkSource;
use serde::Deserialize;

use crate::binning::{BinSpec, BinningConfig, WeightSpec, WeightsConfig};
use crate::collector::Collector;
use crate::explode::explode;
use crate::expr::CompiledExpr;

/// Ordered per-dimension bin indices identifying one output cell.
pub type BinTuple = Vec<usize>;

/// Construction-time configuration for a [`BinnedTable`].
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    /// Ordered binning dimensions.
    pub binning: Vec<BinningConfig>,
    /// Weight definitions; the unweighted count `n` is always recorded.
    #[serde(default)]
    pub weights: Option<WeightsConfig>,
    /// Emit a dataset-identity index level when collecting.
    #[serde(default = "default_true")]
    pub dataset_col: bool,
    /// Materialize bins missing from one dataset but present in another.
    #[serde(default)]
    pub pad_missing: bool,
}

fn default_true() -> bool {
    true
}

/// Per-cell statistics: unweighted count plus per-weight sums.
#[derive(Debug, Clone, PartialEq)]
pub struct CellStats {
    /// Unweighted row count.
    pub n: u64,
    /// Sum of each weight, in weight-spec order.
    pub sumw: Vec<f64>,
    /// Sum of each squared weight, in weight-spec order.
    pub sumw2: Vec<f64>,
}

impl CellStats {
    /// Zero-initialized stats for `n_weights` weight definitions.
    pub fn zeroed(n_weights: usize) -> Self {
        CellStats { n: 0, sumw: vec![0.0; n_weights], sumw2: vec![0.0; n_weights] }
    }

    /// Fold one row's weights in.
    pub fn add_row(&mut self, weights: &[f64]) {
        self.n += 1;
        for (i, w) in weights.iter().enumerate() {
            self.sumw[i] += w;
            self.sumw2[i] += w * w;
        }
    }

    /// Fold another cell's totals in (monoid merge).
    pub fn merge(&mut self, other: &CellStats) {
        self.n += other.n;
        for (i, w) in other.sumw.iter().enumerate() {
            self.sumw[i] += w;
        }
        for (i, w2) in other.sumw2.iter().enumerate() {
            self.sumw2[i] += w2;
        }
    }
}

/// Incremental N-dimensional binned aggregation over event chunks.
#[derive(Debug)]
pub struct BinnedTable {
    name: String,
    out_dir: PathBuf,
    binnings: Vec<BinSpec>,
    weights: Vec<WeightSpec>,
    dataset_col: bool,
    pad_missing: bool,
    state: BTreeMap<BinTuple, CellStats>,
}

impl BinnedTable {
    /// Validate the configuration and create an empty accumulator.
    pub fn new(
        name: impl Into<String>,
        out_dir: impl Into<PathBuf>,
        config: TableConfig,
    ) -> Result<Self> {
        let binnings: Vec<BinSpec> =
            config.binning.iter().map(BinSpec::from_config).collect::<Result<_>>()?;
        if binnings.is_empty() {
            return Err(Error::Config("at least one binning dimension required".into()));
        }
        let weights = match &config.weights {
            Some(cfg) => WeightSpec::from_config(cfg)?,
            None => Vec::new(),
        };
        Ok(BinnedTable {
            name: name.into(),
            out_dir: out_dir.into(),
            binnings,
            weights,
            dataset_col: config.dataset_col,
            pad_missing: config.pad_missing,
            state: BTreeMap::new(),
        })
    }

    /// Accumulator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Destination directory for persisted output.
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Configured binning dimensions.
    pub fn binnings(&self) -> &[BinSpec] {
        &self.binnings
    }

    /// Configured weight definitions.
    pub fn weights(&self) -> &[WeightSpec] {
        &self.weights
    }

    /// Override the missing-bin padding policy.
    pub fn set_pad_missing(&mut self, pad_missing: bool) {
        self.pad_missing = pad_missing;
    }

    /// Override the dataset-identity index policy.
    pub fn set_dataset_col(&mut self, dataset_col: bool) {
        self.dataset_col = dataset_col;
    }

    /// Accumulated per-cell statistics (read-only).
    pub fn state(&self) -> &BTreeMap<BinTuple, CellStats> {
        &self.state
    }

    /// Bucket one chunk of events into the accumulator.
    ///
    /// Evaluates every binning dimension and weight against the chunk,
    /// exploding jagged columns first so replicated event-level values align
    /// with sub-object rows. Errors propagate before any state mutation, so
    /// a failed chunk leaves the accumulator untouched. Calling this N times
    /// with the same chunk accumulates N times the statistics.
    pub fn event(&mut self, chunk: &dyn ChunkSource) -> Result<()> {
        // Gather every referenced column once, in first-occurrence order.
        let mut required: Vec<&str> = Vec::new();
        for expr in self
            .binnings
            .iter()
            .map(|b| b.expr())
            .chain(self.weights.iter().map(|w| w.expr()))
        {
            for name in &expr.required_columns {
                if !required.contains(&name.as_str()) {
                    required.push(name);
                }
            }
        }

        let mut table = DataTable::new();
        for name in &required {
            let col = chunk
                .column(name)
                .ok_or_else(|| Error::UnknownColumn((*name).to_string()))?;
            table.push(*name, col.clone())?;
        }

        let flat = explode(&table)?;
        let n_rows = if required.is_empty() { chunk.n_events() } else { flat.n_rows() };

        // Derived columns are cached per call so several specs sharing one
        // source are evaluated once; the cache dies with the call.
        let mut cache: HashMap<&str, Vec<f64>> = HashMap::new();
        for (source, expr) in self
            .binnings
            .iter()
            .map(|b| (b.source(), b.expr()))
            .chain(self.weights.iter().map(|w| (w.source(), w.expr())))
        {
            if !cache.contains_key(source) {
                cache.insert(source, eval_over(expr, &flat, n_rows)?);
            }
        }

        let dim_vals: Vec<&Vec<f64>> =
            self.binnings.iter().map(|b| &cache[b.source()]).collect();
        let weight_vals: Vec<&Vec<f64>> =
            self.weights.iter().map(|w| &cache[w.source()]).collect();

        let n_weights = self.weights.len();
        let mut key = vec![0usize; self.binnings.len()];
        let mut row_weights = vec![0.0f64; n_weights];
        for row in 0..n_rows {
            for (d, spec) in self.binnings.iter().enumerate() {
                key[d] = spec.find_bin(dim_vals[d][row]);
            }
            for (i, vals) in weight_vals.iter().enumerate() {
                row_weights[i] = vals[row];
            }
            self.state
                .entry(key.clone())
                .or_insert_with(|| CellStats::zeroed(n_weights))
                .add_row(&row_weights);
        }

        tracing::debug!(
            table = %self.name,
            rows = n_rows,
            cells = self.state.len(),
            "chunk accumulated"
        );
        Ok(())
    }

    /// Create a collector over this table's configuration.
    pub fn collector(&self) -> Collector {
        Collector::new(
            self.name.clone(),
            self.out_dir.clone(),
            self.binnings.to_vec(),
            self.weights.iter().map(|w| w.name().to_string()).collect(),
            self.dataset_col,
            self.pad_missing,
        )
    }
}

/// Evaluate a compiled expression against a flat table's columns.
fn eval_over(expr: &CompiledExpr, table: &DataTable, n_rows: usize) -> Result<Vec<f64>> {
    let cols: Vec<&[f64]> = expr
        .required_columns
        .iter()
        .map(|name| {
            table
                .column(name)
                .ok_or_else(|| Error::UnknownColumn(name.clone()))?
                .as_scalar(name)
        })
        .collect::<Result<_>>()?;

    if cols.is_empty() {
        // Constant expression
        return Ok(vec![expr.eval_row(&[]); n_rows]);
    }

    Ok(expr.eval_bulk(&cols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::TableChunk;
    use bt_core::column::{Column, JaggedCol};

    fn config(json: &str) -> TableConfig {
        serde_json::from_str(json).unwrap()
    }

    fn simple_table() -> BinnedTable {
        BinnedTable::new(
            "t",
            "out",
            config(
                r#"{
                    "binning": [{"out": "x", "in": "x", "nbins": 4, "low": 0.0, "high": 4.0}],
                    "weights": ["w"]
                }"#,
            ),
        )
        .unwrap()
    }

    fn simple_chunk() -> TableChunk {
        let mut chunk = TableChunk::new();
        chunk.new_variable("x", Column::Scalar(vec![0.5, 1.5, 1.7, -3.0, 9.0])).unwrap();
        chunk.new_variable("w", Column::Scalar(vec![1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        chunk
    }

    #[test]
    fn accumulates_counts_and_weights() {
        let mut t = simple_table();
        t.event(&simple_chunk()).unwrap();

        // underflow(-3), [0,1)(0.5), [1,2)(1.5, 1.7), overflow(9)
        let stats: Vec<(&BinTuple, &CellStats)> = t.state().iter().collect();
        assert_eq!(stats.len(), 4);
        assert_eq!(*stats[0].0, vec![0]);
        assert_eq!(stats[0].1.n, 1);
        assert_eq!(stats[0].1.sumw, vec![4.0]);
        assert_eq!(*stats[2].0, vec![2]);
        assert_eq!(stats[2].1.n, 2);
        assert_eq!(stats[2].1.sumw, vec![5.0]);
        assert_eq!(stats[2].1.sumw2, vec![4.0 + 9.0]);
    }

    #[test]
    fn repeated_event_doubles_totals() {
        let mut once = simple_table();
        once.event(&simple_chunk()).unwrap();
        let mut twice = simple_table();
        twice.event(&simple_chunk()).unwrap();
        twice.event(&simple_chunk()).unwrap();

        for (key, stats) in once.state() {
            let doubled = &twice.state()[key];
            assert_eq!(doubled.n, 2 * stats.n);
            assert_eq!(doubled.sumw[0], 2.0 * stats.sumw[0]);
            assert_eq!(doubled.sumw2[0], 2.0 * stats.sumw2[0]);
        }
    }

    #[test]
    fn unknown_column_leaves_state_untouched() {
        let mut t = simple_table();
        let mut chunk = TableChunk::new();
        chunk.new_variable("x", Column::Scalar(vec![1.0])).unwrap();
        // no 'w' column
        let err = t.event(&chunk).unwrap_err();
        assert!(matches!(err, Error::UnknownColumn(ref name) if name == "w"));
        assert!(t.state().is_empty());
    }

    #[test]
    fn implicit_count_without_weights() {
        let mut t = BinnedTable::new(
            "t",
            "out",
            config(r#"{"binning": [{"out": "x", "in": "x", "nbins": 2, "low": 0.0, "high": 2.0}]}"#),
        )
        .unwrap();
        let mut chunk = TableChunk::new();
        chunk.new_variable("x", Column::Scalar(vec![0.5, 0.6, 1.5])).unwrap();
        t.event(&chunk).unwrap();

        let total_n: u64 = t.state().values().map(|s| s.n).sum();
        assert_eq!(total_n, 3);
        assert!(t.state().values().all(|s| s.sumw.is_empty()));
    }

    #[test]
    fn jagged_dimension_explodes_per_subobject() {
        let mut t = BinnedTable::new(
            "t",
            "out",
            config(
                r#"{
                    "binning": [{"out": "jet_py", "in": "Jet_Py", "nbins": 2, "low": 0.0, "high": 2.0}],
                    "weights": ["EventWeight"]
                }"#,
            ),
        )
        .unwrap();

        let mut chunk = TableChunk::new();
        chunk
            .new_variable(
                "Jet_Py",
                Column::Jagged(JaggedCol::from_rows(&[vec![0.5, 1.5], vec![], vec![0.7]])),
            )
            .unwrap();
        chunk.new_variable("EventWeight", Column::Scalar(vec![2.0, 10.0, 3.0])).unwrap();
        t.event(&chunk).unwrap();

        // 3 exploded rows; the empty event vanishes, weights replicate.
        let total_n: u64 = t.state().values().map(|s| s.n).sum();
        assert_eq!(total_n, 3);
        let bin_low = &t.state()[&vec![1usize]]; // [0,1): 0.5 and 0.7
        assert_eq!(bin_low.n, 2);
        assert_eq!(bin_low.sumw, vec![5.0]);
    }

    #[test]
    fn derived_dimension_shared_with_weight_is_cached() {
        // Same source appears as a dimension and a weight; one evaluation
        // feeds both.
        let mut t = BinnedTable::new(
            "t",
            "out",
            config(
                r#"{
                    "binning": [{"out": "r", "in": "sqrt(px**2 + py**2)", "nbins": 2, "low": 0.0, "high": 10.0}],
                    "weights": {"sqrt(px**2 + py**2)": "sqrt(px**2 + py**2)"}
                }"#,
            ),
        )
        .unwrap();
        let mut chunk = TableChunk::new();
        chunk.new_variable("px", Column::Scalar(vec![3.0, 6.0])).unwrap();
        chunk.new_variable("py", Column::Scalar(vec![4.0, 8.0])).unwrap();
        t.event(&chunk).unwrap();

        // r = 5 lands in [5, 10), r = 10 in overflow
        let bin_mid = &t.state()[&vec![2usize]];
        assert_eq!(bin_mid.n, 1);
        assert_eq!(bin_mid.sumw, vec![5.0]);
        let bin_over = &t.state()[&vec![3usize]];
        assert_eq!(bin_over.n, 1);
        assert_eq!(bin_over.sumw, vec![10.0]);
    }

    #[test]
    fn expression_error_at_construction() {
        let err = BinnedTable::new(
            "t",
            "out",
            config(r#"{"binning": [{"out": "x", "in": "x +", "nbins": 2, "low": 0.0, "high": 2.0}]}"#),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Expression(_)));
    }
}
