//! # bt-summary
//!
//! Incremental N-dimensional binned aggregation of event-level tabular data.
//!
//! A [`BinnedTable`] buckets each incoming chunk of events into the cells of
//! an N-dimensional histogram defined by configurable bin edges over derived
//! variables, accumulating weighted statistics (count, sum of weights, sum of
//! squared weights) per cell. A [`Collector`] merges the states of many
//! `BinnedTable` readers across named datasets into a single output table.
//!
//! ## Example
//!
//! ```
//! use bt_summary::{BinnedTable, TableChunk, TableConfig};
//! use bt_core::Column;
//!
//! let config: TableConfig = serde_json::from_str(r#"{
//!     "binning": [{"out": "x", "in": "x", "nbins": 4, "low": 0.0, "high": 4.0}],
//!     "weights": ["w"]
//! }"#).unwrap();
//! let mut table = BinnedTable::new("example", "out", config).unwrap();
//!
//! let mut chunk = TableChunk::new();
//! chunk.new_variable("x", Column::Scalar(vec![0.5, 1.5, 2.5])).unwrap();
//! chunk.new_variable("w", Column::Scalar(vec![1.0, 2.0, 3.0])).unwrap();
//! table.event(&chunk).unwrap();
//!
//! let results = table.collector().prepare_output(&[("data", &[&table])]);
//! assert_eq!(results.totals()["n"], 3.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accumulator;
pub mod binning;
pub mod chunk;
pub mod collector;
pub mod explode;
pub mod expr;
pub mod writer;

pub use accumulator::{BinnedTable, CellStats, TableConfig};
pub use binning::{BinSpec, BinningConfig, Interval, WeightSpec, WeightsConfig};
pub use chunk::TableChunk;
pub use collector::{Collector, MergedRow, MergedTable};
pub use explode::explode;
pub use expr::CompiledExpr;
pub use writer::{CsvWriter, TableWriter};
