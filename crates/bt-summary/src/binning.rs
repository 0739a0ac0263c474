//! Immutable binning and weight definitions.
//!
//! A [`BinSpec`] fixes one output dimension: its label, the source column or
//! expression, and the realized bin-edge sequence. Realized edges are the
//! configured finite edges extended with `-inf` / `+inf` sentinels, so every
//! value maps to exactly one bin and the first and last bins act as
//! catch-all underflow/overflow. All validation happens at construction;
//! nothing is re-validated per chunk.

use std::collections::BTreeMap;
use std::fmt;

use bt_core::error::{Error, Result};
use serde::Deserialize;

use crate::expr::CompiledExpr;

/// Configuration for one binning dimension.
///
/// Either `nbins`/`low`/`high` (uniform bins) or `edges` (explicit edge
/// list) must be given, not both.
#[derive(Debug, Clone, Deserialize)]
pub struct BinningConfig {
    /// Output dimension label.
    pub out: String,
    /// Source column name or expression.
    #[serde(rename = "in")]
    pub input: String,
    /// Number of uniform bins between `low` and `high`.
    #[serde(default)]
    pub nbins: Option<usize>,
    /// Lower edge of the uniform range.
    #[serde(default)]
    pub low: Option<f64>,
    /// Upper edge of the uniform range.
    #[serde(default)]
    pub high: Option<f64>,
    /// Explicit finite bin edges, strictly increasing.
    #[serde(default)]
    pub edges: Option<Vec<f64>>,
}

/// Weight configuration: an ordered list of expressions (each named by its
/// own source text) or a mapping of weight name to expression.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WeightsConfig {
    /// Weight expressions named by their source text.
    List(Vec<String>),
    /// Weight name mapped to expression.
    Map(BTreeMap<String, String>),
}

/// One realized bin: the half-open interval `[lo, hi)`.
///
/// The first and last bins of a dimension are unbounded (`lo == -inf` /
/// `hi == +inf`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    /// Inclusive lower edge.
    pub lo: f64,
    /// Exclusive upper edge.
    pub hi: f64,
}

impl Interval {
    /// Interval midpoint, used for bin-center analyses.
    pub fn mid(&self) -> f64 {
        (self.lo + self.hi) / 2.0
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lo, self.hi)
    }
}

/// Immutable per-dimension binning definition.
#[derive(Debug, Clone)]
pub struct BinSpec {
    out: String,
    source: String,
    expr: CompiledExpr,
    /// Realized edges: `[-inf, finite edges.., +inf]`.
    edges: Vec<f64>,
}

impl BinSpec {
    /// Build and validate a binning definition from its configuration.
    pub fn from_config(cfg: &BinningConfig) -> Result<Self> {
        let finite = match (&cfg.edges, cfg.nbins, cfg.low, cfg.high) {
            (Some(edges), None, None, None) => {
                if edges.len() < 2 {
                    return Err(Error::Config(format!(
                        "binning '{}': need at least 2 edges, got {}",
                        cfg.out,
                        edges.len()
                    )));
                }
                if edges.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(Error::Config(format!(
                        "binning '{}': edges must be strictly increasing",
                        cfg.out
                    )));
                }
                if edges.iter().any(|e| !e.is_finite()) {
                    return Err(Error::Config(format!(
                        "binning '{}': explicit edges must be finite",
                        cfg.out
                    )));
                }
                edges.clone()
            }
            (None, Some(nbins), Some(low), Some(high)) => {
                if nbins == 0 {
                    return Err(Error::Config(format!("binning '{}': nbins must be > 0", cfg.out)));
                }
                if !low.is_finite() || !high.is_finite() || low >= high {
                    return Err(Error::Config(format!(
                        "binning '{}': low ({}) must be below high ({})",
                        cfg.out, low, high
                    )));
                }
                let step = (high - low) / nbins as f64;
                let mut edges: Vec<f64> = (0..nbins).map(|i| low + step * i as f64).collect();
                edges.push(high);
                edges
            }
            _ => {
                return Err(Error::Config(format!(
                    "binning '{}': give either edges or all of nbins/low/high",
                    cfg.out
                )));
            }
        };

        let expr = CompiledExpr::compile(&cfg.input)?;

        let mut edges = Vec::with_capacity(finite.len() + 2);
        edges.push(f64::NEG_INFINITY);
        edges.extend_from_slice(&finite);
        edges.push(f64::INFINITY);

        Ok(BinSpec { out: cfg.out.clone(), source: cfg.input.clone(), expr, edges })
    }

    /// Output dimension label.
    pub fn out(&self) -> &str {
        &self.out
    }

    /// Source column name or expression text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compiled source expression.
    pub fn expr(&self) -> &CompiledExpr {
        &self.expr
    }

    /// Realized bin edges including the infinity sentinels.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of bins, including underflow and overflow.
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// The half-open interval of bin `i`.
    pub fn interval(&self, i: usize) -> Interval {
        Interval { lo: self.edges[i], hi: self.edges[i + 1] }
    }

    /// Locate the bin containing `value`.
    ///
    /// Every value maps to some bin thanks to the sentinel edges; NaN lands
    /// in overflow.
    pub fn find_bin(&self, value: f64) -> usize {
        if value.is_nan() {
            return self.n_bins() - 1;
        }
        let idx = self.edges.partition_point(|e| *e <= value);
        idx.saturating_sub(1).min(self.n_bins() - 1)
    }
}

/// A named weight expression.
#[derive(Debug, Clone)]
pub struct WeightSpec {
    name: String,
    source: String,
    expr: CompiledExpr,
}

impl WeightSpec {
    /// Expand a weight configuration into ordered named weight specs.
    pub fn from_config(cfg: &WeightsConfig) -> Result<Vec<Self>> {
        let pairs: Vec<(String, String)> = match cfg {
            WeightsConfig::List(exprs) => {
                exprs.iter().map(|e| (e.clone(), e.clone())).collect()
            }
            WeightsConfig::Map(map) => {
                map.iter().map(|(n, e)| (n.clone(), e.clone())).collect()
            }
        };
        pairs
            .into_iter()
            .map(|(name, source)| {
                let expr = CompiledExpr::compile(&source)?;
                Ok(WeightSpec { name, source, expr })
            })
            .collect()
    }

    /// Output weight name (column prefix in the merged table).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Weight expression text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compiled weight expression.
    pub fn expr(&self) -> &CompiledExpr {
        &self.expr
    }
}
