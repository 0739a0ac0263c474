//! End-to-end scenarios: configure a binned table, feed it event chunks,
//! collect across readers and datasets, check totals and row layout.

use approx::assert_relative_eq;
use bt_core::column::{Column, JaggedCol};
use bt_core::traits::ChunkSource;
use bt_summary::{BinnedTable, TableChunk, TableConfig};

fn config_met_jets() -> TableConfig {
    serde_json::from_str(
        r#"{
            "binning": [
                {"out": "MET_px", "in": "MET_px", "nbins": 10, "low": -50.0, "high": 150.0},
                {"out": "jet_py", "in": "Jet_Py", "nbins": 4, "low": -20.0, "high": 80.0}
            ],
            "weights": ["EventWeight"]
        }"#,
    )
    .unwrap()
}

fn config_electron_pt() -> TableConfig {
    serde_json::from_str(
        r#"{
            "binning": [
                {"out": "electron_pT", "in": "sqrt(Electron_Px**2 + Electron_Py**2)",
                 "nbins": 20, "low": 0.0, "high": 200.0}
            ],
            "weights": {"weighted": "EventWeight"}
        }"#,
    )
    .unwrap()
}

/// Deterministic pseudo-random stream, good enough for fixture data.
struct Lcg(u64);

impl Lcg {
    fn next_unit(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

struct Fixture {
    chunk: TableChunk,
    /// Per-event jet multiplicity.
    jet_lens: Vec<usize>,
    event_weight: Vec<f64>,
    electron_pt: Vec<f64>,
}

/// A synthetic "event file": scalar MET and weight, jagged jet and electron
/// kinematics with per-event multiplicities.
fn physics_fixture() -> Fixture {
    let n_events = 500;
    let mut rng = Lcg(0x5eed);

    let mut met_px = Vec::with_capacity(n_events);
    let mut event_weight = Vec::with_capacity(n_events);
    let mut jets: Vec<Vec<f64>> = Vec::with_capacity(n_events);
    let mut ele_px: Vec<Vec<f64>> = Vec::with_capacity(n_events);
    let mut ele_py: Vec<Vec<f64>> = Vec::with_capacity(n_events);

    for _ in 0..n_events {
        met_px.push(200.0 * rng.next_unit() - 50.0);
        event_weight.push(0.5 + rng.next_unit());

        let n_jets = (4.0 * rng.next_unit()) as usize; // 0..=3
        jets.push((0..n_jets).map(|_| 120.0 * rng.next_unit() - 30.0).collect());

        let n_ele = 1 + (2.0 * rng.next_unit()) as usize; // 1..=2
        ele_px.push((0..n_ele).map(|_| 180.0 * rng.next_unit() - 90.0).collect());
        ele_py.push((0..n_ele).map(|_| 180.0 * rng.next_unit() - 90.0).collect());
    }

    let jet_lens: Vec<usize> = jets.iter().map(Vec::len).collect();
    // Same operation order as the engine's sqrt(px**2 + py**2) so binning
    // comparisons are bit-exact.
    let electron_pt: Vec<f64> = ele_px
        .iter()
        .zip(&ele_py)
        .flat_map(|(pxs, pys)| {
            pxs.iter().zip(pys).map(|(x, y)| (x.powf(2.0) + y.powf(2.0)).sqrt())
        })
        .collect();

    let mut chunk = TableChunk::new();
    chunk.new_variable("MET_px", Column::Scalar(met_px)).unwrap();
    chunk.new_variable("EventWeight", Column::Scalar(event_weight.clone())).unwrap();
    chunk.new_variable("Jet_Py", Column::Jagged(JaggedCol::from_rows(&jets))).unwrap();
    chunk.new_variable("Electron_Px", Column::Jagged(JaggedCol::from_rows(&ele_px))).unwrap();
    chunk.new_variable("Electron_Py", Column::Jagged(JaggedCol::from_rows(&ele_py))).unwrap();

    Fixture { chunk, jet_lens, event_weight, electron_pt }
}

#[test]
fn construction_exposes_binnings_and_weights() {
    let t = BinnedTable::new("binned_met_jets", "out", config_met_jets()).unwrap();
    assert_eq!(t.name(), "binned_met_jets");
    assert_eq!(t.binnings().len(), 2);
    assert_eq!(t.binnings()[0].out(), "MET_px");
    // bin edges: nbins, plus 1 closing edge, plus 2 for +-inf
    assert_eq!(t.binnings()[0].edges().len(), 10 + 1 + 2);
    assert_eq!(t.weights().len(), 1);
    assert_eq!(t.weights()[0].name(), "EventWeight");
}

#[test]
fn run_totals_match_direct_computation() {
    let fx = physics_fixture();
    let mut t = BinnedTable::new("binned_met_jets", "out", config_met_jets()).unwrap();
    t.event(&fx.chunk).unwrap();

    // One exploded row per jet; event weight replicated per jet.
    let expected_n: usize = fx.jet_lens.iter().sum();
    let expected_sumw: f64 =
        fx.event_weight.iter().zip(&fx.jet_lens).map(|(w, &l)| w * l as f64).sum();

    let collector = t.collector();
    let results = collector.prepare_output(&[("test_dataset", &[&t])]);
    let totals = results.totals();
    assert_eq!(totals["n"], expected_n as f64);
    assert_relative_eq!(totals["EventWeight:sumw"], expected_sumw, max_relative = 1e-12);

    // collect() without file writing returns the identical table.
    let collected = collector.collect(&[("test_dataset", &[&t])], false).unwrap();
    assert_eq!(collected.totals()["n"], expected_n as f64);
    assert_relative_eq!(
        collected.totals()["EventWeight:sumw"],
        expected_sumw,
        max_relative = 1e-12
    );
}

#[test]
fn running_same_chunk_twice_doubles_totals() {
    let fx = physics_fixture();
    let mut t = BinnedTable::new("binned_met_jets", "out", config_met_jets()).unwrap();
    t.event(&fx.chunk).unwrap();
    let once = t.collector().prepare_output(&[("test_dataset", &[&t])]).totals();

    t.event(&fx.chunk).unwrap();
    let twice = t.collector().prepare_output(&[("test_dataset", &[&t])]).totals();

    assert_eq!(twice["n"], 2.0 * once["n"]);
    assert_relative_eq!(
        twice["EventWeight:sumw"],
        2.0 * once["EventWeight:sumw"],
        max_relative = 1e-12
    );
}

#[test]
fn derived_dimension_midpoint_mean() {
    let fx = physics_fixture();
    let mut t = BinnedTable::new("electron_pt", "out", config_electron_pt()).unwrap();
    t.event(&fx.chunk).unwrap();

    let results = t.collector().prepare_output(&[("test_dataset", &[&t])]);
    let spec = &t.binnings()[0];

    // Direct per-bin counts of the independently computed pT values.
    let mut direct = vec![0u64; spec.n_bins()];
    for &pt in &fx.electron_pt {
        direct[spec.find_bin(pt)] += 1;
    }
    let direct_mean: f64 = {
        let total: u64 = direct[1..direct.len() - 1].iter().sum();
        direct[1..direct.len() - 1]
            .iter()
            .enumerate()
            .map(|(i, &n)| spec.interval(i + 1).mid() * n as f64 / total as f64)
            .sum()
    };

    // Bin-weighted mean over interval midpoints, excluding the unbounded
    // flow bins.
    let interior: Vec<_> = results
        .rows()
        .iter()
        .filter(|r| r.bins[0].lo.is_finite() && r.bins[0].hi.is_finite())
        .collect();
    let total: f64 = interior.iter().map(|r| r.stats.n as f64).sum();
    let mean: f64 =
        interior.iter().map(|r| r.bins[0].mid() * r.stats.n as f64 / total).sum();

    assert_relative_eq!(mean, direct_mean, max_relative = 1e-12);
    assert!(mean > 0.0 && mean < 200.0);
}

#[test]
fn user_defined_variable_matches_expression() {
    let fx = physics_fixture();

    let mut from_expr = BinnedTable::new("electron_pt", "out", config_electron_pt()).unwrap();
    from_expr.event(&fx.chunk).unwrap();

    // Same binning over a pre-derived column attached to the chunk.
    let user_config: TableConfig = serde_json::from_str(
        r#"{
            "binning": [
                {"out": "electron_pT", "in": "Electron_Pt", "nbins": 20, "low": 0.0, "high": 200.0}
            ],
            "weights": {"weighted": "EventWeight"}
        }"#,
    )
    .unwrap();
    let lens: Vec<usize> = {
        let Column::Jagged(px) = fx.chunk.column("Electron_Px").unwrap() else {
            panic!("Electron_Px should be jagged")
        };
        (0..px.n_rows()).map(|r| px.row_len(r)).collect()
    };
    let mut pt_rows: Vec<Vec<f64>> = Vec::with_capacity(lens.len());
    let mut i = 0;
    for len in lens {
        pt_rows.push(fx.electron_pt[i..i + len].to_vec());
        i += len;
    }
    let mut chunk = fx.chunk.clone();
    chunk.new_variable("Electron_Pt", Column::Jagged(JaggedCol::from_rows(&pt_rows))).unwrap();

    let mut from_var = BinnedTable::new("electron_pt", "out", user_config).unwrap();
    from_var.event(&chunk).unwrap();

    let a = from_expr.collector().prepare_output(&[("d", &[&from_expr])]);
    let b = from_var.collector().prepare_output(&[("d", &[&from_var])]);
    assert_eq!(a.totals()["n"], b.totals()["n"]);
    assert_relative_eq!(
        a.totals()["weighted:sumw"],
        b.totals()["weighted:sumw"],
        max_relative = 1e-12
    );
}

fn small_config() -> TableConfig {
    serde_json::from_str(
        r#"{
            "binning": [
                {"out": "x", "in": "x", "nbins": 2, "low": 0.0, "high": 2.0},
                {"out": "y", "in": "y", "nbins": 1, "low": 0.0, "high": 1.0}
            ],
            "weights": ["w"]
        }"#,
    )
    .unwrap()
}

fn small_chunk(points: &[(f64, f64)]) -> TableChunk {
    let mut c = TableChunk::new();
    c.new_variable("x", Column::Scalar(points.iter().map(|p| p.0).collect())).unwrap();
    c.new_variable("y", Column::Scalar(points.iter().map(|p| p.1).collect())).unwrap();
    c.new_variable("w", Column::Scalar(vec![1.0; points.len()])).unwrap();
    c
}

#[test]
fn two_datasets_two_readers_policy_matrix() {
    // mc populates 5 bin combinations; data misses one of them.
    let mc_points =
        [(0.5, 0.5), (1.5, 0.5), (-1.0, 0.5), (0.5, 2.0), (5.0, 0.5)];
    let data_points = [(0.5, 0.5), (1.5, 0.5), (-1.0, 0.5), (0.5, 2.0)];

    let mut readers: Vec<BinnedTable> = (0..4)
        .map(|i| BinnedTable::new(format!("r{i}"), "out", small_config()).unwrap())
        .collect();
    readers[0].event(&small_chunk(&mc_points)).unwrap();
    readers[1].event(&small_chunk(&mc_points)).unwrap();
    readers[2].event(&small_chunk(&data_points)).unwrap();
    readers[3].event(&small_chunk(&data_points)).unwrap();
    let (mc_a, mc_b, data_a, data_b) =
        (&readers[0], &readers[1], &readers[2], &readers[3]);

    for dataset_col in [true, false] {
        for pad_missing in [true, false] {
            let mut probe = BinnedTable::new("probe", "out", small_config()).unwrap();
            probe.set_dataset_col(dataset_col);
            probe.set_pad_missing(pad_missing);

            let results = probe.collector().prepare_output(&[
                ("test_mc", &[mc_a, mc_b]),
                ("test_data", &[data_a, data_b]),
            ]);

            assert_eq!(results.nlevels(), 2 + usize::from(dataset_col));
            let expected_len = if !dataset_col {
                5 // populated union
            } else if pad_missing {
                5 * 2 // union replicated per dataset
            } else {
                5 + 4 // sparse: one bin combination absent from data
            };
            assert_eq!(
                results.len(),
                expected_len,
                "dataset_col={dataset_col} pad_missing={pad_missing}"
            );

            // Each point appears twice per dataset (two readers).
            let totals = results.totals();
            assert_eq!(totals["n"], (2 * (mc_points.len() + data_points.len())) as f64);
            assert_eq!(totals["w:sumw"], totals["n"]);
        }
    }
}

#[test]
fn merge_of_equal_readers_doubles_single_reader() {
    let fx = physics_fixture();
    let mut a = BinnedTable::new("binned_met_jets", "out", config_met_jets()).unwrap();
    let mut b = BinnedTable::new("binned_met_jets", "out", config_met_jets()).unwrap();
    a.event(&fx.chunk).unwrap();
    b.event(&fx.chunk).unwrap();

    let single = a.collector().prepare_output(&[("d", &[&a])]).totals();
    let merged = a.collector().prepare_output(&[("d", &[&a, &b])]).totals();
    assert_eq!(merged["n"], 2.0 * single["n"]);
    assert_relative_eq!(
        merged["EventWeight:sumw"],
        2.0 * single["EventWeight:sumw"],
        max_relative = 1e-12
    );
}
