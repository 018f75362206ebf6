//! Shared helpers for factorplan integration tests: reference whole-factor
//! updates computed the slow, obvious way, against which planned updates are
//! checked.

use factorplan_core::{FactorRuntime, FactorTable};

/// Builds a runtime for `table` with the given incoming message per edge.
pub fn runtime_with_messages(table: &FactorTable, messages: &[Vec<f64>]) -> FactorRuntime {
    assert_eq!(messages.len(), table.num_dims());
    let mut runtime = FactorRuntime::for_table(table);
    for (edge, msg) in messages.iter().enumerate() {
        runtime
            .set_in_message(edge, msg)
            .expect("message length matches the table");
    }
    runtime
}

fn coords_of(dims: &[usize], joint: usize) -> Vec<usize> {
    let mut coords = Vec::with_capacity(dims.len());
    let mut rest = joint;
    for &d in dims {
        coords.push(rest % d);
        rest /= d;
    }
    coords
}

/// Every stored cell of the table as (coordinates, value). Sparse tables
/// yield their entries only; absent cells carry zero weight.
fn stored_cells(table: &FactorTable) -> Vec<(Vec<usize>, f64)> {
    match table.sparse_joint_indices() {
        Some(joints) => joints
            .iter()
            .zip(table.values())
            .map(|(&j, &v)| (coords_of(table.dims(), j as usize), v))
            .collect(),
        None => table
            .values()
            .iter()
            .enumerate()
            .map(|(j, &v)| (coords_of(table.dims(), j), v))
            .collect(),
    }
}

/// Naive sum-product update: per edge, marginalize the full joint table with
/// every other edge's message folded in, then normalize.
pub fn sum_product_reference(table: &FactorTable, messages: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dims = table.dims();
    let cells = stored_cells(table);
    (0..dims.len())
        .map(|out_edge| {
            let mut out = vec![0.0; dims[out_edge]];
            for (coords, weight) in &cells {
                let mut product = *weight;
                for (d, &coord) in coords.iter().enumerate() {
                    if d != out_edge {
                        product *= messages[d][coord];
                    }
                }
                out[coords[out_edge]] += product;
            }
            let sum: f64 = out.iter().sum();
            assert!(sum != 0.0, "reference marginal sums to zero");
            for v in &mut out {
                *v /= sum;
            }
            out
        })
        .collect()
}

/// Naive min-sum update over energies: per edge, minimize `-ln(w)` plus the
/// other edges' input energies, then shift so the minimum is zero.
pub fn min_sum_reference(table: &FactorTable, messages: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dims = table.dims();
    let cells = stored_cells(table);
    (0..dims.len())
        .map(|out_edge| {
            let mut out = vec![f64::INFINITY; dims[out_edge]];
            for (coords, weight) in &cells {
                let mut v = -weight.ln();
                for (d, &coord) in coords.iter().enumerate() {
                    if d != out_edge {
                        v += messages[d][coord];
                    }
                }
                if v < out[coords[out_edge]] {
                    out[coords[out_edge]] = v;
                }
            }
            let min = out.iter().cloned().fold(f64::INFINITY, f64::min);
            if min.is_finite() {
                for v in &mut out {
                    *v -= min;
                }
            }
            out
        })
        .collect()
}

/// Asserts two message vectors agree to within `tol` per element.
pub fn assert_messages_close(actual: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        if a.is_infinite() && e.is_infinite() {
            continue;
        }
        assert!(
            (a - e).abs() <= tol,
            "element {} differs: {} vs {}",
            i,
            a,
            e
        );
    }
}
