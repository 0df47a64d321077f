//! Least-squares kernel: fixed-effect absorption, collinearity screening,
//! and the normal-equation solve.
//!
//! The absorbed fixed effect is removed by demeaning the outcome and every
//! design column within its groups (Frisch–Waugh–Lovell), which yields the
//! same slope coefficients as including one dummy per group. Design rows stay
//! sparse: a trial has two rows, so a demeaned row only touches the columns
//! that are non-zero somewhere in its trial.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use nalgebra::{DMatrix, DVector};

use super::design::SparseRow;

/// Dense integer codes for an arbitrary grouping key, in first-seen order.
pub fn intern<K: Eq + Hash>(keys: impl IntoIterator<Item = K>) -> (Vec<u32>, usize) {
    let mut ids: HashMap<K, u32> = HashMap::new();
    let codes = keys
        .into_iter()
        .map(|k| {
            let next = ids.len() as u32;
            *ids.entry(k).or_insert(next)
        })
        .collect();
    (codes, ids.len())
}

/// Row indices of every group, indexed by group code.
pub fn group_members(codes: &[u32], n_groups: usize) -> Vec<Vec<usize>> {
    let mut members = vec![Vec::new(); n_groups];
    for (i, &g) in codes.iter().enumerate() {
        members[g as usize].push(i);
    }
    members
}

/// Demean rows and outcome within each group, in place.
pub fn absorb(rows: &mut [SparseRow], y: &mut [f64], members: &[Vec<usize>]) {
    for group in members {
        if group.is_empty() {
            continue;
        }
        let n = group.len() as f64;
        let mut mean: BTreeMap<usize, f64> = BTreeMap::new();
        let mut y_mean = 0.0;
        for &i in group {
            for &(c, v) in &rows[i] {
                *mean.entry(c).or_insert(0.0) += v;
            }
            y_mean += y[i];
        }
        for v in mean.values_mut() {
            *v /= n;
        }
        y_mean /= n;

        for &i in group {
            let own: HashMap<usize, f64> = rows[i].iter().copied().collect();
            rows[i] = mean
                .iter()
                .map(|(&c, &m)| (c, own.get(&c).copied().unwrap_or(0.0) - m))
                .filter(|(_, v)| *v != 0.0)
                .collect();
            y[i] -= y_mean;
        }
    }
}

/// Dense `X'X` and `X'y` from sparse rows.
pub fn cross_products(rows: &[SparseRow], y: &[f64], p: usize) -> (DMatrix<f64>, DVector<f64>) {
    let mut xtx = DMatrix::<f64>::zeros(p, p);
    let mut xty = DVector::<f64>::zeros(p);
    for (row, &yi) in rows.iter().zip(y) {
        for &(j, a) in row {
            xty[j] += a * yi;
            for &(k, b) in row {
                if k <= j {
                    xtx[(j, k)] += a * b;
                }
            }
        }
    }
    for j in 0..p {
        for k in 0..j {
            xtx[(k, j)] = xtx[(j, k)];
        }
    }
    (xtx, xty)
}

/// Sequential collinearity screen on `X'X`.
///
/// Columns are visited in order and kept when their squared residual norm,
/// after projecting on the already-kept columns, exceeds `tol` times their
/// own squared norm. This is a left-looking Cholesky that skips pivots; an
/// aliased column therefore always yields to the earlier columns it depends
/// on. Returns one keep flag per column.
pub fn screen_collinear(xtx: &DMatrix<f64>, tol: f64) -> Vec<bool> {
    let p = xtx.nrows();
    let mut l = DMatrix::<f64>::zeros(p, p);
    let mut kept: Vec<usize> = Vec::new();
    let mut keep = vec![false; p];

    for j in 0..p {
        let d = xtx[(j, j)];
        if d.is_nan() || d <= 0.0 {
            continue;
        }
        let s = d - kept.iter().map(|&k| l[(j, k)] * l[(j, k)]).sum::<f64>();
        if s <= tol * d {
            continue;
        }
        let pivot = s.sqrt();
        l[(j, j)] = pivot;
        for i in (j + 1)..p {
            let dot: f64 = kept.iter().map(|&k| l[(i, k)] * l[(j, k)]).sum();
            l[(i, j)] = (xtx[(i, j)] - dot) / pivot;
        }
        kept.push(j);
        keep[j] = true;
    }
    keep
}

/// Solution of the reduced normal equations.
pub struct Solution {
    /// Full-length coefficients; aliased columns are 0.
    pub beta: Vec<f64>,
    /// Reduced index of every kept column.
    pub kept: Vec<Option<usize>>,
    /// `(X'X)^-1` over kept columns.
    pub bread: DMatrix<f64>,
}

/// Solve `X'X b = X'y` over the kept columns. `None` if the reduced system is
/// not positive definite.
pub fn solve_kept(xtx: &DMatrix<f64>, xty: &DVector<f64>, keep: &[bool]) -> Option<Solution> {
    let idx: Vec<usize> = (0..keep.len()).filter(|&j| keep[j]).collect();
    let m = idx.len();
    if m == 0 {
        return None;
    }
    let reduced = DMatrix::from_fn(m, m, |a, b| xtx[(idx[a], idx[b])]);
    let rhs = DVector::from_fn(m, |a, _| xty[idx[a]]);
    let chol = reduced.cholesky()?;
    let b = chol.solve(&rhs);
    let bread = chol.inverse();

    let mut beta = vec![0.0; keep.len()];
    let mut kept = vec![None; keep.len()];
    for (a, &j) in idx.iter().enumerate() {
        beta[j] = b[a];
        kept[j] = Some(a);
    }
    Some(Solution { beta, kept, bread })
}

/// `y - X b` for sparse rows.
pub fn residuals(rows: &[SparseRow], y: &[f64], beta: &[f64]) -> Vec<f64> {
    rows.iter()
        .zip(y)
        .map(|(row, &yi)| yi - row.iter().map(|&(c, v)| v * beta[c]).sum::<f64>())
        .collect()
}
