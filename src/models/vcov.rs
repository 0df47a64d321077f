//! Coefficient covariance: IID and multiway-clustered sandwich estimators.
//!
//! Multiway clustering follows Cameron–Gelbach–Miller: one sandwich per
//! non-empty subset of cluster dimensions, added with sign `(-1)^(|S|+1)`,
//! where a subset clusters on the intersection of its dimensions. Each
//! sandwich is scaled by `G/(G-1)` with `G` the smallest cluster count
//! among the dimensions, and the whole estimate by `(n-1)/(n-K)`.
//!
//! The signed sum is not guaranteed positive semi-definite. A multiway
//! estimate is projected back onto the PSD cone by zeroing its negative
//! eigenvalues.

use std::collections::HashMap;

use nalgebra::DMatrix;
use tracing::warn;

use super::design::SparseRow;

/// Cluster codes of one dimension.
pub struct ClusterDim {
    pub codes: Vec<u32>,
    pub n_groups: usize,
}

/// `sigma² (X'X)^-1` with `sigma² = e'e / (n - K)`.
pub fn iid(bread: &DMatrix<f64>, resid: &[f64], n_params: usize) -> DMatrix<f64> {
    let n = resid.len();
    let dof = n.saturating_sub(n_params).max(1) as f64;
    let sigma2 = resid.iter().map(|e| e * e).sum::<f64>() / dof;
    bread * sigma2
}

/// Score sums per cluster, over kept columns only.
fn cluster_scores(
    rows: &[SparseRow],
    resid: &[f64],
    kept: &[Option<usize>],
    codes: &[u32],
    n_groups: usize,
    m: usize,
) -> DMatrix<f64> {
    let mut s = DMatrix::<f64>::zeros(n_groups, m);
    for ((row, &e), &g) in rows.iter().zip(resid).zip(codes) {
        for &(c, v) in row {
            if let Some(a) = kept[c] {
                s[(g as usize, a)] += v * e;
            }
        }
    }
    s
}

/// Codes for the intersection of several dimensions.
fn intersect(dims: &[&ClusterDim], n: usize) -> ClusterDim {
    let mut ids: HashMap<Vec<u32>, u32> = HashMap::new();
    let codes = (0..n)
        .map(|i| {
            let key: Vec<u32> = dims.iter().map(|d| d.codes[i]).collect();
            let next = ids.len() as u32;
            *ids.entry(key).or_insert(next)
        })
        .collect();
    ClusterDim {
        codes,
        n_groups: ids.len(),
    }
}

/// Multiway clustered covariance over the kept columns.
///
/// `n_params` is the parameter count used in the small-sample adjustment.
pub fn clustered(
    bread: &DMatrix<f64>,
    rows: &[SparseRow],
    resid: &[f64],
    kept: &[Option<usize>],
    dims: &[ClusterDim],
    n_params: usize,
) -> DMatrix<f64> {
    let n = resid.len();
    let m = bread.nrows();
    let g_min = dims.iter().map(|d| d.n_groups).min().unwrap_or(1);
    let cluster_adj = if g_min > 1 {
        g_min as f64 / (g_min as f64 - 1.0)
    } else {
        warn!(clusters = g_min, "single cluster, skipping G/(G-1) adjustment");
        1.0
    };

    let mut meat = DMatrix::<f64>::zeros(m, m);
    for mask in 1u32..(1 << dims.len()) {
        let subset: Vec<&ClusterDim> = dims
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << *i) != 0)
            .map(|(_, d)| d)
            .collect();
        let sign = if subset.len() % 2 == 1 { 1.0 } else { -1.0 };
        let scores = if subset.len() == 1 {
            cluster_scores(rows, resid, kept, &subset[0].codes, subset[0].n_groups, m)
        } else {
            let joint = intersect(&subset, n);
            cluster_scores(rows, resid, kept, &joint.codes, joint.n_groups, m)
        };
        meat += (scores.transpose() * &scores) * sign;
    }

    let dof = n.saturating_sub(n_params).max(1) as f64;
    let small_sample = (n as f64 - 1.0) / dof * cluster_adj;
    let v = (bread * meat * bread) * small_sample;
    if dims.len() > 1 {
        clip_to_psd(v)
    } else {
        v
    }
}

/// Zero the negative eigenvalues of a symmetric matrix and recompose it.
pub fn clip_to_psd(v: DMatrix<f64>) -> DMatrix<f64> {
    let sym = (&v + v.transpose()) * 0.5;
    let mut eig = sym.symmetric_eigen();
    let negative = eig.eigenvalues.iter().filter(|&&l| l < 0.0).count();
    if negative == 0 {
        return v;
    }
    let smallest = eig.eigenvalues.min();
    warn!(negative, smallest, "multiway covariance not PSD, clipping eigenvalues");
    for l in eig.eigenvalues.iter_mut() {
        if *l < 0.0 {
            *l = 0.0;
        }
    }
    eig.recompose()
}

/// Whether every fixed-effect group lies inside a single cluster of `dim`.
pub fn nested_in(fe_codes: &[u32], n_fe: usize, dim: &ClusterDim) -> bool {
    let mut owner: Vec<Option<u32>> = vec![None; n_fe];
    for (&f, &c) in fe_codes.iter().zip(&dim.codes) {
        match owner[f as usize] {
            None => owner[f as usize] = Some(c),
            Some(o) if o != c => return false,
            Some(_) => {}
        }
    }
    true
}
