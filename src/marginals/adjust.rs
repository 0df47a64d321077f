//! Normal-approximation p-values and Benjamini–Hochberg adjustment.

use statrs::distribution::{ContinuousCDF, Normal};

/// `2 * (1 - Φ(|z|))`, computed from the upper tail to keep precision for
/// large statistics.
pub fn two_sided_p(z: f64) -> f64 {
    if !z.is_finite() {
        return if z.is_nan() { f64::NAN } else { 0.0 };
    }
    match Normal::new(0.0, 1.0) {
        Ok(n) => (2.0 * n.sf(z.abs())).min(1.0),
        Err(_) => f64::NAN,
    }
}

/// Benjamini–Hochberg step-up adjustment of one family of p-values.
///
/// `adj_(i) = min_{j >= i} (m / j) * p_(j)` over ascending ranks, capped at 1.
/// Returned in input order. NaN inputs stay NaN and do not count toward `m`.
pub fn benjamini_hochberg(p: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..p.len()).filter(|&i| !p[i].is_nan()).collect();
    order.sort_by(|&a, &b| p[a].total_cmp(&p[b]));
    let m = order.len() as f64;

    let mut adjusted = vec![f64::NAN; p.len()];
    let mut running = f64::INFINITY;
    for (rank, &i) in order.iter().enumerate().rev() {
        let candidate = p[i] * m / (rank as f64 + 1.0);
        running = running.min(candidate);
        adjusted[i] = running.min(1.0);
    }
    adjusted
}
