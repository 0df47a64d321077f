//! Model Fitter: fixed-effects linear probability models with clustered
//! covariance, plus the fitting entry points for each analysis variant.
//!
//! | Entry point | Models | Panel |
//! |-------------|--------|-------|
//! | [`fit`] | main, nudge | full panel, nudge subpanel |
//! | [`fit_profile`] | profile no-nudge, profile nudge | rows with a user profile |
//! | [`fit_independent`] | cheaper, rating | trial summaries |

use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{FitError, Result};
use crate::marginals::adjust::two_sided_p;
use crate::types::{ChoicePanel, HasNudge, TrialSummaryRow};

use super::design::{Design, SparseRow};
use super::solve::{absorb, cross_products, group_members, intern, residuals, screen_collinear, solve_kept};
use super::spec::{GroupVar, ModelSpec, Observation, VcovSpec};
use super::vcov::{clustered, iid, nested_in, ClusterDim};

/// A fitted regression. Keeps its specification so it can be refitted on a
/// subset with the identical formula.
#[derive(Clone, Debug)]
pub struct FittedModel {
    pub spec: ModelSpec,
    pub design: Design,
    /// One coefficient per design column; aliased columns are 0.
    pub coefficients: Vec<f64>,
    /// Position of each design column in `vcov`, `None` when aliased.
    pub kept: Vec<Option<usize>>,
    /// Covariance over kept columns.
    pub vcov: DMatrix<f64>,
    pub n_obs: usize,
    pub n_dropped: usize,
    pub fe_groups: usize,
    pub clusters: Vec<(GroupVar, usize)>,
    pub r2_within: f64,
}

/// One row of a coefficient table.
#[derive(Clone, Debug, Serialize)]
pub struct CoefficientRow {
    pub regression: &'static str,
    pub term: String,
    pub estimate: f64,
    #[serde(rename = "std.error")]
    pub std_error: Option<f64>,
    pub statistic: Option<f64>,
    #[serde(rename = "p.value")]
    pub p_value: Option<f64>,
    pub aliased: bool,
}

impl FittedModel {
    pub fn num_aliased(&self) -> usize {
        self.kept.iter().filter(|k| k.is_none()).count()
    }

    pub fn std_error(&self, column: usize) -> Option<f64> {
        self.kept[column].map(|a| self.vcov[(a, a)].max(0.0).sqrt())
    }

    /// Estimate and standard error of `l'b`. `None` when `l` only touches
    /// aliased columns.
    pub fn linear_combination(&self, l: &SparseRow) -> Option<(f64, f64)> {
        let m = self.vcov.nrows();
        let mut reduced = DVector::<f64>::zeros(m);
        let mut touched = false;
        let mut estimate = 0.0;
        for &(c, v) in l {
            estimate += v * self.coefficients[c];
            if let Some(a) = self.kept[c] {
                reduced[a] += v;
                touched = true;
            }
        }
        if !touched {
            return None;
        }
        let variance = reduced.dot(&(&self.vcov * &reduced));
        Some((estimate, variance.max(0.0).sqrt()))
    }

    pub fn coefficient_table(&self) -> Vec<CoefficientRow> {
        self.design
            .column_names
            .iter()
            .enumerate()
            .map(|(c, name)| {
                let se = self.std_error(c);
                let statistic = se.filter(|s| *s > 0.0).map(|s| self.coefficients[c] / s);
                CoefficientRow {
                    regression: self.spec.name,
                    term: name.clone(),
                    estimate: self.coefficients[c],
                    std_error: se,
                    statistic,
                    p_value: statistic.map(two_sided_p),
                    aliased: self.kept[c].is_none(),
                }
            })
            .collect()
    }

    /// Same specification, different rows.
    pub fn refit<O: Observation>(&self, rows: &[O]) -> Result<FittedModel> {
        fit_model(&self.spec, rows)
    }
}

/// Fit one specification on `rows`.
///
/// Rows missing the outcome, a grouping value or any design variable are
/// left out and counted in `n_dropped`.
pub fn fit_model<O: Observation>(spec: &ModelSpec, rows: &[O]) -> Result<FittedModel> {
    let t0 = Instant::now();
    let model = spec.name;
    if rows.is_empty() {
        return Err(FitError::EmptyPanel { model }.into());
    }
    let cluster_vars: Vec<GroupVar> = match &spec.vcov {
        VcovSpec::Cluster(vars) => vars.clone(),
        VcovSpec::Iid => Vec::new(),
    };
    let grouped = |r: &O| {
        spec.fixed_effect.map_or(true, |g| r.group(g).is_some())
            && cluster_vars.iter().all(|g| r.group(*g).is_some())
    };
    let usable: Vec<&O> = rows
        .iter()
        .filter(|r| r.outcome(spec.outcome).is_some_and(f64::is_finite) && grouped(r))
        .collect();
    let design = Design::build(spec, usable.iter().copied());

    let mut x: Vec<SparseRow> = Vec::with_capacity(usable.len());
    let mut y: Vec<f64> = Vec::with_capacity(usable.len());
    let mut used: Vec<&O> = Vec::with_capacity(usable.len());
    for r in usable {
        if let (Some(row), Some(out)) = (design.encode(r), r.outcome(spec.outcome)) {
            x.push(row);
            y.push(out);
            used.push(r);
        }
    }
    let n_dropped = rows.len() - used.len();
    if used.is_empty() {
        return Err(FitError::NonFinite {
            model,
            dropped: n_dropped,
        }
        .into());
    }
    if n_dropped > 0 {
        warn!(model, dropped = n_dropped, "rows with missing or non-finite values left out");
    }

    let (fe_codes, fe_groups) = match spec.fixed_effect {
        Some(g) => {
            let (codes, n) = intern(used.iter().map(|r| r.group(g)));
            absorb(&mut x, &mut y, &group_members(&codes, n));
            (Some(codes), n)
        }
        None => (None, 0),
    };

    let p = design.num_columns();
    let (xtx, xty) = cross_products(&x, &y, p);
    let keep = screen_collinear(&xtx, spec.collinearity_tol);
    let n_kept = keep.iter().filter(|k| **k).count();
    if n_kept == 0 {
        return Err(FitError::NoIdentifiableColumns { model }.into());
    }
    for &t in &spec.treatments {
        let cols = design.term_columns(&[t]);
        if cols.iter().all(|&c| !keep[c]) {
            return Err(FitError::DegenerateTerm {
                model,
                term: t.to_string(),
            }
            .into());
        }
    }
    let solution = solve_kept(&xtx, &xty, &keep).ok_or(FitError::Singular { model })?;
    let resid = residuals(&x, &y, &solution.beta);

    let (vcov, clusters) = match &spec.vcov {
        VcovSpec::Iid => (iid(&solution.bread, &resid, n_kept + fe_groups), Vec::new()),
        VcovSpec::Cluster(vars) => {
            let dims: Vec<ClusterDim> = vars
                .iter()
                .map(|g| {
                    let (codes, n_groups) = intern(used.iter().map(|r| r.group(*g)));
                    ClusterDim { codes, n_groups }
                })
                .collect();
            let nested = fe_codes
                .as_deref()
                .is_some_and(|f| dims.iter().any(|d| nested_in(f, fe_groups, d)));
            let n_params = if nested { n_kept } else { n_kept + fe_groups };
            let v = clustered(&solution.bread, &x, &resid, &solution.kept, &dims, n_params);
            let sizes = vars.iter().copied().zip(dims.iter().map(|d| d.n_groups)).collect();
            (v, sizes)
        }
    };

    let ssr: f64 = resid.iter().map(|e| e * e).sum();
    let y_mean = if fe_codes.is_some() {
        0.0
    } else {
        y.iter().sum::<f64>() / y.len() as f64
    };
    let tss: f64 = y.iter().map(|v| (v - y_mean) * (v - y_mean)).sum();
    let r2_within = if tss > 0.0 { 1.0 - ssr / tss } else { f64::NAN };

    info!(
        model,
        n_obs = used.len(),
        columns = p,
        kept = n_kept,
        aliased = p - n_kept,
        fe_groups,
        clusters = ?clusters,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "fitted model"
    );

    Ok(FittedModel {
        spec: spec.clone(),
        design,
        coefficients: solution.beta,
        kept: solution.kept,
        vcov,
        n_obs: used.len(),
        n_dropped,
        fe_groups,
        clusters,
        r2_within,
    })
}

// ── Variant entry points ──

/// Main and nudge models of one experiment variant.
pub struct ModelFit {
    pub main_model: FittedModel,
    pub nudge_model: FittedModel,
    pub nudge_subpanel: ChoicePanel,
    pub has_rating: bool,
}

/// Fit the main model on the whole panel and the nudge model on its
/// nudge-exposed rows. `drop_rating` forces the rating-free formulas.
pub fn fit(panel: &ChoicePanel, drop_rating: bool) -> Result<ModelFit> {
    if panel.is_empty() {
        return Err(FitError::EmptyPanel { model: "main" }.into());
    }
    let has_rating = panel.has_rating && !drop_rating;
    let mut nudge_subpanel = panel.nudge_subpanel();
    nudge_subpanel.has_rating = has_rating;
    debug!(has_rating, nudge_rows = nudge_subpanel.len(), "fitting main and nudge models");

    let (main, nudge) = rayon::join(
        || fit_model(&ModelSpec::main(has_rating), &panel.rows),
        || fit_model(&ModelSpec::nudge(has_rating), &nudge_subpanel.rows),
    );
    Ok(ModelFit {
        main_model: main?,
        nudge_model: nudge?,
        nudge_subpanel,
        has_rating,
    })
}

/// Models of the user-profile experiments.
pub struct ProfileFit {
    pub no_nudge_model: FittedModel,
    pub nudge_model: FittedModel,
    pub no_nudge_subpanel: ChoicePanel,
    pub nudge_subpanel: ChoicePanel,
    pub has_rating: bool,
}

pub fn fit_profile(panel: &ChoicePanel, drop_rating: bool) -> Result<ProfileFit> {
    let has_rating = panel.has_rating && !drop_rating;
    let mut profiled = panel.filter(|r| r.profile.is_some());
    profiled.has_rating = has_rating;
    let without = panel.len() - profiled.len();
    if without > 0 {
        warn!(rows = without, "rows without a user profile left out");
    }
    let no_nudge_subpanel = profiled.filter(|r| r.has_nudge == HasNudge::NoNudge);
    let nudge_subpanel = profiled.nudge_subpanel();

    let (no_nudge, nudge) = rayon::join(
        || fit_model(&ModelSpec::profile_no_nudge(has_rating), &no_nudge_subpanel.rows),
        || fit_model(&ModelSpec::profile_nudge(has_rating), &nudge_subpanel.rows),
    );
    Ok(ProfileFit {
        no_nudge_model: no_nudge?,
        nudge_model: nudge?,
        no_nudge_subpanel,
        nudge_subpanel,
        has_rating,
    })
}

/// The two regressions of the independent-analysis variant.
pub struct IndependentFit {
    pub cheaper: FittedModel,
    pub rating: FittedModel,
}

pub fn fit_independent(summaries: &[TrialSummaryRow]) -> Result<IndependentFit> {
    let (cheaper, rating) = rayon::join(
        || fit_model(&ModelSpec::independent_cheaper(), summaries),
        || fit_model(&ModelSpec::independent_rating(), summaries),
    );
    Ok(IndependentFit {
        cheaper: cheaper?,
        rating: rating?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::models::spec::{GroupValue, Outcome, Var};

    struct Point {
        x: f64,
        y: f64,
        g: i64,
    }

    impl Observation for Point {
        fn level(&self, _: Var) -> Option<&str> {
            None
        }
        fn value(&self, var: Var) -> Option<f64> {
            (var == Var::RatingDiff).then_some(self.x)
        }
        fn outcome(&self, _: Outcome) -> Option<f64> {
            Some(self.y)
        }
        fn group(&self, _: GroupVar) -> Option<GroupValue<'_>> {
            Some(GroupValue::Id(self.g))
        }
    }

    fn line_spec() -> ModelSpec {
        let mut spec = ModelSpec::independent_rating();
        spec.lattice = vec![Var::RatingDiff];
        spec
    }

    #[test]
    fn test_ols_with_intercept() {
        let pts: Vec<Point> = [(0.0, 1.1), (1.0, 2.9), (2.0, 5.1), (3.0, 6.9)]
            .iter()
            .map(|&(x, y)| Point { x, y, g: 0 })
            .collect();
        let fit = fit_model(&line_spec(), &pts).unwrap();
        assert_eq!(fit.design.column_names, vec!["(Intercept)", "rating_diff"]);
        // closed form: slope = Sxy / Sxx = 9.8 / 5, intercept = 4 - 1.96 * 1.5
        assert!((fit.coefficients[1] - 1.96).abs() < 1e-10);
        assert!((fit.coefficients[0] - 1.06).abs() < 1e-10);
        let table = fit.coefficient_table();
        assert!(table.iter().all(|r| !r.aliased));
        assert!(table[1].p_value.unwrap() < 0.01);
        assert_eq!(fit.num_aliased(), 0);
        assert!(fit.r2_within > 0.99 && fit.r2_within < 1.0);
    }

    #[test]
    fn test_fixed_effect_absorbs_group_intercepts() {
        let mut spec = line_spec();
        spec.fixed_effect = Some(GroupVar::Category);
        // two groups with different intercepts, same slope 0.5
        let pts: Vec<Point> = [(0.0, 0.0, 0), (2.0, 1.0, 0), (0.0, 3.0, 1), (4.0, 5.0, 1)]
            .iter()
            .map(|&(x, y, g)| Point { x, y, g })
            .collect();
        let fit = fit_model(&spec, &pts).unwrap();
        assert_eq!(fit.design.column_names, vec!["rating_diff"]);
        assert!((fit.coefficients[0] - 0.5).abs() < 1e-12);
        assert_eq!(fit.fe_groups, 2);
        // exact fit after demeaning
        assert!((fit.r2_within - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_treatment_is_degenerate() {
        let pts: Vec<Point> = (0..4).map(|i| Point { x: 1.0, y: i as f64, g: 0 }).collect();
        let err = fit_model(&line_spec(), &pts).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Fit(FitError::DegenerateTerm { ref term, .. }) if term == "rating_diff"
        ));
    }

    #[test]
    fn test_non_finite_rows_dropped() {
        let mut pts: Vec<Point> = [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)]
            .iter()
            .map(|&(x, y)| Point { x, y, g: 0 })
            .collect();
        pts.push(Point { x: f64::NEG_INFINITY, y: 0.0, g: 0 });
        let fit = fit_model(&line_spec(), &pts).unwrap();
        assert_eq!(fit.n_obs, 3);
        assert_eq!(fit.n_dropped, 1);
    }

    #[test]
    fn test_empty_rows() {
        let pts: Vec<Point> = Vec::new();
        assert!(matches!(
            fit_model(&line_spec(), &pts),
            Err(AnalysisError::Fit(FitError::EmptyPanel { .. }))
        ));
    }

    #[test]
    fn test_linear_combination_matches_coefficient() {
        let pts: Vec<Point> = [(0.0, 1.1), (1.0, 2.9), (2.0, 5.1), (3.0, 6.9)]
            .iter()
            .map(|&(x, y)| Point { x, y, g: 0 })
            .collect();
        let fit = fit_model(&line_spec(), &pts).unwrap();
        let (est, se) = fit.linear_combination(&vec![(1, 1.0)]).unwrap();
        assert_eq!(est, fit.coefficients[1]);
        assert!((se - fit.std_error(1).unwrap()).abs() < 1e-15);
    }
}
