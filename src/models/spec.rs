//! Regression specifications as data.
//!
//! A [`ModelSpec`] names an outcome, a set of variables that are fully
//! interacted (every subset of the lattice is a term), optional extra terms,
//! the treatment variables whose main effect must be identified, an absorbed
//! fixed effect, and the covariance estimator. The with/without-rating
//! variants are one parameterised constructor instead of two templates.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::COLLINEARITY_TOL;

// ── Variables ──

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Var {
    #[serde(rename = "model")]
    Model,
    #[serde(rename = "nudge_text")]
    NudgeText,
    #[serde(rename = "category")]
    Category,
    #[serde(rename = "profile_variable")]
    ProfileVariable,
    #[serde(rename = "profile_sensitivity")]
    ProfileSensitivity,
    #[serde(rename = "product_is_cheaper")]
    Cheaper,
    #[serde(rename = "product_is_nudged")]
    Nudged,
    #[serde(rename = "product_is_higher_rated")]
    HigherRated,
    #[serde(rename = "product_position_idx")]
    Position,
    #[serde(rename = "log_price_diff_pct")]
    LogPriceDiffPct,
    #[serde(rename = "log_avg_price")]
    LogAvgPrice,
    #[serde(rename = "rating_diff")]
    RatingDiff,
    #[serde(rename = "avg_rating")]
    AvgRating,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VarKind {
    Factor,
    Numeric,
}

impl Var {
    pub fn kind(&self) -> VarKind {
        match self {
            Var::Model
            | Var::NudgeText
            | Var::Category
            | Var::ProfileVariable
            | Var::ProfileSensitivity => VarKind::Factor,
            _ => VarKind::Numeric,
        }
    }

    pub fn is_factor(&self) -> bool {
        self.kind() == VarKind::Factor
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Var::Model => "model",
            Var::NudgeText => "nudge_text",
            Var::Category => "category",
            Var::ProfileVariable => "profile_variable",
            Var::ProfileSensitivity => "profile_sensitivity",
            Var::Cheaper => "product_is_cheaper",
            Var::Nudged => "product_is_nudged",
            Var::HigherRated => "product_is_higher_rated",
            Var::Position => "product_position_idx",
            Var::LogPriceDiffPct => "log_price_diff_pct",
            Var::LogAvgPrice => "log_avg_price",
            Var::RatingDiff => "rating_diff",
            Var::AvgRating => "avg_rating",
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Outcome {
    ChoseProduct,
    ChoseCheaper,
    ChoseHigherRated,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::ChoseProduct => "chose_product",
            Outcome::ChoseCheaper => "chose_cheaper",
            Outcome::ChoseHigherRated => "chose_higher_rated",
        }
    }
}

/// Grouping keys for absorbed fixed effects and clusters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum GroupVar {
    Trial,
    Category,
    NudgeText,
}

impl GroupVar {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupVar::Trial => "trial_id",
            GroupVar::Category => "category",
            GroupVar::NudgeText => "nudge_text",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GroupValue<'a> {
    Id(i64),
    Label(&'a str),
}

/// Read access to one observation for design encoding.
///
/// `None` means missing; observations missing any variable the model uses
/// are left out of the fit.
pub trait Observation {
    fn level(&self, var: Var) -> Option<&str>;
    fn value(&self, var: Var) -> Option<f64>;
    fn outcome(&self, outcome: Outcome) -> Option<f64>;
    fn group(&self, var: GroupVar) -> Option<GroupValue<'_>>;
}

// ── Terms and specs ──

/// One formula term: a product of variables, in lattice order.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Term {
    pub vars: Vec<Var>,
}

impl Term {
    pub fn contains(&self, var: Var) -> bool {
        self.vars.contains(&var)
    }

    pub fn degree(&self) -> usize {
        self.vars.len()
    }

    /// Same variable set, order-insensitive.
    pub fn same_vars(&self, other: &[Var]) -> bool {
        self.vars.len() == other.len() && other.iter().all(|v| self.vars.contains(v))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VcovSpec {
    Iid,
    Cluster(Vec<GroupVar>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelSpec {
    pub name: &'static str,
    pub outcome: Outcome,
    /// Fully interacted variables.
    pub lattice: Vec<Var>,
    /// Additional terms outside the lattice.
    pub extra_terms: Vec<Vec<Var>>,
    /// Variables whose main-effect column must survive collinearity screening.
    pub treatments: Vec<Var>,
    pub fixed_effect: Option<GroupVar>,
    pub vcov: VcovSpec,
    pub collinearity_tol: f64,
}

/// Binary treatment indicators of the choice design, rating optional.
pub fn choice_treatments(has_rating: bool) -> Vec<Var> {
    let mut t = vec![Var::Cheaper, Var::Nudged];
    if has_rating {
        t.push(Var::HigherRated);
    }
    t
}

fn choice_lattice(has_rating: bool) -> Vec<Var> {
    let mut vars = vec![Var::Model, Var::Cheaper, Var::Nudged];
    if has_rating {
        vars.push(Var::HigherRated);
    }
    vars.push(Var::Position);
    vars
}

fn two_way_cluster() -> VcovSpec {
    VcovSpec::Cluster(vec![GroupVar::NudgeText, GroupVar::Category])
}

impl ModelSpec {
    /// `chose_product ~ model * cheaper * nudged [* higher_rated] * position | trial_id`
    pub fn main(has_rating: bool) -> Self {
        ModelSpec {
            name: "main",
            outcome: Outcome::ChoseProduct,
            lattice: choice_lattice(has_rating),
            extra_terms: Vec::new(),
            treatments: choice_treatments(has_rating),
            fixed_effect: Some(GroupVar::Trial),
            vcov: two_way_cluster(),
            collinearity_tol: COLLINEARITY_TOL,
        }
    }

    /// The main lattice crossed with `nudge_text`, plus `nudged:category`.
    pub fn nudge(has_rating: bool) -> Self {
        let mut lattice = choice_lattice(has_rating);
        lattice.push(Var::NudgeText);
        ModelSpec {
            name: "nudge",
            outcome: Outcome::ChoseProduct,
            lattice,
            extra_terms: vec![vec![Var::Nudged, Var::Category]],
            treatments: choice_treatments(has_rating),
            fixed_effect: Some(GroupVar::Trial),
            vcov: two_way_cluster(),
            collinearity_tol: COLLINEARITY_TOL,
        }
    }

    /// No-nudge trials of the user-profile experiments.
    pub fn profile_no_nudge(has_rating: bool) -> Self {
        let mut lattice = vec![Var::Model, Var::Cheaper];
        let mut treatments = vec![Var::Cheaper];
        if has_rating {
            lattice.push(Var::HigherRated);
            treatments.push(Var::HigherRated);
        }
        lattice.extend([Var::Position, Var::ProfileVariable, Var::ProfileSensitivity]);
        ModelSpec {
            name: "profile_no_nudge",
            outcome: Outcome::ChoseProduct,
            lattice,
            extra_terms: Vec::new(),
            treatments,
            fixed_effect: Some(GroupVar::Trial),
            vcov: two_way_cluster(),
            collinearity_tol: COLLINEARITY_TOL,
        }
    }

    /// Nudge trials of the user-profile experiments.
    pub fn profile_nudge(has_rating: bool) -> Self {
        let mut spec = Self::nudge(has_rating);
        spec.name = "profile_nudge";
        spec.lattice.extend([Var::ProfileVariable, Var::ProfileSensitivity]);
        spec
    }

    /// `chose_cheaper ~ log(price_diff_pct) * model * log(avg_price) | category`
    pub fn independent_cheaper() -> Self {
        ModelSpec {
            name: "independent_cheaper",
            outcome: Outcome::ChoseCheaper,
            lattice: vec![Var::LogPriceDiffPct, Var::Model, Var::LogAvgPrice],
            extra_terms: Vec::new(),
            treatments: vec![Var::LogPriceDiffPct],
            fixed_effect: Some(GroupVar::Category),
            vcov: VcovSpec::Cluster(vec![GroupVar::Category]),
            collinearity_tol: COLLINEARITY_TOL,
        }
    }

    /// `chose_higher_rated ~ rating_diff * model * avg_rating`
    pub fn independent_rating() -> Self {
        ModelSpec {
            name: "independent_rating",
            outcome: Outcome::ChoseHigherRated,
            lattice: vec![Var::RatingDiff, Var::Model, Var::AvgRating],
            extra_terms: Vec::new(),
            treatments: vec![Var::RatingDiff],
            fixed_effect: None,
            vcov: VcovSpec::Iid,
            collinearity_tol: COLLINEARITY_TOL,
        }
    }

    /// All variables the model reads.
    pub fn variables(&self) -> Vec<Var> {
        let mut vars = self.lattice.clone();
        for term in &self.extra_terms {
            for v in term {
                if !vars.contains(v) {
                    vars.push(*v);
                }
            }
        }
        vars
    }

    /// Expanded terms in formula order: the intercept (only without an
    /// absorbed fixed effect), lattice subsets by degree then lexicographic
    /// position, then extra terms not already present.
    pub fn terms(&self) -> Vec<Term> {
        let mut terms = Vec::new();
        if self.fixed_effect.is_none() {
            terms.push(Term { vars: Vec::new() });
        }
        let n = self.lattice.len();
        for degree in 1..=n {
            for combo in combinations(n, degree) {
                terms.push(Term {
                    vars: combo.iter().map(|&i| self.lattice[i]).collect(),
                });
            }
        }
        for extra in &self.extra_terms {
            if !terms.iter().any(|t| t.same_vars(extra)) {
                terms.push(Term {
                    vars: extra.clone(),
                });
            }
        }
        terms
    }
}

/// All `k`-subsets of `0..n` in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if k == 0 || k > n {
        return out;
    }
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(idx.clone());
        let mut i = k;
        while i > 0 && idx[i - 1] == n - k + i - 1 {
            i -= 1;
        }
        if i == 0 {
            break;
        }
        idx[i - 1] += 1;
        for j in i..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combinations_lexicographic() {
        assert_eq!(
            combinations(3, 2),
            vec![vec![0, 1], vec![0, 2], vec![1, 2]]
        );
        assert_eq!(combinations(4, 4).len(), 1);
        assert!(combinations(2, 3).is_empty());
    }

    #[test]
    fn test_main_terms_full_lattice() {
        let spec = ModelSpec::main(true);
        let terms = spec.terms();
        // 5 lattice variables, no intercept under a fixed effect
        assert_eq!(terms.len(), (1 << 5) - 1);
        assert_eq!(terms[0].vars, vec![Var::Model]);
        assert_eq!(terms[1].vars, vec![Var::Cheaper]);
        assert_eq!(terms.last().unwrap().degree(), 5);
    }

    #[test]
    fn test_rating_flag_removes_variable() {
        let spec = ModelSpec::main(false);
        assert!(!spec.lattice.contains(&Var::HigherRated));
        assert!(!spec.treatments.contains(&Var::HigherRated));
        assert_eq!(spec.terms().len(), (1 << 4) - 1);
    }

    #[test]
    fn test_nudge_extra_term_appended() {
        let spec = ModelSpec::nudge(false);
        let terms = spec.terms();
        assert_eq!(terms.len(), (1 << 5) - 1 + 1);
        assert!(terms.last().unwrap().same_vars(&[Var::Nudged, Var::Category]));
    }

    #[test]
    fn test_profile_nudge_extends_lattice() {
        let base = ModelSpec::nudge(true);
        let spec = ModelSpec::profile_nudge(true);
        assert_eq!(spec.lattice.len(), base.lattice.len() + 2);
        assert_eq!(
            spec.lattice[base.lattice.len()..],
            [Var::ProfileVariable, Var::ProfileSensitivity]
        );
    }

    #[test]
    fn test_intercept_without_fixed_effect() {
        let spec = ModelSpec::independent_rating();
        let terms = spec.terms();
        assert!(terms[0].vars.is_empty());
        assert_eq!(terms.len(), 8);
    }
}
