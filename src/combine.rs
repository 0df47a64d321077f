//! Combiner: stack the effect tables of the three experiment variants.
//!
//! Pure concatenation and relabelling. Rows are tagged with their
//! experiment, the treatment term is replaced by a readable outcome label,
//! and both factors sort in their fixed level order.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::marginals::{EffectEstimate, Family, MarginalEffects};
use crate::models::spec::Var;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Experiment {
    #[serde(rename = "Original")]
    Original,
    #[serde(rename = "Ratings matched")]
    RatingsMatched,
    #[serde(rename = "Ratings & prices matched")]
    RatingsPricesMatched,
}

impl Experiment {
    pub const ALL: [Experiment; 3] = [
        Experiment::Original,
        Experiment::RatingsMatched,
        Experiment::RatingsPricesMatched,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Experiment::Original => "Original",
            Experiment::RatingsMatched => "Ratings matched",
            Experiment::RatingsPricesMatched => "Ratings & prices matched",
        }
    }
}

/// Readable outcome label of a treatment term, in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OutcomeLabel {
    #[serde(rename = "Chose cheaper")]
    Cheaper,
    #[serde(rename = "Chose higher rated")]
    HigherRated,
    #[serde(rename = "Chose nudged")]
    Nudged,
}

impl OutcomeLabel {
    pub fn from_term(term: Var) -> Option<OutcomeLabel> {
        match term {
            Var::Cheaper => Some(OutcomeLabel::Cheaper),
            Var::HigherRated => Some(OutcomeLabel::HigherRated),
            Var::Nudged => Some(OutcomeLabel::Nudged),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OutcomeLabel::Cheaper => "Chose cheaper",
            OutcomeLabel::HigherRated => "Chose higher rated",
            OutcomeLabel::Nudged => "Chose nudged",
        }
    }
}

/// One stacked row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombinedEstimate {
    pub experiment: Experiment,
    pub outcome: OutcomeLabel,
    pub model: Option<String>,
    pub category: Option<String>,
    pub nudge_text: Option<String>,
    pub estimate: f64,
    #[serde(rename = "std.error")]
    pub std_error: f64,
    pub statistic: f64,
    #[serde(rename = "p.value")]
    pub p_value: f64,
    pub panel: Family,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CombinedTables {
    pub main: Vec<CombinedEstimate>,
    pub category: Vec<CombinedEstimate>,
    pub text: Vec<CombinedEstimate>,
}

fn relabel(experiment: Experiment, rows: &[EffectEstimate]) -> Vec<CombinedEstimate> {
    rows.iter()
        .filter_map(|r| {
            let Some(outcome) = OutcomeLabel::from_term(r.term) else {
                warn!(term = %r.term, "term has no outcome label, skipped");
                return None;
            };
            Some(CombinedEstimate {
                experiment,
                outcome,
                model: r.model.clone(),
                category: r.category.clone(),
                nudge_text: r.nudge_text.clone(),
                estimate: r.estimate,
                std_error: r.std_error,
                statistic: r.statistic,
                p_value: r.p_value,
                panel: r.panel,
            })
        })
        .collect()
}

fn stack<'a, F>(inputs: &[(Experiment, &'a MarginalEffects)], table: F) -> Vec<CombinedEstimate>
where
    F: Fn(&'a MarginalEffects) -> &'a [EffectEstimate],
{
    let mut rows: Vec<CombinedEstimate> = inputs
        .iter()
        .flat_map(|(experiment, effects)| relabel(*experiment, table(*effects)))
        .collect();
    // stable: order within an (experiment, outcome) block is kept
    rows.sort_by_key(|r| (r.experiment, r.outcome));
    rows
}

/// Stack main, category and aggregated text effects across variants.
pub fn combine(inputs: &[(Experiment, &MarginalEffects)]) -> CombinedTables {
    let tables = CombinedTables {
        main: stack(inputs, |e| e.main.as_slice()),
        category: stack(inputs, |e| e.category.as_slice()),
        text: stack(inputs, |e| e.text_aggregated.as_slice()),
    };
    info!(
        experiments = inputs.len(),
        main = tables.main.len(),
        category = tables.category.len(),
        text = tables.text.len(),
        "combined effect tables"
    );
    tables
}
