//! Core data structures: raw trial records, the expanded choice panel, and
//! trial summaries for the independent-analysis variant.
//!
//! A [`RawTrialRecord`] is one logged trial. [`crate::data_prep::prepare`]
//! expands each into two [`ChoicePanelRow`]s (one per display position) and
//! wraps them in a [`ChoicePanel`] that also records whether ratings are a
//! meaningful treatment in this dataset. Panels are built once and then only
//! filtered (nudge subpanel, non-human subpanel, AME subsample).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::constants::HUMAN_MODEL_LABEL;

// ── Raw input ──

/// One experimental trial as logged by the harness.
///
/// Indices are kept as read (`None` when the cell was empty); values outside
/// {0, 1} simply never match a display position during expansion.
#[derive(Clone, Debug, PartialEq)]
pub struct RawTrialRecord {
    pub experiment_id: String,
    pub model_family: String,
    pub category: String,
    pub nudge_text: Option<String>,
    /// Textual flag, compared against [`crate::constants::NUDGE_TRIAL_TRUE`].
    pub nudge_trial: String,
    pub nudged_idx: Option<i64>,
    pub chose_idx: Option<i64>,
    pub cheaper_idx: Option<i64>,
    pub better_rated_idx: Option<i64>,
    pub avg_price: Option<f64>,
    /// Serialized per-option price list, e.g. `"[12.99, 15.5]"`.
    pub prices: Option<String>,
    /// Serialized per-option rating list, e.g. `"[88, 92]"`.
    pub ratings: Option<String>,
    pub user_preference: Option<String>,
    pub coverage_type: Option<String>,
}

// ── Categorical labels ──

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum HasNudge {
    #[serde(rename = "No Nudge")]
    NoNudge,
    #[serde(rename = "Nudge")]
    Nudge,
}

impl HasNudge {
    pub fn as_str(&self) -> &'static str {
        match self {
            HasNudge::NoNudge => "No Nudge",
            HasNudge::Nudge => "Nudge",
        }
    }
}

impl fmt::Display for HasNudge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Simulated-user profile attached to a trial in the preference experiments.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct UserProfile {
    /// What the preference is about: `experts`, `price` or `rating`.
    pub variable: String,
    /// Direction of the preference: `high` or `low`.
    pub sensitivity: String,
}

// ── Choice panel ──

/// One display position of one trial. Two rows share each `trial_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChoicePanelRow {
    pub trial_id: i64,
    pub model: String,
    pub category: String,
    pub nudge_text: String,
    pub has_nudge: HasNudge,
    pub negative_nudge: bool,
    pub product_position_idx: u8,
    pub chose_product: u8,
    pub product_is_cheaper: u8,
    /// `None` on every row once the panel's rating column has been dropped.
    pub product_is_higher_rated: Option<u8>,
    pub product_is_nudged: u8,
    pub profile: Option<UserProfile>,
    pub coverage_type: Option<String>,
}

impl ChoicePanelRow {
    pub fn is_human(&self) -> bool {
        self.model == HUMAN_MODEL_LABEL
    }
}

/// The expanded panel plus its panel-level rating attribute.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChoicePanel {
    pub rows: Vec<ChoicePanelRow>,
    pub has_rating: bool,
}

impl ChoicePanel {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows matching `keep`, with the same panel attribute.
    pub fn filter<F>(&self, keep: F) -> ChoicePanel
    where
        F: Fn(&ChoicePanelRow) -> bool,
    {
        ChoicePanel {
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
            has_rating: self.has_rating,
        }
    }

    /// Nudge-exposed rows only.
    pub fn nudge_subpanel(&self) -> ChoicePanel {
        self.filter(|r| r.has_nudge == HasNudge::Nudge)
    }

    /// All rows except the human baseline.
    pub fn without_human(&self) -> ChoicePanel {
        self.filter(|r| !r.is_human())
    }

    pub fn has_human(&self) -> bool {
        self.rows.iter().any(|r| r.is_human())
    }

    pub fn num_trials(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.trial_id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Sorted distinct model labels present in the panel.
    pub fn models(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.model.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

// ── Independent-analysis variant ──

/// A panel row that also carries the price and rating of the option shown
/// at its position.
#[derive(Clone, Debug, PartialEq)]
pub struct PricedPanelRow {
    pub row: ChoicePanelRow,
    pub price: f64,
    pub rating: f64,
}

/// One row per trial: realized price/rating extremes and what was chosen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialSummaryRow {
    pub trial_id: i64,
    pub model: String,
    pub coverage_type: Option<String>,
    pub category: String,
    pub price_min: f64,
    pub price_max: f64,
    pub price_mean: f64,
    pub rating_min: f64,
    pub rating_max: f64,
    pub rating_mean: f64,
    /// `None` when the trial's chosen index was missing.
    pub chosen_price: Option<f64>,
    pub chosen_rating: Option<f64>,
    pub chose_cheaper: Option<bool>,
    pub chose_higher_rated: Option<bool>,
    pub price_diff_pct: f64,
    pub rating_diff: f64,
}
