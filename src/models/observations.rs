//! How panel rows and trial summaries expose themselves to the model layer.

use super::spec::{GroupValue, GroupVar, Observation, Outcome, Var};
use crate::types::{ChoicePanelRow, TrialSummaryRow};

impl Observation for ChoicePanelRow {
    fn level(&self, var: Var) -> Option<&str> {
        match var {
            Var::Model => Some(&self.model),
            Var::Category => Some(&self.category),
            Var::NudgeText => Some(&self.nudge_text),
            Var::ProfileVariable => self.profile.as_ref().map(|p| p.variable.as_str()),
            Var::ProfileSensitivity => self.profile.as_ref().map(|p| p.sensitivity.as_str()),
            _ => None,
        }
    }

    fn value(&self, var: Var) -> Option<f64> {
        match var {
            Var::Cheaper => Some(self.product_is_cheaper as f64),
            Var::Nudged => Some(self.product_is_nudged as f64),
            Var::HigherRated => self.product_is_higher_rated.map(f64::from),
            Var::Position => Some(self.product_position_idx as f64),
            _ => None,
        }
    }

    fn outcome(&self, outcome: Outcome) -> Option<f64> {
        match outcome {
            Outcome::ChoseProduct => Some(self.chose_product as f64),
            _ => None,
        }
    }

    fn group(&self, var: GroupVar) -> Option<GroupValue<'_>> {
        Some(match var {
            GroupVar::Trial => GroupValue::Id(self.trial_id),
            GroupVar::Category => GroupValue::Label(&self.category),
            GroupVar::NudgeText => GroupValue::Label(&self.nudge_text),
        })
    }
}

impl Observation for TrialSummaryRow {
    fn level(&self, var: Var) -> Option<&str> {
        match var {
            Var::Model => Some(&self.model),
            Var::Category => Some(&self.category),
            _ => None,
        }
    }

    /// Log transforms of non-positive inputs give non-finite values, which
    /// keep the row out of the fit.
    fn value(&self, var: Var) -> Option<f64> {
        match var {
            Var::LogPriceDiffPct => Some(self.price_diff_pct.ln()),
            Var::LogAvgPrice => Some(self.price_mean.ln()),
            Var::RatingDiff => Some(self.rating_diff),
            Var::AvgRating => Some(self.rating_mean),
            _ => None,
        }
    }

    fn outcome(&self, outcome: Outcome) -> Option<f64> {
        let flag = match outcome {
            Outcome::ChoseCheaper => self.chose_cheaper,
            Outcome::ChoseHigherRated => self.chose_higher_rated,
            Outcome::ChoseProduct => None,
        };
        flag.map(|b| if b { 1.0 } else { 0.0 })
    }

    fn group(&self, var: GroupVar) -> Option<GroupValue<'_>> {
        match var {
            GroupVar::Trial => Some(GroupValue::Id(self.trial_id)),
            GroupVar::Category => Some(GroupValue::Label(&self.category)),
            GroupVar::NudgeText => None,
        }
    }
}
