//! AME path: average marginal effects over a stratified subsample.
//!
//! Each row contributes the derivative of its design row with respect to
//! the treatment at its observed covariates. Every term is linear in each of
//! its variables, so the derivative is exact and no finite-difference step
//! is involved.

use tracing::info;

use crate::error::Result;
use crate::models::design::{SparseAccumulator, SparseRow};
use crate::models::fit::{FittedModel, ModelFit};
use crate::models::spec::{Observation, Var};
use crate::types::ChoicePanel;

use super::grid::Family;
use super::sampling::stratified_sample;
use super::{non_human, EffectEstimate, MarginalEffects, MarginalEffectsEngine, Method};

/// Mean per-row derivative with respect to `v` over `members`.
pub fn ame_contrast<O: Observation>(model: &FittedModel, members: &[&O], v: Var) -> Option<SparseRow> {
    let mut acc = SparseAccumulator::default();
    let mut n = 0usize;
    for &row in members {
        if let Some(diff) = model.design.partial(row, v, &[]) {
            acc.add(&diff, 1.0);
            n += 1;
        }
    }
    if n == 0 {
        return None;
    }
    let n = n as f64;
    Some(acc.into_row().into_iter().map(|(c, x)| (c, x / n)).collect())
}

impl MarginalEffectsEngine {
    /// Stratified subsample of `panel`, or the panel itself when it is small.
    pub fn subsample(&self, panel: &ChoicePanel) -> ChoicePanel {
        let idx = stratified_sample(&panel.rows, self.config.ame_sample_target, self.config.sample_seed);
        if idx.len() < panel.len() {
            info!(rows = panel.len(), sampled = idx.len(), "stratified AME subsample");
        }
        ChoicePanel {
            rows: idx.into_iter().map(|i| panel.rows[i].clone()).collect(),
            has_rating: panel.has_rating,
        }
    }

    fn ame_family(
        &self,
        model: &FittedModel,
        panel: &ChoicePanel,
        family: Family,
    ) -> Result<Vec<EffectEstimate>> {
        let sample = self.subsample(panel);
        self.family_effects(Method::Ame, model, &sample.rows, family)
    }

    /// AME counterparts of [`MarginalEffectsEngine::compute_emm`]. Models
    /// are fitted on full panels; only the averaging uses the subsample.
    pub fn compute_ame(&self, fit: &ModelFit, panel: &ChoicePanel) -> Result<MarginalEffects> {
        let main = self.ame_family(&fit.main_model, panel, Family::Main)?;
        let text = self.ame_family(&fit.nudge_model, &fit.nudge_subpanel, Family::TextByModel)?;
        let (model, subpanel) = non_human(fit)?;
        let category = self.ame_family(&model, &subpanel, Family::Category)?;
        let text_aggregated = self.ame_family(&model, &subpanel, Family::Text)?;
        Ok(MarginalEffects {
            main,
            category,
            text,
            text_aggregated,
        })
    }
}
