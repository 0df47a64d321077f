//! Marginal-Effects Engine.
//!
//! For every treatment variable of a fitted model and every slice of a
//! family, the engine builds one contrast vector `L` over the design
//! columns, so that `L'b` is the effect of the treatment in that slice and
//! `sqrt(L'VL)` its standard error. The EMM path ([`emm`]) builds `L` from
//! cell-weighted reference-grid rows with the other treatments held at 0;
//! the AME path ([`ame`]) averages per-row derivatives over a stratified
//! subsample. p-values are normal-approximation and Benjamini–Hochberg
//! adjusted within each family.

pub mod adjust;
pub mod ame;
pub mod emm;
pub mod grid;
pub mod sampling;

use std::borrow::Cow;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::env_config::EngineConfig;
use crate::error::Result;
use crate::models::design::SparseRow;
use crate::models::fit::{FittedModel, ModelFit};
use crate::models::spec::Var;
use crate::types::{ChoicePanel, ChoicePanelRow};

use adjust::{benjamini_hochberg, two_sided_p};
use grid::{slices, SliceKey};

pub use grid::Family;

/// One output row: a slice of one family, one treatment term.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectEstimate {
    pub model: Option<String>,
    pub category: Option<String>,
    pub nudge_text: Option<String>,
    pub profile_variable: Option<String>,
    pub profile_sensitivity: Option<String>,
    pub term: Var,
    pub estimate: f64,
    #[serde(rename = "std.error")]
    pub std_error: f64,
    pub statistic: f64,
    /// Adjusted within the row's family.
    #[serde(rename = "p.value")]
    pub p_value: f64,
    pub panel: Family,
}

/// The four families of one experiment variant.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MarginalEffects {
    pub main: Vec<EffectEstimate>,
    pub category: Vec<EffectEstimate>,
    pub text: Vec<EffectEstimate>,
    pub text_aggregated: Vec<EffectEstimate>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProfileEffects {
    pub no_nudge: Vec<EffectEstimate>,
    pub nudge: Vec<EffectEstimate>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Method {
    Emm,
    Ame,
}

pub struct MarginalEffectsEngine {
    config: EngineConfig,
}

impl MarginalEffectsEngine {
    pub fn new(config: EngineConfig) -> Self {
        MarginalEffectsEngine { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Effects of every treatment of `model` in every slice of `family`,
    /// adjusted together. Slices whose contrast is empty or has no usable
    /// standard error produce no row.
    fn family_effects(
        &self,
        method: Method,
        model: &FittedModel,
        rows: &[ChoicePanelRow],
        family: Family,
    ) -> Result<Vec<EffectEstimate>> {
        let groups = slices(rows, family);
        let per_term: Vec<Vec<(SliceKey, Var, f64, f64)>> = model
            .spec
            .treatments
            .par_iter()
            .map(|&v| {
                groups
                    .iter()
                    .filter_map(|(key, members)| {
                        let l = contrast(method, model, members, v)?;
                        let (estimate, se) = model.linear_combination(&l)?;
                        if !(se.is_finite() && se > 0.0) {
                            warn!(
                                family = family.label(),
                                slice = ?key,
                                term = ?v,
                                se,
                                "slice dropped, no usable standard error"
                            );
                            return None;
                        }
                        Some((key.clone(), v, estimate, se))
                    })
                    .collect()
            })
            .collect();

        let raw: Vec<(SliceKey, Var, f64, f64)> = per_term.into_iter().flatten().collect();
        let p_raw: Vec<f64> = raw.iter().map(|(_, _, est, se)| two_sided_p(est / se)).collect();
        let p_adj = benjamini_hochberg(&p_raw);

        let mut out = Vec::with_capacity(raw.len());
        for ((key, term, estimate, se), p_value) in raw.into_iter().zip(p_adj) {
            let fields = key.into_fields(family)?;
            out.push(EffectEstimate {
                model: fields.model,
                category: fields.category,
                nudge_text: fields.nudge_text,
                profile_variable: fields.profile_variable,
                profile_sensitivity: fields.profile_sensitivity,
                term,
                estimate,
                std_error: se,
                statistic: estimate / se,
                p_value,
                panel: family,
            });
        }
        info!(
            family = family.label(),
            slices = groups.len(),
            rows = out.len(),
            "effects computed"
        );
        Ok(out)
    }
}

fn contrast(method: Method, model: &FittedModel, members: &[&ChoicePanelRow], v: Var) -> Option<SparseRow> {
    match method {
        Method::Emm => emm::emm_contrast(model, members, v),
        Method::Ame => ame::ame_contrast(model, members, v),
    }
}

/// Nudge model and subpanel with the human baseline removed. Refits only
/// when human rows are present.
fn non_human(fit: &ModelFit) -> Result<(Cow<'_, FittedModel>, Cow<'_, ChoicePanel>)> {
    if !fit.nudge_subpanel.has_human() {
        debug!("no human rows, reusing nudge model for aggregate slices");
        return Ok((Cow::Borrowed(&fit.nudge_model), Cow::Borrowed(&fit.nudge_subpanel)));
    }
    let panel = fit.nudge_subpanel.without_human();
    let model = fit.nudge_model.refit(&panel.rows)?;
    info!(rows = panel.len(), "refitted nudge model without human rows");
    Ok((Cow::Owned(model), Cow::Owned(panel)))
}
