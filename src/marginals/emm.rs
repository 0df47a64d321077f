//! EMM path: contrasts of estimated marginal means.
//!
//! Within a slice, rows are grouped into reference-grid cells by every
//! non-treatment variable of the model. Each cell contributes the design
//! difference between `v = 1` and `v = 0` (other treatments at 0) weighted
//! by its share of the slice's rows, so the nuisance distribution is the
//! empirical one rather than a uniform grid average.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Result;
use crate::models::design::{SparseAccumulator, SparseRow};
use crate::models::fit::{FittedModel, ModelFit, ProfileFit};
use crate::models::spec::{Observation, Var};
use crate::types::ChoicePanel;

use super::grid::{check_grid_size, Family};
use super::{non_human, EffectEstimate, MarginalEffects, MarginalEffectsEngine, Method, ProfileEffects};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum CellValue<'a> {
    Level(&'a str),
    Value(u64),
}

fn cell_key<'a, O: Observation>(row: &'a O, nuisance: &[Var]) -> Option<Vec<CellValue<'a>>> {
    nuisance
        .iter()
        .map(|&v| {
            if v.is_factor() {
                row.level(v).map(CellValue::Level)
            } else {
                row.value(v).map(|x| CellValue::Value(x.to_bits()))
            }
        })
        .collect()
}

/// Proportionally weighted EMM contrast for treatment `v` over `members`.
pub fn emm_contrast<O: Observation>(model: &FittedModel, members: &[&O], v: Var) -> Option<SparseRow> {
    let treatments = &model.spec.treatments;
    let overrides: Vec<(Var, f64)> = treatments
        .iter()
        .filter(|t| **t != v)
        .map(|&t| (t, 0.0))
        .collect();
    let nuisance: Vec<Var> = model
        .spec
        .variables()
        .into_iter()
        .filter(|x| !treatments.contains(x))
        .collect();

    let mut cells: BTreeMap<Vec<CellValue<'_>>, (&O, usize)> = BTreeMap::new();
    for &row in members {
        if let Some(key) = cell_key(row, &nuisance) {
            cells.entry(key).or_insert((row, 0)).1 += 1;
        }
    }

    let mut acc = SparseAccumulator::default();
    let mut total = 0usize;
    for (row, count) in cells.into_values() {
        if let Some(diff) = model.design.partial(row, v, &overrides) {
            acc.add(&diff, count as f64);
            total += count;
        }
    }
    if total == 0 {
        return None;
    }
    let total = total as f64;
    Some(acc.into_row().into_iter().map(|(c, x)| (c, x / total)).collect())
}

impl MarginalEffectsEngine {
    fn emm_family(
        &self,
        model: &FittedModel,
        panel: &ChoicePanel,
        family: Family,
    ) -> Result<Vec<EffectEstimate>> {
        let cells = check_grid_size(&panel.rows, &model.spec.variables(), self.config.max_grid_cells)?;
        debug!(family = family.label(), cells, "reference grid");
        self.family_effects(Method::Emm, model, &panel.rows, family)
    }

    /// EMM contrasts for the main, category, text-by-model and aggregated
    /// text families. Category and aggregated text use the nudge model
    /// refitted without human rows.
    pub fn compute_emm(&self, fit: &ModelFit, panel: &ChoicePanel) -> Result<MarginalEffects> {
        let main = self.emm_family(&fit.main_model, panel, Family::Main)?;
        let text = self.emm_family(&fit.nudge_model, &fit.nudge_subpanel, Family::TextByModel)?;
        let (model, subpanel) = non_human(fit)?;
        let category = self.emm_family(&model, &subpanel, Family::Category)?;
        let text_aggregated = self.emm_family(&model, &subpanel, Family::Text)?;
        Ok(MarginalEffects {
            main,
            category,
            text,
            text_aggregated,
        })
    }

    /// EMM contrasts of the user-profile models, sliced by model and profile.
    pub fn compute_profile_emm(&self, fit: &ProfileFit) -> Result<ProfileEffects> {
        Ok(ProfileEffects {
            no_nudge: self.emm_family(&fit.no_nudge_model, &fit.no_nudge_subpanel, Family::ProfileNoNudge)?,
            nudge: self.emm_family(&fit.nudge_model, &fit.nudge_subpanel, Family::ProfileNudge)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fit::fit_model;
    use crate::models::spec::{GroupVar, ModelSpec, VcovSpec};
    use crate::types::{ChoicePanelRow, HasNudge};

    fn row(trial: i64, model: &str, position: u8, cheaper: u8, chose: u8) -> ChoicePanelRow {
        ChoicePanelRow {
            trial_id: trial,
            model: model.to_string(),
            category: if trial % 2 == 0 { "Lamps" } else { "Toys" }.to_string(),
            nudge_text: "None".to_string(),
            has_nudge: HasNudge::NoNudge,
            negative_nudge: false,
            product_position_idx: position,
            chose_product: chose,
            product_is_cheaper: cheaper,
            product_is_higher_rated: None,
            product_is_nudged: 0,
            profile: None,
            coverage_type: None,
        }
    }

    fn spec() -> ModelSpec {
        let mut s = ModelSpec::main(false);
        s.lattice = vec![Var::Model, Var::Cheaper, Var::Position];
        s.treatments = vec![Var::Cheaper];
        s.vcov = VcovSpec::Cluster(vec![GroupVar::Category]);
        s
    }

    #[test]
    fn test_emm_contrast_recovers_within_trial_effect() {
        // model "a" always picks the cheaper option, "b" picks position 0
        let mut rows = Vec::new();
        for t in 0..8 {
            let cheap_pos = (t % 2) as u8;
            for m in ["a", "b"] {
                let id = if m == "a" { t } else { t + 100 };
                for pos in 0..2u8 {
                    let cheaper = (pos == cheap_pos) as u8;
                    let chose = if m == "a" { cheaper } else { (pos == 0) as u8 };
                    rows.push(row(id, m, pos, cheaper, chose));
                }
            }
        }
        let fit = fit_model(&spec(), &rows).unwrap();
        let a: Vec<&ChoicePanelRow> = rows.iter().filter(|r| r.model == "a").collect();
        let b: Vec<&ChoicePanelRow> = rows.iter().filter(|r| r.model == "b").collect();
        let la = emm_contrast(&fit, &a, Var::Cheaper).unwrap();
        let lb = emm_contrast(&fit, &b, Var::Cheaper).unwrap();
        let (ea, _) = fit.linear_combination(&la).unwrap();
        let (eb, _) = fit.linear_combination(&lb).unwrap();
        assert!((ea - 1.0).abs() < 1e-9, "{ea}");
        assert!(eb.abs() < 1e-9, "{eb}");
    }

    #[test]
    fn test_cell_weights_follow_row_counts() {
        let rows = vec![
            row(0, "a", 0, 1, 1),
            row(0, "a", 1, 0, 0),
            row(2, "a", 0, 0, 0),
            row(2, "a", 1, 1, 1),
            row(4, "a", 0, 0, 1),
            row(4, "a", 1, 1, 0),
        ];
        let fit = fit_model(&spec(), &rows).unwrap();
        let members: Vec<&ChoicePanelRow> = rows.iter().collect();
        let l = emm_contrast(&fit, &members, Var::Cheaper).unwrap();
        // product_is_cheaper column gets weight 1; cheaper:position gets the
        // share of rows at position 1
        let position_share = l
            .iter()
            .find(|(c, _)| fit.design.column_names[*c] == "product_is_cheaper:product_position_idx")
            .map(|(_, x)| *x)
            .unwrap();
        assert!((position_share - 0.5).abs() < 1e-12);
    }
}
