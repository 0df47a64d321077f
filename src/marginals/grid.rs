//! Slice families, slicing keys and the reference-grid size guard.
//!
//! A family is a set of effect rows corrected together. Its slicing key is a
//! fixed, ordered list of panel variables; every key produced while slicing
//! is checked against that list before its values are spread into the
//! output columns, so a collapsed or reordered key is an error rather than
//! a mislabelled row.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::EffectsError;
use crate::models::spec::{Observation, Var};

/// Output families. Benjamini–Hochberg runs within one family only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Family {
    #[serde(rename = "main")]
    Main,
    #[serde(rename = "category")]
    Category,
    #[serde(rename = "text_model")]
    TextByModel,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "profile_no_nudge")]
    ProfileNoNudge,
    #[serde(rename = "profile_nudge")]
    ProfileNudge,
}

impl Family {
    pub fn label(&self) -> &'static str {
        match self {
            Family::Main => "main",
            Family::Category => "category",
            Family::TextByModel => "text_model",
            Family::Text => "text",
            Family::ProfileNoNudge => "profile_no_nudge",
            Family::ProfileNudge => "profile_nudge",
        }
    }

    pub fn slice_vars(&self) -> &'static [Var] {
        match self {
            Family::Main => &[Var::Model],
            Family::Category => &[Var::Category],
            Family::TextByModel => &[Var::NudgeText, Var::Model],
            Family::Text => &[Var::NudgeText],
            Family::ProfileNoNudge | Family::ProfileNudge => {
                &[Var::Model, Var::ProfileVariable, Var::ProfileSensitivity]
            }
        }
    }
}

/// Ordered `(variable, level)` pairs identifying one slice.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SliceKey(pub Vec<(Var, String)>);

impl SliceKey {
    /// Key of `obs` under `vars`; `None` when a level is missing.
    pub fn of<O: Observation + ?Sized>(obs: &O, vars: &[Var]) -> Option<SliceKey> {
        vars.iter()
            .map(|&v| obs.level(v).map(|l| (v, l.to_string())))
            .collect::<Option<Vec<_>>>()
            .map(SliceKey)
    }

    /// Spread the key into output columns after checking its shape.
    pub fn into_fields(self, family: Family) -> Result<SliceFields, EffectsError> {
        let expected = family.slice_vars();
        let mismatch = || EffectsError::GroupingKey {
            family: family.label(),
            expected: join(expected.iter().map(|v| v.as_str())),
            found: join(self.0.iter().map(|(v, _)| v.as_str())),
        };
        let shape_ok = self.0.len() == expected.len()
            && self.0.iter().zip(expected).all(|((v, level), e)| v == e && !level.is_empty());
        if !shape_ok {
            return Err(mismatch());
        }
        let mut fields = SliceFields::default();
        for (var, level) in &self.0 {
            let slot = match var {
                Var::Model => &mut fields.model,
                Var::Category => &mut fields.category,
                Var::NudgeText => &mut fields.nudge_text,
                Var::ProfileVariable => &mut fields.profile_variable,
                Var::ProfileSensitivity => &mut fields.profile_sensitivity,
                _ => return Err(mismatch()),
            };
            *slot = Some(level.clone());
        }
        Ok(fields)
    }
}

fn join<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

/// Slicing columns of an effect row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SliceFields {
    pub model: Option<String>,
    pub category: Option<String>,
    pub nudge_text: Option<String>,
    pub profile_variable: Option<String>,
    pub profile_sensitivity: Option<String>,
}

/// Group rows by slice; slices with no rows never appear.
pub fn slices<'a, O: Observation>(rows: &'a [O], family: Family) -> BTreeMap<SliceKey, Vec<&'a O>> {
    let mut out: BTreeMap<SliceKey, Vec<&O>> = BTreeMap::new();
    for row in rows {
        if let Some(key) = SliceKey::of(row, family.slice_vars()) {
            out.entry(key).or_default().push(row);
        }
    }
    out
}

/// Size of the full reference grid spanned by `vars` over `rows`: the
/// product of the number of distinct values of each variable.
pub fn reference_grid_size<O: Observation>(rows: &[O], vars: &[Var]) -> usize {
    vars.iter()
        .map(|&v| {
            if v.is_factor() {
                rows.iter().filter_map(|r| r.level(v)).collect::<BTreeSet<_>>().len()
            } else {
                rows.iter()
                    .filter_map(|r| r.value(v))
                    .map(f64::to_bits)
                    .collect::<BTreeSet<_>>()
                    .len()
            }
        })
        .fold(1usize, |acc, n| acc.saturating_mul(n.max(1)))
}

pub fn check_grid_size<O: Observation>(rows: &[O], vars: &[Var], limit: usize) -> Result<usize, EffectsError> {
    let cells = reference_grid_size(rows, vars);
    if cells > limit {
        return Err(EffectsError::GridTooLarge { cells, limit });
    }
    Ok(cells)
}
