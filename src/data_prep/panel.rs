//! Choice-Data Builder: raw trial records → position-expanded choice panel.
//!
//! Each trial becomes exactly two rows, one per display position. The
//! treatment indicators are properties of the position (`cheaper_idx ==
//! position`), so across a trial's two rows each indicator is 1 on exactly
//! one row, or 0 on both when the underlying index was missing.

use tracing::{debug, info};

use crate::constants::{NO_NUDGE_TEXT, NUDGE_TRIAL_TRUE};
use crate::error::{PrepError, Result};
use crate::types::{ChoicePanel, ChoicePanelRow, HasNudge, RawTrialRecord, UserProfile};

use super::labels::{
    is_negative_nudge, model_display_name, nudge_label, parse_trial_id, transliterate,
    user_profile,
};

/// Per-trial labels derived before row expansion.
#[derive(Clone, Debug)]
pub struct TrialLabels {
    pub trial_id: i64,
    pub model: String,
    pub category: String,
    pub nudge_text: String,
    pub negative_nudge: bool,
    pub has_nudge: HasNudge,
    /// Position the nudge effectively points at, after the negative flip.
    pub effective_nudged_idx: Option<i64>,
    pub profile: Option<UserProfile>,
}

/// Derive labels for one record (steps 1–6 of the builder).
pub fn trial_labels(row: usize, record: &RawTrialRecord) -> std::result::Result<TrialLabels, PrepError> {
    let raw_text = record
        .nudge_text
        .as_deref()
        .map(transliterate)
        .filter(|t| !t.is_empty());
    let negative_nudge = raw_text.as_deref().is_some_and(is_negative_nudge);
    let nudge_text = match &raw_text {
        Some(text) => nudge_label(text, negative_nudge),
        None => NO_NUDGE_TEXT.to_string(),
    };

    let has_nudge = if record.nudge_trial.trim() == NUDGE_TRIAL_TRUE {
        HasNudge::Nudge
    } else {
        HasNudge::NoNudge
    };

    let effective_nudged_idx = match (has_nudge, record.nudged_idx) {
        (HasNudge::Nudge, Some(idx)) if negative_nudge => Some(1 - idx),
        (HasNudge::Nudge, Some(idx)) => Some(idx),
        _ => None,
    };

    let trial_id = parse_trial_id(&record.experiment_id).ok_or_else(|| PrepError::ExperimentId {
        row,
        value: record.experiment_id.clone(),
    })?;

    Ok(TrialLabels {
        trial_id,
        model: model_display_name(record.model_family.trim()),
        category: record.category.trim().to_string(),
        nudge_text,
        negative_nudge,
        has_nudge,
        effective_nudged_idx,
        profile: user_profile(record.user_preference.as_deref()),
    })
}

#[inline]
fn matches(idx: Option<i64>, position: u8) -> u8 {
    (idx == Some(position as i64)) as u8
}

/// Cross one trial with positions {0, 1}.
pub fn expand_trial(labels: &TrialLabels, record: &RawTrialRecord) -> [ChoicePanelRow; 2] {
    [0u8, 1u8].map(|position| ChoicePanelRow {
        trial_id: labels.trial_id,
        model: labels.model.clone(),
        category: labels.category.clone(),
        nudge_text: labels.nudge_text.clone(),
        has_nudge: labels.has_nudge,
        negative_nudge: labels.negative_nudge,
        product_position_idx: position,
        chose_product: matches(record.chose_idx, position),
        product_is_cheaper: matches(record.cheaper_idx, position),
        product_is_higher_rated: Some(matches(record.better_rated_idx, position)),
        product_is_nudged: matches(labels.effective_nudged_idx, position),
        profile: labels.profile.clone(),
        coverage_type: record.coverage_type.clone(),
    })
}

/// Ratings are a usable treatment only if the higher-rated position varies
/// across trials. A missing index counts as 0 (equal ratings resolve to
/// index 0). When every trial has the same index the indicator is either
/// constant-zero or a copy of the position (or of its complement) and
/// carries no information.
pub fn ratings_informative(records: &[RawTrialRecord]) -> bool {
    let mut indices = records.iter().map(|r| r.better_rated_idx.unwrap_or(0));
    match indices.next() {
        Some(first) => indices.any(|idx| idx != first),
        None => false,
    }
}

/// Build the choice panel.
///
/// `drop_rating` forces the rating column out; otherwise it is dropped
/// automatically when ratings are uninformative (see [`ratings_informative`]).
pub fn prepare(records: &[RawTrialRecord], drop_rating: bool) -> Result<ChoicePanel> {
    if records.is_empty() {
        return Err(PrepError::Empty.into());
    }

    let mut rows = Vec::with_capacity(records.len() * 2);
    for (i, record) in records.iter().enumerate() {
        let labels = trial_labels(i, record)?;
        rows.extend(expand_trial(&labels, record));
    }

    let has_rating = !drop_rating && ratings_informative(records);
    if !has_rating {
        for row in &mut rows {
            row.product_is_higher_rated = None;
        }
        debug!(drop_rating, "rating column dropped from panel");
    }

    let panel = ChoicePanel { rows, has_rating };
    info!(
        trials = panel.num_trials(),
        models = ?panel.models(),
        rows = panel.len(),
        has_rating,
        nudge_rows = panel.nudge_subpanel().len(),
        "prepared choice panel"
    );
    Ok(panel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NEGATIVE_NUDGE_MARKER;

    fn record(id: &str) -> RawTrialRecord {
        RawTrialRecord {
            experiment_id: id.to_string(),
            model_family: "gpt-4o".to_string(),
            category: "Headphones".to_string(),
            nudge_text: None,
            nudge_trial: "False".to_string(),
            nudged_idx: None,
            chose_idx: Some(0),
            cheaper_idx: Some(0),
            better_rated_idx: Some(1),
            avg_price: Some(50.0),
            prices: Some("[45.0, 55.0]".to_string()),
            ratings: Some("[80, 90]".to_string()),
            user_preference: None,
            coverage_type: None,
        }
    }

    #[test]
    fn test_two_rows_per_trial() {
        let mut second = record("exp2");
        second.better_rated_idx = Some(0);
        let records = vec![record("exp1"), second];
        let panel = prepare(&records, false).unwrap();
        assert_eq!(panel.len(), 4);
        assert_eq!(panel.num_trials(), 2);
        assert_eq!(panel.models().len(), 1);
        assert_eq!(panel.rows[0].trial_id, 1);
        assert_eq!(panel.rows[0].product_position_idx, 0);
        assert_eq!(panel.rows[1].product_position_idx, 1);
        assert!(panel.has_rating);
    }

    #[test]
    fn test_nudge_trial_is_textual() {
        let mut r = record("exp1");
        r.nudge_trial = "true".to_string();
        r.nudged_idx = Some(1);
        let labels = trial_labels(0, &r).unwrap();
        assert_eq!(labels.has_nudge, HasNudge::NoNudge);
        assert_eq!(labels.effective_nudged_idx, None);

        r.nudge_trial = "True".to_string();
        let labels = trial_labels(0, &r).unwrap();
        assert_eq!(labels.has_nudge, HasNudge::Nudge);
        assert_eq!(labels.effective_nudged_idx, Some(1));
    }

    #[test]
    fn test_negative_nudge_flips_target() {
        let mut r = record("exp5");
        r.nudge_trial = "True".to_string();
        r.nudge_text = Some("Outdated version".to_string());
        r.nudged_idx = Some(0);
        let labels = trial_labels(0, &r).unwrap();
        assert!(labels.negative_nudge);
        assert_eq!(labels.effective_nudged_idx, Some(1));
        assert!(labels.nudge_text.ends_with(NEGATIVE_NUDGE_MARKER));

        let rows = expand_trial(&labels, &r);
        assert_eq!(rows[0].product_is_nudged, 0);
        assert_eq!(rows[1].product_is_nudged, 1);
    }

    #[test]
    fn test_missing_nudged_idx_defaults_to_zero() {
        let mut r = record("exp6");
        r.nudge_trial = "True".to_string();
        r.nudge_text = Some("Bestseller".to_string());
        let panel = prepare(&[r], false).unwrap();
        assert!(panel.rows.iter().all(|row| row.product_is_nudged == 0));
    }

    #[test]
    fn test_bad_experiment_id() {
        let r = record("trial-x");
        assert!(prepare(&[r], false).is_err());
    }

    #[test]
    fn test_constant_rating_index_is_uninformative() {
        // higher-rated always at position 1: the indicator would copy position
        let records: Vec<RawTrialRecord> = (1..=4).map(|i| record(&format!("exp{i}"))).collect();
        let panel = prepare(&records, false).unwrap();
        assert!(!panel.has_rating);
        assert!(panel.rows.iter().all(|r| r.product_is_higher_rated.is_none()));

        // missing counts as 0
        let mut mixed = records.clone();
        mixed[2].better_rated_idx = None;
        assert!(ratings_informative(&mixed));
        let mut zeros = records;
        zeros.iter_mut().for_each(|r| r.better_rated_idx = Some(0));
        zeros[0].better_rated_idx = None;
        assert!(!ratings_informative(&zeros));
    }

    #[test]
    fn test_drop_rating_forced() {
        let panel = prepare(&[record("exp1")], true).unwrap();
        assert!(!panel.has_rating);
        assert!(panel.rows.iter().all(|r| r.product_is_higher_rated.is_none()));
    }
}
