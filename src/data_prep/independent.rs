//! Trial Summary Builder for the independent-analysis variant.
//!
//! Rows carry the price and rating of the option at their position, taken
//! from the trial's serialized per-option lists. Grouping by trial collapses
//! the two rows back into one summary with realized extremes and the values
//! of the chosen option.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::error::{PrepError, Result};
use crate::types::{PricedPanelRow, RawTrialRecord, TrialSummaryRow};

use super::panel::{expand_trial, trial_labels};

/// What to do with a record whose price/rating lists fail to parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MalformedRowPolicy {
    /// Skip the record and log it.
    Drop,
    /// Fail the whole build.
    Abort,
}

/// Parse a serialized two-option list such as `"[12.99, 15.5]"`.
pub fn parse_option_values(
    trial: i64,
    column: &'static str,
    text: Option<&str>,
) -> std::result::Result<[f64; 2], PrepError> {
    let text = text.unwrap_or("");
    let values: Vec<f64> =
        serde_json::from_str(text.trim()).map_err(|_| PrepError::MalformedArray {
            trial,
            column,
            value: text.to_string(),
        })?;
    match values.as_slice() {
        [a, b] => Ok([*a, *b]),
        other => Err(PrepError::OptionCount {
            trial,
            column,
            found: other.len(),
        }),
    }
}

fn priced_rows(row: usize, record: &RawTrialRecord) -> std::result::Result<[PricedPanelRow; 2], PrepError> {
    let labels = trial_labels(row, record)?;
    let prices = parse_option_values(labels.trial_id, "prices", record.prices.as_deref())?;
    let ratings = parse_option_values(labels.trial_id, "ratings", record.ratings.as_deref())?;
    let rows = expand_trial(&labels, record);
    Ok(rows.map(|r| {
        let pos = r.product_position_idx as usize;
        PricedPanelRow {
            price: prices[pos],
            rating: ratings[pos],
            row: r,
        }
    }))
}

/// Whether the logged `avg_price` agrees with the mean of the parsed option
/// prices. A missing `avg_price` is not a disagreement.
pub fn avg_price_consistent(record: &RawTrialRecord, prices: [f64; 2]) -> bool {
    match record.avg_price {
        Some(logged) => {
            let mean = (prices[0] + prices[1]) / 2.0;
            (logged - mean).abs() <= 1e-6 * mean.abs().max(1.0)
        }
        None => true,
    }
}

/// Expand records into priced rows, handling malformed lists per `policy`.
///
/// Records whose `avg_price` disagrees with their option prices keep the
/// parsed prices and are counted in the log.
pub fn prepare_independent(
    records: &[RawTrialRecord],
    policy: MalformedRowPolicy,
) -> Result<Vec<PricedPanelRow>> {
    if records.is_empty() {
        return Err(PrepError::Empty.into());
    }
    let mut rows = Vec::with_capacity(records.len() * 2);
    let mut dropped = 0usize;
    let mut inconsistent = 0usize;
    for (i, record) in records.iter().enumerate() {
        match priced_rows(i, record) {
            Ok(pair) => {
                if !avg_price_consistent(record, [pair[0].price, pair[1].price]) {
                    debug!(row = i, avg_price = ?record.avg_price, "avg_price differs from option prices");
                    inconsistent += 1;
                }
                rows.extend(pair);
            }
            Err(e @ (PrepError::MalformedArray { .. } | PrepError::OptionCount { .. }))
                if policy == MalformedRowPolicy::Drop =>
            {
                warn!(row = i, error = %e, "dropping record with malformed option list");
                dropped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    if inconsistent > 0 {
        warn!(records = inconsistent, "avg_price disagrees with the option prices");
    }
    info!(rows = rows.len(), dropped, "prepared priced panel");
    Ok(rows)
}

type TrialKey = (i64, String, Option<String>, String);

/// One summary row per (trial, model, coverage type, category).
///
/// Ties count as choosing the extreme: with equal prices the chosen price
/// equals the minimum, so `chose_cheaper` is true.
pub fn summarize_trials(rows: &[PricedPanelRow]) -> Vec<TrialSummaryRow> {
    let mut groups: BTreeMap<TrialKey, Vec<&PricedPanelRow>> = BTreeMap::new();
    for r in rows {
        let key = (
            r.row.trial_id,
            r.row.model.clone(),
            r.row.coverage_type.clone(),
            r.row.category.clone(),
        );
        groups.entry(key).or_default().push(r);
    }

    groups
        .into_iter()
        .map(|((trial_id, model, coverage_type, category), members)| {
            let n = members.len() as f64;
            let fold = |f: fn(&PricedPanelRow) -> f64| {
                let vals: Vec<f64> = members.iter().map(|r| f(r)).collect();
                let min = vals.iter().copied().fold(f64::INFINITY, f64::min);
                let max = vals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let mean = vals.iter().sum::<f64>() / n;
                (min, max, mean)
            };
            let (price_min, price_max, price_mean) = fold(|r| r.price);
            let (rating_min, rating_max, rating_mean) = fold(|r| r.rating);

            let chosen = members.iter().find(|r| r.row.chose_product == 1);
            let chosen_price = chosen.map(|r| r.price);
            let chosen_rating = chosen.map(|r| r.rating);

            TrialSummaryRow {
                trial_id,
                model,
                coverage_type,
                category,
                price_min,
                price_max,
                price_mean,
                rating_min,
                rating_max,
                rating_mean,
                chosen_price,
                chosen_rating,
                chose_cheaper: chosen_price.map(|p| p == price_min),
                chose_higher_rated: chosen_rating.map(|r| r == rating_max),
                price_diff_pct: (price_max - price_min) / price_min,
                rating_diff: rating_max - rating_min,
            }
        })
        .collect()
}
