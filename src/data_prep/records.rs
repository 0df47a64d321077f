//! Raw trial CSV loading.
//!
//! Every column is read as optional text and validated afterwards, so a
//! missing metadata column (`user_preference`, `coverage_type`) resolves to
//! `None` instead of failing the whole file. Index columns accept the forms
//! pandas writes for nullable integers: `"1"`, `"1.0"`, or empty.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{PrepError, Result};
use crate::types::RawTrialRecord;

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    experiment_id: Option<String>,
    #[serde(default)]
    model_family: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    nudge_text: Option<String>,
    #[serde(default)]
    nudge_trial: Option<String>,
    #[serde(default)]
    nudged_idx: Option<String>,
    #[serde(default)]
    chose_idx: Option<String>,
    #[serde(default)]
    cheaper_idx: Option<String>,
    #[serde(default)]
    better_rated_idx: Option<String>,
    #[serde(default)]
    avg_price: Option<String>,
    #[serde(default)]
    prices: Option<String>,
    #[serde(default)]
    ratings: Option<String>,
    #[serde(default, rename = "cfg.task.config.user_preference", alias = "user_preference")]
    user_preference: Option<String>,
    #[serde(default, rename = "cfg.task.config.coverage_type", alias = "coverage_type")]
    coverage_type: Option<String>,
}

/// Load every trial record from a harness CSV export.
pub fn load_raw_records<P: AsRef<Path>>(path: P) -> Result<Vec<RawTrialRecord>> {
    let path = path.as_ref();
    let reader = csv::Reader::from_path(path)?;
    let records = read_raw_records(reader)?;
    info!(path = %path.display(), records = records.len(), "loaded raw trial records");
    Ok(records)
}

/// Parse trial records from any CSV reader (header row required).
pub fn read_raw_records<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<RawTrialRecord>> {
    let mut records = Vec::new();
    for (row, result) in reader.deserialize::<CsvRow>().enumerate() {
        let csv_row = result?;
        records.push(to_record(row, csv_row)?);
    }
    if records.is_empty() {
        return Err(PrepError::Empty.into());
    }
    Ok(records)
}

fn to_record(row: usize, r: CsvRow) -> std::result::Result<RawTrialRecord, PrepError> {
    Ok(RawTrialRecord {
        experiment_id: required(row, "experiment_id", r.experiment_id)?,
        model_family: required(row, "model_family", r.model_family)?,
        category: required(row, "category", r.category)?,
        nudge_text: present(r.nudge_text),
        nudge_trial: present(r.nudge_trial).unwrap_or_default(),
        nudged_idx: parse_index(row, "nudged_idx", r.nudged_idx)?,
        chose_idx: parse_index(row, "chose_idx", r.chose_idx)?,
        cheaper_idx: parse_index(row, "cheaper_idx", r.cheaper_idx)?,
        better_rated_idx: parse_index(row, "better_rated_idx", r.better_rated_idx)?,
        avg_price: parse_number(row, "avg_price", r.avg_price)?,
        prices: present(r.prices),
        ratings: present(r.ratings),
        user_preference: present(r.user_preference),
        coverage_type: present(r.coverage_type),
    })
}

/// Empty and pandas null spellings are all "missing".
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| {
        let t = v.trim();
        !(t.is_empty() || t == "nan" || t == "NaN" || t == "<NA>" || t == "None")
    })
}

fn required(
    row: usize,
    column: &'static str,
    value: Option<String>,
) -> std::result::Result<String, PrepError> {
    present(value).ok_or(PrepError::MissingColumn { row, column })
}

pub(crate) fn parse_index(
    row: usize,
    column: &'static str,
    value: Option<String>,
) -> std::result::Result<Option<i64>, PrepError> {
    let Some(text) = present(value) else {
        return Ok(None);
    };
    let malformed = || PrepError::MalformedIndex {
        row,
        column,
        value: text.clone(),
    };
    let parsed: f64 = text.trim().parse().map_err(|_| malformed())?;
    if parsed.fract() != 0.0 || !parsed.is_finite() {
        return Err(malformed());
    }
    Ok(Some(parsed as i64))
}

fn parse_number(
    row: usize,
    column: &'static str,
    value: Option<String>,
) -> std::result::Result<Option<f64>, PrepError> {
    let Some(text) = present(value) else {
        return Ok(None);
    };
    text.trim()
        .parse()
        .map(Some)
        .map_err(|_| PrepError::MalformedNumber {
            row,
            column,
            value: text.clone(),
        })
}
