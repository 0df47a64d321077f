//! Error types for every pipeline stage.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("data preparation failed: {0}")]
    Prep(#[from] PrepError),
    #[error("model fit failed: {0}")]
    Fit(#[from] FitError),
    #[error("marginal effects failed: {0}")]
    Effects(#[from] EffectsError),
    #[error("output failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PrepError {
    #[error("no trial records in input")]
    Empty,
    #[error("trial {trial}: malformed `{column}` array {value:?}")]
    MalformedArray {
        trial: i64,
        column: &'static str,
        value: String,
    },
    #[error("trial {trial}: `{column}` has {found} options, expected 2")]
    OptionCount {
        trial: i64,
        column: &'static str,
        found: usize,
    },
    #[error("row {row}: malformed index `{column}` = {value:?}")]
    MalformedIndex {
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("row {row}: malformed number `{column}` = {value:?}")]
    MalformedNumber {
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("row {row}: experiment id {value:?} is not `exp<number>`")]
    ExperimentId { row: usize, value: String },
    #[error("row {row}: required column `{column}` is missing")]
    MissingColumn { row: usize, column: &'static str },
}

#[derive(Debug, Error)]
pub enum FitError {
    #[error("{model}: panel has no rows")]
    EmptyPanel { model: &'static str },
    #[error("{model}: term `{term}` is constant or aliased within the panel")]
    DegenerateTerm { model: &'static str, term: String },
    #[error("{model}: no identifiable columns after absorbing fixed effects")]
    NoIdentifiableColumns { model: &'static str },
    #[error("{model}: cross-product matrix is singular after elimination")]
    Singular { model: &'static str },
    #[error("{model}: {dropped} rows have non-finite covariates and nothing remains")]
    NonFinite { model: &'static str, dropped: usize },
}

#[derive(Debug, Error)]
pub enum EffectsError {
    #[error("{family}: grouping key has fields [{found}], expected [{expected}]")]
    GroupingKey {
        family: &'static str,
        expected: String,
        found: String,
    },
    #[error("reference grid has {cells} cells, limit is {limit}")]
    GridTooLarge { cells: usize, limit: usize },
}
