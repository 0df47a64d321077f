//! Data preparation: raw trial CSV → typed choice panels.
//!
//! - [`records`]: CSV loading with optional metadata columns
//! - [`labels`]: nudge-text normalisation, model display names, profiles
//! - [`panel`]: the Choice-Data Builder ([`prepare`])
//! - [`independent`]: priced rows and per-trial summaries

pub mod independent;
pub mod labels;
pub mod panel;
pub mod records;

pub use independent::{prepare_independent, summarize_trials, MalformedRowPolicy};
pub use panel::prepare;
pub use records::load_raw_records;
