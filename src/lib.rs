//! # abxlab: discrete-choice analysis for shopping experiments
//!
//! Quantifies which attributes (price, rating, position, persuasive nudge
//! text) drive binary shopping choices made by AI agents and human
//! participants, per model and per subgroup.
//!
//! ## Pipeline overview
//!
//! | Stage | Entry point | Module | Description |
//! |-------|-------------|--------|-------------|
//! | 1 | [`data_prep::prepare`] | [`data_prep`] | Raw trial records → two position rows per trial, treatment indicators, canonical labels, `has_rating` |
//! | 1b | [`data_prep::summarize_trials`] | [`data_prep::independent`] | Priced rows → one summary per trial (independent variant) |
//! | 2 | [`models::fit`] | [`models`] | Main and nudge LPMs with absorbed trial fixed effects and two-way clustered covariance |
//! | 3 | [`marginals::MarginalEffectsEngine`] | [`marginals`] | EMM/AME contrasts per model, category, nudge text; BH within each family |
//! | 4 | [`combine::combine`] | [`combine`] | Stack effect tables across experiment variants |
//!
//! ## Identification
//!
//! Every trial contributes two mirror rows, one per display position. The
//! trial fixed effect is absorbed by within-trial demeaning, so every
//! coefficient is identified from the within-pair contrast only. Full
//! interaction lattices are structurally rank-deficient under that fixed
//! effect; aliased columns are screened out in formula order and fixed at
//! zero, and a fit fails only when a treatment's own main effect is lost.
//!
//! ## Determinism
//!
//! Independent work (the two models of a variant, the treatment variables
//! of an effect family) runs on rayon and is collected in declaration
//! order. The AME subsample is drawn from a seeded `SmallRng`, so a run is
//! reproducible for a given [`env_config::EngineConfig`].

#![allow(clippy::needless_range_loop)]

pub mod combine;
pub mod constants;
pub mod data_prep;
pub mod env_config;
pub mod error;
pub mod marginals;
pub mod models;
pub mod output;
pub mod types;

pub use error::{AnalysisError, Result};
