//! Model layer: formula specifications, design encoding, the fixed-effects
//! least-squares kernel and clustered covariance.

pub mod design;
pub mod fit;
pub mod observations;
pub mod solve;
pub mod spec;
pub mod vcov;

pub use fit::{fit, fit_independent, fit_model, fit_profile, FittedModel, IndependentFit, ModelFit, ProfileFit};
pub use spec::{ModelSpec, Observation, Var};
