//! Distribution Model: a validated tree of categorical distributions.
//!
//! - `model`: typed tree, room occupancy, sampling order
//! - `loader`: JSON documents and normalisation
//! - `sampler`: seeded draws with condition resolution
//! - `sweep`: parameter sweep templates expanded into documents

mod loader;
mod model;
mod sampler;
mod sweep;

pub use loader::{Correction, CorrectionAction, Normalized, normalize_weights};
pub use model::{
    Categorical, ConditionedDistribution, DistributionEntry, DistributionModel,
    OCCUPANCY_VARIABLE, ProbabilitySpec, Scope,
};
pub use sampler::jitter;
pub use sweep::DistributionSweep;

pub(crate) use loader::{PROBABILITIES_ALIAS, PROBABILITIES_KEY, kind, parse_probability};
