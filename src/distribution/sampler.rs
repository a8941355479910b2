//! Drawing values from the distribution model.

use std::collections::BTreeMap;

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use crate::dataset::AggregateRow;
use crate::distribution::model::{Categorical, DistributionEntry, ProbabilitySpec};
use crate::error::ForgeError;

impl Categorical {
    /// Draw one outcome proportionally to its weight.
    pub fn sample<R: Rng + ?Sized>(&self, variable: &str, rng: &mut R) -> Result<&str, ForgeError> {
        let index = WeightedIndex::<f64>::new(self.outcomes().iter().map(|(_, p)| *p)).map_err(|e| {
            ForgeError::DegenerateDistribution {
                variable: variable.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(&self.outcomes()[index.sample(rng)].0)
    }
}

impl DistributionEntry {
    /// Pick the categorical that applies in this context.
    ///
    /// A condition value is taken from `assigned` (values already drawn for
    /// this room or guest) first, then from the aggregate row.
    pub fn resolve<'a>(
        &'a self,
        assigned: &BTreeMap<String, String>,
        row: &AggregateRow,
    ) -> Result<&'a Categorical, ForgeError> {
        match &self.spec {
            ProbabilitySpec::Flat(c) => Ok(c),
            ProbabilitySpec::Conditioned(c) => {
                let value = assigned
                    .get(&c.condition)
                    .map(String::as_str)
                    .or_else(|| row.field(&c.condition))
                    .ok_or_else(|| ForgeError::UnresolvedCondition {
                        variable: self.name.clone(),
                        condition: c.condition.clone(),
                    })?;

                c.branch(value).ok_or_else(|| ForgeError::MissingBranch {
                    variable: self.name.clone(),
                    condition: c.condition.clone(),
                    value: value.to_string(),
                })
            }
        }
    }

    /// Resolve and draw a value.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        assigned: &BTreeMap<String, String>,
        row: &AggregateRow,
        rng: &mut R,
    ) -> Result<String, ForgeError> {
        let dist = self.resolve(assigned, row)?;
        dist.sample(&self.name, rng).map(str::to_string)
    }
}

/// Uniform relative perturbation in `[-amplitude, amplitude]`.
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, amplitude: f64) -> f64 {
    if amplitude > 0.0 {
        rng.gen_range(-amplitude..=amplitude)
    } else {
        0.0
    }
}
