//! Parameter sweeps over distribution documents.
//!
//! A sweep template is a distribution document where any probability may be
//! a list of candidates instead of a number. All lists of one variable must
//! have the same length `k`; a variant picks one index per variable and uses
//! it for every list of that variable, so a conditioned variable moves all
//! its branches together. Variants enumerate the cartesian product of the
//! per-variable indices, last variable fastest.

use serde_json::{Map, Value};

use crate::distribution::loader::{PROBABILITIES_ALIAS, PROBABILITIES_KEY, kind};
use crate::error::ConfigError;

/// Expands a template into concrete distribution documents.
#[derive(Debug, Clone)]
pub struct DistributionSweep {
    template: Map<String, Value>,
    /// Candidate count per variable, in document order.
    candidates: Vec<(String, usize)>,
}

impl DistributionSweep {
    pub fn from_json(doc: &Value) -> Result<Self, ConfigError> {
        let template = doc
            .as_object()
            .ok_or_else(|| ConfigError::InvalidDocument {
                document: "sweep template".to_string(),
                reason: format!("expected an object of variables, found {}", kind(doc)),
            })?
            .clone();

        let mut candidates = Vec::with_capacity(template.len());
        for (name, raw) in &template {
            let probs = raw
                .get(PROBABILITIES_KEY)
                .or_else(|| raw.get(PROBABILITIES_ALIAS))
                .ok_or_else(|| ConfigError::InvalidDocument {
                    document: "sweep template".to_string(),
                    reason: format!("variable '{}' has no '{}'", name, PROBABILITIES_KEY),
                })?;

            let mut lengths = Vec::new();
            collect_lengths(name, probs, &mut lengths)?;

            let k = lengths.first().copied().unwrap_or(1);
            if k == 0 {
                return Err(ConfigError::InvalidDocument {
                    document: "sweep template".to_string(),
                    reason: format!("variable '{}' has an empty candidate list", name),
                });
            }
            if let Some(&found) = lengths.iter().find(|&&l| l != k) {
                return Err(ConfigError::SweepLengthMismatch {
                    variable: name.clone(),
                    expected: k,
                    found,
                });
            }
            candidates.push((name.clone(), k));
        }

        let variants = candidates.iter().try_fold(1usize, |n, (_, k)| n.checked_mul(*k));
        if variants.is_none() {
            return Err(ConfigError::InvalidDocument {
                document: "sweep template".to_string(),
                reason: "too many variants to enumerate".to_string(),
            });
        }

        Ok(Self {
            template,
            candidates,
        })
    }

    /// Number of variants. Checked against overflow when the template loads.
    pub fn len(&self) -> usize {
        self.candidates.iter().map(|(_, k)| k).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Candidate count per variable.
    pub fn candidates(&self) -> &[(String, usize)] {
        &self.candidates
    }

    /// Document for one choice of candidate index per variable.
    pub fn variant(&self, indices: &[usize]) -> Value {
        let mut doc = Map::new();
        for ((name, raw), &index) in self.template.iter().zip(indices) {
            let mut var = raw.as_object().cloned().unwrap_or_default();
            let probs_key = if var.contains_key(PROBABILITIES_KEY) {
                PROBABILITIES_KEY
            } else {
                PROBABILITIES_ALIAS
            };
            if let Some(probs) = var.get(probs_key) {
                let chosen = select(probs, index);
                var.insert(probs_key.to_string(), chosen);
            }
            doc.insert(name.clone(), Value::Object(var));
        }
        Value::Object(doc)
    }

    /// All variants in odometer order.
    pub fn variants(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).map(move |n| self.variant(&self.indices(n)))
    }

    /// Per-variable indices of the `n`th variant.
    fn indices(&self, mut n: usize) -> Vec<usize> {
        let mut indices = vec![0; self.candidates.len()];
        for (slot, (_, k)) in indices.iter_mut().zip(&self.candidates).rev() {
            *slot = n % k;
            n /= k;
        }
        indices
    }
}

fn collect_lengths(variable: &str, value: &Value, lengths: &mut Vec<usize>) -> Result<(), ConfigError> {
    match value {
        Value::Number(_) => Ok(()),
        Value::Array(items) => {
            if let Some(bad) = items.iter().find(|v| !v.is_number()) {
                return Err(ConfigError::InvalidSpecType {
                    variable: variable.to_string(),
                    found: format!("{} inside a candidate list", kind(bad)),
                });
            }
            lengths.push(items.len());
            Ok(())
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_lengths(variable, v, lengths)?;
            }
            Ok(())
        }
        other => Err(ConfigError::InvalidSpecType {
            variable: variable.to_string(),
            found: kind(other).to_string(),
        }),
    }
}

fn select(value: &Value, index: usize) -> Value {
    match value {
        Value::Array(items) => items.get(index).cloned().unwrap_or(Value::Null),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), select(v, index)))
                .collect(),
        ),
        other => other.clone(),
    }
}
