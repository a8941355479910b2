//! Loading, normalising and saving distribution documents.
//!
//! Document shape, one object per variable:
//!
//! ```json
//! {
//!   "sexo": {"probabilidades": {"Hombre": 0.5, "Mujer": 0.5}},
//!   "nacionalidad": {
//!     "condicion": "Estación",
//!     "probabilidades": {"invierno": {"España": 0.4, "Otros": 0.6}}
//!   },
//!   "viaje": {"probabilidades": {"Negocios": 0.3, "Placer": 0.7},
//!             "compartido_por_habitacion": true},
//!   "ocupacion_habitacion": {"probabilidades": {"1": 0.4, "2": 0.6}}
//! }
//! ```

use serde_json::{Map, Value};

use crate::distribution::model::{
    Categorical, ConditionedDistribution, DistributionEntry, DistributionModel,
    OCCUPANCY_VARIABLE, ProbabilitySpec, Scope,
};
use crate::error::ConfigError;

pub(crate) const PROBABILITIES_KEY: &str = "probabilidades";
pub(crate) const CONDITION_KEY: &str = "condicion";
pub(crate) const SHARED_KEY: &str = "compartido_por_habitacion";

pub(crate) const PROBABILITIES_ALIAS: &str = "probabilities";
const CONDITION_ALIAS: &str = "condition";
const SHARED_ALIAS: &str = "shared_by_room";

/// What normalisation did to one probability branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionAction {
    /// Values were divided by their total.
    Rescaled,
    /// Total was exactly zero; values were left as they were.
    LeftZero,
}

/// A branch whose total was outside tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub variable: String,
    /// Condition value of the branch, for conditioned specs.
    pub branch: Option<String>,
    pub total: f64,
    pub action: CorrectionAction,
}

/// Result of normalising a model.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub model: DistributionModel,
    pub corrections: Vec<Correction>,
}

impl DistributionModel {
    /// Parse a distribution document without altering its probabilities.
    pub fn from_json(doc: &Value) -> Result<Self, ConfigError> {
        let vars = doc.as_object().ok_or_else(|| ConfigError::InvalidDocument {
            document: "distribution".to_string(),
            reason: format!("expected an object of variables, found {}", kind(doc)),
        })?;

        let mut entries = Vec::with_capacity(vars.len());
        let mut occupancy = None;

        for (name, raw) in vars {
            let obj = raw.as_object().ok_or_else(|| ConfigError::InvalidDocument {
                document: "distribution".to_string(),
                reason: format!("variable '{}' must be an object, found {}", name, kind(raw)),
            })?;

            let probs = field(obj, PROBABILITIES_KEY, PROBABILITIES_ALIAS).ok_or_else(|| {
                ConfigError::InvalidDocument {
                    document: "distribution".to_string(),
                    reason: format!("variable '{}' has no '{}'", name, PROBABILITIES_KEY),
                }
            })?;

            let condition = match field(obj, CONDITION_KEY, CONDITION_ALIAS) {
                None | Some(Value::Null) => None,
                Some(Value::String(c)) => Some(c.clone()),
                Some(other) => {
                    return Err(ConfigError::InvalidDocument {
                        document: "distribution".to_string(),
                        reason: format!(
                            "variable '{}': condition must be a string, found {}",
                            name,
                            kind(other)
                        ),
                    });
                }
            };

            let shared = match field(obj, SHARED_KEY, SHARED_ALIAS) {
                None | Some(Value::Null) => false,
                Some(Value::Bool(b)) => *b,
                Some(other) => {
                    return Err(ConfigError::InvalidDocument {
                        document: "distribution".to_string(),
                        reason: format!(
                            "variable '{}': shared flag must be a boolean, found {}",
                            name,
                            kind(other)
                        ),
                    });
                }
            };

            let spec = match condition {
                Some(condition) => {
                    let branches = expect_mapping(name, probs)?;
                    let mut parsed = Vec::with_capacity(branches.len());
                    for (value, branch) in branches {
                        parsed.push((value.clone(), parse_categorical(name, branch)?));
                    }
                    ProbabilitySpec::Conditioned(ConditionedDistribution::new(condition, parsed))
                }
                None => ProbabilitySpec::Flat(parse_categorical(name, probs)?),
            };

            if name == OCCUPANCY_VARIABLE {
                match spec {
                    ProbabilitySpec::Flat(c) => occupancy = Some(c),
                    ProbabilitySpec::Conditioned(_) => {
                        return Err(ConfigError::InvalidDocument {
                            document: "distribution".to_string(),
                            reason: format!("'{}' cannot be conditioned", OCCUPANCY_VARIABLE),
                        });
                    }
                }
                continue;
            }

            entries.push(DistributionEntry {
                name: name.clone(),
                spec,
                scope: if shared {
                    Scope::SharedByRoom
                } else {
                    Scope::Individual
                },
            });
        }

        DistributionModel::new(entries, occupancy)
    }

    /// Parse a distribution document from text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let doc: Value = serde_json::from_str(text)?;
        Self::from_json(&doc)
    }

    /// Serialise back to the document shape, occupancy last.
    pub fn to_json(&self) -> Value {
        let mut vars = Map::new();

        for entry in self.entries() {
            let mut obj = Map::new();
            match &entry.spec {
                ProbabilitySpec::Flat(c) => {
                    obj.insert(PROBABILITIES_KEY.to_string(), categorical_json(c));
                }
                ProbabilitySpec::Conditioned(c) => {
                    obj.insert(CONDITION_KEY.to_string(), Value::String(c.condition.clone()));
                    let branches: Map<String, Value> = c
                        .branches()
                        .iter()
                        .map(|(k, b)| (k.clone(), categorical_json(b)))
                        .collect();
                    obj.insert(PROBABILITIES_KEY.to_string(), Value::Object(branches));
                }
            }
            if entry.scope == Scope::SharedByRoom {
                obj.insert(SHARED_KEY.to_string(), Value::Bool(true));
            }
            vars.insert(entry.name.clone(), Value::Object(obj));
        }

        let mut occ = Map::new();
        occ.insert(
            PROBABILITIES_KEY.to_string(),
            categorical_json(self.occupancy()),
        );
        vars.insert(OCCUPANCY_VARIABLE.to_string(), Value::Object(occ));

        Value::Object(vars)
    }

    /// Normalise every flat spec and every conditioned branch.
    ///
    /// Branches within `tolerance` of 1 are kept as they are. Others are
    /// rescaled, except branches summing to exactly zero, which are left
    /// untouched. Each correction is logged as a warning.
    pub fn normalized(&self, tolerance: f64) -> Normalized {
        let mut corrections = Vec::new();

        let model = self.map_specs(|name, spec| match spec {
            ProbabilitySpec::Flat(c) => {
                ProbabilitySpec::Flat(normalize_branch(name, None, c, tolerance, &mut corrections))
            }
            ProbabilitySpec::Conditioned(c) => {
                let branches: Vec<(String, Categorical)> = c
                    .branches()
                    .iter()
                    .map(|(value, b)| {
                        (
                            value.clone(),
                            normalize_branch(name, Some(value), b, tolerance, &mut corrections),
                        )
                    })
                    .collect();
                ProbabilitySpec::Conditioned(ConditionedDistribution::new(
                    c.condition.clone(),
                    branches,
                ))
            }
        });

        Normalized { model, corrections }
    }
}

/// Normalise a weight sequence in place with the tolerance policy.
///
/// Returns the action taken, or `None` when the sum was already in tolerance.
pub fn normalize_weights(weights: &mut [f64], tolerance: f64) -> Option<CorrectionAction> {
    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() <= tolerance {
        None
    } else if total == 0.0 {
        Some(CorrectionAction::LeftZero)
    } else {
        for w in weights.iter_mut() {
            *w /= total;
        }
        Some(CorrectionAction::Rescaled)
    }
}

fn normalize_branch(
    variable: &str,
    branch: Option<&String>,
    dist: &Categorical,
    tolerance: f64,
    corrections: &mut Vec<Correction>,
) -> Categorical {
    let mut weights: Vec<f64> = dist.outcomes().iter().map(|(_, p)| *p).collect();
    let total: f64 = weights.iter().sum();

    match normalize_weights(&mut weights, tolerance) {
        None => dist.clone(),
        Some(action) => {
            match action {
                CorrectionAction::Rescaled => tracing::warn!(
                    variable,
                    branch = branch.map(String::as_str).unwrap_or("-"),
                    total,
                    "Probabilities do not sum to 1, rescaling"
                ),
                CorrectionAction::LeftZero => tracing::warn!(
                    variable,
                    branch = branch.map(String::as_str).unwrap_or("-"),
                    "Probabilities sum to zero, leaving branch as is"
                ),
            }
            corrections.push(Correction {
                variable: variable.to_string(),
                branch: branch.cloned(),
                total,
                action,
            });
            match action {
                CorrectionAction::Rescaled => dist.scaled(1.0 / total),
                CorrectionAction::LeftZero => dist.clone(),
            }
        }
    }
}

fn field<'a>(obj: &'a Map<String, Value>, key: &str, alias: &str) -> Option<&'a Value> {
    obj.get(key).or_else(|| obj.get(alias))
}

fn expect_mapping<'a>(
    variable: &str,
    value: &'a Value,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Array(_) => Err(ConfigError::InvalidDocument {
            document: "distribution".to_string(),
            reason: format!(
                "variable '{}': sequences are only valid in hourly profiles",
                variable
            ),
        }),
        other => Err(ConfigError::InvalidSpecType {
            variable: variable.to_string(),
            found: kind(other).to_string(),
        }),
    }
}

fn parse_categorical(variable: &str, value: &Value) -> Result<Categorical, ConfigError> {
    let map = expect_mapping(variable, value)?;
    let mut pairs = Vec::with_capacity(map.len());
    for (outcome, p) in map {
        pairs.push((outcome.clone(), parse_probability(variable, outcome, p)?));
    }
    Ok(Categorical::new(pairs))
}

pub(crate) fn parse_probability(
    variable: &str,
    outcome: &str,
    value: &Value,
) -> Result<f64, ConfigError> {
    let p = value.as_f64().ok_or_else(|| ConfigError::InvalidSpecType {
        variable: variable.to_string(),
        found: format!("{} for '{}'", kind(value), outcome),
    })?;
    if !p.is_finite() || p < 0.0 {
        return Err(ConfigError::InvalidProbability {
            variable: variable.to_string(),
            outcome: outcome.to_string(),
            value: p,
        });
    }
    Ok(p)
}

fn categorical_json(dist: &Categorical) -> Value {
    let map: Map<String, Value> = dist
        .outcomes()
        .iter()
        .map(|(k, p)| (k.clone(), Value::from(*p)))
        .collect();
    Value::Object(map)
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
