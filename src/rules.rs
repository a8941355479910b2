//! Rule Table: fractional consumption adjustments per categorical value.
//!
//! ```json
//! {"sexo": {"Hombre": 0.1, "Mujer": -0.1}, "viaje": {"Negocios": 0.25}}
//! ```
//!
//! A guest whose values hit several rules gets the sum of their
//! adjustments; mean consumption is then scaled by `1 + sum`.

use serde_json::{Map, Value};

use crate::distribution::kind;
use crate::error::ConfigError;

/// Adjustments of one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub variable: String,
    adjustments: Vec<(String, f64)>,
}

impl Rule {
    pub fn new<I, K>(variable: impl Into<String>, adjustments: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            variable: variable.into(),
            adjustments: adjustments
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        }
    }

    /// Adjustment for a value, if the rule names it.
    pub fn adjustment(&self, value: &str) -> Option<f64> {
        self.adjustments
            .iter()
            .find(|(k, _)| k == value)
            .map(|(_, a)| *a)
    }

    pub fn adjustments(&self) -> &[(String, f64)] {
        &self.adjustments
    }
}

/// Ordered set of rules, one per variable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn from_json(doc: &Value) -> Result<Self, ConfigError> {
        let vars = doc.as_object().ok_or_else(|| ConfigError::InvalidDocument {
            document: "rule table".to_string(),
            reason: format!("expected an object of variables, found {}", kind(doc)),
        })?;

        let mut rules = Vec::with_capacity(vars.len());
        for (variable, raw) in vars {
            let values = raw.as_object().ok_or_else(|| ConfigError::InvalidDocument {
                document: "rule table".to_string(),
                reason: format!("variable '{}' must map values to adjustments, found {}", variable, kind(raw)),
            })?;

            let mut adjustments = Vec::with_capacity(values.len());
            for (value, a) in values {
                let a = a
                    .as_f64()
                    .filter(|a| a.is_finite())
                    .ok_or_else(|| ConfigError::InvalidDocument {
                        document: "rule table".to_string(),
                        reason: format!("'{}' = '{}': adjustment must be a finite number", variable, value),
                    })?;
                adjustments.push((value.clone(), a));
            }
            rules.push(Rule::new(variable.clone(), adjustments));
        }

        Ok(Self { rules })
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let doc: Value = serde_json::from_str(text)?;
        Self::from_json(&doc)
    }

    pub fn to_json(&self) -> Value {
        let vars: Map<String, Value> = self
            .rules
            .iter()
            .map(|rule| {
                let values: Map<String, Value> = rule
                    .adjustments
                    .iter()
                    .map(|(k, a)| (k.clone(), Value::from(*a)))
                    .collect();
                (rule.variable.clone(), Value::Object(values))
            })
            .collect();
        Value::Object(vars)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, variable: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.variable == variable)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Summed adjustment for a guest.
    ///
    /// `lookup` returns the guest's value of a variable; variables without a
    /// value and values without an adjustment contribute nothing.
    pub fn adjustment<'a, F>(&self, lookup: F) -> f64
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        self.rules
            .iter()
            .filter_map(|rule| lookup(&rule.variable).and_then(|v| rule.adjustment(v)))
            .sum()
    }
}
