//! Theoretical importance of rule values.
//!
//! A rule value matters in proportion to how strongly it moves consumption
//! and how often it occurs, so its score is `|adjustment| x P(value)`. The
//! marginal `P(value)` is propagated through condition chains of the
//! distribution model:
//!
//! ```text
//! P(tipo_habitacion = Suite)
//!     = P(Suite | viaje = Negocios) x P(Negocios)
//!     + P(Suite | viaje = Placer)   x P(Placer)
//! ```
//!
//! Each product is kept as a separate path so callers can see where the
//! probability mass came from; the score sums them.

use crate::dataset::{AggregateRow, feature_key};
use crate::distribution::{DistributionModel, OCCUPANCY_VARIABLE, ProbabilitySpec};
use crate::error::{DataError, ImportanceError};
use crate::importance::table::ImportanceTable;
use crate::rules::RuleTable;

/// Column written by the evaluator.
pub const THEORETICAL_COLUMN: &str = "Theoretical_Importance";

/// Marginal probability of one value.
#[derive(Debug, Clone, PartialEq)]
pub enum Marginal {
    /// Read directly from a flat distribution or the data.
    Scalar(f64),
    /// One product per conditioning path.
    Paths(Vec<f64>),
}

impl Marginal {
    pub fn total(&self) -> f64 {
        match self {
            Marginal::Scalar(p) => *p,
            Marginal::Paths(ps) => ps.iter().sum(),
        }
    }

    fn products(&self, factor: f64) -> Vec<f64> {
        match self {
            Marginal::Scalar(p) => vec![p * factor],
            Marginal::Paths(ps) => ps.iter().map(|p| p * factor).collect(),
        }
    }
}

/// Marginal of every value of a variable, in first-seen order.
pub type Marginals = Vec<(String, Marginal)>;

/// Marginal distribution of `variable`.
///
/// Variables without a distribution entry fall back to their relative
/// frequency in `rows`.
pub fn probability_of(
    variable: &str,
    model: &DistributionModel,
    rows: &[AggregateRow],
) -> Result<Marginals, ImportanceError> {
    if variable == OCCUPANCY_VARIABLE {
        return Ok(scalars(model.occupancy().outcomes()));
    }

    let Some(entry) = model.entry(variable) else {
        return empirical(variable, rows);
    };

    match &entry.spec {
        ProbabilitySpec::Flat(dist) => Ok(scalars(dist.outcomes())),
        ProbabilitySpec::Conditioned(cond) => {
            let condition = probability_of(&cond.condition, model, rows)?;
            let mut combined: Vec<(String, Vec<f64>)> = Vec::new();

            for (condition_value, condition_p) in &condition {
                let branch = cond
                    .branch(condition_value)
                    .ok_or_else(|| ImportanceError::MissingBranch {
                        variable: variable.to_string(),
                        condition: cond.condition.clone(),
                        value: condition_value.clone(),
                    })?;

                for (value, p) in branch.outcomes() {
                    let products = condition_p.products(*p);
                    match combined.iter_mut().find(|(v, _)| v == value) {
                        Some((_, paths)) => paths.extend(products),
                        None => combined.push((value.clone(), products)),
                    }
                }
            }

            Ok(combined
                .into_iter()
                .map(|(v, paths)| (v, Marginal::Paths(paths)))
                .collect())
        }
    }
}

/// Score every value named by the rule table.
///
/// A value the marginal does not know scores zero.
pub fn theoretical_importance(
    rules: &RuleTable,
    model: &DistributionModel,
    rows: &[AggregateRow],
) -> Result<ImportanceTable, ImportanceError> {
    let mut table = ImportanceTable::new([THEORETICAL_COLUMN]);

    for rule in rules.rules() {
        let marginal = probability_of(&rule.variable, model, rows)?;
        for (value, adjustment) in rule.adjustments() {
            let probability = marginal
                .iter()
                .find(|(v, _)| v == value)
                .map(|(_, m)| m.total())
                .unwrap_or(0.0);
            table.push(
                feature_key(&rule.variable, value),
                vec![adjustment.abs() * probability],
            )?;
        }
    }

    tracing::debug!(features = table.len(), "Computed theoretical importance");
    Ok(table)
}

fn scalars(outcomes: &[(String, f64)]) -> Marginals {
    outcomes
        .iter()
        .map(|(v, p)| (v.clone(), Marginal::Scalar(*p)))
        .collect()
}

fn empirical(variable: &str, rows: &[AggregateRow]) -> Result<Marginals, ImportanceError> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in rows.iter().filter_map(|r| r.field(variable)) {
        match counts.iter_mut().find(|(v, _)| v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value.to_string(), 1)),
        }
    }

    if counts.is_empty() {
        return Err(DataError::MissingColumn {
            column: variable.to_string(),
            source_name: "aggregate rows".to_string(),
        }
        .into());
    }

    let total = rows.len() as f64;
    Ok(counts
        .into_iter()
        .map(|(v, n)| (v, Marginal::Scalar(n as f64 / total)))
        .collect())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn score(table: &ImportanceTable, feature: &str) -> f64 {
        table.value(feature, THEORETICAL_COLUMN).unwrap()
    }

    #[test]
    fn test_flat_variable() {
        let model = DistributionModel::from_json(&json!({
            "uso_instalaciones": {"probabilidades": {"Si": 0.3, "No": 0.7}}
        }))
        .unwrap();
        let rules = RuleTable::from_json(&json!({"uso_instalaciones": {"Si": 0.2}})).unwrap();

        let table = theoretical_importance(&rules, &model, &[]).unwrap();
        assert_eq!(table.len(), 1);
        assert!((score(&table, "uso_instalaciones_Si") - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_conditioned_chain() {
        let model = DistributionModel::from_json(&json!({
            "viaje": {"probabilidades": {"Negocios": 0.4, "Placer": 0.6}},
            "tipo_habitacion": {
                "condicion": "viaje",
                "probabilidades": {
                    "Negocios": {"Estándar": 0.5, "Suite": 0.5},
                    "Placer": {"Estándar": 0.8, "Suite": 0.2}
                }
            },
            "uso_instalaciones": {
                "condicion": "tipo_habitacion",
                "probabilidades": {
                    "Estándar": {"Si": 0.1, "No": 0.9},
                    "Suite": {"Si": 0.9, "No": 0.1}
                }
            }
        }))
        .unwrap();

        let marginal = probability_of("tipo_habitacion", &model, &[]).unwrap();
        assert_eq!(marginal[1].0, "Suite");
        assert!((marginal[1].1.total() - (0.4 * 0.5 + 0.6 * 0.2)).abs() < 1e-12);

        // Two levels deep: every path through both conditions is kept.
        let marginal = probability_of("uso_instalaciones", &model, &[]).unwrap();
        let (_, si) = marginal.iter().find(|(v, _)| v == "Si").unwrap();
        match si {
            Marginal::Paths(paths) => assert_eq!(paths.len(), 4),
            other => panic!("expected paths, got {:?}", other),
        }
        let expected = (0.4 * 0.5 + 0.6 * 0.8) * 0.1 + (0.4 * 0.5 + 0.6 * 0.2) * 0.9;
        assert!((si.total() - expected).abs() < 1e-12);

        let rules = RuleTable::from_json(&json!({"uso_instalaciones": {"Si": -0.5}})).unwrap();
        let table = theoretical_importance(&rules, &model, &[]).unwrap();
        assert!((score(&table, "uso_instalaciones_Si") - 0.5 * expected).abs() < 1e-12);
    }

    #[test]
    fn test_empirical_fallback() {
        let model = DistributionModel::from_json(&json!({
            "nacionalidad": {
                "condicion": "Estación",
                "probabilidades": {
                    "invierno": {"España": 0.2, "Otros": 0.8},
                    "verano": {"España": 0.6, "Otros": 0.4}
                }
            }
        }))
        .unwrap();
        let rows = vec![
            AggregateRow::new("H", 2023, 1, "invierno", 10, 1.0),
            AggregateRow::new("H", 2023, 2, "invierno", 10, 1.0),
            AggregateRow::new("H", 2023, 3, "invierno", 10, 1.0),
            AggregateRow::new("H", 2023, 7, "verano", 10, 1.0),
        ];
        let rules = RuleTable::from_json(&json!({
            "Estación": {"verano": 0.4},
            "nacionalidad": {"España": 0.1}
        }))
        .unwrap();

        let table = theoretical_importance(&rules, &model, &rows).unwrap();
        assert!((score(&table, "Estación_verano") - 0.4 * 0.25).abs() < 1e-12);
        let espana = 0.75 * 0.2 + 0.25 * 0.6;
        assert!((score(&table, "nacionalidad_España") - 0.1 * espana).abs() < 1e-12);
    }

    #[test]
    fn test_occupancy_and_unknown_values() {
        let model = DistributionModel::from_json(&json!({
            "ocupacion_habitacion": {"probabilidades": {"1": 0.25, "2": 0.75}}
        }))
        .unwrap();
        let rules = RuleTable::from_json(&json!({"ocupacion_habitacion": {"2": 0.2, "5": 1.0}})).unwrap();

        let table = theoretical_importance(&rules, &model, &[]).unwrap();
        assert!((score(&table, "ocupacion_habitacion_2") - 0.15).abs() < 1e-12);
        assert_eq!(score(&table, "ocupacion_habitacion_5"), 0.0);
    }

    #[test]
    fn test_missing_sources() {
        let model = DistributionModel::from_json(&json!({
            "nacionalidad": {
                "condicion": "Estación",
                "probabilidades": {"invierno": {"España": 1.0}}
            }
        }))
        .unwrap();
        let rules = RuleTable::from_json(&json!({"edad": {"Joven": 0.1}})).unwrap();
        assert!(matches!(
            theoretical_importance(&rules, &model, &[]),
            Err(ImportanceError::Data(DataError::MissingColumn { .. }))
        ));

        let rows = vec![AggregateRow::new("H", 2023, 7, "verano", 10, 1.0)];
        assert!(matches!(
            probability_of("nacionalidad", &model, &rows),
            Err(ImportanceError::MissingBranch { .. })
        ));
    }
}
