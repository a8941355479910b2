//! Reconciling trained importances with theoretical ones.
//!
//! The modelling step drops one-hot features that are too correlated with
//! another feature or too collinear with the rest. Before comparing tables
//! the theoretical side is brought onto the same feature set: a feature
//! dropped for correlation hands its importance to the features it
//! correlated with, a feature dropped for collinearity just disappears.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dataset::Guest;
use crate::error::DataError;
use crate::importance::table::{FeatureRow, ImportanceTable};

/// Feature dropped for high pairwise correlation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CorrelationElimination {
    #[serde(default)]
    pub correlated_with: Vec<String>,
}

/// Feature dropped for a high variance inflation factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VifElimination {
    /// Kept as text since the factor may be `Infinity`.
    #[serde(rename = "VIF")]
    pub vif: String,
}

/// Features removed by the modelling step, and why.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EliminatedVariables {
    #[serde(default)]
    pub correlation: BTreeMap<String, CorrelationElimination>,
    #[serde(default, rename = "VIF")]
    pub vif: BTreeMap<String, VifElimination>,
}

impl EliminatedVariables {
    /// Whether a feature was eliminated for either reason.
    pub fn contains(&self, feature: &str) -> bool {
        self.correlation.contains_key(feature) || self.vif.contains_key(feature)
    }
}

/// Test-set error of one trained model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    #[serde(rename = "RMSE")]
    pub rmse: f64,
    #[serde(rename = "MAE")]
    pub mae: f64,
}

/// What a modelling collaborator reports back.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainedImportance {
    /// One column per trained model.
    pub importance: ImportanceTable,
    pub eliminated: EliminatedVariables,
    pub error_metrics: BTreeMap<String, ErrorMetrics>,
}

/// A supervised learner that scores guest features.
pub trait ImportanceModel {
    fn train_and_evaluate(&self, guests: &[Guest]) -> anyhow::Result<TrainedImportance>;
}

/// Fold eliminated features into the features that remain.
pub fn redistribute(eliminated: &EliminatedVariables, table: &ImportanceTable) -> ImportanceTable {
    let mut out = table.clone();
    let mut removed: Vec<&str> = Vec::new();

    for (feature, info) in &eliminated.correlation {
        let Some(source) = table.row(feature) else {
            continue;
        };
        for target in &info.correlated_with {
            if let Some(row) = out.rows_mut().iter_mut().find(|r| &r.feature == target) {
                for (value, add) in row.values.iter_mut().zip(&source.values) {
                    *value += add;
                }
            }
        }
        removed.push(feature);
    }

    for feature in eliminated.vif.keys() {
        if table.row(feature).is_some() {
            removed.push(feature);
        }
    }

    if !removed.is_empty() {
        tracing::debug!(features = ?removed, "Dropping eliminated features");
    }
    out.rows_mut()
        .retain(|r| !removed.contains(&r.feature.as_str()));
    out
}

/// Divide every column by its sum; columns summing to zero are kept.
pub fn normalize_columns(table: &ImportanceTable) -> ImportanceTable {
    let mut out = table.clone();
    let sums: Vec<f64> = (0..table.columns().len())
        .map(|i| table.rows().iter().map(|r| r.values[i]).sum())
        .collect();

    for row in out.rows_mut() {
        for (value, sum) in row.values.iter_mut().zip(&sums) {
            if *sum != 0.0 {
                *value /= sum;
            }
        }
    }
    out
}

/// Features present on both sides, in left order, with all columns.
pub fn inner_join(left: &ImportanceTable, right: &ImportanceTable) -> Result<ImportanceTable, DataError> {
    if let Some(dup) = left.columns().iter().find(|c| right.columns().contains(*c)) {
        return Err(DataError::DuplicateColumn(dup.clone()));
    }

    let mut joined = ImportanceTable::new(left.columns().iter().chain(right.columns()).cloned());
    for FeatureRow { feature, values } in left.rows() {
        if let Some(other) = right.row(feature) {
            let mut combined = values.clone();
            combined.extend(&other.values);
            joined.push(feature.clone(), combined)?;
        }
    }
    Ok(joined)
}

/// Bring theoretical importance onto the trained feature set, join the two
/// and normalise every column.
pub fn reconcile(trained: &TrainedImportance, theoretical: &ImportanceTable) -> Result<ImportanceTable, DataError> {
    let theoretical = redistribute(&trained.eliminated, theoretical);
    let joined = inner_join(&trained.importance, &theoretical)?;

    let dropped = trained.importance.len() - joined.len();
    if dropped > 0 {
        tracing::warn!(
            dropped,
            "Trained features without a theoretical counterpart were left out"
        );
    }
    Ok(normalize_columns(&joined))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn theoretical() -> ImportanceTable {
        ImportanceTable::single(
            "Theoretical_Importance",
            [
                ("sexo_Hombre", 0.05),
                ("sexo_Mujer", 0.05),
                ("viaje_Negocios", 0.1),
                ("viaje_Placer", 0.0),
            ],
        )
        .unwrap()
    }

    fn eliminated() -> EliminatedVariables {
        serde_json::from_value(json!({
            "correlation": {"sexo_Mujer": {"correlated_with": ["sexo_Hombre"]}},
            "VIF": {"viaje_Placer": {"VIF": "Infinity"}}
        }))
        .unwrap()
    }

    #[test]
    fn test_eliminated_variables_json() {
        let e = eliminated();
        assert_eq!(e.correlation["sexo_Mujer"].correlated_with, vec!["sexo_Hombre"]);
        assert_eq!(e.vif["viaje_Placer"].vif, "Infinity");
        assert!(e.contains("sexo_Mujer") && e.contains("viaje_Placer"));
        assert!(!e.contains("sexo_Hombre"));

        let back = serde_json::to_value(&e).unwrap();
        assert_eq!(back["VIF"]["viaje_Placer"]["VIF"], json!("Infinity"));
    }

    #[test]
    fn test_redistribute() {
        let table = redistribute(&eliminated(), &theoretical());

        let features: Vec<&str> = table.rows().iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(features, vec!["sexo_Hombre", "viaje_Negocios"]);
        assert!((table.value("sexo_Hombre", "Theoretical_Importance").unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_columns() {
        let mut table = ImportanceTable::new(["a", "b"]);
        table.push("x", vec![1.0, 0.0]).unwrap();
        table.push("y", vec![3.0, 0.0]).unwrap();

        let norm = normalize_columns(&table);
        assert_eq!(norm.value("x", "a"), Some(0.25));
        assert_eq!(norm.value("y", "a"), Some(0.75));
        assert_eq!(norm.value("y", "b"), Some(0.0));
    }

    #[test]
    fn test_inner_join() {
        let mut trained = ImportanceTable::new(["RandomForest"]);
        trained.push("viaje_Negocios", vec![0.6]).unwrap();
        trained.push("Dias de estancia", vec![0.1]).unwrap();
        trained.push("sexo_Hombre", vec![0.3]).unwrap();

        let joined = inner_join(&trained, &theoretical()).unwrap();
        assert_eq!(joined.columns(), &["RandomForest", "Theoretical_Importance"]);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.rows()[0].feature, "viaje_Negocios");
        assert_eq!(joined.rows()[0].values, vec![0.6, 0.1]);

        assert!(matches!(
            inner_join(&theoretical(), &theoretical()),
            Err(DataError::DuplicateColumn(_))
        ));
    }

    struct Fixed(TrainedImportance);

    impl ImportanceModel for Fixed {
        fn train_and_evaluate(&self, _guests: &[Guest]) -> anyhow::Result<TrainedImportance> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_reconcile() {
        let mut importance = ImportanceTable::new(["Ridge"]);
        importance.push("sexo_Hombre", vec![2.0]).unwrap();
        importance.push("viaje_Negocios", vec![2.0]).unwrap();
        let model = Fixed(TrainedImportance {
            importance,
            eliminated: eliminated(),
            error_metrics: BTreeMap::new(),
        });

        let trained = model.train_and_evaluate(&[]).unwrap();
        let table = reconcile(&trained, &theoretical()).unwrap();

        assert_eq!(table.value("sexo_Hombre", "Ridge"), Some(0.5));
        assert!((table.value("sexo_Hombre", "Theoretical_Importance").unwrap() - 0.5).abs() < 1e-12);
        assert!((table.value("viaje_Negocios", "Theoretical_Importance").unwrap() - 0.5).abs() < 1e-12);
    }
}
