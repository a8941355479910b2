//! Point-biserial correlation of one-hot guest features with mean
//! consumption, the model-free baseline next to trained importances.

use std::collections::BTreeMap;

use crate::dataset::{Guest, feature_key};
use crate::error::DataError;
use crate::importance::reconcile::normalize_columns;
use crate::importance::table::ImportanceTable;

/// Column written by [`point_biserial`].
pub const CORRELATION_COLUMN: &str = "Correlation";

/// `|r|` between each `{variable}_{value}` indicator and mean consumption,
/// normalised to sum 1.
///
/// Indicators that never vary (a value held by every guest or by none)
/// have no correlation and are left out.
pub fn point_biserial(guests: &[Guest]) -> Result<ImportanceTable, DataError> {
    let mut values: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for guest in guests {
        for (variable, value) in &guest.attributes {
            let seen = values.entry(variable.as_str()).or_default();
            if !seen.contains(&value.as_str()) {
                seen.push(value);
            }
        }
    }

    let y: Vec<f64> = guests.iter().map(|g| g.mean_consumption).collect();
    let mut table = ImportanceTable::new([CORRELATION_COLUMN]);

    for (variable, seen) in &values {
        for value in seen {
            let x: Vec<f64> = guests
                .iter()
                .map(|g| if g.attribute(variable) == Some(*value) { 1.0 } else { 0.0 })
                .collect();
            if let Some(r) = pearson(&x, &y) {
                table.push(feature_key(variable, value), vec![r.abs()])?;
            }
        }
    }

    Ok(normalize_columns(&table))
}

/// Pearson correlation, `None` when either side has no variance.
fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    if x.len() < 2 {
        return None;
    }
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        None
    } else {
        Some(cov / (var_x.sqrt() * var_y.sqrt()))
    }
}
