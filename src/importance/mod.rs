//! Feature importance: theoretical scores from the generative rules, the
//! model-free correlation baseline, and reconciliation with trained models.

mod correlation;
mod reconcile;
mod table;
mod theoretical;

pub use correlation::{CORRELATION_COLUMN, point_biserial};
pub use reconcile::{
    CorrelationElimination, EliminatedVariables, ErrorMetrics, ImportanceModel, TrainedImportance,
    VifElimination, inner_join, normalize_columns, reconcile, redistribute,
};
pub use table::{FEATURE_COLUMN, FeatureRow, ImportanceTable};
pub use theoretical::{Marginal, Marginals, THEORETICAL_COLUMN, probability_of, theoretical_importance};
