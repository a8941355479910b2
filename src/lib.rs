//! Guest-level occupancy and energy forging for hotels.
//!
//! Aggregate hotel/month rows are expanded into rooms and guests whose
//! attributes follow a [`DistributionModel`] and whose consumption follows a
//! [`RuleTable`], calibrated back to measured totals and split into hourly
//! profiles. The same model and rules yield a theoretical importance per
//! rule value for comparison with trained models.

pub mod config;
pub mod dataset;
pub mod distribution;
pub mod error;
pub mod forge;
pub mod importance;
pub mod io;
pub mod rules;

pub use config::{ColumnNames, ForgeSettings, PaxAccounting};
pub use dataset::{AggregateRow, Guest, HourlyRecord};
pub use distribution::{DistributionModel, DistributionSweep};
pub use error::{ConfigError, DataError, Error, ForgeError, ImportanceError, Result};
pub use forge::{ForgeOutput, HourlyProfiles, disaggregate, forge, forge_batch};
pub use importance::{ImportanceTable, reconcile, theoretical_importance};
pub use rules::RuleTable;
