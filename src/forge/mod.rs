//! Forging engines.
//!
//! - `daily`: aggregate rows to guests, with per-row calibration
//! - `calibration`: calibration factors and run statistics
//! - `hourly`: guest totals to 24-hour profiles per stay day
//! - `batch`: independent forge runs fanned out on the blocking pool

mod batch;
mod calibration;
mod daily;
mod hourly;

pub use batch::{ForgeJob, JobResult, forge_batch};
pub use calibration::{
    CalibrationAccumulator, CalibrationBias, CalibrationSkip, CalibrationStats, FactorSummary,
    calibration_factor,
};
pub use daily::{ForgedRow, GuestSequence, RowCalibration, days_in_month, forge, forge_row};
pub use hourly::{HourlyMetadata, HourlyOutput, HourlyProfiles, NOISE_POLICY, disaggregate};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ForgeSettings;
use crate::dataset::Guest;

/// An aggregate row that could not be forged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFailure {
    pub row_index: usize,
    pub hotel: String,
    pub year: i32,
    pub month: u32,
    pub reason: String,
}

/// Description of a forge run, saved next to its outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub settings: ForgeSettings,
    pub rows_processed: usize,
    pub rows_failed: usize,
    pub guests: usize,
}

/// Everything a forge run produces.
#[derive(Debug, Clone)]
pub struct ForgeOutput {
    pub guests: Vec<Guest>,
    pub calibration: CalibrationStats,
    pub failures: Vec<RowFailure>,
    pub metadata: RunMetadata,
}
