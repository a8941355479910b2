//! Run settings for the forging engines.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default tolerance for probability sums.
pub const DEFAULT_TOLERANCE: f64 = 1e-2;

/// Settings shared by the daily and hourly engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgeSettings {
    /// Relative noise on each guest's mean consumption (`U(-noise, noise)`).
    pub noise: f64,
    /// Relative noise on each day's weight within a stay.
    pub daily_noise: f64,
    /// Longest stay a room can draw, in days.
    pub max_stay_days: u32,
    /// How forged rooms consume an aggregate row's pax.
    pub pax_accounting: PaxAccounting,
    /// Allowed deviation of a probability sum from 1 before rescaling.
    pub tolerance: f64,
    /// Seed for the run's random stream. `None` draws from entropy.
    pub seed: Option<u64>,
    /// Column headers of the aggregate dataset.
    pub columns: ColumnNames,
}

impl Default for ForgeSettings {
    fn default() -> Self {
        Self {
            noise: 0.05,
            daily_noise: 0.1,
            max_stay_days: 7,
            pax_accounting: PaxAccounting::Headcount,
            tolerance: DEFAULT_TOLERANCE,
            seed: None,
            columns: ColumnNames::default(),
        }
    }
}

impl ForgeSettings {
    /// Load settings from the environment (and `.env`), starting from defaults.
    ///
    /// Recognised variables: `FORGE_NOISE`, `FORGE_DAILY_NOISE`,
    /// `FORGE_MAX_STAY_DAYS`, `FORGE_TOLERANCE`, `FORGE_PAX_ACCOUNTING`,
    /// `FORGE_SEED`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(v) = lookup("FORGE_NOISE") {
            settings.noise = parse_setting("FORGE_NOISE", &v)?;
        }
        if let Some(v) = lookup("FORGE_DAILY_NOISE") {
            settings.daily_noise = parse_setting("FORGE_DAILY_NOISE", &v)?;
        }
        if let Some(v) = lookup("FORGE_MAX_STAY_DAYS") {
            settings.max_stay_days = parse_setting("FORGE_MAX_STAY_DAYS", &v)?;
        }
        if let Some(v) = lookup("FORGE_TOLERANCE") {
            settings.tolerance = parse_setting("FORGE_TOLERANCE", &v)?;
        }
        if let Some(v) = lookup("FORGE_PAX_ACCOUNTING") {
            settings.pax_accounting = v.parse().map_err(|reason| ConfigError::InvalidSetting {
                key: "FORGE_PAX_ACCOUNTING".to_string(),
                reason,
            })?;
        }
        if let Some(v) = lookup("FORGE_SEED") {
            settings.seed = Some(parse_setting("FORGE_SEED", &v)?);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Check ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.noise) {
            return Err(invalid("noise", "must be in [0, 1)"));
        }
        if !(0.0..1.0).contains(&self.daily_noise) {
            return Err(invalid("daily_noise", "must be in [0, 1)"));
        }
        if self.max_stay_days == 0 {
            return Err(invalid("max_stay_days", "must be at least 1"));
        }
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(invalid("tolerance", "must be a finite non-negative number"));
        }
        Ok(())
    }

    /// Set the consumption noise.
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Set the daily weight noise used by hourly disaggregation.
    pub fn with_daily_noise(mut self, daily_noise: f64) -> Self {
        self.daily_noise = daily_noise;
        self
    }

    /// Set the longest stay.
    pub fn with_max_stay_days(mut self, days: u32) -> Self {
        self.max_stay_days = days;
        self
    }

    /// Set the pax bookkeeping policy.
    pub fn with_pax_accounting(mut self, policy: PaxAccounting) -> Self {
        self.pax_accounting = policy;
        self
    }

    /// Set the normalisation tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Fix the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// How each forged room is charged against an aggregate row's pax.
///
/// ```text
/// ┌──────────────┬───────────────────────────┬──────────────────────────────┐
/// │ Policy       │ pax means                 │ remaining -= per room        │
/// ├──────────────┼───────────────────────────┼──────────────────────────────┤
/// │ Headcount    │ guests in the month       │ occupants                    │
/// │ OccupantDays │ guest-nights in the month │ occupants × stay length      │
/// └──────────────┴───────────────────────────┴──────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaxAccounting {
    #[default]
    Headcount,
    /// Stay length is also capped so a room never overdraws the remainder.
    OccupantDays,
}

impl PaxAccounting {
    /// Units of pax consumed by a room.
    pub fn consumed(&self, occupants: u32, stay_days: u32) -> u32 {
        match self {
            PaxAccounting::Headcount => occupants,
            PaxAccounting::OccupantDays => occupants * stay_days,
        }
    }
}

impl std::str::FromStr for PaxAccounting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "headcount" | "guests" | "occupants" => Ok(PaxAccounting::Headcount),
            "occupant_days" | "occupantdays" | "occupant-days" | "nights" => {
                Ok(PaxAccounting::OccupantDays)
            }
            _ => Err(format!(
                "invalid pax accounting '{}', expected 'headcount' or 'occupant_days'",
                s
            )),
        }
    }
}

impl std::fmt::Display for PaxAccounting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaxAccounting::Headcount => write!(f, "headcount"),
            PaxAccounting::OccupantDays => write!(f, "occupant_days"),
        }
    }
}

/// Header names of the aggregate dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    pub hotel: String,
    pub pax: String,
    pub month: String,
    pub year: String,
    pub season: String,
    pub consumption_per_pax: String,
    pub ground_truth_total: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            hotel: "Hotel".to_string(),
            pax: "Pax".to_string(),
            month: "Mes".to_string(),
            year: "Año".to_string(),
            season: "Estación".to_string(),
            consumption_per_pax: "Consumo de eletricidad por Pax".to_string(),
            ground_truth_total: "Consumo total real".to_string(),
        }
    }
}

fn parse_setting<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidSetting {
        key: key.to_string(),
        reason: format!("'{}': {}", raw, e),
    })
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidSetting {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = ForgeSettings::default();
        assert_eq!(settings.max_stay_days, 7);
        assert_eq!(settings.pax_accounting, PaxAccounting::Headcount);
        assert!(settings.seed.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_lookup_overrides() {
        let settings = ForgeSettings::from_lookup(lookup_from(&[
            ("FORGE_NOISE", "0.1"),
            ("FORGE_MAX_STAY_DAYS", "3"),
            ("FORGE_PAX_ACCOUNTING", "occupant_days"),
            ("FORGE_SEED", "42"),
        ]))
        .unwrap();

        assert_eq!(settings.noise, 0.1);
        assert_eq!(settings.max_stay_days, 3);
        assert_eq!(settings.pax_accounting, PaxAccounting::OccupantDays);
        assert_eq!(settings.seed, Some(42));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ForgeSettings::from_lookup(lookup_from(&[("FORGE_NOISE", "abc")])).is_err());
        assert!(ForgeSettings::from_lookup(lookup_from(&[("FORGE_NOISE", "1.5")])).is_err());
        assert!(ForgeSettings::from_lookup(lookup_from(&[("FORGE_MAX_STAY_DAYS", "0")])).is_err());
        assert!(
            ForgeSettings::from_lookup(lookup_from(&[("FORGE_PAX_ACCOUNTING", "weekly")]))
                .is_err()
        );
    }

    #[test]
    fn test_pax_accounting_parsing() {
        assert_eq!(
            "headcount".parse::<PaxAccounting>().unwrap(),
            PaxAccounting::Headcount
        );
        assert_eq!(
            "Occupant-Days".parse::<PaxAccounting>().unwrap(),
            PaxAccounting::OccupantDays
        );
        assert!("invalid".parse::<PaxAccounting>().is_err());
    }

    #[test]
    fn test_pax_consumed() {
        assert_eq!(PaxAccounting::Headcount.consumed(2, 5), 2);
        assert_eq!(PaxAccounting::OccupantDays.consumed(2, 5), 10);
    }
}
