//! Hourly Disaggregation Engine.
//!
//! Each guest's total is split across the days of the stay with slightly
//! noisy weights renormalised against the whole stay, then every day is
//! split across 24 hours following the guest's profile exactly.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::{Guest, HOURS_PER_DAY, HourlyRecord};
use crate::distribution::{
    CorrectionAction, PROBABILITIES_ALIAS, PROBABILITIES_KEY, jitter, kind, normalize_weights,
    parse_probability,
};
use crate::error::{ConfigError, ForgeError};

/// Name of the daily noise policy, written to the hourly metadata.
pub const NOISE_POLICY: &str = "stay-renormalized-daily-weights";

/// Named 24-hour consumption shapes, each summing to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyProfiles {
    profiles: Vec<(String, [f64; HOURS_PER_DAY])>,
}

impl HourlyProfiles {
    /// Build from already validated weights.
    pub fn new<I, K>(profiles: I, tolerance: f64) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, Vec<f64>)>,
        K: Into<String>,
    {
        let mut parsed = Vec::new();
        for (name, weights) in profiles {
            let name = name.into();
            let found = weights.len();
            let mut hours: [f64; HOURS_PER_DAY] = weights
                .try_into()
                .map_err(|_| ConfigError::ProfileLength {
                    profile: name.clone(),
                    found,
                })?;

            if let Some((hour, &w)) = hours
                .iter()
                .enumerate()
                .find(|(_, w)| !w.is_finite() || **w < 0.0)
            {
                return Err(ConfigError::InvalidProbability {
                    variable: name,
                    outcome: format!("h{}", hour),
                    value: w,
                });
            }

            match normalize_weights(&mut hours, tolerance) {
                Some(CorrectionAction::Rescaled) => {
                    tracing::warn!(profile = %name, "Hourly profile does not sum to 1, rescaling")
                }
                Some(CorrectionAction::LeftZero) => return Err(ConfigError::ZeroProfile(name)),
                None => {}
            }
            parsed.push((name, hours));
        }

        if parsed.is_empty() {
            return Err(ConfigError::NoProfiles);
        }
        Ok(Self { profiles: parsed })
    }

    /// Parse `{name: {"probabilidades": [24 floats]}}`.
    pub fn from_json(doc: &Value, tolerance: f64) -> Result<Self, ConfigError> {
        let map = doc.as_object().ok_or_else(|| ConfigError::InvalidDocument {
            document: "hourly profiles".to_string(),
            reason: format!("expected an object of profiles, found {}", kind(doc)),
        })?;

        let mut profiles = Vec::with_capacity(map.len());
        for (name, raw) in map {
            let probs = raw
                .get(PROBABILITIES_KEY)
                .or_else(|| raw.get(PROBABILITIES_ALIAS))
                .ok_or_else(|| ConfigError::InvalidDocument {
                    document: "hourly profiles".to_string(),
                    reason: format!("profile '{}' has no '{}'", name, PROBABILITIES_KEY),
                })?;
            let values = probs.as_array().ok_or_else(|| ConfigError::InvalidSpecType {
                variable: name.clone(),
                found: kind(probs).to_string(),
            })?;

            let mut weights = Vec::with_capacity(values.len());
            for (hour, v) in values.iter().enumerate() {
                weights.push(parse_probability(name, &format!("h{}", hour), v)?);
            }
            profiles.push((name.clone(), weights));
        }

        Self::new(profiles, tolerance)
    }

    pub fn from_json_str(text: &str, tolerance: f64) -> Result<Self, ConfigError> {
        let doc: Value = serde_json::from_str(text)?;
        Self::from_json(&doc, tolerance)
    }

    pub fn get(&self, name: &str) -> Option<&[f64; HOURS_PER_DAY]> {
        self.profiles.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Pick a profile uniformly.
    fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &(String, [f64; HOURS_PER_DAY]) {
        &self.profiles[rng.gen_range(0..self.profiles.len())]
    }
}

/// Policy and inputs of a disaggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyMetadata {
    pub noise_policy: String,
    pub daily_noise: f64,
    pub profiles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HourlyOutput {
    pub records: Vec<HourlyRecord>,
    pub metadata: HourlyMetadata,
}

/// Spread every guest's total consumption over its stay, hour by hour.
///
/// Guests already tagged with a profile keep it; an unknown tag is an error.
pub fn disaggregate<R: Rng + ?Sized>(
    guests: &[Guest],
    profiles: &HourlyProfiles,
    daily_noise: f64,
    rng: &mut R,
) -> Result<HourlyOutput, ForgeError> {
    let mut records = Vec::with_capacity(guests.iter().map(|g| g.stay_days as usize).sum());

    for guest in guests {
        let (profile_id, profile) = match &guest.profile_id {
            Some(tag) => {
                let profile = profiles.get(tag).ok_or_else(|| ForgeError::UnknownProfile {
                    guest_id: guest.guest_id.clone(),
                    profile: tag.clone(),
                })?;
                (tag.as_str(), profile)
            }
            None => {
                let (name, profile) = profiles.choose(rng);
                (name.as_str(), profile)
            }
        };

        let mut weights: Vec<f64> = (0..guest.stay_days)
            .map(|_| 1.0 + jitter(rng, daily_noise))
            .collect();
        let total: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= total;
        }

        for (offset, weight) in weights.iter().enumerate() {
            let daily = guest.total_consumption * weight;
            let mut hours = [0.0; HOURS_PER_DAY];
            for (slot, share) in hours.iter_mut().zip(profile) {
                *slot = daily * share;
            }

            records.push(HourlyRecord {
                guest_id: guest.guest_id.clone(),
                room_id: guest.room_id.clone(),
                profile_id: profile_id.to_string(),
                day: guest.start_day + offset as u32,
                month: guest.month,
                year: guest.year,
                hotel: guest.hotel.clone(),
                hours,
            });
        }
    }

    tracing::info!(
        guests = guests.len(),
        records = records.len(),
        "Hourly disaggregation complete"
    );

    Ok(HourlyOutput {
        records,
        metadata: HourlyMetadata {
            noise_policy: NOISE_POLICY.to_string(),
            daily_noise,
            profiles: profiles.names().map(str::to_string).collect(),
        },
    })
}
