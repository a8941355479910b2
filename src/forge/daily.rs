//! Daily Forging Engine: aggregate rows to rooms and guests.

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::config::{ForgeSettings, PaxAccounting};
use crate::dataset::{AggregateRow, Guest, hotel_code};
use crate::distribution::{DistributionModel, OCCUPANCY_VARIABLE, jitter};
use crate::error::{ConfigError, ForgeError};
use crate::forge::calibration::{CalibrationAccumulator, CalibrationSkip, calibration_factor};
use crate::forge::{ForgeOutput, RowFailure, RunMetadata};
use crate::rules::RuleTable;

/// Calibration outcome of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowCalibration {
    /// The row has no ground truth.
    NotRequested,
    /// Guests were scaled by this factor.
    Applied(f64),
    /// Ground truth present but the factor could not be computed.
    Skipped(String),
}

/// Guests forged from one aggregate row.
#[derive(Debug, Clone)]
pub struct ForgedRow {
    pub guests: Vec<Guest>,
    pub rooms: usize,
    pub calibration: RowCalibration,
}

/// Guest id counters, one per hotel+year+month.
#[derive(Debug, Clone, Default)]
pub struct GuestSequence {
    next: HashMap<(String, i32, u32), u64>,
}

impl GuestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next guest id for the hotel and month, starting at 1.
    pub fn next_id(&mut self, hotel: &str, year: i32, month: u32) -> String {
        let code = hotel_code(hotel);
        let seq = self.next.entry((code.clone(), year, month)).or_insert(0);
        *seq += 1;
        format!("{}/{}/{:02}/{:06}", code, year, month, seq)
    }
}

/// Forge every row, isolating failures to the row that raised them.
///
/// Settings are validated up front; an invalid setting fails the whole run.
pub fn forge<R: Rng + ?Sized>(
    rows: &[AggregateRow],
    model: &DistributionModel,
    rules: &RuleTable,
    settings: &ForgeSettings,
    rng: &mut R,
) -> Result<ForgeOutput, ConfigError> {
    settings.validate()?;

    let mut sequence = GuestSequence::new();
    let mut calibration = CalibrationAccumulator::new();
    let mut guests = Vec::new();
    let mut failures = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        match forge_row(index, row, model, rules, settings, &mut sequence, rng) {
            Ok(forged) => {
                tracing::debug!(
                    row = index,
                    hotel = %row.hotel,
                    rooms = forged.rooms,
                    guests = forged.guests.len(),
                    "Forged row"
                );
                match forged.calibration {
                    RowCalibration::Applied(factor) => calibration.record(factor),
                    RowCalibration::Skipped(reason) => calibration.skip(CalibrationSkip {
                        row_index: index,
                        hotel: row.hotel.clone(),
                        reason,
                    }),
                    RowCalibration::NotRequested => {}
                }
                guests.extend(forged.guests);
            }
            Err(e) => {
                tracing::error!(row = index, hotel = %row.hotel, "Row failed: {}", e);
                failures.push(RowFailure {
                    row_index: index,
                    hotel: row.hotel.clone(),
                    year: row.year,
                    month: row.month,
                    reason: e.to_string(),
                });
            }
        }
    }

    let calibration = calibration.finish();
    match &calibration.summary {
        Some(summary) => tracing::info!(
            rows = calibration.rows_calibrated,
            mean = summary.mean,
            std = summary.std,
            "Calibration: {}",
            summary.label
        ),
        None => tracing::info!("Calibration not applied"),
    }

    let metadata = RunMetadata {
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        settings: settings.clone(),
        rows_processed: rows.len() - failures.len(),
        rows_failed: failures.len(),
        guests: guests.len(),
    };

    tracing::info!(
        run_id = %metadata.run_id,
        rows = metadata.rows_processed,
        failed = metadata.rows_failed,
        guests = metadata.guests,
        "Forge run complete"
    );

    Ok(ForgeOutput {
        guests,
        calibration,
        failures,
        metadata,
    })
}

/// Forge a single aggregate row.
///
/// Guest ids are only taken from `sequence` once the row has succeeded, so
/// a failed row leaves no gaps.
pub fn forge_row<R: Rng + ?Sized>(
    row_index: usize,
    row: &AggregateRow,
    model: &DistributionModel,
    rules: &RuleTable,
    settings: &ForgeSettings,
    sequence: &mut GuestSequence,
    rng: &mut R,
) -> Result<ForgedRow, ForgeError> {
    let month_days = days_in_month(row.year, row.month).ok_or_else(|| ForgeError::InvalidRow {
        row: row_index,
        reason: format!("no such month {}-{:02}", row.year, row.month),
    })?;
    if !row.consumption_per_pax.is_finite() {
        return Err(ForgeError::InvalidRow {
            row: row_index,
            reason: format!("consumption per pax is {}", row.consumption_per_pax),
        });
    }

    let code = hotel_code(&row.hotel);
    let mut guests = Vec::new();
    let mut remaining = row.pax;
    let mut rooms = 0usize;

    while remaining > 0 {
        let drawn = model.occupancy().sample(OCCUPANCY_VARIABLE, rng)?;
        let occupants = drawn
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidOccupancy(drawn.to_string()))?
            .min(remaining);

        let mut room = BTreeMap::new();
        room.insert(OCCUPANCY_VARIABLE.to_string(), occupants.to_string());
        for entry in model.shared() {
            let value = entry.sample(&room, row, rng)?;
            room.insert(entry.name.clone(), value);
        }

        let mut cap = settings.max_stay_days.min(month_days);
        if settings.pax_accounting == PaxAccounting::OccupantDays {
            cap = cap.min(remaining / occupants);
        }
        let stay_days = rng.gen_range(1..=cap.max(1));
        let start_day = rng.gen_range(1..=month_days - stay_days + 1);

        rooms += 1;
        let room_id = format!("{}/R{:04}/{:06}", code, row_index, rooms);

        for _ in 0..occupants {
            let mut attributes = room.clone();
            for entry in model.individual() {
                let value = entry.sample(&attributes, row, rng)?;
                attributes.insert(entry.name.clone(), value);
            }

            let adjustment = rules.adjustment(|variable| {
                attributes
                    .get(variable)
                    .map(String::as_str)
                    .or_else(|| row.field(variable))
            });
            let mean = row.consumption_per_pax * (1.0 + adjustment) * (1.0 + jitter(rng, settings.noise));

            let mut guest = Guest {
                guest_id: String::new(),
                room_id: room_id.clone(),
                row_index,
                hotel: row.hotel.clone(),
                year: row.year,
                month: row.month,
                season: row.season.clone(),
                stay_days,
                start_day,
                attributes,
                mean_consumption: 0.0,
                total_consumption: 0.0,
                profile_id: None,
            };
            guest.set_mean_consumption(mean);
            guests.push(guest);
        }

        remaining = remaining.saturating_sub(settings.pax_accounting.consumed(occupants, stay_days));
    }

    let calibration = match row.ground_truth_total {
        None => RowCalibration::NotRequested,
        Some(truth) => {
            let synthetic: f64 = guests.iter().map(|g| g.total_consumption).sum();
            match calibration_factor(truth, synthetic) {
                Some(factor) => {
                    for guest in &mut guests {
                        guest.scale_consumption(factor);
                    }
                    RowCalibration::Applied(factor)
                }
                None => {
                    let reason = format!("synthetic total is {}, cannot calibrate to {}", synthetic, truth);
                    tracing::warn!(row = row_index, hotel = %row.hotel, "Calibration skipped: {}", reason);
                    RowCalibration::Skipped(reason)
                }
            }
        }
    };

    for guest in &mut guests {
        guest.guest_id = sequence.next_id(&row.hotel, row.year, row.month);
    }

    Ok(ForgedRow {
        guests,
        rooms,
        calibration,
    })
}

/// Number of days in a calendar month, `None` for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    u32::try_from(next.signed_duration_since(first).num_days()).ok()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    use super::*;

    fn model(doc: serde_json::Value) -> DistributionModel {
        DistributionModel::from_json(&doc).unwrap()
    }

    fn rules(doc: serde_json::Value) -> RuleTable {
        RuleTable::from_json(&doc).unwrap()
    }

    fn quiet() -> ForgeSettings {
        ForgeSettings::default().with_noise(0.0)
    }

    #[test]
    fn test_pair_room_adjustments() {
        let model = model(json!({
            "sexo": {"probabilidades": {"Hombre": 0.5, "Mujer": 0.5}},
            "ocupacion_habitacion": {"probabilidades": {"2": 1.0}}
        }));
        let rules = rules(json!({"sexo": {"Hombre": 0.1, "Mujer": -0.1}}));
        let rows = vec![AggregateRow::new("Hotel Sol", 2023, 1, "invierno", 2, 100.0)];
        let mut rng = StdRng::seed_from_u64(42);

        let out = forge(&rows, &model, &rules, &quiet(), &mut rng).unwrap();

        assert_eq!(out.guests.len(), 2);
        assert_eq!(out.guests[0].room_id, out.guests[1].room_id);
        for guest in &out.guests {
            let expected = match guest.attribute("sexo") {
                Some("Hombre") => 110.0,
                Some("Mujer") => 90.0,
                other => panic!("unexpected sexo {:?}", other),
            };
            assert!((guest.mean_consumption - expected).abs() < 1e-9);
            assert_eq!(guest.attribute(OCCUPANCY_VARIABLE), Some("2"));
        }
    }

    #[test]
    fn test_single_occupancy_rooms() {
        let model = model(json!({
            "sexo": {"probabilidades": {"Hombre": 0.5, "Mujer": 0.5}},
            "ocupacion_habitacion": {"probabilidades": {"1": 1.0}}
        }));
        let rows = vec![AggregateRow::new("H", 2023, 3, "primavera", 5, 10.0)];
        let mut rng = StdRng::seed_from_u64(1);

        let out = forge(&rows, &model, &RuleTable::default(), &quiet(), &mut rng).unwrap();

        let rooms: BTreeSet<&str> = out.guests.iter().map(|g| g.room_id.as_str()).collect();
        assert_eq!(out.guests.len(), 5);
        assert_eq!(rooms.len(), 5);
    }

    #[test]
    fn test_room_shares_attributes_and_timing() {
        let model = model(json!({
            "viaje": {"probabilidades": {"Negocios": 0.5, "Placer": 0.5},
                      "compartido_por_habitacion": true},
            "tipo_habitacion": {"condicion": "viaje",
                                "probabilidades": {
                                    "Negocios": {"Estándar": 0.7, "Suite": 0.3},
                                    "Placer": {"Estándar": 0.4, "Suite": 0.6}},
                                "compartido_por_habitacion": true},
            "sexo": {"probabilidades": {"Hombre": 0.5, "Mujer": 0.5}},
            "ocupacion_habitacion": {"probabilidades": {"1": 0.2, "2": 0.5, "3": 0.3}}
        }));
        let rows = vec![AggregateRow::new("H", 2023, 2, "invierno", 60, 10.0)];
        let mut rng = StdRng::seed_from_u64(9);

        let out = forge(&rows, &model, &RuleTable::default(), &ForgeSettings::default(), &mut rng).unwrap();
        assert_eq!(out.guests.len(), 60);

        let mut by_room: BTreeMap<&str, Vec<&Guest>> = BTreeMap::new();
        for guest in &out.guests {
            by_room.entry(guest.room_id.as_str()).or_default().push(guest);
        }
        for members in by_room.values() {
            let first = members[0];
            assert_eq!(
                first.attribute(OCCUPANCY_VARIABLE),
                Some(members.len().to_string().as_str())
            );
            for other in &members[1..] {
                assert_eq!(other.attribute("viaje"), first.attribute("viaje"));
                assert_eq!(other.attribute("tipo_habitacion"), first.attribute("tipo_habitacion"));
                assert_eq!(other.stay_days, first.stay_days);
                assert_eq!(other.start_day, first.start_day);
            }
        }
    }

    #[test]
    fn test_shared_variable_conditioned_on_occupancy() {
        let model = model(json!({
            "tipo_habitacion": {"condicion": "ocupacion_habitacion",
                                "probabilidades": {
                                    "1": {"Individual": 1.0},
                                    "2": {"Doble": 1.0}},
                                "compartido_por_habitacion": true},
            "ocupacion_habitacion": {"probabilidades": {"1": 0.5, "2": 0.5}}
        }));
        let rows = vec![AggregateRow::new("H", 2023, 4, "primavera", 10, 10.0)];
        let mut rng = StdRng::seed_from_u64(12);

        let out = forge(&rows, &model, &RuleTable::default(), &quiet(), &mut rng).unwrap();

        assert!(out.failures.is_empty(), "{:?}", out.failures);
        assert_eq!(out.guests.len(), 10);
        for guest in &out.guests {
            let expected = match guest.attribute(OCCUPANCY_VARIABLE) {
                Some("1") => "Individual",
                Some("2") => "Doble",
                other => panic!("unexpected occupancy {:?}", other),
            };
            assert_eq!(guest.attribute("tipo_habitacion"), Some(expected));
        }
    }

    #[test]
    fn test_calibration_matches_ground_truth() {
        let model = model(json!({
            "sexo": {"probabilidades": {"Hombre": 0.5, "Mujer": 0.5}},
            "ocupacion_habitacion": {"probabilidades": {"1": 0.5, "2": 0.5}}
        }));
        let rules = rules(json!({"sexo": {"Hombre": 0.3}}));
        let rows = vec![
            AggregateRow::new("H", 2023, 1, "invierno", 40, 12.0).with_ground_truth(5000.0),
            AggregateRow::new("H", 2023, 2, "invierno", 30, 12.0).with_ground_truth(2500.0),
            AggregateRow::new("H", 2023, 3, "primavera", 30, 12.0),
        ];
        let mut rng = StdRng::seed_from_u64(3);

        let out = forge(&rows, &model, &rules, &ForgeSettings::default(), &mut rng).unwrap();

        for (index, truth) in [(0usize, 5000.0), (1, 2500.0)] {
            let total: f64 = out
                .guests
                .iter()
                .filter(|g| g.row_index == index)
                .map(|g| g.total_consumption)
                .sum();
            assert!((total - truth).abs() < 1e-6, "row {} total {}", index, total);
        }
        for guest in &out.guests {
            assert_eq!(guest.total_consumption, guest.mean_consumption * guest.stay_days as f64);
        }

        assert_eq!(out.calibration.rows_calibrated, 2);
        assert!(out.calibration.applied());
    }

    #[test]
    fn test_zero_synthetic_total_is_skipped() {
        let model = model(json!({}));
        let rows = vec![AggregateRow::new("H", 2023, 1, "invierno", 0, 12.0).with_ground_truth(100.0)];
        let mut rng = StdRng::seed_from_u64(3);

        let out = forge(&rows, &model, &RuleTable::default(), &quiet(), &mut rng).unwrap();

        assert!(out.failures.is_empty());
        assert!(!out.calibration.applied());
        assert_eq!(out.calibration.skipped.len(), 1);
    }

    #[test]
    fn test_failed_row_is_isolated() {
        let model = model(json!({
            "nacionalidad": {"condicion": "Zona",
                             "probabilidades": {"sur": {"España": 1.0}}}
        }));
        let rows = vec![
            AggregateRow::new("H", 2023, 1, "invierno", 3, 10.0),
            AggregateRow::new("H", 2023, 1, "invierno", 2, 10.0).with_field("Zona", "sur"),
            AggregateRow::new("H", 2023, 1, "invierno", 2, 10.0).with_field("Zona", "norte"),
        ];
        let mut rng = StdRng::seed_from_u64(5);

        let out = forge(&rows, &model, &RuleTable::default(), &quiet(), &mut rng).unwrap();

        assert_eq!(out.guests.len(), 2);
        assert!(out.guests.iter().all(|g| g.row_index == 1));
        assert_eq!(out.failures.len(), 2);
        assert_eq!(out.failures[0].row_index, 0);
        assert_eq!(out.failures[1].row_index, 2);
        assert_eq!(out.metadata.rows_processed, 1);
        assert_eq!(out.metadata.rows_failed, 2);

        // Failed rows do not consume guest ids.
        assert_eq!(out.guests[0].guest_id, "h/2023/01/000001");
    }

    #[test]
    fn test_guest_ids_scoped_to_hotel_month() {
        let model = model(json!({}));
        let rows = vec![
            AggregateRow::new("Hotel Sol", 2023, 1, "invierno", 2, 10.0),
            AggregateRow::new("Hotel Sol", 2023, 1, "invierno", 1, 10.0),
            AggregateRow::new("Hotel Sol", 2023, 2, "invierno", 1, 10.0),
        ];
        let mut rng = StdRng::seed_from_u64(5);

        let out = forge(&rows, &model, &RuleTable::default(), &quiet(), &mut rng).unwrap();
        let ids: Vec<&str> = out.guests.iter().map(|g| g.guest_id.as_str()).collect();

        assert_eq!(
            ids,
            vec![
                "hotel-sol/2023/01/000001",
                "hotel-sol/2023/01/000002",
                "hotel-sol/2023/01/000003",
                "hotel-sol/2023/02/000001",
            ]
        );
        assert_eq!(out.guests[2].room_id, "hotel-sol/R0001/000001");
    }

    #[test]
    fn test_stays_fit_in_month() {
        let model = model(json!({"ocupacion_habitacion": {"probabilidades": {"1": 0.5, "2": 0.5}}}));
        let rows = vec![AggregateRow::new("H", 2024, 2, "invierno", 200, 10.0)];
        let settings = ForgeSettings::default().with_max_stay_days(40);
        let mut rng = StdRng::seed_from_u64(8);

        let out = forge(&rows, &model, &RuleTable::default(), &settings, &mut rng).unwrap();

        for guest in &out.guests {
            assert!(guest.stay_days >= 1);
            assert!(guest.start_day >= 1);
            assert!(guest.start_day + guest.stay_days - 1 <= 29);
        }
    }

    #[test]
    fn test_occupant_days_accounting() {
        let model = model(json!({"ocupacion_habitacion": {"probabilidades": {"1": 0.3, "2": 0.4, "4": 0.3}}}));
        let rows = vec![AggregateRow::new("H", 2023, 7, "verano", 50, 10.0)];
        let settings = quiet().with_pax_accounting(PaxAccounting::OccupantDays);
        let mut rng = StdRng::seed_from_u64(21);

        let out = forge(&rows, &model, &RuleTable::default(), &settings, &mut rng).unwrap();

        let occupant_days: u32 = out.guests.iter().map(|g| g.stay_days).sum();
        assert_eq!(occupant_days, 50);
    }

    #[test]
    fn test_same_seed_same_output() {
        let model = model(json!({
            "sexo": {"probabilidades": {"Hombre": 0.5, "Mujer": 0.5}},
            "ocupacion_habitacion": {"probabilidades": {"1": 0.5, "2": 0.5}}
        }));
        let rows = vec![AggregateRow::new("H", 2023, 1, "invierno", 20, 10.0)];
        let settings = ForgeSettings::default();

        let a = forge(&rows, &model, &RuleTable::default(), &settings, &mut StdRng::seed_from_u64(4)).unwrap();
        let b = forge(&rows, &model, &RuleTable::default(), &settings, &mut StdRng::seed_from_u64(4)).unwrap();
        assert_eq!(a.guests, b.guests);
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2023, 2), Some(28));
        assert_eq!(days_in_month(2023, 12), Some(31));
        assert_eq!(days_in_month(2023, 13), None);
    }
}
