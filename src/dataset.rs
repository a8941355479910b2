//! Records flowing through the engines: aggregate input rows, forged
//! guests and hourly guest-day records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ColumnNames;

/// Hours in a day bucket set.
pub const HOURS_PER_DAY: usize = 24;

/// One hotel/month input record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub hotel: String,
    pub year: i32,
    pub month: u32,
    pub season: String,
    /// Occupants reported for the month.
    pub pax: u32,
    /// Mean consumption per occupant.
    pub consumption_per_pax: f64,
    /// Measured total consumption, when known.
    pub ground_truth_total: Option<f64>,
    /// Every cell of the source row keyed by its header, used to resolve
    /// condition values and empirical frequencies.
    pub fields: BTreeMap<String, String>,
}

impl AggregateRow {
    /// Build a row keyed by the default column headers.
    pub fn new(
        hotel: impl Into<String>,
        year: i32,
        month: u32,
        season: impl Into<String>,
        pax: u32,
        consumption_per_pax: f64,
    ) -> Self {
        let columns = ColumnNames::default();
        let hotel = hotel.into();
        let season = season.into();

        let mut fields = BTreeMap::new();
        fields.insert(columns.hotel, hotel.clone());
        fields.insert(columns.year, year.to_string());
        fields.insert(columns.month, month.to_string());
        fields.insert(columns.season, season.clone());
        fields.insert(columns.pax, pax.to_string());
        fields.insert(
            columns.consumption_per_pax,
            consumption_per_pax.to_string(),
        );

        Self {
            hotel,
            year,
            month,
            season,
            pax,
            consumption_per_pax,
            ground_truth_total: None,
            fields,
        }
    }

    /// Attach a measured total for calibration.
    pub fn with_ground_truth(mut self, total: f64) -> Self {
        self.ground_truth_total = Some(total);
        self.fields
            .insert(ColumnNames::default().ground_truth_total, total.to_string());
        self
    }

    /// Attach an extra column value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a cell by header.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// One synthetic guest for one stay.
#[derive(Debug, Clone, PartialEq)]
pub struct Guest {
    /// `{hotel-code}/{year}/{month}/{seq}`, sequence scoped to hotel+year+month.
    pub guest_id: String,
    /// `{hotel-code}/R{row}/{seq}`, sequence scoped to the aggregate row.
    pub room_id: String,
    /// Index of the aggregate row this guest was forged from.
    pub row_index: usize,
    pub hotel: String,
    pub year: i32,
    pub month: u32,
    pub season: String,
    pub stay_days: u32,
    pub start_day: u32,
    /// Sampled values: room occupancy, shared and individual variables.
    pub attributes: BTreeMap<String, String>,
    pub mean_consumption: f64,
    /// Always `mean_consumption * stay_days`.
    pub total_consumption: f64,
    /// Hourly profile assigned during disaggregation.
    pub profile_id: Option<String>,
}

impl Guest {
    /// Sampled value of a variable.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Set the mean consumption and recompute the total from it.
    pub fn set_mean_consumption(&mut self, mean: f64) {
        self.mean_consumption = mean;
        self.total_consumption = mean * self.stay_days as f64;
    }

    /// Multiply mean and total consumption by a calibration factor.
    pub fn scale_consumption(&mut self, factor: f64) {
        self.set_mean_consumption(self.mean_consumption * factor);
    }
}

/// Consumption of one guest on one day of the stay, split by hour.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyRecord {
    pub guest_id: String,
    pub room_id: String,
    pub profile_id: String,
    /// Calendar day of the month.
    pub day: u32,
    pub month: u32,
    pub year: i32,
    pub hotel: String,
    pub hours: [f64; HOURS_PER_DAY],
}

impl HourlyRecord {
    /// Sum of the 24 hourly values.
    pub fn total(&self) -> f64 {
        self.hours.iter().sum()
    }
}

/// Feature key shared with the one-hot encoded model features.
pub fn feature_key(variable: &str, value: &str) -> String {
    format!("{}_{}", variable, value)
}

/// Lowercase alphanumeric slug of a hotel name, used in identifiers.
pub fn hotel_code(hotel: &str) -> String {
    let mut code = String::with_capacity(hotel.len());
    let mut last_dash = true;

    for c in hotel.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            code.push(c);
            last_dash = false;
        } else if !last_dash {
            code.push('-');
            last_dash = true;
        }
    }

    while code.ends_with('-') {
        code.pop();
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_fields_use_default_headers() {
        let row = AggregateRow::new("Costa Adeje Gran Hotel", 2023, 1, "invierno", 100, 12.5)
            .with_field("Zona", "sur");

        assert_eq!(row.field("Estación"), Some("invierno"));
        assert_eq!(row.field("Mes"), Some("1"));
        assert_eq!(row.field("Zona"), Some("sur"));
        assert_eq!(row.field("nacionalidad"), None);
    }

    #[test]
    fn test_ground_truth_is_recorded() {
        let row = AggregateRow::new("H", 2023, 2, "invierno", 10, 1.0).with_ground_truth(500.0);
        assert_eq!(row.ground_truth_total, Some(500.0));
        assert_eq!(row.field("Consumo total real"), Some("500"));
    }

    #[test]
    fn test_scaling_keeps_total_invariant() {
        let mut guest = Guest {
            guest_id: "h/2023/01/000001".to_string(),
            room_id: "h/R0000/000001".to_string(),
            row_index: 0,
            hotel: "H".to_string(),
            year: 2023,
            month: 1,
            season: "invierno".to_string(),
            stay_days: 3,
            start_day: 4,
            attributes: BTreeMap::new(),
            mean_consumption: 0.0,
            total_consumption: 0.0,
            profile_id: None,
        };

        guest.set_mean_consumption(10.0);
        assert_eq!(guest.total_consumption, 30.0);

        guest.scale_consumption(1.1);
        assert_eq!(guest.total_consumption, guest.mean_consumption * 3.0);
    }

    #[test]
    fn test_feature_key() {
        assert_eq!(feature_key("sexo", "Hombre"), "sexo_Hombre");
        assert_eq!(feature_key("edad", "De 16 a 24 años"), "edad_De 16 a 24 años");
    }

    #[test]
    fn test_hotel_code() {
        assert_eq!(hotel_code("Costa Adeje Gran Hotel"), "costa-adeje-gran-hotel");
        assert_eq!(hotel_code("  Hotel  Ñandú! "), "hotel-ñandú");
        assert_eq!(hotel_code("H"), "h");
    }
}
