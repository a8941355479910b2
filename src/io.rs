//! CSV and JSON readers and writers for the input and output tables.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::config::ColumnNames;
use crate::dataset::{AggregateRow, Guest, HOURS_PER_DAY, HourlyRecord};
use crate::distribution::{DistributionModel, OCCUPANCY_VARIABLE};
use crate::error::DataError;
use crate::importance::{FEATURE_COLUMN, ImportanceTable};

/// Guest dataset columns before the sampled variables.
pub const GUEST_ID_COLUMNS: [&str; 8] = [
    "id_huesped",
    "id_habitacion",
    "Hotel",
    "Año",
    "Mes",
    "Estación",
    "Dias de estancia",
    "Dia inicio",
];

/// Guest dataset columns after the sampled variables.
pub const GUEST_CONSUMPTION_COLUMNS: [&str; 2] = ["Consumo medio", "Consumo total"];

/// Hourly dataset columns before `h0..h23`.
pub const HOURLY_ID_COLUMNS: [&str; 7] =
    ["id_huesped", "id_habitacion", "profile_id", "dia", "mes", "año", "Hotel"];

fn open(path: &Path) -> Result<File, DataError> {
    File::open(path).map_err(|source| DataError::File {
        path: path.to_path_buf(),
        source,
    })
}

fn create(path: &Path) -> Result<File, DataError> {
    File::create(path).map_err(|source| DataError::File {
        path: path.to_path_buf(),
        source,
    })
}

/// Read the aggregate dataset, optionally keeping one hotel only.
pub fn read_aggregate(
    path: &Path,
    columns: &ColumnNames,
    hotel: Option<&str>,
) -> Result<Vec<AggregateRow>, DataError> {
    let rows = read_aggregate_from(open(path)?, &path.display().to_string(), columns, hotel)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "Loaded aggregate dataset");
    Ok(rows)
}

pub fn read_aggregate_from<R: Read>(
    reader: R,
    source_name: &str,
    columns: &ColumnNames,
    hotel: Option<&str>,
) -> Result<Vec<AggregateRow>, DataError> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers: Vec<String> = csv.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let index = |column: &str| {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| DataError::MissingColumn {
                column: column.to_string(),
                source_name: source_name.to_string(),
            })
    };
    let hotel_idx = index(&columns.hotel)?;
    let pax_idx = index(&columns.pax)?;
    let month_idx = index(&columns.month)?;
    let year_idx = index(&columns.year)?;
    let season_idx = index(&columns.season)?;
    let cpp_idx = index(&columns.consumption_per_pax)?;
    let truth_idx = index(&columns.ground_truth_total).ok();

    let mut rows = Vec::new();
    for (line, record) in csv.records().enumerate() {
        let record = record?;
        let cell = |i: usize| record.get(i).unwrap_or("").trim();

        if hotel.is_some_and(|h| cell(hotel_idx) != h) {
            continue;
        }

        let fields: BTreeMap<String, String> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), cell(i).to_string()))
            .collect();

        let ground_truth_total = match truth_idx.map(cell) {
            None | Some("") => None,
            Some(raw) => Some(parse_number(raw, line, &columns.ground_truth_total)?),
        };

        rows.push(AggregateRow {
            hotel: cell(hotel_idx).to_string(),
            year: parse_integer(cell(year_idx), line, &columns.year)?,
            month: parse_integer(cell(month_idx), line, &columns.month)?,
            season: cell(season_idx).to_string(),
            pax: parse_integer(cell(pax_idx), line, &columns.pax)?,
            consumption_per_pax: parse_number(cell(cpp_idx), line, &columns.consumption_per_pax)?,
            ground_truth_total,
            fields,
        });
    }

    Ok(rows)
}

fn invalid(raw: &str, row: usize, column: &str) -> DataError {
    DataError::InvalidCell {
        row,
        column: column.to_string(),
        value: raw.to_string(),
    }
}

fn parse_number(raw: &str, row: usize, column: &str) -> Result<f64, DataError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(raw, row, column))
}

/// Integers may be written as whole floats (`"120.0"`).
fn parse_integer<T>(raw: &str, row: usize, column: &str) -> Result<T, DataError>
where
    T: std::str::FromStr + TryFrom<i64>,
{
    if let Ok(v) = raw.parse::<T>() {
        return Ok(v);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.fract() == 0.0)
        .and_then(|v| T::try_from(v as i64).ok())
        .ok_or_else(|| invalid(raw, row, column))
}

/// Variable columns of the guest dataset: occupancy, then the model's
/// variables in document order.
pub fn guest_variables(model: &DistributionModel) -> Vec<&str> {
    std::iter::once(OCCUPANCY_VARIABLE)
        .chain(model.entries().iter().map(|e| e.name.as_str()))
        .collect()
}

pub fn write_guests(path: &Path, guests: &[Guest], model: &DistributionModel) -> Result<(), DataError> {
    write_guests_to(create(path)?, guests, model)?;
    tracing::info!(path = %path.display(), guests = guests.len(), "Wrote guest dataset");
    Ok(())
}

pub fn write_guests_to<W: Write>(writer: W, guests: &[Guest], model: &DistributionModel) -> Result<(), DataError> {
    let variables = guest_variables(model);
    let mut csv = csv::Writer::from_writer(writer);

    csv.write_record(
        GUEST_ID_COLUMNS
            .iter()
            .chain(&variables)
            .chain(GUEST_CONSUMPTION_COLUMNS.iter()),
    )?;

    for g in guests {
        let mut record = vec![
            g.guest_id.clone(),
            g.room_id.clone(),
            g.hotel.clone(),
            g.year.to_string(),
            g.month.to_string(),
            g.season.clone(),
            g.stay_days.to_string(),
            g.start_day.to_string(),
        ];
        record.extend(variables.iter().map(|v| g.attribute(v).unwrap_or("").to_string()));
        record.push(g.mean_consumption.to_string());
        record.push(g.total_consumption.to_string());
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

pub fn read_guests(path: &Path) -> Result<Vec<Guest>, DataError> {
    let guests = read_guests_from(open(path)?, &path.display().to_string())?;
    tracing::info!(path = %path.display(), guests = guests.len(), "Loaded guest dataset");
    Ok(guests)
}

/// Read a guest dataset written by [`write_guests_to`]. Every column between
/// the id columns and the consumption columns is a sampled variable.
pub fn read_guests_from<R: Read>(reader: R, source_name: &str) -> Result<Vec<Guest>, DataError> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers: Vec<String> = csv.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let index = |column: &str| {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| DataError::MissingColumn {
                column: column.to_string(),
                source_name: source_name.to_string(),
            })
    };
    let id_idx: Vec<usize> = GUEST_ID_COLUMNS.iter().map(|&c| index(c)).collect::<Result<_, _>>()?;
    let mean_idx = index(GUEST_CONSUMPTION_COLUMNS[0])?;
    let total_idx = index(GUEST_CONSUMPTION_COLUMNS[1])?;
    let variables: Vec<(usize, &String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !id_idx.contains(i) && *i != mean_idx && *i != total_idx)
        .collect();

    let mut guests = Vec::new();
    for (line, record) in csv.records().enumerate() {
        let record = record?;
        let cell = |i: usize| record.get(i).unwrap_or("").trim();
        let column = |k: usize| (cell(id_idx[k]), GUEST_ID_COLUMNS[k]);

        let integer = |k: usize| {
            let (raw, name) = column(k);
            parse_integer::<u32>(raw, line, name)
        };
        let (year_raw, year_name) = column(3);

        guests.push(Guest {
            guest_id: cell(id_idx[0]).to_string(),
            room_id: cell(id_idx[1]).to_string(),
            row_index: line,
            hotel: cell(id_idx[2]).to_string(),
            year: parse_integer(year_raw, line, year_name)?,
            month: integer(4)?,
            season: cell(id_idx[5]).to_string(),
            stay_days: integer(6)?,
            start_day: integer(7)?,
            attributes: variables
                .iter()
                .filter(|(i, _)| !cell(*i).is_empty())
                .map(|(i, name)| ((*name).clone(), cell(*i).to_string()))
                .collect(),
            mean_consumption: parse_number(cell(mean_idx), line, GUEST_CONSUMPTION_COLUMNS[0])?,
            total_consumption: parse_number(cell(total_idx), line, GUEST_CONSUMPTION_COLUMNS[1])?,
            profile_id: None,
        });
    }

    Ok(guests)
}

pub fn write_hourly(path: &Path, records: &[HourlyRecord]) -> Result<(), DataError> {
    write_hourly_to(create(path)?, records)?;
    tracing::info!(path = %path.display(), records = records.len(), "Wrote hourly dataset");
    Ok(())
}

pub fn write_hourly_to<W: Write>(writer: W, records: &[HourlyRecord]) -> Result<(), DataError> {
    let mut csv = csv::Writer::from_writer(writer);

    let mut header: Vec<String> = HOURLY_ID_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend((0..HOURS_PER_DAY).map(|h| format!("h{}", h)));
    csv.write_record(&header)?;

    for r in records {
        let mut record = vec![
            r.guest_id.clone(),
            r.room_id.clone(),
            r.profile_id.clone(),
            r.day.to_string(),
            r.month.to_string(),
            r.year.to_string(),
            r.hotel.clone(),
        ];
        record.extend(r.hours.iter().map(f64::to_string));
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

pub fn write_importance(path: &Path, table: &ImportanceTable) -> Result<(), DataError> {
    write_importance_to(create(path)?, table)
}

pub fn write_importance_to<W: Write>(writer: W, table: &ImportanceTable) -> Result<(), DataError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(std::iter::once(FEATURE_COLUMN).chain(table.columns().iter().map(String::as_str)))?;
    for row in table.rows() {
        csv.write_record(
            std::iter::once(row.feature.clone()).chain(row.values.iter().map(f64::to_string)),
        )?;
    }
    csv.flush()?;
    Ok(())
}

pub fn read_importance(path: &Path) -> Result<ImportanceTable, DataError> {
    read_importance_from(open(path)?, &path.display().to_string())
}

/// First column must be `Feature`; every other column is numeric.
pub fn read_importance_from<R: Read>(reader: R, source_name: &str) -> Result<ImportanceTable, DataError> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers: Vec<String> = csv.headers()?.iter().map(|h| h.trim().to_string()).collect();

    if headers.first().map(String::as_str) != Some(FEATURE_COLUMN) {
        return Err(DataError::MissingColumn {
            column: FEATURE_COLUMN.to_string(),
            source_name: source_name.to_string(),
        });
    }

    let mut table = ImportanceTable::new(headers[1..].iter().cloned());
    for (line, record) in csv.records().enumerate() {
        let record = record?;
        let mut values = Vec::with_capacity(headers.len() - 1);
        for (i, column) in headers.iter().enumerate().skip(1) {
            let raw = record.get(i).unwrap_or("").trim();
            values.push(parse_number(raw, line, column)?);
        }
        table.push(record.get(0).unwrap_or("").trim(), values)?;
    }
    Ok(table)
}

pub fn read_json(path: &Path) -> Result<Value, DataError> {
    Ok(serde_json::from_reader(std::io::BufReader::new(open(path)?))?)
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), DataError> {
    let mut file = create(path)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    const AGGREGATE: &str = "\
Hotel,Pax,Mes,Año,Estación,Consumo de eletricidad por Pax,Consumo total real,Zona
Hotel Sol,120,1,2023,invierno,12.5,1500,sur
Hotel Luna,80.0,2,2023,invierno,10,,norte
Hotel Sol,95,7,2023,verano,14,,sur
";

    #[test]
    fn test_read_aggregate() {
        let rows = read_aggregate_from(AGGREGATE.as_bytes(), "test", &ColumnNames::default(), None).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].hotel, "Hotel Sol");
        assert_eq!(rows[0].pax, 120);
        assert_eq!(rows[0].ground_truth_total, Some(1500.0));
        assert_eq!(rows[0].field("Zona"), Some("sur"));
        assert_eq!(rows[1].pax, 80);
        assert_eq!(rows[1].ground_truth_total, None);
        assert_eq!(rows[2].month, 7);
    }

    #[test]
    fn test_read_aggregate_hotel_filter() {
        let rows =
            read_aggregate_from(AGGREGATE.as_bytes(), "test", &ColumnNames::default(), Some("Hotel Sol")).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.hotel == "Hotel Sol"));
    }

    #[test]
    fn test_read_aggregate_errors() {
        let missing = "Hotel,Pax,Mes,Año\nH,1,1,2023\n";
        assert!(matches!(
            read_aggregate_from(missing.as_bytes(), "test", &ColumnNames::default(), None),
            Err(DataError::MissingColumn { .. })
        ));

        let bad = "Hotel,Pax,Mes,Año,Estación,Consumo de eletricidad por Pax\nH,muchos,1,2023,invierno,1\n";
        assert!(matches!(
            read_aggregate_from(bad.as_bytes(), "test", &ColumnNames::default(), None),
            Err(DataError::InvalidCell { row: 0, .. })
        ));
    }

    #[test]
    fn test_guest_csv_columns() {
        let model = DistributionModel::from_json(&json!({
            "sexo": {"probabilidades": {"Hombre": 1.0}},
            "viaje": {"probabilidades": {"Placer": 1.0}, "compartido_por_habitacion": true}
        }))
        .unwrap();
        let mut attributes = BTreeMap::new();
        attributes.insert(OCCUPANCY_VARIABLE.to_string(), "1".to_string());
        attributes.insert("sexo".to_string(), "Hombre".to_string());
        attributes.insert("viaje".to_string(), "Placer".to_string());
        let guest = Guest {
            guest_id: "h/2023/01/000001".to_string(),
            room_id: "h/R0000/000001".to_string(),
            row_index: 0,
            hotel: "H".to_string(),
            year: 2023,
            month: 1,
            season: "invierno".to_string(),
            stay_days: 2,
            start_day: 3,
            attributes,
            mean_consumption: 10.5,
            total_consumption: 21.0,
            profile_id: None,
        };

        let mut out = Vec::new();
        write_guests_to(&mut out, &[guest], &model).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "id_huesped,id_habitacion,Hotel,Año,Mes,Estación,Dias de estancia,Dia inicio,\
             ocupacion_habitacion,sexo,viaje,Consumo medio,Consumo total"
        );
        assert_eq!(
            lines[1],
            "h/2023/01/000001,h/R0000/000001,H,2023,1,invierno,2,3,1,Hombre,Placer,10.5,21"
        );
    }

    #[test]
    fn test_read_guests() {
        let text = "\
id_huesped,id_habitacion,Hotel,Año,Mes,Estación,Dias de estancia,Dia inicio,ocupacion_habitacion,sexo,Consumo medio,Consumo total
h/2023/01/000001,h/R0000/000001,H,2023,1,invierno,2,3,1,Hombre,10.5,21
h/2023/01/000002,h/R0000/000002,H,2023,1,invierno,1,9,1,,8,8
";
        let guests = read_guests_from(text.as_bytes(), "test").unwrap();

        assert_eq!(guests.len(), 2);
        assert_eq!(guests[0].stay_days, 2);
        assert_eq!(guests[0].attribute("sexo"), Some("Hombre"));
        assert_eq!(guests[0].attribute(OCCUPANCY_VARIABLE), Some("1"));
        assert_eq!(guests[1].attribute("sexo"), None);
        assert_eq!(guests[1].total_consumption, 8.0);

        let missing = "id_huesped,Hotel\nx,H\n";
        assert!(matches!(
            read_guests_from(missing.as_bytes(), "test"),
            Err(DataError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_hourly_csv_header() {
        let record = HourlyRecord {
            guest_id: "g".to_string(),
            room_id: "r".to_string(),
            profile_id: "plano".to_string(),
            day: 4,
            month: 1,
            year: 2023,
            hotel: "H".to_string(),
            hours: [0.5; HOURS_PER_DAY],
        };
        let mut out = Vec::new();
        write_hourly_to(&mut out, &[record]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let header: Vec<&str> = text.lines().next().unwrap().split(',').collect();

        assert_eq!(header.len(), 7 + 24);
        assert_eq!(header[2], "profile_id");
        assert_eq!(header[7], "h0");
        assert_eq!(header[30], "h23");
    }

    #[test]
    fn test_importance_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("importance.csv");

        let mut table = ImportanceTable::new(["RandomForest", "Theoretical_Importance"]);
        table.push("sexo_Hombre", vec![0.25, 0.1]).unwrap();
        table.push("edad_De 16 a 24 años", vec![0.75, 0.9]).unwrap();

        write_importance(&path, &table).unwrap();
        assert_eq!(read_importance(&path).unwrap(), table);

        let bad = "Variable,Score\nx,1\n";
        assert!(matches!(
            read_importance_from(bad.as_bytes(), "test"),
            Err(DataError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        let doc = json!({"sexo": {"Hombre": 0.1}});

        write_json(&path, &doc).unwrap();
        assert_eq!(read_json(&path).unwrap(), doc);

        assert!(matches!(
            read_json(&dir.path().join("missing.json")),
            Err(DataError::File { .. })
        ));
    }
}
