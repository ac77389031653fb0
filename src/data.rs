use crate::config::AppConfig;
use crate::error::LoadError;
use crate::processing;
use crate::types::{DashboardData, District, IndicatorRecord};
use geo::MultiPolygon;
use geojson::GeoJson;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// Normalized form used to match district names between the CSV and the
/// boundary file: trimmed, lowercased, inner whitespace collapsed.
pub fn normalize_district(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn load_data(config: &AppConfig) -> Result<DashboardData, LoadError> {
    info!("Loading data...");

    let records = load_indicators(&config.input.indicators_csv)?;
    info!("Loaded {} indicator records", records.len());

    let districts = load_districts(&config.input.districts_json)?;
    info!("Loaded {} district boundaries", districts.len());

    let (csv_only, boundary_only) = mismatches(&records, &districts);
    for district in &csv_only {
        warn!("District '{}' has indicator rows but no boundary; it will not appear on the map", district);
    }
    for district in &boundary_only {
        info!("District '{}' has a boundary but no indicator rows", district);
    }

    let indicators = processing::indicator_names(&records);
    let district_names = processing::district_names(&records);
    let years = processing::year_bounds(&records);

    Ok(DashboardData {
        records,
        districts,
        indicators,
        district_names,
        years,
    })
}

/// Read the indicator CSV into records. Columns are located by header name.
/// Rows with a blank or non-numeric value are skipped with a warning rather
/// than treated as zero; duplicate (district, year, indicator) keys keep the
/// last row seen.
pub fn load_indicators(path: &Path) -> Result<Vec<IndicatorRecord>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_owned(),
        source,
    })?;
    let mut rdr = csv::ReaderBuilder::new().from_reader(BufReader::new(file));

    let headers = rdr
        .headers()
        .map_err(|source| LoadError::Csv {
            path: path.to_owned(),
            source,
        })?
        .clone();

    let col = |name: &str| -> Result<usize, LoadError> {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| LoadError::MissingColumn(name.to_string()))
    };

    let district_idx = col("district")?;
    let year_idx = col("year")?;
    let indicator_idx = col("indicator")?;
    let value_idx = col("value")?;

    // BTreeMap keyed by (district, indicator, year) gives a deterministic
    // iteration order for rendering and collapses duplicate keys.
    let mut by_key: BTreeMap<(String, String, i32), IndicatorRecord> = BTreeMap::new();

    for (row, result) in rdr.records().enumerate() {
        let record = result.map_err(|source| LoadError::Csv {
            path: path.to_owned(),
            source,
        })?;

        let district = record.get(district_idx).unwrap_or("").trim().to_string();
        if district.is_empty() {
            warn!("Row {}: empty district, skipped", row + 2);
            continue;
        }

        let year: i32 = match record.get(year_idx).unwrap_or("").trim().parse() {
            Ok(y) => y,
            Err(_) => {
                warn!("Row {}: unparseable year '{}', skipped", row + 2, record.get(year_idx).unwrap_or(""));
                continue;
            }
        };

        let indicator = record.get(indicator_idx).unwrap_or("").trim().to_string();
        if indicator.is_empty() {
            warn!("Row {}: empty indicator, skipped", row + 2);
            continue;
        }

        let raw_value = record.get(value_idx).unwrap_or("").trim();
        let value: f64 = match raw_value.parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("Row {}: missing or non-numeric value '{}', skipped", row + 2, raw_value);
                continue;
            }
        };

        let key = (normalize_district(&district), indicator.clone(), year);
        if by_key.contains_key(&key) {
            warn!("Duplicate row for ({}, {}, {}), keeping the later one", district, indicator, year);
        }
        by_key.insert(
            key,
            IndicatorRecord {
                district,
                year,
                indicator,
                value,
            },
        );
    }

    Ok(by_key.into_values().collect())
}

/// Read the district boundary GeoJSON. Each feature needs a `district_id`
/// (or `name`) property and a Polygon/MultiPolygon geometry; anything else
/// is skipped.
pub fn load_districts(path: &Path) -> Result<Vec<District>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_owned(),
        source,
    })?;
    let reader = BufReader::new(file);

    let geojson = GeoJson::from_reader(reader).map_err(|source| LoadError::Json {
        path: path.to_owned(),
        source: geojson::Error::MalformedJson(source),
    })?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(LoadError::NotACollection),
    };

    let mut districts = Vec::new();

    for feature in collection.features {
        let prop = |key: &str| -> Option<String> {
            match feature.properties.as_ref().and_then(|p| p.get(key)) {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                _ => None,
            }
        };

        let id = match prop("district_id").or_else(|| prop("name")) {
            Some(id) => id,
            None => {
                warn!("Boundary feature without district_id or name property, skipped");
                continue;
            }
        };
        let name = prop("name").unwrap_or_else(|| id.clone());

        let geometry = match &feature.geometry {
            Some(geom) => {
                let converted: geo::Geometry<f64> = geom
                    .value
                    .clone()
                    .try_into()
                    .map_err(|_| LoadError::BadGeometry(id.clone()))?;
                match converted {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // Skip points/lines
                }
            }
            None => continue,
        };

        districts.push(District { id, name, geometry });
    }

    districts.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(districts)
}

/// Districts appearing on only one side of the join. Data-quality report
/// material, never an error.
pub fn mismatches(records: &[IndicatorRecord], districts: &[District]) -> (Vec<String>, Vec<String>) {
    let boundary_keys: HashSet<String> = districts
        .iter()
        .flat_map(|d| [normalize_district(&d.id), normalize_district(&d.name)])
        .collect();

    let mut csv_only = Vec::new();
    let mut seen = HashSet::new();
    for record in records {
        let key = normalize_district(&record.district);
        if !boundary_keys.contains(&key) && seen.insert(key) {
            csv_only.push(record.district.clone());
        }
    }
    csv_only.sort();

    let record_keys: HashSet<String> = records
        .iter()
        .map(|r| normalize_district(&r.district))
        .collect();

    let mut boundary_only: Vec<String> = districts
        .iter()
        .filter(|d| {
            !record_keys.contains(&normalize_district(&d.id))
                && !record_keys.contains(&normalize_district(&d.name))
        })
        .map(|d| d.name.clone())
        .collect();
    boundary_only.sort();

    (csv_only, boundary_only)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    const GOOD_CSV: &str = "district,year,indicator,value\n\
        Thimphu,2020,cases_total,10\n\
        Paro,2020,cases_total,5\n\
        Thimphu,2021,cases_total,7\n";

    #[test]
    fn well_formed_csv_yields_one_record_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "indicators.csv", GOOD_CSV);
        let records = load_indicators(&path).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn blank_and_non_numeric_values_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "indicators.csv",
            "district,year,indicator,value\n\
             Thimphu,2020,cases_total,10\n\
             Paro,2020,cases_total,\n\
             Haa,2020,cases_total,n/a\n",
        );
        let records = load_indicators(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].district, "Thimphu");
    }

    #[test]
    fn duplicate_keys_keep_the_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "indicators.csv",
            "district,year,indicator,value\n\
             Thimphu,2020,cases_total,10\n\
             Thimphu,2020,cases_total,12\n",
        );
        let records = load_indicators(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 12.0);
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "indicators.csv", "district,year,value\nThimphu,2020,3\n");
        match load_indicators(&path) {
            Err(LoadError::MissingColumn(name)) => assert_eq!(name, "indicator"),
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.csv");
        assert!(matches!(load_indicators(&path), Err(LoadError::Io { .. })));
    }

    #[test]
    fn loading_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "indicators.csv", GOOD_CSV);
        let first = load_indicators(&path).unwrap();
        let second = load_indicators(&path).unwrap();
        assert_eq!(first, second);
    }

    const DISTRICTS_JSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"district_id": "Thimphu", "name": "Thimphu"},
                "geometry": {"type": "Polygon", "coordinates": [[[89.0, 27.0], [90.0, 27.0], [90.0, 28.0], [89.0, 28.0], [89.0, 27.0]]]}
            },
            {
                "type": "Feature",
                "properties": {"district_id": "Paro", "name": "Paro"},
                "geometry": {"type": "Polygon", "coordinates": [[[88.0, 27.0], [89.0, 27.0], [89.0, 28.0], [88.0, 28.0], [88.0, 27.0]]]}
            }
        ]
    }"#;

    #[test]
    fn boundary_file_loads_polygons() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "districts.json", DISTRICTS_JSON);
        let districts = load_districts(&path).unwrap();
        assert_eq!(districts.len(), 2);
        assert_eq!(districts[0].name, "Paro");
        assert_eq!(districts[1].name, "Thimphu");
    }

    #[test]
    fn non_collection_geojson_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "districts.json",
            r#"{"type": "Point", "coordinates": [89.0, 27.0]}"#,
        );
        assert!(matches!(load_districts(&path), Err(LoadError::NotACollection)));
    }

    #[test]
    fn mismatches_report_both_directions() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_file(
            &dir,
            "indicators.csv",
            "district,year,indicator,value\n\
             Thimphu,2020,cases_total,10\n\
             Gelephu,2020,cases_total,4\n",
        );
        let json = write_file(&dir, "districts.json", DISTRICTS_JSON);
        let records = load_indicators(&csv).unwrap();
        let districts = load_districts(&json).unwrap();
        let (csv_only, boundary_only) = mismatches(&records, &districts);
        assert_eq!(csv_only, vec!["Gelephu".to_string()]);
        assert_eq!(boundary_only, vec!["Paro".to_string()]);
    }

    #[test]
    fn district_matching_ignores_case_and_whitespace() {
        assert_eq!(normalize_district("  Samdrup  Jongkhar "), "samdrup jongkhar");
        assert_eq!(normalize_district("THIMPHU"), "thimphu");
    }
}
