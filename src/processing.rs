//! Pure filtering and aggregation over the loaded indicator table. Every
//! function here is side-effect free and returns data in a stable order so
//! repeated renders of the same selection are identical.

use crate::data::normalize_district;
use crate::types::{IndicatorRecord, Selection};
use std::collections::{BTreeMap, HashMap};

/// Slice the table down to the rows matching a selection. An indicator that
/// does not occur in the data yields an empty result, not an error.
pub fn filter_records<'a>(
    records: &'a [IndicatorRecord],
    selection: &Selection,
) -> Vec<&'a IndicatorRecord> {
    let wanted_district = selection.district.as_deref().map(normalize_district);

    records
        .iter()
        .filter(|r| r.indicator == selection.indicator)
        .filter(|r| match &wanted_district {
            Some(d) => normalize_district(&r.district) == *d,
            None => true,
        })
        .filter(|r| match selection.years {
            Some((from, to)) => r.year >= from && r.year <= to,
            None => true,
        })
        .collect()
}

/// Sorted, deduplicated indicator names present in the table.
pub fn indicator_names(records: &[IndicatorRecord]) -> Vec<String> {
    let mut names: Vec<String> = records.iter().map(|r| r.indicator.clone()).collect();
    names.sort();
    names.dedup();
    names
}

/// Sorted, deduplicated district names present in the table.
pub fn district_names(records: &[IndicatorRecord]) -> Vec<String> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for r in records {
        seen.entry(normalize_district(&r.district))
            .or_insert_with(|| r.district.clone());
    }
    seen.into_values().collect()
}

/// Inclusive (min, max) year span of the table, if any rows exist.
pub fn year_bounds(records: &[IndicatorRecord]) -> Option<(i32, i32)> {
    let min = records.iter().map(|r| r.year).min()?;
    let max = records.iter().map(|r| r.year).max()?;
    Some((min, max))
}

/// The year a multi-district bar chart and the map refer to: the latest year
/// present in the filtered subset.
pub fn reference_year(rows: &[&IndicatorRecord]) -> Option<i32> {
    rows.iter().map(|r| r.year).max()
}

/// Bar chart data. With several districts in the subset the bars are one per
/// district at the reference year; with a single district they are one per
/// year instead.
pub fn bar_series(rows: &[&IndicatorRecord]) -> Vec<(String, f64)> {
    let mut districts: Vec<String> = rows
        .iter()
        .map(|r| normalize_district(&r.district))
        .collect();
    districts.sort();
    districts.dedup();

    let mut bars: Vec<(String, f64)> = if districts.len() > 1 {
        let Some(year) = reference_year(rows) else {
            return Vec::new();
        };
        rows.iter()
            .filter(|r| r.year == year)
            .map(|r| (r.district.clone(), r.value))
            .collect()
    } else {
        rows.iter()
            .map(|r| (r.year.to_string(), r.value))
            .collect()
    };

    bars.sort_by(|a, b| a.0.cmp(&b.0));
    bars
}

/// Line chart data: one (district, points-by-year) series per district.
pub fn line_series(rows: &[&IndicatorRecord]) -> Vec<(String, Vec<(i32, f64)>)> {
    let mut by_district: BTreeMap<String, Vec<(i32, f64)>> = BTreeMap::new();
    for r in rows {
        by_district
            .entry(r.district.clone())
            .or_default()
            .push((r.year, r.value));
    }
    by_district
        .into_iter()
        .map(|(district, mut points)| {
            points.sort_by_key(|(year, _)| *year);
            (district, points)
        })
        .collect()
}

/// Map shading input: normalized district name -> the district's value at
/// its own latest year within the subset.
pub fn choropleth_values(rows: &[&IndicatorRecord]) -> HashMap<String, f64> {
    let mut latest: HashMap<String, (i32, f64)> = HashMap::new();
    for r in rows {
        let key = normalize_district(&r.district);
        match latest.get(&key) {
            Some((year, _)) if *year >= r.year => {}
            _ => {
                latest.insert(key, (r.year, r.value));
            }
        }
    }
    latest
        .into_iter()
        .map(|(district, (_, value))| (district, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(district: &str, year: i32, indicator: &str, value: f64) -> IndicatorRecord {
        IndicatorRecord {
            district: district.to_string(),
            year,
            indicator: indicator.to_string(),
            value,
        }
    }

    fn sample() -> Vec<IndicatorRecord> {
        vec![
            record("Thimphu", 2019, "cases_total", 14.0),
            record("Thimphu", 2020, "cases_total", 10.0),
            record("Paro", 2020, "cases_total", 5.0),
            record("Paro", 2020, "cases_imported", 2.0),
            record("Sarpang", 2019, "cases_total", 30.0),
        ]
    }

    #[test]
    fn filter_keeps_only_the_selected_indicator() {
        let records = sample();
        let rows = filter_records(
            &records,
            &Selection {
                indicator: "cases_total".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.indicator == "cases_total"));
    }

    #[test]
    fn filter_by_absent_indicator_is_empty_not_an_error() {
        let records = sample();
        let rows = filter_records(
            &records,
            &Selection {
                indicator: "incidence_rate".to_string(),
                ..Default::default()
            },
        );
        assert!(rows.is_empty());
    }

    #[test]
    fn filter_narrows_by_district_and_year_range() {
        let records = sample();
        let rows = filter_records(
            &records,
            &Selection {
                indicator: "cases_total".to_string(),
                district: Some("thimphu".to_string()),
                years: Some((2020, 2020)),
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 10.0);
    }

    #[test]
    fn multi_district_bars_use_the_latest_year() {
        let records = sample();
        let rows = filter_records(
            &records,
            &Selection {
                indicator: "cases_total".to_string(),
                ..Default::default()
            },
        );
        // Latest year in the subset is 2020; Sarpang only has 2019 data.
        let bars = bar_series(&rows);
        assert_eq!(
            bars,
            vec![("Paro".to_string(), 5.0), ("Thimphu".to_string(), 10.0)]
        );
    }

    #[test]
    fn single_district_bars_are_per_year() {
        let records = sample();
        let rows = filter_records(
            &records,
            &Selection {
                indicator: "cases_total".to_string(),
                district: Some("Thimphu".to_string()),
                years: None,
            },
        );
        let bars = bar_series(&rows);
        assert_eq!(
            bars,
            vec![("2019".to_string(), 14.0), ("2020".to_string(), 10.0)]
        );
    }

    #[test]
    fn line_series_is_sorted_by_district_and_year() {
        let records = sample();
        let rows = filter_records(
            &records,
            &Selection {
                indicator: "cases_total".to_string(),
                ..Default::default()
            },
        );
        let series = line_series(&rows);
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].0, "Paro");
        assert_eq!(series[2].0, "Thimphu");
        assert_eq!(series[2].1, vec![(2019, 14.0), (2020, 10.0)]);
    }

    #[test]
    fn choropleth_takes_each_districts_latest_value() {
        let records = sample();
        let rows = filter_records(
            &records,
            &Selection {
                indicator: "cases_total".to_string(),
                ..Default::default()
            },
        );
        let values = choropleth_values(&rows);
        assert_eq!(values.get("thimphu"), Some(&10.0));
        assert_eq!(values.get("sarpang"), Some(&30.0));
    }

    #[test]
    fn empty_subset_yields_empty_series() {
        let rows: Vec<&IndicatorRecord> = Vec::new();
        assert!(bar_series(&rows).is_empty());
        assert!(line_series(&rows).is_empty());
        assert!(choropleth_values(&rows).is_empty());
        assert_eq!(reference_year(&rows), None);
    }

    #[test]
    fn listings_are_sorted_and_deduplicated() {
        let records = sample();
        assert_eq!(indicator_names(&records), vec!["cases_imported", "cases_total"]);
        assert_eq!(district_names(&records), vec!["Paro", "Sarpang", "Thimphu"]);
        assert_eq!(year_bounds(&records), Some((2019, 2020)));
    }
}
