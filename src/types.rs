use geo::MultiPolygon;

/// One row of the indicator table. Uniqueness is (district, year, indicator).
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    pub district: String,
    pub year: i32,
    pub indicator: String,
    pub value: f64,
}

/// A district boundary from the GeoJSON file. Immutable after load.
#[derive(Debug, Clone)]
pub struct District {
    pub id: String,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// Everything the dashboard needs, loaded once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct DashboardData {
    pub records: Vec<IndicatorRecord>,
    pub districts: Vec<District>,
    pub indicators: Vec<String>,
    pub district_names: Vec<String>,
    pub years: Option<(i32, i32)>,
}

/// A user selection: which indicator to show, optionally narrowed to one
/// district and/or an inclusive year range.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub indicator: String,
    pub district: Option<String>,
    pub years: Option<(i32, i32)>,
}
