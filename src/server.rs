use crate::config::AppConfig;
use crate::data::normalize_district;
use crate::processing;
use crate::render::{self, ColorRamp};
use crate::types::{DashboardData, Selection};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::{Point, Rect};
use geojson::FeatureCollection;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

// Wrapper for RTree indexing
struct DistrictIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for DistrictIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub struct AppState {
    pub data: DashboardData,
    pub tree: RTree<DistrictIndex>,
    pub ramp: ColorRamp,
    pub config: AppConfig,
}

pub async fn start_server(config: AppConfig, data: DashboardData) -> Result<()> {
    // Spatial index over district bounding boxes for the hover lookup.
    let tree_items: Vec<DistrictIndex> = data
        .districts
        .iter()
        .enumerate()
        .map(|(i, district)| {
            let rect = district.geometry.bounding_rect().unwrap_or(Rect::new(
                geo::Coord { x: 0.0, y: 0.0 },
                geo::Coord { x: 0.0, y: 0.0 },
            ));
            DistrictIndex {
                index: i,
                aabb: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            }
        })
        .collect();

    let tree = RTree::bulk_load(tree_items);

    let ramp = ColorRamp::from_config(&config.map);
    let port = config.server.port;
    let state = Arc::new(AppState {
        data,
        tree,
        ramp,
        config,
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting dashboard on http://{}", addr);

    let app = Router::new()
        .route("/api/options", get(options_handler))
        .route("/api/charts", get(charts_handler))
        .route("/api/map", get(map_handler))
        .route("/api/query", get(query_handler))
        .fallback_service(ServeDir::new("assets"))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct OptionsResponse {
    indicators: Vec<String>,
    districts: Vec<String>,
    years: Option<(i32, i32)>,
    default_indicator: Option<String>,
}

async fn options_handler(State(state): State<Arc<AppState>>) -> Json<OptionsResponse> {
    let default_indicator = state
        .config
        .map
        .default_indicator
        .clone()
        .filter(|d| state.data.indicators.contains(d))
        .or_else(|| state.data.indicators.first().cloned());

    Json(OptionsResponse {
        indicators: state.data.indicators.clone(),
        districts: state.data.district_names.clone(),
        years: state.data.years,
        default_indicator,
    })
}

#[derive(Deserialize)]
struct ChartParams {
    indicator: String,
    district: Option<String>,
    from: Option<i32>,
    to: Option<i32>,
}

impl ChartParams {
    fn selection(&self) -> Selection {
        Selection {
            indicator: self.indicator.clone(),
            district: self.district.clone().filter(|d| !d.is_empty()),
            years: match (self.from, self.to) {
                (None, None) => None,
                (from, to) => Some((from.unwrap_or(i32::MIN), to.unwrap_or(i32::MAX))),
            },
        }
    }
}

#[derive(Serialize)]
struct ChartsResponse {
    bar: render::BarChart,
    line: render::LineChart,
}

async fn charts_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChartParams>,
) -> Json<ChartsResponse> {
    let selection = params.selection();
    let rows = processing::filter_records(&state.data.records, &selection);
    Json(ChartsResponse {
        bar: render::build_bar_chart(&rows),
        line: render::build_line_chart(&rows),
    })
}

#[derive(Deserialize)]
struct MapParams {
    indicator: String,
    year: Option<i32>,
}

async fn map_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MapParams>,
) -> Json<FeatureCollection> {
    let selection = Selection {
        indicator: params.indicator,
        district: None,
        years: params.year.map(|y| (y, y)),
    };
    let rows = processing::filter_records(&state.data.records, &selection);
    let values = processing::choropleth_values(&rows);
    Json(render::build_choropleth(
        &state.data.districts,
        &values,
        &state.ramp,
    ))
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
pub struct RecordOut {
    year: i32,
    indicator: String,
    value: f64,
}

#[derive(Serialize)]
pub struct QueryResponse {
    id: String,
    name: String,
    records: Vec<RecordOut>,
}

/// Which district contains a point, plus all of its indicator rows. Powers
/// the click-for-details panel on the map.
async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<QueryResponse>> {
    let point = Point::new(params.lon, params.lat);
    let envelope = AABB::from_point([params.lon, params.lat]);

    let candidates = state.tree.locate_in_envelope_intersecting(&envelope);

    for candidate in candidates {
        if let Some(district) = state.data.districts.get(candidate.index) {
            if district.geometry.contains(&point) {
                let key = normalize_district(&district.id);
                let name_key = normalize_district(&district.name);
                let records = state
                    .data
                    .records
                    .iter()
                    .filter(|r| {
                        let k = normalize_district(&r.district);
                        k == key || k == name_key
                    })
                    .map(|r| RecordOut {
                        year: r.year,
                        indicator: r.indicator.clone(),
                        value: r.value,
                    })
                    .collect();

                return Json(Some(QueryResponse {
                    id: district.id.clone(),
                    name: district.name.clone(),
                    records,
                }));
            }
        }
    }

    Json(None)
}
