use crate::config::MapConfig;
use crate::data::normalize_district;
use crate::processing;
use crate::types::{District, IndicatorRecord};
use anyhow::Result;
use geo::algorithm::bounding_rect::BoundingRect;
use geojson::{Feature, FeatureCollection, Geometry};
use plotters::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Bar chart payload. `year` is set when the bars are one-per-district at
/// the reference year; per-year bars for a single district leave it empty.
#[derive(Debug, Clone, Serialize)]
pub struct BarChart {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendSeries {
    pub name: String,
    pub points: Vec<(i32, f64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineChart {
    pub series: Vec<TrendSeries>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

pub fn hex_to_rgb(hex: &str) -> Rgb {
    let hex = hex.trim_start_matches('#');
    let byte = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .unwrap_or(0)
    };
    Rgb(byte(0..2), byte(2..4), byte(4..6))
}

/// Linear low -> high color ramp for the choropleth, with a neutral color
/// for districts that have no value in the current selection.
#[derive(Debug, Clone, Copy)]
pub struct ColorRamp {
    pub low: Rgb,
    pub high: Rgb,
    pub neutral: Rgb,
}

impl ColorRamp {
    pub fn from_config(map: &MapConfig) -> Self {
        ColorRamp {
            low: hex_to_rgb(&map.low_color),
            high: hex_to_rgb(&map.high_color),
            neutral: hex_to_rgb(&map.neutral_color),
        }
    }

    pub fn shade(&self, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb(
            lerp(self.low.0, self.high.0),
            lerp(self.low.1, self.high.1),
            lerp(self.low.2, self.high.2),
        )
    }

    /// Fill for one district given the value range of the whole selection.
    /// A constant range degenerates to the high color.
    pub fn fill_for(&self, value: Option<f64>, range: Option<(f64, f64)>) -> Rgb {
        match (value, range) {
            (Some(v), Some((min, max))) if max > min => self.shade((v - min) / (max - min)),
            (Some(_), Some(_)) => self.high,
            _ => self.neutral,
        }
    }
}

/// (min, max) of the shaded values, if any.
pub fn value_range(values: &HashMap<String, f64>) -> Option<(f64, f64)> {
    let mut iter = values.values();
    let first = *iter.next()?;
    let (min, max) = iter.fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    Some((min, max))
}

pub fn build_bar_chart(rows: &[&IndicatorRecord]) -> BarChart {
    let mut districts: Vec<String> = rows
        .iter()
        .map(|r| normalize_district(&r.district))
        .collect();
    districts.sort();
    districts.dedup();

    let bars = processing::bar_series(rows);
    let (labels, values) = bars.into_iter().unzip();
    BarChart {
        labels,
        values,
        year: if districts.len() > 1 {
            processing::reference_year(rows)
        } else {
            None
        },
    }
}

pub fn build_line_chart(rows: &[&IndicatorRecord]) -> LineChart {
    LineChart {
        series: processing::line_series(rows)
            .into_iter()
            .map(|(name, points)| TrendSeries { name, points })
            .collect(),
    }
}

/// The choropleth as a GeoJSON FeatureCollection. Each feature carries the
/// district name, its value (null when absent) and a `fill` hex color the
/// frontend applies directly. Districts absent from the selection keep the
/// neutral fill.
pub fn build_choropleth(
    districts: &[District],
    values: &HashMap<String, f64>,
    ramp: &ColorRamp,
) -> FeatureCollection {
    let range = value_range(values);

    let features = districts
        .iter()
        .map(|district| {
            let value = values
                .get(&normalize_district(&district.id))
                .or_else(|| values.get(&normalize_district(&district.name)))
                .copied();
            let fill = ramp.fill_for(value, range).hex();

            let mut properties = serde_json::Map::new();
            properties.insert("district_id".to_string(), district.id.clone().into());
            properties.insert("name".to_string(), district.name.clone().into());
            properties.insert(
                "value".to_string(),
                value.map_or(serde_json::Value::Null, |v| {
                    serde_json::json!(v)
                }),
            );
            properties.insert("fill".to_string(), fill.into());

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&district.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Write bar.png, trend.png and map.png for the current selection.
pub fn export_pngs(
    out_dir: &Path,
    indicator: &str,
    bar: &BarChart,
    line: &LineChart,
    districts: &[District],
    values: &HashMap<String, f64>,
    ramp: &ColorRamp,
) -> Result<()> {
    std::fs::create_dir_all(out_dir)?;

    let bar_path = out_dir.join("bar.png");
    render_bar_png(&bar_path, indicator, bar, ramp)?;
    info!("Wrote {:?}", bar_path);

    let trend_path = out_dir.join("trend.png");
    render_line_png(&trend_path, indicator, line)?;
    info!("Wrote {:?}", trend_path);

    let map_path = out_dir.join("map.png");
    render_map_png(&map_path, indicator, districts, values, ramp)?;
    info!("Wrote {:?}", map_path);

    Ok(())
}

fn draw_no_data(root: &DrawingArea<BitMapBackend, plotters::coord::Shift>) -> Result<()> {
    root.draw(&Text::new(
        "No data for this selection",
        (320, 290),
        ("sans-serif", 24).into_font().color(&RGBColor(120, 120, 120)),
    ))?;
    Ok(())
}

fn render_bar_png(path: &Path, indicator: &str, bar: &BarChart, ramp: &ColorRamp) -> Result<()> {
    let root = BitMapBackend::new(path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    if bar.values.is_empty() {
        draw_no_data(&root)?;
        root.present()?;
        return Ok(());
    }

    let y_max = bar
        .values
        .iter()
        .cloned()
        .fold(f64::MIN, f64::max)
        .max(1.0)
        * 1.1;

    let caption = match bar.year {
        Some(year) => format!("{} by district, {}", indicator, year),
        None => format!("{} by year", indicator),
    };

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 28))
        .margin(12)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d((0usize..bar.labels.len()).into_segmented(), 0f64..y_max)?;

    let labels = &bar.labels;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(labels.len())
        .x_label_formatter(&|seg: &SegmentValue<usize>| match seg {
            SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => {
                labels.get(*i).cloned().unwrap_or_default()
            }
            SegmentValue::Last => String::new(),
        })
        .y_desc(indicator)
        .draw()?;

    let fill = RGBColor(ramp.high.0, ramp.high.1, ramp.high.2);
    chart.draw_series(bar.values.iter().enumerate().map(|(i, v)| {
        Rectangle::new(
            [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *v)],
            fill.mix(0.85).filled(),
        )
    }))?;

    root.present()?;
    Ok(())
}

fn render_line_png(path: &Path, indicator: &str, line: &LineChart) -> Result<()> {
    let root = BitMapBackend::new(path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let points: Vec<(i32, f64)> = line
        .series
        .iter()
        .flat_map(|s| s.points.iter().copied())
        .collect();

    if points.is_empty() {
        draw_no_data(&root)?;
        root.present()?;
        return Ok(());
    }

    let x_min = points.iter().map(|(y, _)| *y).min().unwrap_or(0);
    let x_max = points.iter().map(|(y, _)| *y).max().unwrap_or(0);
    // A single year still needs a non-degenerate axis.
    let (x_min, x_max) = if x_min == x_max {
        (x_min - 1, x_max + 1)
    } else {
        (x_min, x_max)
    };
    let y_max = points
        .iter()
        .map(|(_, v)| *v)
        .fold(f64::MIN, f64::max)
        .max(1.0)
        * 1.1;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{} over time", indicator), ("sans-serif", 28))
        .margin(12)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, 0f64..y_max)?;

    chart
        .configure_mesh()
        .x_label_formatter(&|year| year.to_string())
        .y_desc(indicator)
        .draw()?;

    for (i, series) in line.series.iter().enumerate() {
        let color = Palette99::pick(i);
        chart
            .draw_series(LineSeries::new(
                series.points.iter().copied(),
                color.stroke_width(2),
            ))?
            .label(series.name.as_str())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 18, y)], color.stroke_width(2))
            });
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn render_map_png(
    path: &Path,
    indicator: &str,
    districts: &[District],
    values: &HashMap<String, f64>,
    ramp: &ColorRamp,
) -> Result<()> {
    let root = BitMapBackend::new(path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut bbox: Option<geo::Rect<f64>> = None;
    for district in districts {
        if let Some(rect) = district.geometry.bounding_rect() {
            bbox = Some(match bbox {
                Some(acc) => geo::Rect::new(
                    geo::Coord {
                        x: acc.min().x.min(rect.min().x),
                        y: acc.min().y.min(rect.min().y),
                    },
                    geo::Coord {
                        x: acc.max().x.max(rect.max().x),
                        y: acc.max().y.max(rect.max().y),
                    },
                ),
                None => rect,
            });
        }
    }

    let Some(bbox) = bbox else {
        draw_no_data(&root)?;
        root.present()?;
        return Ok(());
    };

    let pad_x = (bbox.max().x - bbox.min().x) * 0.02;
    let pad_y = (bbox.max().y - bbox.min().y) * 0.02;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{} by district", indicator), ("sans-serif", 28))
        .margin(12)
        .build_cartesian_2d(
            bbox.min().x - pad_x..bbox.max().x + pad_x,
            bbox.min().y - pad_y..bbox.max().y + pad_y,
        )?;

    let range = value_range(values);
    let outline = RGBColor(90, 90, 90);

    for district in districts {
        let value = values
            .get(&normalize_district(&district.id))
            .or_else(|| values.get(&normalize_district(&district.name)))
            .copied();
        let fill = ramp.fill_for(value, range);
        let fill = RGBColor(fill.0, fill.1, fill.2);

        for polygon in &district.geometry {
            let ring: Vec<(f64, f64)> = polygon.exterior().coords().map(|c| (c.x, c.y)).collect();
            chart.draw_series(std::iter::once(Polygon::new(ring.clone(), fill.filled())))?;
            chart.draw_series(std::iter::once(PathElement::new(ring, outline.stroke_width(1))))?;
        }
    }

    root.present()?;
    Ok(())
}
