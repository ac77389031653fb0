use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub map: MapConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub indicators_csv: PathBuf,
    pub districts_json: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

/// Choropleth appearance. The ramp runs low -> high over the value range of
/// the current selection; districts without a value get the neutral color.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub low_color: String,
    pub high_color: String,
    pub neutral_color: String,
    pub default_indicator: Option<String>,
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            low_color: "#fee8c8".to_string(),
            high_color: "#b30000".to_string(),
            neutral_color: "#d9d9d9".to_string(),
            default_indicator: None,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_section_is_optional() {
        let config: AppConfig = toml::from_str(
            r#"
            [input]
            indicators_csv = "data/malaria_indicators_btn.csv"
            districts_json = "data/bhutan_districts.json"

            [server]
            port = 8080
            "#,
        )
        .unwrap();
        assert_eq!(config.map.neutral_color, "#d9d9d9");
        assert!(config.map.default_indicator.is_none());
    }

    #[test]
    fn map_section_overrides_defaults() {
        let config: AppConfig = toml::from_str(
            r##"
            [input]
            indicators_csv = "a.csv"
            districts_json = "b.json"

            [server]
            port = 9000

            [map]
            high_color = "#123456"
            default_indicator = "cases_total"
            "##,
        )
        .unwrap();
        assert_eq!(config.map.high_color, "#123456");
        assert_eq!(config.map.low_color, "#fee8c8");
        assert_eq!(config.map.default_indicator.as_deref(), Some("cases_total"));
    }
}
