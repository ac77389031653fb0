use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading the input files. All of these are fatal to
/// the dashboard session; district mismatches between the two files are not
/// errors and are only logged.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed GeoJSON in {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: geojson::Error,
    },

    #[error("column '{0}' not found in indicator CSV")]
    MissingColumn(String),

    #[error("boundary file must be a GeoJSON FeatureCollection")]
    NotACollection,

    #[error("failed to convert geometry for district '{0}'")]
    BadGeometry(String),
}
