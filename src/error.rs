use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DashboardError {
    #[error("Row source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Table is missing display columns {missing:?}")]
    SchemaMismatch { missing: Vec<String> },
}

/// Failure of a single address lookup. Never fatal to the pipeline.
#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("Geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Geocoder answered with status {0:?}")]
    Status(String),

    #[error("Malformed geocoder response: {0}")]
    Malformed(String),
}
