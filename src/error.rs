//! Error types for provider calls and estimate aggregation

use thiserror::Error;

use crate::aggregator::ProviderCall;

/// Why a provider call produced no result
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider reported status {status}")]
    Provider { status: String },

    #[error("response is missing field `{0}`")]
    MissingField(&'static str),

    #[error("expected {0} in response")]
    UnexpectedShape(&'static str),

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure of a whole estimate run
#[derive(Debug, Error)]
pub enum EstimateError {
    #[error("asset has no usable geometry: {0}")]
    NoProjectArea(#[from] GeometryError),

    #[error("{call} failed: {source}")]
    Provider {
        call: ProviderCall,
        #[source]
        source: ClientError,
    },
}

/// Failure to turn a geometry file into a project area
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("could not read geometry: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("invalid WKT: {0}")]
    Wkt(String),

    #[error("position needs both longitude and latitude")]
    Position,

    #[error("geometry contains no points")]
    Empty,
}
