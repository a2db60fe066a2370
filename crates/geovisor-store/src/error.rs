use geovisor_core::CoordError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("layer file not found: {0}")]
    NotFound(std::path::PathBuf),

    #[error("failed to read layer: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] ::geojson::Error),

    #[error("feature {index}: unsupported geometry: {detail}")]
    Geometry { index: usize, detail: String },

    #[error("invalid CSV: {0}")]
    Csv(#[from] arrow::error::ArrowError),

    #[error("no latitude/longitude or easting/northing/zone columns")]
    NoCoordinateColumns,

    #[error("line {line}: {source}")]
    Coordinate { line: usize, source: CoordError },
}
