use geovisor_core::SourceError;
use thiserror::Error;

/// A paginated fetch did not complete. Partial pages are discarded.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("counting {layer} failed: {source}")]
    Count { layer: String, source: SourceError },

    #[error("page at offset {offset} of {layer} failed: {source}")]
    Page {
        layer: String,
        offset: usize,
        source: SourceError,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no polygons to union")]
    EmptyUnion,

    #[error("geometry {index} is not a polygon")]
    NotPolygonal { index: usize },

    #[error("geometry {index} has non-finite coordinates")]
    NonFinite { index: usize },

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("could not union reference layer {layer}: {source}")]
    ReferenceUnion { layer: String, source: EngineError },

    #[error("querying {layer} failed: {source}")]
    Source { layer: String, source: SourceError },

    #[error("every overlay test against {layer} failed: {source}")]
    Engine { layer: String, source: EngineError },

    #[error("unknown layer: {0}")]
    UnknownLayer(String),

    #[error("an overlay analysis is already running")]
    AlreadyRunning,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
