//! Analysis core: paginated fetching, participant statistics, and polygon
//! overlay detection over [`geovisor_core::FeatureSource`] layers.

pub mod aggregate;
pub mod context;
pub mod engine;
mod error;
pub mod fetch;
pub mod overlay;
pub mod progress;
pub mod table;

pub use aggregate::{
    AggregationRequest, AggregationResult, CategoryCount, PairIntersection, UNASSIGNED_GROUP,
    aggregate, aggregate_by_group,
};
pub use context::{MapContext, Missing, Outcome};
pub use engine::{GeometryEngine, PlanarEngine};
pub use error::{AnalysisError, EngineError, FetchError};
pub use fetch::{FetchOptions, fetch_all};
pub use overlay::{
    OverlayDetector, OverlayMatch, OverlayOutcome, Reference, Strategy, matches_to_csv,
};
pub use progress::{CancellationFlag, NoopProgress, Progress, ProgressSink};
