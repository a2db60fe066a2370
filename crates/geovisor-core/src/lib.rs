pub mod config;
pub mod coords;
pub mod export;
pub mod normalize;
pub mod record;
pub mod schema;
pub mod source;

pub use config::{AnalysisConfig, ConfigError};
pub use coords::{CoordError, GeoPoint, UtmPoint, UtmZone};
pub use export::{export_file_name, to_csv};
pub use normalize::{CategoryMatcher, normalize_category};
pub use record::{Attributes, FieldMap, Geometry, Record, fields};
pub use schema::tables;
pub use source::{FeatureSource, Filter, Query, SourceError, SpatialRelationship};
