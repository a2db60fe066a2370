//! Storage layer: in-memory feature layers built from uploaded GeoJSON or
//! point CSV files.

mod error;
pub use error::StoreError;

mod import;
pub use import::records_from_geojson;

mod points;
pub use points::{PointColumns, records_from_csv};

mod memory;
pub use memory::MemoryStore;
