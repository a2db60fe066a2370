//! Sync layer: remote feature services exposed as [`geovisor_core::FeatureSource`]s.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{FeatureServiceClient, SyncError};
