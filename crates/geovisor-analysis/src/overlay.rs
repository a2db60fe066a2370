//! Overlay detection: which uploaded polygons touch a reference layer.
//!
//! Candidates are tested in fixed-size batches. Tests inside a batch run
//! concurrently; batches run one after another, so at most `batch_size`
//! requests are in flight against the engine or the reference source.
//! Matches keep the original candidate order.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use geovisor_core::config::DEFAULT_BATCH_SIZE;
use geovisor_core::{FeatureSource, Geometry, Record, SourceError, SpatialRelationship, to_csv};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::GeometryEngine;
use crate::progress::{CancellationFlag, Progress, ProgressSink};
use crate::{AnalysisError, EngineError};

/// Column appended to exported matches.
pub const MATCHED_AGAINST: &str = "matched_against";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Union the reference layer once, test every candidate against it.
    UnionedGeometry,
    /// One spatial query per candidate against the reference source.
    LiveSpatialQuery,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnionedGeometry => "unioned-geometry",
            Self::LiveSpatialQuery => "live-spatial-query",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "unioned-geometry" | "unioned" => Ok(Self::UnionedGeometry),
            "live-spatial-query" | "live" => Ok(Self::LiveSpatialQuery),
            other => Err(AnalysisError::InvalidRequest(format!(
                "unknown overlay strategy: {other}"
            ))),
        }
    }
}

/// What candidates are tested against.
#[derive(Clone)]
pub enum Reference {
    Unioned {
        name: String,
        geometry: Geometry,
    },
    LiveQuery {
        name: String,
        source: Arc<dyn FeatureSource>,
        /// Attribute reported as `matched_against` for a hit.
        identifier_field: String,
    },
}

impl Reference {
    /// Union the polygonal records of a reference layer.
    pub async fn unioned(
        engine: &dyn GeometryEngine,
        name: impl Into<String>,
        records: &[Record],
    ) -> Result<Self, AnalysisError> {
        let name = name.into();
        let geometry = union_layer(engine, &name, records).await?;
        Ok(Self::Unioned { name, geometry })
    }

    pub fn live(source: Arc<dyn FeatureSource>, identifier_field: impl Into<String>) -> Self {
        Self::LiveQuery {
            name: source.name().to_string(),
            source,
            identifier_field: identifier_field.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Unioned { name, .. } | Self::LiveQuery { name, .. } => name,
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Unioned { .. } => Strategy::UnionedGeometry,
            Self::LiveQuery { .. } => Strategy::LiveSpatialQuery,
        }
    }
}

/// Union the polygonal records of a layer into one geometry.
///
/// Records without polygon geometry are left out. A layer with nothing to
/// union fails with [`AnalysisError::ReferenceUnion`].
pub async fn union_layer(
    engine: &dyn GeometryEngine,
    name: &str,
    records: &[Record],
) -> Result<Geometry, AnalysisError> {
    let polygons: Vec<Geometry> = records
        .iter()
        .filter(|r| r.is_polygonal())
        .filter_map(|r| r.geometry.clone())
        .collect();
    if polygons.len() < records.len() {
        debug!(
            layer = %name,
            dropped = records.len() - polygons.len(),
            "non-polygon reference records left out of union"
        );
    }

    let geometry = engine
        .union(&polygons)
        .await
        .map_err(|source| AnalysisError::ReferenceUnion {
            layer: name.to_string(),
            source,
        })?;
    info!(layer = %name, parts = polygons.len(), "reference layer unioned");
    Ok(geometry)
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("name", &self.name())
            .field("strategy", &self.strategy())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayMatch {
    pub candidate: Record,
    /// Reference feature identifier, or the reference layer name.
    pub matched_against: String,
    pub geometry: Geometry,
}

/// Result of one overlay run.
#[derive(Debug, Clone)]
pub struct OverlayOutcome {
    pub reference: String,
    pub strategy: Strategy,
    pub matches: Vec<OverlayMatch>,
    /// Last progress reported.
    pub progress: Progress,
    /// Candidates without polygon geometry.
    pub skipped: usize,
    /// Candidates whose test errored; counted as no match.
    pub failed_tests: usize,
    pub cancelled: bool,
    pub batches: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OverlayOutcome {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn matched_records(&self) -> Vec<Record> {
        self.matches.iter().map(|m| m.candidate.clone()).collect()
    }

    pub fn to_csv(&self) -> String {
        matches_to_csv(&self.matches)
    }

    /// No cancellation and no failed tests: an empty match list means no overlaps.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed_tests == 0
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// CSV of the matched candidates with a trailing `matched_against` column.
pub fn matches_to_csv(matches: &[OverlayMatch]) -> String {
    let records: Vec<Record> = matches
        .iter()
        .map(|m| {
            let mut record = m.candidate.clone();
            record.attributes.insert(
                MATCHED_AGAINST.to_string(),
                m.matched_against.clone().into(),
            );
            record
        })
        .collect();
    to_csv(&records)
}

#[derive(Debug, Error)]
enum TestError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

pub struct OverlayDetector {
    engine: Arc<dyn GeometryEngine>,
    batch_size: usize,
}

impl OverlayDetector {
    pub fn new(engine: Arc<dyn GeometryEngine>) -> Self {
        Self {
            engine,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Test every polygonal candidate against `reference`.
    ///
    /// Progress is reported after each batch; `processed` and `total` count
    /// polygonal candidates only. A set `cancel` flag stops the run before
    /// the next batch and the outcome holds the matches found so far.
    ///
    /// A failed test counts as no match, unless every tested candidate
    /// failed: the reference is then unusable and the run is an error.
    pub async fn detect(
        &self,
        candidates: &[Record],
        reference: &Reference,
        progress: &dyn ProgressSink,
        cancel: Option<&CancellationFlag>,
    ) -> Result<OverlayOutcome, AnalysisError> {
        let started_at = Utc::now();
        let testable: Vec<(usize, &Record, &Geometry)> = candidates
            .iter()
            .enumerate()
            .filter_map(|(index, record)| match &record.geometry {
                Some(g @ (Geometry::Polygon(_) | Geometry::MultiPolygon(_))) => {
                    Some((index, record, g))
                }
                _ => None,
            })
            .collect();
        let skipped = candidates.len() - testable.len();
        let total = testable.len();
        info!(
            reference = %reference.name(),
            strategy = %reference.strategy(),
            candidates = total,
            skipped,
            batch_size = self.batch_size,
            "starting overlay analysis"
        );

        let mut matches = Vec::new();
        let mut current = Progress {
            processed: 0,
            total,
            matches_so_far: 0,
        };
        let mut failed_tests = 0;
        let mut last_error = None;
        let mut batches = 0;
        let mut cancelled = false;

        for batch in testable.chunks(self.batch_size) {
            if cancel.is_some_and(CancellationFlag::is_cancelled) {
                info!(processed = current.processed, total, "overlay analysis cancelled");
                cancelled = true;
                break;
            }

            let results = join_all(
                batch
                    .iter()
                    .map(|&(_, _, geometry)| self.test_candidate(geometry, reference)),
            )
            .await;

            for (&(index, record, geometry), result) in batch.iter().zip(results) {
                match result {
                    Ok(Some(matched_against)) => matches.push(OverlayMatch {
                        candidate: record.clone(),
                        matched_against,
                        geometry: geometry.clone(),
                    }),
                    Ok(None) => {}
                    Err(err) => {
                        failed_tests += 1;
                        warn!(candidate = index, error = %err, "overlay test failed, counting as no match");
                        last_error = Some(err);
                    }
                }
            }

            batches += 1;
            current = Progress {
                processed: current.processed + batch.len(),
                total,
                matches_so_far: matches.len(),
            };
            debug!(
                batch = batches,
                processed = current.processed,
                matches = current.matches_so_far,
                "batch complete"
            );
            progress.on_progress(current);
        }

        // `last_error` is set whenever a test failed.
        if let Some(err) = last_error.filter(|_| failed_tests == current.processed) {
            tracing::error!(reference = %reference.name(), failed_tests, "every overlay test failed");
            let layer = reference.name().to_string();
            return Err(match err {
                TestError::Engine(source) => AnalysisError::Engine { layer, source },
                TestError::Source(source) => AnalysisError::Source { layer, source },
            });
        }

        info!(
            reference = %reference.name(),
            matches = matches.len(),
            failed_tests,
            "overlay analysis finished"
        );
        Ok(OverlayOutcome {
            reference: reference.name().to_string(),
            strategy: reference.strategy(),
            matches,
            progress: current,
            skipped,
            failed_tests,
            cancelled,
            batches,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn test_candidate(
        &self,
        geometry: &Geometry,
        reference: &Reference,
    ) -> Result<Option<String>, TestError> {
        match reference {
            Reference::Unioned {
                name,
                geometry: unioned,
            } => {
                let hit = self.engine.intersects(geometry, unioned).await?;
                Ok(hit.then(|| name.clone()))
            }
            Reference::LiveQuery {
                name,
                source,
                identifier_field,
            } => {
                let hits = source
                    .query_spatial(
                        geometry,
                        SpatialRelationship::Intersects,
                        std::slice::from_ref(identifier_field),
                    )
                    .await?;
                Ok(hits.first().map(|hit| {
                    hit.identifier(identifier_field)
                        .unwrap_or_else(|| name.clone())
                }))
            }
        }
    }
}
