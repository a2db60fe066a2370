//! Session context: registered layers, configuration, and cached reference
//! geometry for one analysis session.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use geovisor_core::{AnalysisConfig, FeatureSource, Filter, Geometry, Record};
use tracing::{debug, info, warn};

use crate::aggregate::{AggregationRequest, AggregationResult, aggregate, aggregate_by_group};
use crate::engine::{GeometryEngine, PlanarEngine};
use crate::fetch::{FetchOptions, fetch_all};
use crate::overlay::{OverlayDetector, OverlayOutcome, Reference, Strategy, union_layer};
use crate::progress::{CancellationFlag, ProgressSink};
use crate::AnalysisError;

/// What a request was missing when it came back without running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// No candidate polygons were supplied.
    Candidates,
    /// The reference layer has no features.
    Reference,
    /// The filter matched no records.
    Records,
}

/// Result of a request that may have had nothing to work on.
///
/// `NoSelection` is a warning for the caller to surface, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    NoSelection(Missing),
}

impl<T> Outcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::NoSelection(_) => None,
        }
    }

    pub fn is_no_selection(&self) -> bool {
        matches!(self, Self::NoSelection(_))
    }
}

/// Clears the in-flight flag when the overlay run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, AnalysisError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AnalysisError::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct MapContext {
    sources: HashMap<String, Arc<dyn FeatureSource>>,
    reference_cache: Mutex<HashMap<String, Geometry>>,
    engine: Arc<dyn GeometryEngine>,
    config: AnalysisConfig,
    overlay_running: AtomicBool,
}

impl MapContext {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            sources: HashMap::new(),
            reference_cache: Mutex::new(HashMap::new()),
            engine: Arc::new(PlanarEngine),
            config,
            overlay_running: AtomicBool::new(false),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn GeometryEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Register a layer under its own name.
    pub fn register(&mut self, source: Arc<dyn FeatureSource>) {
        let name = source.name().to_string();
        self.register_as(name, source);
    }

    /// Register a layer under `name`, replacing any previous one.
    pub fn register_as(&mut self, name: impl Into<String>, source: Arc<dyn FeatureSource>) {
        let name = name.into();
        debug!(layer = %name, "registered layer");
        self.cache().remove(&name);
        self.sources.insert(name, source);
    }

    pub fn layer_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn source(&self, name: &str) -> Result<Arc<dyn FeatureSource>, AnalysisError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| AnalysisError::UnknownLayer(name.to_string()))
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::from_config(&self.config)
    }

    /// All records of a layer matching `filter`, with geometry.
    pub async fn fetch_layer(
        &self,
        name: &str,
        filter: &Filter,
    ) -> Result<Vec<Record>, AnalysisError> {
        let source = self.source(name)?;
        Ok(fetch_all(source.as_ref(), filter, &[], &self.fetch_options()).await?)
    }

    /// Participant statistics over a layer, with the configured categories
    /// and pairs.
    pub async fn statistics(
        &self,
        name: &str,
        filter: &Filter,
    ) -> Result<Outcome<AggregationResult>, AnalysisError> {
        let Some(records) = self.attribute_records(name, filter).await? else {
            return Ok(Outcome::NoSelection(Missing::Records));
        };
        let request = AggregationRequest::from_config(&self.config);
        Ok(Outcome::Completed(aggregate(&records, &request)?))
    }

    /// [`statistics`](Self::statistics) split by the configured group field.
    pub async fn statistics_by_group(
        &self,
        name: &str,
        filter: &Filter,
    ) -> Result<Outcome<BTreeMap<String, AggregationResult>>, AnalysisError> {
        let Some(records) = self.attribute_records(name, filter).await? else {
            return Ok(Outcome::NoSelection(Missing::Records));
        };
        let request = AggregationRequest::from_config(&self.config);
        let groups = aggregate_by_group(&records, &self.config.fields.group, &request)?;
        Ok(Outcome::Completed(groups))
    }

    async fn attribute_records(
        &self,
        name: &str,
        filter: &Filter,
    ) -> Result<Option<Vec<Record>>, AnalysisError> {
        let source = self.source(name)?;
        let options = self.fetch_options().without_geometry();
        let fields = [
            self.config.fields.identifier.clone(),
            self.config.fields.category.clone(),
            self.config.fields.area.clone(),
            self.config.fields.group.clone(),
        ];
        let records = fetch_all(source.as_ref(), filter, &fields, &options).await?;
        if records.is_empty() {
            warn!(layer = %name, "no records matched the selection");
            return Ok(None);
        }
        Ok(Some(records))
    }

    /// Unioned geometry of a reference layer, computed once per session.
    ///
    /// `None` when the layer has no features.
    pub async fn reference_geometry(&self, name: &str) -> Result<Option<Geometry>, AnalysisError> {
        if let Some(geometry) = self.cache().get(name) {
            debug!(layer = %name, "reference geometry cache hit");
            return Ok(Some(geometry.clone()));
        }

        let records = self.fetch_layer(name, &Filter::All).await?;
        if records.is_empty() {
            return Ok(None);
        }
        let geometry = union_layer(self.engine.as_ref(), name, &records).await?;
        self.cache().insert(name.to_string(), geometry.clone());
        Ok(Some(geometry))
    }

    /// Run an overlay analysis of `candidates` against a registered layer.
    ///
    /// Only one run may be in flight per context; a second concurrent call
    /// fails with [`AnalysisError::AlreadyRunning`].
    pub async fn overlay(
        &self,
        candidates: &[Record],
        reference_layer: &str,
        strategy: Strategy,
        progress: &dyn ProgressSink,
        cancel: Option<&CancellationFlag>,
    ) -> Result<Outcome<OverlayOutcome>, AnalysisError> {
        let _guard = RunGuard::acquire(&self.overlay_running)?;

        if candidates.is_empty() {
            warn!("no candidate polygons to analyse");
            return Ok(Outcome::NoSelection(Missing::Candidates));
        }

        let reference = match strategy {
            Strategy::UnionedGeometry => match self.reference_geometry(reference_layer).await? {
                Some(geometry) => Reference::Unioned {
                    name: reference_layer.to_string(),
                    geometry,
                },
                None => return Ok(self.empty_reference(reference_layer)),
            },
            Strategy::LiveSpatialQuery => {
                let source = self.source(reference_layer)?;
                let count = source.count(&Filter::All).await.map_err(|source| {
                    AnalysisError::Source {
                        layer: reference_layer.to_string(),
                        source,
                    }
                })?;
                if count == 0 {
                    return Ok(self.empty_reference(reference_layer));
                }
                Reference::LiveQuery {
                    name: reference_layer.to_string(),
                    source,
                    identifier_field: self.config.fields.identifier.clone(),
                }
            }
        };

        let detector =
            OverlayDetector::new(self.engine.clone()).with_batch_size(self.config.batch_size);
        let outcome = detector
            .detect(candidates, &reference, progress, cancel)
            .await?;
        Ok(Outcome::Completed(outcome))
    }

    pub fn is_overlay_running(&self) -> bool {
        self.overlay_running.load(Ordering::Acquire)
    }

    /// Drop cached reference geometry.
    pub fn dispose(&self) {
        let mut cache = self.cache();
        let cleared = cache.len();
        cache.clear();
        info!(cleared, "map context disposed");
    }

    fn empty_reference<T>(&self, layer: &str) -> Outcome<T> {
        warn!(layer = %layer, "reference layer has no features");
        Outcome::NoSelection(Missing::Reference)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Geometry>> {
        self.reference_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
