//! Paginated retrieval of every record matching a filter.
//!
//! The loop is bounded two ways: by the up-front `count`, and by the first
//! page shorter than requested. Either one ends the fetch, so a source whose
//! count disagrees with its retrievable rows can't loop forever.

use std::future::Future;
use std::time::Duration;

use geovisor_core::config::DEFAULT_PAGE_SIZE;
use geovisor_core::{AnalysisConfig, FeatureSource, Filter, Query, Record, SourceError};
use tracing::{debug, info, warn};

use crate::FetchError;

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub page_size: usize,
    /// Per-request timeout; `None` leaves it to the transport.
    pub page_timeout: Option<Duration>,
    /// Extra attempts per request after the first failure.
    pub retries: u32,
    pub order_by: Option<String>,
    pub return_geometry: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_timeout: Some(Duration::from_secs(30)),
            retries: 1,
            order_by: None,
            return_geometry: true,
        }
    }
}

impl FetchOptions {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            page_size: config.page_size,
            page_timeout: Some(config.page_timeout()),
            retries: config.page_retries,
            order_by: config.order_by.clone(),
            return_geometry: true,
        }
    }

    pub fn without_geometry(mut self) -> Self {
        self.return_geometry = false;
        self
    }
}

/// Fetch all records matching `filter`, page by page.
///
/// Any failed request (after retries) aborts the whole fetch; nothing
/// partial is returned.
pub async fn fetch_all(
    source: &dyn FeatureSource,
    filter: &Filter,
    fields: &[String],
    options: &FetchOptions,
) -> Result<Vec<Record>, FetchError> {
    let layer = source.name().to_string();
    let page_size = options.page_size.max(1);

    let total = with_retry(options, || source.count(filter))
        .await
        .map_err(|source| FetchError::Count {
            layer: layer.clone(),
            source,
        })?;
    info!(layer = %layer, total, page_size, "fetching records");

    let mut records: Vec<Record> = Vec::with_capacity(total);
    while records.len() < total {
        let offset = records.len();
        let mut query = Query::new(filter.clone())
            .fields(fields)
            .page(offset, page_size)
            .order_by(options.order_by.clone());
        query.return_geometry = options.return_geometry;

        let mut page = with_retry(options, || source.query(&query))
            .await
            .map_err(|source| FetchError::Page {
                layer: layer.clone(),
                offset,
                source,
            })?;

        let short = page.len() < page_size;
        page.truncate(page_size.min(total - offset));
        records.extend(page);
        debug!(layer = %layer, fetched = records.len(), total, "page received");

        if short {
            if records.len() < total {
                warn!(
                    layer = %layer,
                    fetched = records.len(),
                    total,
                    "source returned fewer rows than counted"
                );
            }
            break;
        }
    }

    info!(layer = %layer, count = records.len(), "fetch complete");
    Ok(records)
}

async fn with_retry<T, F, Fut>(options: &FetchOptions, mut op: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 0;
    loop {
        let result = match options.page_timeout {
            Some(limit) => tokio::time::timeout(limit, op())
                .await
                .unwrap_or(Err(SourceError::Timeout(limit))),
            None => op().await,
        };
        match result {
            Ok(value) => return Ok(value),
            Err(err) if attempt < options.retries => {
                attempt += 1;
                warn!(attempt, error = %err, "request failed, retrying");
            }
            Err(err) => return Err(err),
        }
    }
}
