//! HTTP client for feature-service layers (`<layer>/query` REST endpoint).

use async_trait::async_trait;
use geo::BoundingRect;
use geo::{Intersects, Relate};
use geovisor_core::{
    FeatureSource, Filter, Geometry, Query, Record, SourceError, SpatialRelationship,
};
use geovisor_store::{StoreError, records_from_geojson};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("service error {code}: {message}")]
    Service { code: i64, message: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("GeoJSON decode error: {0}")]
    Decode(#[from] StoreError),
}

impl From<SyncError> for SourceError {
    fn from(err: SyncError) -> Self {
        SourceError::backend(err)
    }
}

/// Client for one feature-service layer, e.g.
/// `https://host/server/rest/services/Parcelas/FeatureServer/0`.
pub struct FeatureServiceClient {
    client: reqwest::Client,
    layer_url: String,
    name: String,
}

#[derive(Deserialize)]
struct CountResponse {
    count: usize,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ServiceErrorBody,
}

#[derive(Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl FeatureServiceClient {
    /// Create a client for the given layer URL (no trailing slash needed).
    ///
    /// The layer name defaults to the service name in the URL.
    pub fn new(layer_url: String) -> Self {
        let layer_url = layer_url.trim_end_matches('/').to_string();
        let name = layer_name_from_url(&layer_url);
        Self {
            client: reqwest::Client::new(),
            layer_url,
            name,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.layer_url)
    }

    async fn get_text(&self, params: &[(&'static str, String)]) -> Result<String, SyncError> {
        let url = self.query_url();
        debug!(url = %url, ?params, "feature service request");
        let resp = self.client.get(&url).query(params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let text = resp.text().await?;
        // Services report query errors with a 200 and an error envelope.
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&text) {
            return Err(SyncError::Service {
                code: envelope.error.code,
                message: envelope.error.message,
            });
        }
        Ok(text)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        params: &[(&'static str, String)],
    ) -> Result<T, SyncError> {
        let text = self.get_text(params).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn get_records(&self, params: &[(&'static str, String)]) -> Result<Vec<Record>, SyncError> {
        let text = self.get_text(params).await?;
        Ok(records_from_geojson(&text)?)
    }
}

fn layer_name_from_url(url: &str) -> String {
    let segments: Vec<&str> = url.split('/').filter(|s| !s.is_empty()).collect();
    // .../services/<Name>/FeatureServer/<n>
    match segments.iter().rposition(|s| s.ends_with("Server")) {
        Some(i) if i > 0 => segments[i - 1].to_string(),
        _ => segments.last().map(|s| s.to_string()).unwrap_or_default(),
    }
}

fn out_fields(fields: &[String]) -> String {
    if fields.is_empty() {
        "*".to_string()
    } else {
        fields.join(",")
    }
}

fn count_params(filter: &Filter) -> Vec<(&'static str, String)> {
    vec![
        ("where", filter.to_where_clause()),
        ("returnCountOnly", "true".to_string()),
        ("f", "json".to_string()),
    ]
}

fn query_params(query: &Query) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("where", query.filter.to_where_clause()),
        ("outFields", out_fields(&query.fields)),
        ("returnGeometry", query.return_geometry.to_string()),
        ("outSR", "4326".to_string()),
        ("resultOffset", query.offset.to_string()),
    ];
    if let Some(limit) = query.limit {
        params.push(("resultRecordCount", limit.to_string()));
    }
    if let Some(order) = &query.order_by {
        params.push(("orderByFields", order.clone()));
    }
    params.push(("f", "geojson".to_string()));
    params
}

fn spatial_rel(relationship: SpatialRelationship) -> &'static str {
    match relationship {
        SpatialRelationship::Intersects => "esriSpatialRelIntersects",
        SpatialRelationship::Contains => "esriSpatialRelContains",
        SpatialRelationship::Within => "esriSpatialRelWithin",
    }
}

/// Envelope prefilter: the service narrows by bounding box, the exact
/// predicate runs locally on the returned geometries.
fn spatial_params(
    geometry: &Geometry,
    relationship: SpatialRelationship,
    fields: &[String],
) -> Option<Vec<(&'static str, String)>> {
    let rect = geometry.bounding_rect()?;
    let (min, max) = (rect.min(), rect.max());
    Some(vec![
        ("where", "1=1".to_string()),
        ("geometry", format!("{},{},{},{}", min.x, min.y, max.x, max.y)),
        ("geometryType", "esriGeometryEnvelope".to_string()),
        ("inSR", "4326".to_string()),
        ("spatialRel", spatial_rel(relationship).to_string()),
        ("outFields", out_fields(fields)),
        ("returnGeometry", "true".to_string()),
        ("outSR", "4326".to_string()),
        ("f", "geojson".to_string()),
    ])
}

#[async_trait]
impl FeatureSource for FeatureServiceClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn count(&self, filter: &Filter) -> Result<usize, SourceError> {
        let resp: CountResponse = self.get_json(&count_params(filter)).await?;
        info!(layer = %self.name, count = resp.count, "counted features");
        Ok(resp.count)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Record>, SourceError> {
        let records = self.get_records(&query_params(query)).await?;
        debug!(
            layer = %self.name,
            offset = query.offset,
            returned = records.len(),
            "fetched page"
        );
        Ok(records)
    }

    async fn query_spatial(
        &self,
        geometry: &Geometry,
        relationship: SpatialRelationship,
        fields: &[String],
    ) -> Result<Vec<Record>, SourceError> {
        let Some(params) = spatial_params(geometry, relationship, fields) else {
            return Ok(Vec::new());
        };
        let records = self.get_records(&params).await?;
        Ok(records
            .into_iter()
            .filter(|r| {
                r.geometry.as_ref().is_some_and(|g| match relationship {
                    SpatialRelationship::Intersects => g.intersects(geometry),
                    SpatialRelationship::Contains => g.relate(geometry).is_contains(),
                    SpatialRelationship::Within => g.relate(geometry).is_within(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Rect;

    fn param<'a>(params: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client =
            FeatureServiceClient::new("https://host/rest/services/Parcelas/FeatureServer/0/".into());
        assert_eq!(client.layer_url, "https://host/rest/services/Parcelas/FeatureServer/0");
        assert_eq!(
            client.query_url(),
            "https://host/rest/services/Parcelas/FeatureServer/0/query"
        );
    }

    #[test]
    fn layer_name_from_service_url() {
        assert_eq!(
            layer_name_from_url("https://host/rest/services/ANP/MapServer/3"),
            "ANP"
        );
        assert_eq!(layer_name_from_url("http://localhost:8080/layers/zonas"), "zonas");
        let client = FeatureServiceClient::new("http://x/y".into()).with_name("custom");
        assert_eq!(client.name(), "custom");
    }

    #[test]
    fn page_params() {
        let q = Query::new(Filter::contains("tipo_cultivo", "cacao"))
            .fields(&["dni".to_string(), "tipo_cultivo".to_string()])
            .page(4000, 2000)
            .order_by(Some("OBJECTID".into()));
        let params = query_params(&q);
        assert_eq!(param(&params, "where"), Some("UPPER(tipo_cultivo) LIKE '%CACAO%'"));
        assert_eq!(param(&params, "outFields"), Some("dni,tipo_cultivo"));
        assert_eq!(param(&params, "resultOffset"), Some("4000"));
        assert_eq!(param(&params, "resultRecordCount"), Some("2000"));
        assert_eq!(param(&params, "orderByFields"), Some("OBJECTID"));
        assert_eq!(param(&params, "returnGeometry"), Some("true"));
        assert_eq!(param(&params, "f"), Some("geojson"));
    }

    #[test]
    fn unbounded_query_omits_record_count() {
        let params = query_params(&Query::new(Filter::All));
        assert_eq!(param(&params, "outFields"), Some("*"));
        assert_eq!(param(&params, "resultRecordCount"), None);
        assert_eq!(param(&params, "orderByFields"), None);
    }

    #[test]
    fn count_params_request_count_only() {
        let params = count_params(&Filter::All);
        assert_eq!(param(&params, "where"), Some("1=1"));
        assert_eq!(param(&params, "returnCountOnly"), Some("true"));
    }

    #[test]
    fn spatial_params_use_envelope() {
        let g: Geometry = Rect::new((-76.5, -6.5), (-76.0, -6.0)).to_polygon().into();
        let params = spatial_params(&g, SpatialRelationship::Intersects, &[]).unwrap();
        assert_eq!(param(&params, "geometry"), Some("-76.5,-6.5,-76,-6"));
        assert_eq!(param(&params, "spatialRel"), Some("esriSpatialRelIntersects"));
    }

    #[test]
    fn error_envelope_parses() {
        let body = r#"{"error":{"code":400,"message":"Invalid query","details":[]}}"#;
        let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.error.code, 400);
        assert_eq!(envelope.error.message, "Invalid query");
        assert!(serde_json::from_str::<ErrorEnvelope>(r#"{"count": 3}"#).is_err());
    }

    #[test]
    fn sync_error_becomes_source_error() {
        let err: SourceError = SyncError::Server {
            status: 503,
            body: "unavailable".into(),
        }
        .into();
        assert_eq!(err.to_string(), "server returned 503: unavailable");
    }
}
