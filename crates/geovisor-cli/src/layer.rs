//! Resolve a layer argument to a feature source.
//!
//! A layer argument is one of:
//! - an `http(s)://` layer URL,
//! - a path to a GeoJSON or point CSV file,
//! - a layer path relative to `--service-url` (e.g. `parcelas/FeatureServer/0`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use geovisor_core::FeatureSource;
use geovisor_store::MemoryStore;
use geovisor_sync::FeatureServiceClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerLocation {
    Url(String),
    File(PathBuf),
}

pub fn resolve(arg: &str, service_url: Option<&str>) -> anyhow::Result<LayerLocation> {
    let arg = arg.trim();
    if arg.starts_with("http://") || arg.starts_with("https://") {
        return Ok(LayerLocation::Url(arg.to_string()));
    }
    let path = Path::new(arg);
    if path.exists() {
        return Ok(LayerLocation::File(path.to_path_buf()));
    }
    match service_url {
        Some(base) => Ok(LayerLocation::Url(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            arg.trim_start_matches('/')
        ))),
        None => bail!("{arg} is not a file or URL, and no service URL is set"),
    }
}

pub async fn open(arg: &str, service_url: Option<&str>) -> anyhow::Result<Arc<dyn FeatureSource>> {
    match resolve(arg, service_url)? {
        LayerLocation::Url(url) => {
            tracing::debug!(url = %url, "using feature service layer");
            Ok(Arc::new(FeatureServiceClient::new(url)))
        }
        LayerLocation::File(path) => {
            let store = MemoryStore::open(&path)
                .await
                .with_context(|| format!("loading {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_pass_through() {
        let loc = resolve("https://example.org/arcgis/rest/services/ugc/FeatureServer/0", None).unwrap();
        assert_eq!(
            loc,
            LayerLocation::Url("https://example.org/arcgis/rest/services/ugc/FeatureServer/0".into())
        );
    }

    #[test]
    fn existing_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let arg = file.path().to_str().unwrap();
        assert_eq!(
            resolve(arg, Some("https://example.org")).unwrap(),
            LayerLocation::File(file.path().to_path_buf())
        );
    }

    #[test]
    fn relative_to_service() {
        let loc = resolve("/parcelas/FeatureServer/0", Some("https://example.org/services/")).unwrap();
        assert_eq!(
            loc,
            LayerLocation::Url("https://example.org/services/parcelas/FeatureServer/0".into())
        );
    }

    #[test]
    fn unresolvable() {
        assert!(resolve("no-such-layer.geojson", None).is_err());
    }

    #[tokio::test]
    async fn opens_geojson_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ugc.geojson");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"dni":"1"},
                 "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}
            ]}"#,
        )
        .unwrap();

        let source = open(path.to_str().unwrap(), None).await.unwrap();
        assert_eq!(source.name(), "ugc");
        assert_eq!(source.count(&geovisor_core::Filter::All).await.unwrap(), 1);
    }
}
