//! [`FeatureService`] over GeoJSON documents.
//!
//! Each feature collection id maps to a GeoJSON `FeatureCollection` on disk
//! or behind a URL. Documents are parsed with the `geojson` crate on every
//! request; the attribute filter is applied after parsing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use geojson::{feature::Id, GeoJson};
use serde_json::Value;
use tracing::{debug, warn};

use basinscope_core::{AttributeValue, Feature, FeatureCollection, FeatureFilter, FeatureService};

use crate::error::{CloudError, Result};

/// Where a collection's GeoJSON lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureSource {
    Path(PathBuf),
    Url(String),
}

impl FeatureSource {
    /// `http(s)://` locations are URLs, anything else a path
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::Url(location.to_string())
        } else {
            Self::Path(PathBuf::from(location))
        }
    }
}

/// Feature service reading GeoJSON files or URLs.
pub struct GeoJsonFeatureService {
    sources: HashMap<String, FeatureSource>,
    rt: tokio::runtime::Runtime,
    client: reqwest::Client,
}

impl GeoJsonFeatureService {
    pub fn new() -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CloudError::Network(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            sources: HashMap::new(),
            rt,
            client,
        })
    }

    /// Register `collection` as served from `source`
    pub fn with_source(mut self, collection: impl Into<String>, source: FeatureSource) -> Self {
        self.sources.insert(collection.into(), source);
        self
    }

    fn load(&self, collection: &str) -> Result<String> {
        let source = self
            .sources
            .get(collection)
            .ok_or_else(|| CloudError::UnknownCollection(collection.to_string()))?;

        match source {
            FeatureSource::Path(path) => {
                std::fs::read_to_string(path).map_err(|e| CloudError::Core(basinscope_core::Error::Io(e)))
            }
            FeatureSource::Url(url) => self.rt.block_on(async {
                let resp = self.client.get(url).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(CloudError::Network(format!("GeoJSON GET returned HTTP {status}: {url}")));
                }
                Ok::<_, CloudError>(resp.text().await?)
            }),
        }
    }
}

impl FeatureService for GeoJsonFeatureService {
    fn get_features(&self, collection: &str, filter: &FeatureFilter) -> basinscope_core::Result<FeatureCollection> {
        let all = parse_feature_collection(&self.load(collection)?)?;
        let matched = all.filter_eq(&filter.field, &filter.value);
        debug!(
            collection,
            field = %filter.field,
            value = %filter.value,
            total = all.len(),
            matched = matched.len(),
            "GeoJSON feature query"
        );
        Ok(matched)
    }
}

/// Parse a GeoJSON `FeatureCollection` document.
pub fn parse_feature_collection(text: &str) -> Result<FeatureCollection> {
    let doc: GeoJson = text
        .parse()
        .map_err(|e| CloudError::InvalidResponse(format!("parsing GeoJSON: {e}")))?;
    let GeoJson::FeatureCollection(collection) = doc else {
        return Err(CloudError::InvalidResponse("GeoJSON root must be a FeatureCollection".into()));
    };

    collection.features.into_iter().map(convert_feature).collect()
}

fn convert_feature(feature: geojson::Feature) -> Result<Feature> {
    let id = feature.id.map(|id| match id {
        Id::String(s) => s,
        Id::Number(n) => n.to_string(),
    });

    let geometry = match feature.geometry {
        Some(g) => Some(
            geo_types::Geometry::<f64>::try_from(g)
                .map_err(|e| CloudError::InvalidResponse(format!("feature geometry: {e}")))?,
        ),
        None => {
            warn!(id = id.as_deref().unwrap_or("-"), "GeoJSON feature without geometry");
            None
        }
    };

    let properties = feature
        .properties
        .map(|props| props.iter().map(|(k, v)| (k.clone(), attribute(v))).collect::<HashMap<_, _>>())
        .unwrap_or_default();

    Ok(Feature {
        geometry,
        properties,
        id,
    })
}

fn attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => n.as_f64().map(AttributeValue::Float).unwrap_or(AttributeValue::Null),
        },
        Value::String(s) => AttributeValue::String(s.clone()),
        other => AttributeValue::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Geometry;
    use std::io::Write;

    const WATERSHEDS: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": 1,
      "properties": {"HUC_8": "18010206", "NAME": "Upper Klamath Lake", "AREA_SQKM": 1912.5},
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[-122.2, 42.3], [-121.8, 42.3], [-121.8, 42.7], [-122.2, 42.7], [-122.2, 42.3]]]
      }
    },
    {
      "type": "Feature",
      "id": "b",
      "properties": {"HUC_8": 18010201, "NAME": "Williamson"},
      "geometry": {
        "type": "MultiPolygon",
        "coordinates": [
          [[[-121.6, 42.5], [-121.4, 42.5], [-121.4, 42.7], [-121.6, 42.5]]],
          [[[-121.3, 42.5], [-121.1, 42.5], [-121.1, 42.7], [-121.3, 42.5]]]
        ]
      }
    },
    {
      "type": "Feature",
      "properties": {"HUC_8": "00000000"},
      "geometry": null
    }
  ]
}"#;

    fn service_with_file() -> (tempfile::NamedTempFile, GeoJsonFeatureService) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(WATERSHEDS.as_bytes()).unwrap();
        let service = GeoJsonFeatureService::new()
            .unwrap()
            .with_source("huc8", FeatureSource::Path(file.path().to_path_buf()));
        (file, service)
    }

    #[test]
    fn parse_collection() {
        let fc = parse_feature_collection(WATERSHEDS).unwrap();
        assert_eq!(fc.len(), 3);

        let first = fc.iter().next().unwrap();
        assert_eq!(first.id.as_deref(), Some("1"));
        assert!(matches!(first.geometry, Some(Geometry::Polygon(_))));
        assert_eq!(first.get_property("AREA_SQKM"), Some(&AttributeValue::Float(1912.5)));

        let second = fc.iter().nth(1).unwrap();
        assert_eq!(second.polygons().0.len(), 2);
        assert_eq!(second.get_property("HUC_8"), Some(&AttributeValue::Int(18010201)));

        assert!(fc.iter().nth(2).unwrap().geometry.is_none());
    }

    #[test]
    fn rejects_non_collection() {
        let doc = serde_json::json!({"type": "Feature", "properties": {}, "geometry": null});
        assert!(parse_feature_collection(&doc.to_string()).is_err());
        assert!(parse_feature_collection("not json").is_err());
    }

    #[test]
    fn keeps_lines_points_and_collections() {
        let doc = serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"kind": "river"},
                    "geometry": {"type": "LineString", "coordinates": [[-121.9, 44.4], [-121.8, 44.5]]}},
                {"type": "Feature", "properties": {"kind": "gauges"},
                    "geometry": {"type": "MultiPoint", "coordinates": [[-121.9, 44.4], [-121.8, 44.5]]}},
                {"type": "Feature", "properties": {"kind": "mixed"},
                    "geometry": {"type": "GeometryCollection", "geometries": [
                        {"type": "Point", "coordinates": [-121.85, 44.41]},
                        {"type": "Polygon", "coordinates": [[[-122.0, 44.3], [-121.7, 44.3], [-121.7, 44.6], [-122.0, 44.3]]]}
                    ]}}
            ]
        });
        let fc = parse_feature_collection(&doc.to_string()).unwrap();
        let features: Vec<&Feature> = fc.iter().collect();
        assert!(matches!(features[0].geometry, Some(Geometry::LineString(_))));
        assert!(matches!(features[1].geometry, Some(Geometry::MultiPoint(_))));
        assert!(matches!(features[2].geometry, Some(Geometry::GeometryCollection(_))));
        assert!(features[0].polygons().0.is_empty());
        assert_eq!(features[2].polygons().0.len(), 1);
    }

    #[test]
    fn malformed_position_is_error() {
        let doc = serde_json::json!({
            "type": "FeatureCollection",
            "features": [{"type": "Feature", "properties": {},
                "geometry": {"type": "Polygon", "coordinates": [[["a", 1.0]]]}}]
        });
        assert!(parse_feature_collection(&doc.to_string()).is_err());
    }

    #[test]
    fn filter_from_file() {
        let (_file, service) = service_with_file();
        let fc = service
            .get_features("huc8", &FeatureFilter::equals("HUC_8", "18010206"))
            .unwrap();
        assert_eq!(fc.len(), 1);

        // numeric attribute matches its text form
        let fc = service
            .get_features("huc8", &FeatureFilter::equals("HUC_8", "18010201"))
            .unwrap();
        assert_eq!(fc.len(), 1);

        let none = service
            .get_features("huc8", &FeatureFilter::equals("HUC_8", "99999999"))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn unknown_collection_is_remote_error() {
        let (_file, service) = service_with_file();
        let err = service
            .get_features("huc12", &FeatureFilter::equals("HUC_12", "1"))
            .unwrap_err();
        assert!(matches!(err, basinscope_core::Error::RemoteService(_)));
    }

    #[test]
    fn source_parsing() {
        assert!(matches!(FeatureSource::parse("https://x.org/a.geojson"), FeatureSource::Url(_)));
        assert!(matches!(FeatureSource::parse("data/huc8.geojson"), FeatureSource::Path(_)));
    }
}
