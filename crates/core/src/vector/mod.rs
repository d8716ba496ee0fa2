//! Vector features returned by feature services

use geo_types::{Geometry, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Whether this attribute equals a filter value given as text.
    ///
    /// Numeric attributes compare numerically so `"13"` matches both
    /// `Int(13)` and `Float(13.0)`.
    pub fn matches_text(&self, value: &str) -> bool {
        match self {
            AttributeValue::Null => false,
            AttributeValue::Bool(b) => value.parse::<bool>().map(|v| v == *b).unwrap_or(false),
            AttributeValue::Int(i) => value.trim().parse::<f64>().map(|v| v == *i as f64).unwrap_or(false),
            AttributeValue::Float(f) => value.trim().parse::<f64>().map(|v| v == *f).unwrap_or(false),
            AttributeValue::String(s) => s == value,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "null"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Int(i) => write!(f, "{i}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::String(s) => write!(f, "{s}"),
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry, in WGS84 longitude/latitude as served
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes
    pub properties: HashMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Builder form of [`Feature::set_property`]
    pub fn with_property(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.set_property(key, value);
        self
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Whether attribute `field` equals `value`
    pub fn matches(&self, field: &str, value: &str) -> bool {
        self.get_property(field)
            .map(|attr| attr.matches_text(value))
            .unwrap_or(false)
    }

    /// Areal part of the geometry; points and lines contribute nothing
    pub fn polygons(&self) -> MultiPolygon<f64> {
        let mut out = Vec::new();
        if let Some(geometry) = &self.geometry {
            collect_polygons(geometry, &mut out);
        }
        MultiPolygon::new(out)
    }
}

fn collect_polygons(geometry: &Geometry<f64>, out: &mut Vec<geo_types::Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(p) => out.push(p.clone()),
        Geometry::MultiPolygon(mp) => out.extend(mp.0.iter().cloned()),
        Geometry::Rect(r) => out.push(r.to_polygon()),
        Geometry::Triangle(t) => out.push(t.to_polygon()),
        Geometry::GeometryCollection(gc) => {
            for g in gc.iter() {
                collect_polygons(g, out);
            }
        }
        _ => {}
    }
}

/// Collection of features
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self { features: Vec::new() }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Features whose `field` attribute equals `value`
    pub fn filter_eq(&self, field: &str, value: &str) -> FeatureCollection {
        self.features
            .iter()
            .filter(|f| f.matches(field, value))
            .cloned()
            .collect()
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}
