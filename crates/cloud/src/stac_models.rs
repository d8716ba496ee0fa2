//! STAC Item Search request and response models
//!
//! Only what the archive adapter reads is modeled: bbox, datetime,
//! collection and property filters on the way out; items, `next` links,
//! `proj:epsg`, and band assets with their raster-extension scaling on the
//! way back. Unknown fields are kept in `extra` maps.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use basinscope_core::DateRange;

/// `POST /search` body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StacSearchParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Query extension filters, `{"platform": {"eq": "landsat-5"}}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
}

impl StacSearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// WGS84 `[west, south, east, north]`
    pub fn bbox(mut self, west: f64, south: f64, east: f64, north: f64) -> Self {
        self.bbox = Some([west, south, east, north]);
        self
    }

    pub fn datetime(mut self, interval: impl Into<String>) -> Self {
        self.datetime = Some(interval.into());
        self
    }

    /// Closed RFC 3339 interval covering a half-open date window: the upper
    /// bound is one millisecond before the exclusive end.
    pub fn date_range(self, dates: &DateRange) -> Self {
        let fmt = |t: DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Millis, true);
        let last = dates.end_instant() - chrono::Duration::milliseconds(1);
        self.datetime(format!("{}/{}", fmt(dates.start_instant()), fmt(last)))
    }

    pub fn collections(mut self, ids: &[&str]) -> Self {
        self.collections = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Page size
    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Require `property == value`
    pub fn property_eq(mut self, property: &str, value: &str) -> Self {
        let query = self.query.get_or_insert_with(|| json!({}));
        if let Some(filters) = query.as_object_mut() {
            filters.insert(property.to_string(), json!({ "eq": value }));
        }
        self
    }
}

/// One page of search results
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(default)]
    pub features: Vec<StacItem>,
    #[serde(default)]
    pub links: Vec<StacLink>,
    #[serde(rename = "numberMatched", default, skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,
}

impl StacItemCollection {
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,
}

impl StacItem {
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    /// `proj:epsg` of the projection extension
    pub fn epsg(&self) -> Option<u32> {
        self.properties
            .get("proj:epsg")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    pub fn acquired(&self) -> Option<DateTime<Utc>> {
        let raw = self.properties.get("datetime")?.as_str()?;
        DateTime::parse_from_rfc3339(raw).ok().map(|t| t.with_timezone(&Utc))
    }

    /// Property as text: strings verbatim, other values as JSON
    pub fn property_text(&self, key: &str) -> Option<String> {
        self.properties.get(key).and_then(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    pub href: String,
    #[serde(rename = "raster:bands", default, skip_serializing_if = "Vec::is_empty")]
    pub raster_bands: Vec<Value>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl StacAsset {
    fn first_band(&self, key: &str) -> Option<f64> {
        self.raster_bands.first()?.get(key)?.as_f64()
    }

    /// `(scale, offset)` turning stored numbers into physical values as
    /// `dn * scale + offset`; `(1, 0)` without the raster extension
    pub fn scale_offset(&self) -> (f64, f64) {
        (self.first_band("scale").unwrap_or(1.0), self.first_band("offset").unwrap_or(0.0))
    }

    /// Stored no-data value, if declared
    pub fn nodata(&self) -> Option<f64> {
        self.first_band("nodata")
    }
}

/// Link object; `next` links drive pagination
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacLink {
    pub rel: String,
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Merge `body` into the previous request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FIXTURE: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": "LT05_L2SP_045030_19950805_02_T1",
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[-122.9, 41.7], [-120.1, 41.7], [-120.1, 43.8], [-122.9, 43.8], [-122.9, 41.7]]]
      },
      "bbox": [-122.9, 41.7, -120.1, 43.8],
      "properties": {
        "datetime": "1995-08-05T18:21:07.313000Z",
        "eo:cloud_cover": 3.0,
        "platform": "landsat-5",
        "gsd": 30.0,
        "proj:epsg": 32610,
        "landsat:wrs_path": "045"
      },
      "assets": {
        "green": {
          "href": "https://example.com/LT05_SR_B2.TIF",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "title": "Green Band",
          "roles": ["data", "reflectance"],
          "raster:bands": [{"nodata": 0, "scale": 2.75e-05, "offset": -0.2, "data_type": "uint16"}]
        },
        "qa_pixel": {
          "href": "https://example.com/LT05_QA_PIXEL.TIF",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "roles": ["cloud", "cloud-shadow", "snow-ice", "water-mask"],
          "raster:bands": [{"nodata": 1, "data_type": "uint16"}]
        },
        "thumbnail": {
          "href": "https://example.com/thumb.jpeg",
          "type": "image/jpeg",
          "roles": ["thumbnail"]
        }
      },
      "collection": "landsat-c2-l2",
      "links": []
    }
  ],
  "links": [
    {
      "rel": "next",
      "href": "https://planetarycomputer.microsoft.com/api/stac/v1/search",
      "method": "POST",
      "body": {"token": "next:abc123"},
      "merge": true
    },
    {
      "rel": "self",
      "href": "https://planetarycomputer.microsoft.com/api/stac/v1/search"
    }
  ],
  "numberMatched": 42,
  "numberReturned": 1
}"#;

    fn fixture() -> StacItemCollection {
        serde_json::from_str(FIXTURE).unwrap()
    }

    #[test]
    fn parse_item_collection() {
        let col = fixture();
        assert_eq!(col.len(), 1);
        assert_eq!(col.number_matched, Some(42));
    }

    #[test]
    fn parse_item() {
        let item = &fixture().features[0];
        assert_eq!(item.id, "LT05_L2SP_045030_19950805_02_T1");
        assert_eq!(item.collection.as_deref(), Some("landsat-c2-l2"));
        assert_eq!(item.epsg(), Some(32610));
        assert_eq!(item.property_text("platform").as_deref(), Some("landsat-5"));
        assert_eq!(item.property_text("landsat:wrs_path").as_deref(), Some("045"));
        assert_eq!(item.property_text("gsd").as_deref(), Some("30.0"));
        assert_eq!(item.property_text("constellation"), None);
    }

    #[test]
    fn acquired_instant() {
        let item = &fixture().features[0];
        let t = item.acquired().unwrap();
        assert_eq!(t.date_naive(), chrono::NaiveDate::from_ymd_opt(1995, 8, 5).unwrap());
        assert!(t > Utc.with_ymd_and_hms(1995, 8, 5, 18, 21, 7).unwrap());
    }

    #[test]
    fn raster_extension_scale_offset() {
        let item = &fixture().features[0];
        let (scale, offset) = item.asset("green").unwrap().scale_offset();
        assert!((scale - 2.75e-05).abs() < 1e-15);
        assert!((offset + 0.2).abs() < 1e-15);
        assert_eq!(item.asset("green").unwrap().nodata(), Some(0.0));

        // QA band carries no scale: identity
        assert_eq!(item.asset("qa_pixel").unwrap().scale_offset(), (1.0, 0.0));
        assert_eq!(item.asset("thumbnail").unwrap().nodata(), None);
    }

    #[test]
    fn pagination_links() {
        let col = fixture();
        let next = col.next_link().unwrap();
        assert_eq!(next.method.as_deref(), Some("POST"));
        assert_eq!(next.merge, Some(true));
    }

    #[test]
    fn builder_serializes_correctly() {
        let dates = DateRange::calendar_year(1995).unwrap();
        let params = StacSearchParams::new()
            .bbox(-122.5, 42.0, -121.5, 43.0)
            .date_range(&dates)
            .collections(&["landsat-c2-l2"])
            .property_eq("platform", "landsat-5")
            .limit(100);

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["bbox"], serde_json::json!([-122.5, 42.0, -121.5, 43.0]));
        assert_eq!(json["datetime"], "1995-01-01T00:00:00.000Z/1995-12-31T23:59:59.999Z");
        assert_eq!(json["collections"], serde_json::json!(["landsat-c2-l2"]));
        assert_eq!(json["query"]["platform"]["eq"], "landsat-5");
        assert_eq!(json["limit"], 100);
        assert!(json.get("token").is_none());
    }

    #[test]
    fn datetime_upper_bound_keeps_last_second() {
        let dates = DateRange::parse("2003-03-01", "2004-03-01").unwrap();
        let params = StacSearchParams::new().date_range(&dates);
        let interval = params.datetime.unwrap();
        let (_, upper) = interval.split_once('/').unwrap();
        let upper = DateTime::parse_from_rfc3339(upper).unwrap().with_timezone(&Utc);

        let late: DateTime<Utc> = "2004-02-29T23:59:59.400Z".parse().unwrap();
        assert!(dates.contains(&late));
        assert!(late <= upper);
        assert!(upper < dates.end_instant());
    }

    #[test]
    fn empty_params_has_no_fields() {
        let json = serde_json::to_value(StacSearchParams::new()).unwrap();
        assert!(json.as_object().unwrap().is_empty());
    }
}
