//! Typed client for the cadastral query service.
//!
//! The service is an ArcGIS-compatible MapServer exposing two query layers:
//! an address point layer and a cadastral parcel layer. Every query requests
//! GeoJSON output with all attributes in WGS84.

use crate::config::Config;
use crate::error::{ParcelError, Result};
use crate::predicate::Predicate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Parcel-layer record properties this pipeline depends on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParcelProperties {
    #[serde(default)]
    pub lotplan: Option<String>,
    #[serde(default)]
    pub objectid: Option<i64>,
    #[serde(default)]
    pub lot: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub tenure: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub shire_name: Option<String>,
}

/// One parcel record: boundary geometry plus registry attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelFeature {
    #[serde(default)]
    pub geometry: Option<geojson::Geometry>,
    #[serde(default)]
    pub properties: ParcelProperties,
}

impl ParcelFeature {
    /// Identity key for deduplication. When the lot/plan is absent the
    /// object id alone identifies the record.
    pub fn dedup_key(&self) -> (Option<i64>, Option<String>) {
        (self.properties.objectid, self.properties.lotplan.clone())
    }

    /// Human-facing name for one record.
    pub fn display_name(&self) -> String {
        if let Some(lp) = self.properties.lotplan.as_deref().filter(|s| !s.is_empty()) {
            lp.to_string()
        } else if let Some(oid) = self.properties.objectid {
            format!("Parcel {}", oid)
        } else {
            "parcel".to_string()
        }
    }
}

/// Address-layer record properties.
///
/// Latitude/longitude come back as numbers or numeric strings depending on
/// the layer metadata, hence the loose value type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressProperties {
    #[serde(default)]
    pub lotplan: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub street_number: Option<String>,
    #[serde(default)]
    pub street_name: Option<String>,
    #[serde(default)]
    pub street_type: Option<String>,
    #[serde(default)]
    pub street_suffix: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<serde_json::Value>,
    #[serde(default)]
    pub longitude: Option<serde_json::Value>,
    #[serde(default)]
    pub objectid: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressFeature {
    #[serde(default)]
    pub geometry: Option<geojson::Geometry>,
    #[serde(default)]
    pub properties: AddressProperties,
}

impl AddressProperties {
    pub fn point(&self) -> Option<(f64, f64)> {
        Some((coord(self.latitude.as_ref()?)?, coord(self.longitude.as_ref()?)?))
    }
}

// Some layer configurations serve street numbers as JSON numbers.
fn de_opt_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

fn coord(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct ParcelCollection {
    #[serde(default)]
    features: Vec<ParcelFeature>,
}

#[derive(Debug, Deserialize)]
struct AddressCollection {
    #[serde(default)]
    features: Vec<AddressFeature>,
}

/// Query seam over the cadastral service, so resolution and labeling are
/// testable without a live MapServer.
#[async_trait]
pub trait CadastralService: Send + Sync {
    /// Run a filter predicate against the address layer.
    async fn query_addresses(&self, filter: &Predicate, max_results: u32)
        -> Result<Vec<AddressFeature>>;

    /// Run a filter predicate against the parcel layer.
    async fn query_parcels(&self, filter: &Predicate, max_results: u32)
        -> Result<Vec<ParcelFeature>>;

    /// Spatial fallback: parcels intersecting a WGS84 point.
    async fn query_parcels_at_point(
        &self,
        lat: f64,
        lon: f64,
        max_results: u32,
    ) -> Result<Vec<ParcelFeature>>;
}

/// HTTP client against the configured MapServer.
pub struct ArcGisClient {
    http: reqwest::Client,
    config: Config,
}

impl ArcGisClient {
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(QUERY_TIMEOUT).build()?;
        Ok(Self { http, config })
    }

    fn layer_url(&self, layer: u32) -> String {
        format!("{}/{}/query", self.config.base_url, layer)
    }

    async fn query_layer(&self, layer: u32, mut params: Vec<(String, String)>) -> Result<String> {
        params.push(("f".to_string(), "geojson".to_string()));
        params.push(("outFields".to_string(), "*".to_string()));
        params.push(("returnGeometry".to_string(), "true".to_string()));
        params.push(("outSR".to_string(), "4326".to_string()));
        if let Some(token) = &self.config.auth_token {
            params.push(("token".to_string(), token.clone()));
        }
        let url = self.layer_url(layer);
        debug!(layer, %url, "cadastral query");
        let resp = self.http.get(&url).query(&params).send().await?;
        if !resp.status().is_success() {
            return Err(ParcelError::Upstream(format!(
                "layer {} query returned HTTP {}",
                layer,
                resp.status()
            )));
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl CadastralService for ArcGisClient {
    async fn query_addresses(
        &self,
        filter: &Predicate,
        max_results: u32,
    ) -> Result<Vec<AddressFeature>> {
        let params = vec![
            ("where".to_string(), filter.build()),
            ("resultRecordCount".to_string(), max_results.to_string()),
        ];
        let body = self.query_layer(self.config.address_layer, params).await?;
        let coll: AddressCollection = serde_json::from_str(&body)?;
        Ok(coll.features)
    }

    async fn query_parcels(
        &self,
        filter: &Predicate,
        max_results: u32,
    ) -> Result<Vec<ParcelFeature>> {
        let params = vec![
            ("where".to_string(), filter.build()),
            ("resultRecordCount".to_string(), max_results.to_string()),
        ];
        let body = self.query_layer(self.config.parcels_layer, params).await?;
        let coll: ParcelCollection = serde_json::from_str(&body)?;
        Ok(coll.features)
    }

    async fn query_parcels_at_point(
        &self,
        lat: f64,
        lon: f64,
        max_results: u32,
    ) -> Result<Vec<ParcelFeature>> {
        let geometry = serde_json::json!({
            "x": lon,
            "y": lat,
            "spatialReference": {"wkid": 4326}
        });
        let params = vec![
            ("geometry".to_string(), geometry.to_string()),
            ("geometryType".to_string(), "esriGeometryPoint".to_string()),
            ("inSR".to_string(), "4326".to_string()),
            ("spatialRel".to_string(), "esriSpatialRelIntersects".to_string()),
            ("resultRecordCount".to_string(), max_results.to_string()),
        ];
        let body = self.query_layer(self.config.parcels_layer, params).await?;
        let coll: ParcelCollection = serde_json::from_str(&body)?;
        Ok(coll.features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parcel_collection_deserializes_geojson() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Polygon", "coordinates": [[[152.0, -27.0], [152.1, -27.0], [152.1, -27.1], [152.0, -27.0]]]},
                "properties": {"lotplan": "4RP30439", "objectid": 7, "tenure": "Freehold", "extra_field": true}
            }]
        }"#;
        let coll: ParcelCollection = serde_json::from_str(body).unwrap();
        assert_eq!(coll.features.len(), 1);
        let f = &coll.features[0];
        assert_eq!(f.properties.lotplan.as_deref(), Some("4RP30439"));
        assert_eq!(f.properties.objectid, Some(7));
        assert_eq!(f.display_name(), "4RP30439");
        assert!(f.geometry.is_some());
    }

    #[test]
    fn test_address_point_accepts_string_coordinates() {
        let props: AddressProperties = serde_json::from_str(
            r#"{"latitude": "-27.47", "longitude": 153.02}"#,
        )
        .unwrap();
        assert_eq!(props.point(), Some((-27.47, 153.02)));
    }

    #[test]
    fn test_address_street_number_accepts_numbers_and_strings() {
        let props: AddressProperties =
            serde_json::from_str(r#"{"street_number": 12, "street_name": "SMITH"}"#).unwrap();
        assert_eq!(props.street_number.as_deref(), Some("12"));
        let props: AddressProperties =
            serde_json::from_str(r#"{"street_number": "12B"}"#).unwrap();
        assert_eq!(props.street_number.as_deref(), Some("12B"));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let f: ParcelFeature =
            serde_json::from_str(r#"{"geometry": null, "properties": {"objectid": 12}}"#).unwrap();
        assert_eq!(f.display_name(), "Parcel 12");
        let f: ParcelFeature = serde_json::from_str(r#"{"geometry": null, "properties": {}}"#).unwrap();
        assert_eq!(f.display_name(), "parcel");
    }
}
