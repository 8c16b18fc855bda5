//! Upstream service configuration, fixed at process start.

use crate::error::{ParcelError, Result};

const DEFAULT_BASE: &str = "https://spatial-gis.information.qld.gov.au/arcgis/rest/services/PlanningCadastre/LandParcelPropertyFramework/MapServer";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base MapServer URL, without a trailing slash.
    pub base_url: String,
    /// Layer index of the address point layer.
    pub address_layer: u32,
    /// Layer index of the cadastral parcel layer.
    pub parcels_layer: u32,
    /// Optional bearer-style token attached to every query.
    pub auth_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("QLD_MAPSERVER_BASE")
            .unwrap_or_else(|_| DEFAULT_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let address_layer = layer_index("QLD_ADDRESS_LAYER", 0)?;
        let parcels_layer = layer_index("QLD_PARCELS_LAYER", 4)?;
        let auth_token = std::env::var("ARCGIS_AUTH_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        Ok(Self {
            base_url,
            address_layer,
            parcels_layer,
            auth_token,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE.trim_end_matches('/').to_string(),
            address_layer: 0,
            parcels_layer: 4,
            auth_token: None,
        }
    }
}

fn layer_index(var: &str, default: u32) -> Result<u32> {
    match std::env::var(var) {
        Ok(v) => v
            .parse::<u32>()
            .map_err(|_| ParcelError::Config(format!("{} must be a layer index, got '{}'", var, v))),
        Err(_) => Ok(default),
    }
}
