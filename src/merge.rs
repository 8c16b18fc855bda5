//! Aggregation: geometric merge of duplicate parcels and result-set labeling.

use crate::arcgis::{CadastralService, ParcelFeature, ParcelProperties};
use crate::predicate;
use geo::BooleanOps;
use geo_types::{Geometry as GeoGeometry, MultiPolygon};
use itertools::Itertools;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Label used when nothing better is available.
pub const DEFAULT_LABEL: &str = "parcels";

const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MergeKey {
    LotPlan(String),
    Object(i64),
    // Neither identifier present: the record is its own group.
    Anonymous(usize),
}

fn merge_key(feature: &ParcelFeature, ordinal: usize) -> MergeKey {
    if let Some(lp) = feature.properties.lotplan.as_deref().filter(|s| !s.is_empty()) {
        MergeKey::LotPlan(lp.to_uppercase())
    } else if let Some(oid) = feature.properties.objectid {
        MergeKey::Object(oid)
    } else {
        MergeKey::Anonymous(ordinal)
    }
}

fn polygonal_parts(geometry: &geojson::Geometry) -> Option<MultiPolygon<f64>> {
    match GeoGeometry::<f64>::try_from(geometry.value.clone()).ok()? {
        GeoGeometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        GeoGeometry::MultiPolygon(mp) => Some(mp),
        _ => None,
    }
}

fn props_are_empty(props: &ParcelProperties) -> bool {
    props.lotplan.is_none()
        && props.objectid.is_none()
        && props.lot.is_none()
        && props.plan.is_none()
        && props.tenure.is_none()
        && props.locality.is_none()
        && props.shire_name.is_none()
}

/// Union parcel records that represent the same real-world parcel.
///
/// Records are grouped by lot/plan when present, else object id. Polygonal
/// geometries within a group are unioned into one feature, holes preserved;
/// a group whose union degenerates to nothing is dropped. Records with no
/// geometry, or with non-area geometry, pass through unchanged. Group order
/// follows each group's first appearance.
pub fn merge(features: Vec<ParcelFeature>) -> Vec<ParcelFeature> {
    enum Slot {
        Passthrough(ParcelFeature),
        Group(MergeKey),
    }

    let mut order: Vec<Slot> = Vec::new();
    let mut groups: HashMap<MergeKey, Vec<(ParcelFeature, MultiPolygon<f64>)>> = HashMap::new();

    for (ordinal, feature) in features.into_iter().enumerate() {
        let parts = feature.geometry.as_ref().and_then(polygonal_parts);
        match parts {
            None => order.push(Slot::Passthrough(feature)),
            Some(parts) => {
                let key = merge_key(&feature, ordinal);
                let entry = groups.entry(key.clone()).or_default();
                if entry.is_empty() {
                    order.push(Slot::Group(key));
                }
                entry.push((feature, parts));
            }
        }
    }

    let mut out = Vec::new();
    for slot in order {
        match slot {
            Slot::Passthrough(f) => out.push(f),
            Slot::Group(key) => {
                let members = groups.remove(&key).unwrap_or_default();
                if let Some(f) = merge_group(members) {
                    out.push(f);
                }
            }
        }
    }
    out
}

fn merge_group(members: Vec<(ParcelFeature, MultiPolygon<f64>)>) -> Option<ParcelFeature> {
    let first = members.first()?.0.clone();
    let mut union: Option<MultiPolygon<f64>> = None;
    for (_, parts) in &members {
        union = Some(match union {
            None => parts.clone(),
            Some(acc) => acc.union(parts),
        });
    }
    let union = union?;
    if union.0.is_empty() {
        debug!("union degenerated to empty, dropping group");
        return None;
    }

    let mut properties = members
        .iter()
        .map(|(f, _)| &f.properties)
        .find(|p| !props_are_empty(p))
        .cloned()
        .unwrap_or_default();
    if properties.lotplan.as_deref().unwrap_or("").is_empty() {
        properties.lotplan = Some(first.display_name());
    }

    let value = if union.0.len() == 1 {
        geojson::Value::from(&union.0[0])
    } else {
        geojson::Value::from(&union)
    };
    Some(ParcelFeature {
        geometry: Some(geojson::Geometry::new(value)),
        properties,
    })
}

/// Bounded, memoizing lot/plan -> address-label cache.
///
/// Entries are never invalidated; stale labels after upstream edits are an
/// accepted tradeoff. Recomputation is pure, so redundant concurrent fills
/// are harmless.
pub struct LabelCache {
    inner: Mutex<LruCache<String, Option<String>>>,
}

impl LabelCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn get(&self, key: &str) -> Option<Option<String>> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: String, value: Option<String>) {
        self.inner.lock().unwrap().put(key, value);
    }
}

impl Default for LabelCache {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap())
    }
}

/// Chooses display labels for result sets, memoizing reverse lookups.
pub struct Aggregator {
    service: Arc<dyn CadastralService>,
    cache: LabelCache,
}

impl Aggregator {
    pub fn new(service: Arc<dyn CadastralService>, cache: LabelCache) -> Self {
        Self { service, cache }
    }

    /// Label priority: reverse address lookup on any lot/plan in the set,
    /// then the caller's fallback, then the first raw lot/plan value, then
    /// [`DEFAULT_LABEL`].
    pub async fn label_for(&self, features: &[ParcelFeature], fallback: Option<&str>) -> String {
        let lotplans: Vec<String> = features
            .iter()
            .filter_map(|f| f.properties.lotplan.as_deref())
            .map(|lp| lp.trim().to_uppercase())
            .filter(|lp| !lp.is_empty())
            .unique()
            .collect();

        for lp in &lotplans {
            if let Some(label) = self.reverse_label(lp).await {
                return label;
            }
        }
        if let Some(fb) = fallback.map(str::trim).filter(|s| !s.is_empty()) {
            return fb.to_string();
        }
        if let Some(lp) = lotplans.first() {
            return lp.clone();
        }
        DEFAULT_LABEL.to_string()
    }

    async fn reverse_label(&self, lotplan: &str) -> Option<String> {
        if let Some(cached) = self.cache.get(lotplan) {
            return cached;
        }
        let filter = predicate::lotplan_where(lotplan);
        let label = match self.service.query_addresses(&filter, 1).await {
            Ok(records) => records
                .iter()
                .filter_map(|r| r.properties.address.as_deref())
                .map(str::trim)
                .find(|a| !a.is_empty())
                .map(str::to_string),
            Err(e) => {
                // Labels are best-effort; a failed lookup is not cached so a
                // later request can retry.
                warn!(lotplan = %lotplan, error = %e, "reverse label lookup failed");
                return None;
            }
        };
        self.cache.put(lotplan.to_string(), label.clone());
        label
    }
}
