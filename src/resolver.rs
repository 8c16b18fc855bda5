//! Parcel resolution strategies.
//!
//! Strategy A goes straight from a lot/plan token to the parcel layer.
//! Strategy B goes address layer -> lot/plan tokens -> parcel layer, with a
//! spatial point fallback when no token yields a parcel. Both converge on a
//! deduplicated list of [`ParcelFeature`]s in first-seen order.

use crate::address::StructuredAddress;
use crate::arcgis::{CadastralService, ParcelFeature};
use crate::error::{ParcelError, Result};
use crate::predicate;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Strategy A: parcels for one lot/plan token.
pub async fn resolve_lotplan(
    service: &dyn CadastralService,
    token: &str,
    max_results: u32,
) -> Result<Vec<ParcelFeature>> {
    let filter = predicate::lotplan_where(token);
    service.query_parcels(&filter, max_results).await
}

/// Address-layer stage of strategy B: the lot/plan tokens of every matching
/// address record (order-preserving, de-duplicated, uppercased) plus the
/// first coordinate pair seen, kept as the spatial fallback hint.
pub async fn resolve_lotplans_from_address(
    service: &dyn CadastralService,
    addr: &StructuredAddress,
    relax_no_number: bool,
    max_results: u32,
) -> Result<(Vec<String>, Option<(f64, f64)>)> {
    let filter = predicate::address_where(addr, relax_no_number)?;
    let records = service.query_addresses(&filter, max_results).await?;

    let mut lotplans = Vec::new();
    let mut seen = HashSet::new();
    let mut point = None;
    for record in &records {
        if let Some(lp) = record.properties.lotplan.as_deref() {
            let lp = lp.trim().to_uppercase();
            if !lp.is_empty() && seen.insert(lp.clone()) {
                lotplans.push(lp);
            }
        }
        if point.is_none() {
            point = record.properties.point();
        }
    }
    debug!(count = lotplans.len(), has_point = point.is_some(), "address layer resolved");
    Ok((lotplans, point))
}

/// Strategy B: full address resolution.
///
/// An upstream failure on one lot/plan sub-query skips that token and
/// continues with the rest; the spatial fallback still runs if nothing else
/// produced a parcel. Validation failures from predicate construction abort
/// immediately.
pub async fn resolve_address(
    service: &dyn CadastralService,
    addr: &StructuredAddress,
    relax_no_number: bool,
    max_results: u32,
) -> Result<Vec<ParcelFeature>> {
    let (lotplans, point) = resolve_lotplans_from_address(service, addr, relax_no_number, max_results).await?;

    let mut found = Vec::new();
    for lp in &lotplans {
        match resolve_lotplan(service, lp, max_results).await {
            Ok(batch) => found.extend(batch),
            Err(ParcelError::Upstream(msg)) => {
                warn!(lotplan = %lp, error = %msg, "parcel sub-query failed, skipping token");
            }
            Err(e) => return Err(e),
        }
    }

    if found.is_empty() {
        if let Some((lat, lon)) = point {
            debug!(lat, lon, "no parcels via lot/plan, falling back to point intersect");
            found = service.query_parcels_at_point(lat, lon, max_results).await?;
        }
    }

    Ok(dedup(found))
}

/// Drop repeated records, keyed by `(objectid, lotplan)`, first-seen order.
pub fn dedup(features: Vec<ParcelFeature>) -> Vec<ParcelFeature> {
    let mut seen = HashSet::new();
    features
        .into_iter()
        .filter(|f| seen.insert(f.dedup_key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::structure;
    use crate::arcgis::AddressFeature;
    use crate::predicate::Predicate;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn parcel(lotplan: &str, objectid: i64) -> ParcelFeature {
        serde_json::from_value(serde_json::json!({
            "geometry": null,
            "properties": {"lotplan": lotplan, "objectid": objectid}
        }))
        .unwrap()
    }

    fn address_record(lotplan: &str, lat: f64, lon: f64) -> AddressFeature {
        serde_json::from_value(serde_json::json!({
            "geometry": null,
            "properties": {"lotplan": lotplan, "latitude": lat, "longitude": lon}
        }))
        .unwrap()
    }

    /// Canned service: address records, per-token parcel batches, and a log
    /// of every `where` string issued.
    struct StubService {
        addresses: Vec<AddressFeature>,
        parcels: Vec<(String, std::result::Result<Vec<ParcelFeature>, String>)>,
        point_parcels: Vec<ParcelFeature>,
        queries: Mutex<Vec<String>>,
    }

    impl StubService {
        fn new() -> Self {
            Self {
                addresses: Vec::new(),
                parcels: Vec::new(),
                point_parcels: Vec::new(),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CadastralService for StubService {
        async fn query_addresses(
            &self,
            filter: &Predicate,
            _max_results: u32,
        ) -> Result<Vec<AddressFeature>> {
            self.queries.lock().unwrap().push(filter.build());
            Ok(self.addresses.clone())
        }

        async fn query_parcels(
            &self,
            filter: &Predicate,
            _max_results: u32,
        ) -> Result<Vec<ParcelFeature>> {
            let clause = filter.build();
            self.queries.lock().unwrap().push(clause.clone());
            for (token, outcome) in &self.parcels {
                if clause.contains(token.as_str()) {
                    return outcome
                        .clone()
                        .map_err(ParcelError::Upstream);
                }
            }
            Ok(Vec::new())
        }

        async fn query_parcels_at_point(
            &self,
            _lat: f64,
            _lon: f64,
            _max_results: u32,
        ) -> Result<Vec<ParcelFeature>> {
            self.queries.lock().unwrap().push("point".to_string());
            Ok(self.point_parcels.clone())
        }
    }

    #[tokio::test]
    async fn test_equivalent_token_forms_issue_identical_queries() {
        let svc = StubService::new();
        resolve_lotplan(&svc, "4RP30439", 10).await.unwrap();
        resolve_lotplan(&svc, "4 RP 30439", 10).await.unwrap();
        let queries = svc.queries.lock().unwrap();
        assert_eq!(queries[0], queries[1]);
    }

    #[tokio::test]
    async fn test_address_resolution_dedups_results() {
        let mut svc = StubService::new();
        svc.addresses = vec![
            address_record("4RP30439", -27.0, 152.0),
            address_record("4RP30439", -27.0, 152.0),
            address_record("5RP30439", -27.1, 152.1),
        ];
        svc.parcels = vec![
            ("4RP30439".to_string(), Ok(vec![parcel("4RP30439", 1), parcel("4RP30439", 1)])),
            ("5RP30439".to_string(), Ok(vec![parcel("5RP30439", 2)])),
        ];
        let addr = &structure("12 Smith Street, Brisbane, QLD 4000")[0];
        let out = resolve_address(&svc, addr, false, 50).await.unwrap();
        let keys: Vec<_> = out.iter().map(|f| f.dedup_key()).collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(out[0].properties.objectid, Some(1));
        assert_eq!(out[1].properties.objectid, Some(2));
    }

    #[tokio::test]
    async fn test_failed_sub_query_skips_token_and_continues() {
        let mut svc = StubService::new();
        svc.addresses = vec![
            address_record("4RP30439", -27.0, 152.0),
            address_record("5RP30439", -27.1, 152.1),
        ];
        svc.parcels = vec![
            ("4RP30439".to_string(), Err("HTTP 503".to_string())),
            ("5RP30439".to_string(), Ok(vec![parcel("5RP30439", 2)])),
        ];
        let addr = &structure("12 Smith Street, Brisbane, QLD 4000")[0];
        let out = resolve_address(&svc, addr, false, 50).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].properties.lotplan.as_deref(), Some("5RP30439"));
    }

    #[tokio::test]
    async fn test_point_fallback_when_no_lotplan_matches() {
        let mut svc = StubService::new();
        svc.addresses = vec![address_record("99SP999", -27.0, 152.0)];
        svc.point_parcels = vec![parcel("4RP30439", 9)];
        let addr = &structure("12 Smith Street, Brisbane, QLD 4000")[0];
        let out = resolve_address(&svc, addr, false, 50).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].properties.objectid, Some(9));
        assert!(svc.queries.lock().unwrap().contains(&"point".to_string()));
    }

    #[tokio::test]
    async fn test_missing_house_number_fails_validation() {
        let svc = StubService::new();
        let mut addr = structure("12 Smith Street, Brisbane, QLD 4000")[0].clone();
        addr.house_number = None;
        addr.original = String::new();
        assert!(matches!(
            resolve_address(&svc, &addr, false, 50).await,
            Err(ParcelError::Validation(_))
        ));
    }

    #[test]
    fn test_dedup_never_repeats_a_key() {
        let feats = vec![
            parcel("4RP30439", 1),
            parcel("4RP30439", 1),
            parcel("4RP30439", 2),
            parcel("5RP30439", 1),
        ];
        let out = dedup(feats);
        let keys: HashSet<_> = out.iter().map(|f| f.dedup_key()).collect();
        assert_eq!(out.len(), keys.len());
        assert_eq!(out.len(), 3);
    }
}
