//! End-to-end pipeline: raw document text -> resolved parcels -> labeled
//! group ready for KMZ serialization.

use crate::address;
use crate::arcgis::{CadastralService, ParcelFeature};
use crate::error::{ParcelError, Result};
use crate::kmz::ResolutionGroup;
use crate::lotplan;
use crate::merge::{self, Aggregator, LabelCache, DEFAULT_LABEL};
use crate::resolver;
use std::sync::Arc;
use tracing::{debug, info};

/// How many scanned lot/plan tokens one document may resolve.
const MAX_DOCUMENT_TOKENS: usize = 100;
/// How many address candidates one document may try.
const MAX_DOCUMENT_ADDRESSES: usize = 5;
/// Cap on the joined multi-token label.
const MAX_LABEL_LEN: usize = 120;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_results: u32,
    pub relax_no_number: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_results: 300,
            relax_no_number: false,
        }
    }
}

pub struct Pipeline {
    service: Arc<dyn CadastralService>,
    aggregator: Aggregator,
}

impl Pipeline {
    pub fn new(service: Arc<dyn CadastralService>, cache: LabelCache) -> Self {
        let aggregator = Aggregator::new(service.clone(), cache);
        Self {
            service,
            aggregator,
        }
    }

    /// Resolve a raw document: lot/plan tokens take precedence, address
    /// candidates are the fallback. Fails with `NotFound` once both
    /// strategies are exhausted.
    pub async fn resolve_document(
        &self,
        text: &str,
        options: &PipelineOptions,
    ) -> Result<ResolutionGroup> {
        let tokens = lotplan::scan_text(text);
        if !tokens.is_empty() {
            debug!(count = tokens.len(), "document yielded lot/plan tokens");
            let mut found = Vec::new();
            for token in tokens.iter().take(MAX_DOCUMENT_TOKENS) {
                found.extend(resolver::resolve_lotplan(self.service.as_ref(), token, options.max_results).await?);
            }
            let found = resolver::dedup(found);
            if !found.is_empty() {
                let label = self.aggregator.label_for(&found, None).await;
                return Ok(self.finish(label, found));
            }
        }

        for addr in address::structure(text).iter().take(MAX_DOCUMENT_ADDRESSES) {
            let label = document_address_label(addr);
            let found =
                resolver::resolve_address(self.service.as_ref(), addr, options.relax_no_number, options.max_results)
                    .await?;
            if !found.is_empty() {
                info!(label = %label, parcels = found.len(), "resolved via address candidate");
                return Ok(self.finish(label, found));
            }
        }

        Err(ParcelError::NotFound(
            "no parcels found for the extracted details".to_string(),
        ))
    }

    /// Resolve an explicit list of lot/plan tokens (strategy A per token).
    pub async fn resolve_tokens(
        &self,
        tokens: &[String],
        options: &PipelineOptions,
    ) -> Result<ResolutionGroup> {
        if tokens.is_empty() {
            return Err(ParcelError::Validation("no lot/plan tokens supplied".to_string()));
        }
        let mut found = Vec::new();
        for token in tokens {
            found.extend(resolver::resolve_lotplan(self.service.as_ref(), token, options.max_results).await?);
        }
        let found = resolver::dedup(found);
        if found.is_empty() {
            return Err(ParcelError::NotFound(
                "no parcels found for given lot/plan token(s)".to_string(),
            ));
        }
        let mut label = tokens
            .iter()
            .map(|t| lotplan::normalize(t).unwrap_or_else(|_| t.trim().to_uppercase()))
            .collect::<Vec<_>>()
            .join(" & ");
        // Cap in characters; byte truncation would split multibyte input.
        if label.chars().count() > MAX_LABEL_LEN {
            label = label.chars().take(MAX_LABEL_LEN).collect();
        }
        Ok(self.finish(label, found))
    }

    /// Resolve a single free-form address line.
    pub async fn resolve_address_line(
        &self,
        line: &str,
        options: &PipelineOptions,
    ) -> Result<ResolutionGroup> {
        let candidates = address::structure(line);
        let addr = candidates.first().ok_or_else(|| {
            ParcelError::Validation(format!("line does not match the address grammar: {}", line))
        })?;
        let found =
            resolver::resolve_address(self.service.as_ref(), addr, options.relax_no_number, options.max_results)
                .await?;
        if found.is_empty() {
            return Err(ParcelError::NotFound(
                "no parcels found from provided address".to_string(),
            ));
        }
        let fallback = document_address_label(addr);
        let label = self.aggregator.label_for(&found, Some(&fallback)).await;
        Ok(self.finish(label, found))
    }

    fn finish(&self, label: String, features: Vec<ParcelFeature>) -> ResolutionGroup {
        ResolutionGroup {
            label,
            features: merge::merge(features),
        }
    }
}

/// Folder label for an address candidate: the property name prefixes the
/// original line unless the line already starts with it.
fn document_address_label(addr: &crate::address::StructuredAddress) -> String {
    match &addr.property_name {
        Some(name) if !addr.original.to_lowercase().starts_with(&name.to_lowercase()) => {
            format!("{} {}", name, addr.original)
        }
        _ => addr.original.clone(),
    }
}

/// Restrict a label to characters safe for folder and file names.
pub fn safe_folder_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | ','))
        .collect();
    let cleaned = kept
        .replace(",,", ",")
        .trim()
        .trim_matches(',')
        .to_string();
    if cleaned.is_empty() {
        DEFAULT_LABEL.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_folder_name_strips_punctuation() {
        assert_eq!(safe_folder_name("4RP30439 & 5/SP181234"), "4RP30439  5SP181234");
        assert_eq!(safe_folder_name("\"Willow Park\", Toowoomba"), "Willow Park, Toowoomba");
        assert_eq!(safe_folder_name("///"), "parcels");
        assert_eq!(safe_folder_name(""), "parcels");
    }

    #[test]
    fn test_document_address_label_prefixes_property_name() {
        let addr = &crate::address::structure("\"Willow Park\" 45 River Road, Toowoomba, QLD")[0];
        assert_eq!(
            document_address_label(addr),
            "Willow Park \"Willow Park\" 45 River Road, Toowoomba, QLD"
        );
    }
}
