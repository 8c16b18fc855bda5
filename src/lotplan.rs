//! Lot/plan token grammar: canonicalization and free-text scanning.
//!
//! A lot/plan token combines a lot identifier with a plan reference
//! (prefix + number), e.g. `4RP30439`. Any accepted written form of the
//! same token normalizes to the identical canonical string.

use crate::error::{ParcelError, Result};
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Spaced form: lot, separator, prefix, optional separator, number.
    static ref SPACED: Regex =
        Regex::new(r"^\s*(\d+[A-Za-z]?)[\s/\-]+([A-Za-z]{1,4})[\s/\-]?(\d+)\s*$").unwrap();
    // Compact form, matched after stripping all separators.
    static ref COMPACT: Regex = Regex::new(r"^(\d+[A-Za-z]?)([A-Za-z]{1,4})(\d+)$").unwrap();
    // Prose scanning needs the closed prefix set; the anchored grammar above
    // accepts any 1-4 letter prefix.
    static ref SCAN_WORDED: Regex = Regex::new(
        r"(?i)\b(?:LOT|L)\s*(\d+[A-Z]?)\s*(?:ON\s*)?((?:RP|SP|CP|DP|CH|CC|BUP|GTP|HBL|HBP)\d+)"
    )
    .unwrap();
    static ref SCAN_SLASHED: Regex =
        Regex::new(r"(?i)\b(\d+[A-Z]?)\s*/\s*((?:RP|SP|CP|DP|CH|CC|BUP|GTP|HBL|HBP)\d+)").unwrap();
}

/// A parsed cadastral lot/plan identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotPlanToken {
    pub lot: String,
    pub plan_prefix: String,
    pub plan_number: String,
}

impl LotPlanToken {
    /// Parse either the spaced or the compact written form.
    pub fn parse(raw: &str) -> Result<Self> {
        if let Some(caps) = SPACED.captures(raw) {
            return Ok(Self::from_parts(&caps[1], &caps[2], &caps[3]));
        }
        let stripped: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '/' && *c != '-')
            .collect();
        if let Some(caps) = COMPACT.captures(&stripped) {
            return Ok(Self::from_parts(&caps[1], &caps[2], &caps[3]));
        }
        Err(ParcelError::InvalidTokenFormat(raw.to_string()))
    }

    fn from_parts(lot: &str, prefix: &str, number: &str) -> Self {
        Self {
            lot: lot.to_uppercase(),
            plan_prefix: prefix.to_uppercase(),
            plan_number: number.to_string(),
        }
    }

    /// Canonical string form: lot + prefix + number, uppercase, no separators.
    pub fn canonical(&self) -> String {
        format!("{}{}{}", self.lot, self.plan_prefix, self.plan_number)
    }
}

/// Normalize a raw lot/plan string to its canonical form.
///
/// Idempotent: the canonical form is itself a valid compact form that
/// normalizes to itself.
pub fn normalize(raw: &str) -> Result<String> {
    LotPlanToken::parse(raw).map(|t| t.canonical())
}

/// Scan free-form document text for lot/plan references.
///
/// Recognizes both the worded form (`Lot 4 on RP30439`, `L4 RP30439`) and
/// the slash form (`4/RP30439`). Returns canonical tokens, first-seen order,
/// de-duplicated.
pub fn scan_text(text: &str) -> Vec<String> {
    let worded = SCAN_WORDED
        .captures_iter(text)
        .map(|c| format!("{}{}", c[1].to_uppercase(), c[2].to_uppercase()));
    let slashed = SCAN_SLASHED
        .captures_iter(text)
        .map(|c| format!("{}{}", c[1].to_uppercase(), c[2].to_uppercase()));
    worded.chain(slashed).unique().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accepts_all_written_forms() {
        for raw in ["4 RP30439", "4RP30439", "4/RP30439", "4-RP-30439", "4 rp 30439"] {
            assert_eq!(normalize(raw).unwrap(), "4RP30439", "form: {raw}");
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize("12a sp 104092").unwrap();
        assert_eq!(once, "12ASP104092");
        assert_eq!(normalize(&once).unwrap(), once);
    }

    #[test]
    fn test_normalize_keeps_lot_letter() {
        let tok = LotPlanToken::parse("4A RP30439").unwrap();
        assert_eq!(tok.lot, "4A");
        assert_eq!(tok.plan_prefix, "RP");
        assert_eq!(tok.plan_number, "30439");
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        for raw in ["not-a-token", "", "RP30439", "4 RP", "4  "] {
            assert!(
                matches!(normalize(raw), Err(ParcelError::InvalidTokenFormat(_))),
                "should reject: {raw}"
            );
        }
    }

    #[test]
    fn test_scan_text_finds_both_wordings() {
        let text = "The land described as Lot 4 on RP30439, together with\n\
                    parcel 7/SP181234 and L12 on DP75544.";
        assert_eq!(scan_text(text), vec!["4RP30439", "12DP75544", "7SP181234"]);
    }

    #[test]
    fn test_scan_text_dedups_preserving_order() {
        let text = "Lot 4 on RP30439 ... also known as 4/RP30439 and Lot 2 on RP30439";
        assert_eq!(scan_text(text), vec!["4RP30439", "2RP30439"]);
    }

    #[test]
    fn test_scan_text_ignores_unknown_prefixes() {
        assert!(scan_text("Lot 4 on XX30439").is_empty());
    }
}
