//! Declarative filter predicates for the cadastral query layers.
//!
//! The ArcGIS query endpoint only accepts a literal `where` string, so
//! parameterization is unavailable; every literal passes through [`escape`],
//! which doubles embedded single quotes. That is a legacy-compatible escape
//! path, not a complete defense against arbitrary metacharacters, so callers
//! must never interpolate values into clauses themselves.

use crate::address::StructuredAddress;
use crate::error::{ParcelError, Result};
use crate::lotplan;

// Address layer fields.
pub const F_ADDRESS: &str = "address";
pub const F_STREET_NUMBER: &str = "street_number";
pub const F_STREET_NAME: &str = "street_name";
pub const F_STREET_TYPE: &str = "street_type";
pub const F_STREET_SUFFIX: &str = "street_suffix";
pub const F_LOCALITY: &str = "locality";
pub const F_STATE: &str = "state";
// Shared by both layers.
pub const F_LOTPLAN: &str = "lotplan";

/// Conjunction of field clauses, rendered as a `where` string.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    clauses: Vec<String>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive exact match: `UPPER(field) = UPPER('value')`.
    pub fn eq(mut self, field: &str, value: &str) -> Self {
        self.clauses
            .push(format!("UPPER({}) = UPPER('{}')", field, escape(value)));
        self
    }

    /// Case-insensitive substring match: `UPPER(field) LIKE '%VALUE%'`.
    pub fn contains(mut self, field: &str, value: &str) -> Self {
        self.clauses.push(format!(
            "UPPER({}) LIKE '%{}%'",
            field,
            escape(&value.to_uppercase())
        ));
        self
    }

    /// Substring match against any of several fields, OR-ed together.
    pub fn any_contains(mut self, fields: &[&str], value: &str) -> Self {
        let v = escape(&value.to_uppercase());
        let alts: Vec<String> = fields
            .iter()
            .map(|f| format!("UPPER({}) LIKE '%{}%'", f, v))
            .collect();
        self.clauses.push(format!("({})", alts.join(" OR ")));
        self
    }

    /// Render the `where` string. An empty predicate matches everything.
    pub fn build(&self) -> String {
        if self.clauses.is_empty() {
            "1=1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }
}

/// Double embedded single quotes for interpolation into a string literal.
fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

/// Address-layer predicate for a structured address.
///
/// The full original line, when present, is matched as a complete value and
/// also stands in for a missing house number; otherwise a missing house
/// number fails validation unless `relax_no_number` is set.
pub fn address_where(addr: &StructuredAddress, relax_no_number: bool) -> Result<Predicate> {
    let mut p = Predicate::new();
    if !addr.original.is_empty() {
        p = p.eq(F_ADDRESS, &addr.original);
    }
    if let Some(number) = &addr.house_number {
        p = p.eq(F_STREET_NUMBER, number);
    } else if !relax_no_number && addr.original.is_empty() {
        return Err(ParcelError::Validation(
            "address has no house number and relax_no_number is not set".to_string(),
        ));
    }
    if !addr.street.is_empty() {
        p = p.contains(F_STREET_NAME, &addr.street);
    }
    if let Some(suffix) = &addr.suffix {
        p = p.any_contains(&[F_STREET_TYPE, F_STREET_SUFFIX], suffix);
    }
    if !addr.suburb.is_empty() {
        p = p.eq(F_LOCALITY, &addr.suburb);
    }
    if !addr.state.is_empty() {
        p = p.eq(F_STATE, &addr.state);
    }
    Ok(p)
}

/// Parcel-layer predicate for a lot/plan token.
///
/// A token that canonicalizes gets an exact equality clause; anything else
/// falls back to an uppercased substring match, which risks collisions
/// between unrelated plans and is therefore the weaker path.
pub fn lotplan_where(token: &str) -> Predicate {
    match lotplan::normalize(token) {
        Ok(canonical) => Predicate::new().eq(F_LOTPLAN, &canonical),
        Err(_) => Predicate::new().contains(F_LOTPLAN, token.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::structure;

    #[test]
    fn test_quote_doubling() {
        let p = Predicate::new().eq(F_LOCALITY, "O'REILLY");
        assert_eq!(p.build(), "UPPER(locality) = UPPER('O''REILLY')");
    }

    #[test]
    fn test_empty_predicate_matches_everything() {
        assert_eq!(Predicate::new().build(), "1=1");
    }

    #[test]
    fn test_lotplan_exact_when_canonical() {
        assert_eq!(
            lotplan_where("4 RP 30439").build(),
            "UPPER(lotplan) = UPPER('4RP30439')"
        );
        // Same canonical form regardless of the written form.
        assert_eq!(lotplan_where("4RP30439").build(), lotplan_where("4/RP30439").build());
    }

    #[test]
    fn test_lotplan_substring_fallback() {
        assert_eq!(
            lotplan_where(" rp30439 ").build(),
            "UPPER(lotplan) LIKE '%RP30439%'"
        );
    }

    #[test]
    fn test_address_where_full_line() {
        let addr = &structure("12 Smith Street, Brisbane, QLD 4000")[0];
        let w = address_where(addr, false).unwrap().build();
        assert!(w.starts_with("UPPER(address) = UPPER('12 Smith Street, Brisbane, QLD 4000')"));
        assert!(w.contains("UPPER(street_number) = UPPER('12')"));
        assert!(w.contains("UPPER(street_name) LIKE '%SMITH%'"));
        assert!(w.contains("(UPPER(street_type) LIKE '%STREET%' OR UPPER(street_suffix) LIKE '%STREET%')"));
        assert!(w.contains("UPPER(locality) = UPPER('BRISBANE')"));
        assert!(w.contains("UPPER(state) = UPPER('QLD')"));
    }

    #[test]
    fn test_address_where_requires_house_number() {
        let addr = StructuredAddress {
            property_name: None,
            house_number: None,
            street: "SMITH".to_string(),
            suffix: None,
            suburb: "BRISBANE".to_string(),
            state: "QLD".to_string(),
            postcode: None,
            original: String::new(),
        };
        assert!(matches!(
            address_where(&addr, false),
            Err(ParcelError::Validation(_))
        ));
        assert!(address_where(&addr, true).is_ok());
    }
}
