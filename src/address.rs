//! Address grammar: one structured candidate per matching input line.

use lazy_static::lazy_static;
use regex::Regex;

/// Cap on candidates produced from one document.
const MAX_CANDIDATES: usize = 10;

lazy_static! {
    static ref LINE: Regex = Regex::new(
        r#"(?i)(?:^"?(?P<prop>[^",]+?)"?\s*,?\s+)?(?:(?P<number>\d{1,5}[A-Z]?)\s+)?(?P<street>[A-Za-z0-9 .'\-]+?)\s+(?P<suffix>Road|Rd|Street|St|Avenue|Ave|Highway|Hwy|Drive|Dr|Court|Ct|Place|Pl|Boulevard|Blvd|Way|Lane|Ln|Crescent|Cres|Terrace|Tce|Close|Cl)?\s*,\s*(?P<suburb>[A-Za-z ]+)\s*,\s*(?P<state>QLD|NSW|VIC|SA|WA|TAS|NT|ACT)\b(?:\s+(?P<pcode>\d{4}))?\s*$"#
    )
    .unwrap();
}

/// One address candidate parsed from a single input line.
///
/// `original` is the raw source line; it is always retained for exact-match
/// queries and fallback labeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredAddress {
    pub property_name: Option<String>,
    pub house_number: Option<String>,
    pub street: String,
    pub suffix: Option<String>,
    pub suburb: String,
    pub state: String,
    pub postcode: Option<u32>,
    pub original: String,
}

/// Parse raw (possibly multi-line) text into ordered address candidates.
///
/// Lines that fail the grammar are skipped, not errors. At most ten
/// candidates are produced; callers wanting a single best guess take the
/// first.
pub fn structure(text: &str) -> Vec<StructuredAddress> {
    text.lines()
        .map(str::trim)
        .filter(|ln| !ln.is_empty())
        .filter_map(parse_line)
        .take(MAX_CANDIDATES)
        .collect()
}

fn parse_line(line: &str) -> Option<StructuredAddress> {
    // En/em dashes show up in scraped documents; fold them before matching.
    let normalized = line.replace(" \u{2013} ", " - ").replace('\u{2014}', "-");
    let caps = LINE.captures(&normalized)?;

    let mut property_name = caps
        .name("prop")
        .map(|m| m.as_str().trim_matches(|c| c == ' ' || c == '"' || c == '\'').to_string())
        .filter(|s| !s.is_empty());
    let mut house_number = caps.name("number").map(|m| m.as_str().to_uppercase());

    // "123, Smith St, ..." parses with the bare numeral in the property-name
    // slot; reinterpret it as the house number.
    if house_number.is_none() {
        if let Some(prop) = &property_name {
            if prop.chars().all(|c| c.is_ascii_digit()) {
                house_number = Some(prop.clone());
                property_name = None;
            }
        }
    }

    let street = caps["street"]
        .replace(" - ", "-")
        .replace(" -", "-")
        .replace("- ", "-")
        .to_uppercase();

    Some(StructuredAddress {
        property_name,
        house_number,
        street,
        suffix: caps.name("suffix").map(|m| m.as_str().to_uppercase()),
        suburb: caps["suburb"].trim().to_uppercase(),
        state: caps["state"].to_uppercase(),
        postcode: caps.name("pcode").and_then(|m| m.as_str().parse().ok()),
        original: line.to_string(),
    })
}
