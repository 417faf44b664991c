//! Candidate -> `PropertyRecord` conversion
//!
//! Explicit fields are accepted only in known representations
//! (`"$245,000"`, `"62%"`, `"yes"`); anything else is a `ValidationError`,
//! never a guess. Cards that carry only free text go through line
//! heuristics for address, owner, value and tags.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::candidate::Candidate;
use super::record::{PropertyFields, PropertyRecord};
use crate::error::ValidationError;

static ADDRESS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{3,5}\s+\w").expect("Invalid address regex"));

static MONEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$?\s*(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?$").expect("Invalid money regex")
});

static MONEY_IN_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\s*(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?").expect("Invalid money-in-text regex")
});

static PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*%?$").expect("Invalid percent regex"));

const OWNER_MARKERS: &[&str] = &["LLC", "Trust", "Inc", "Corp", "Properties", "Estates"];
const TAG_KEYWORDS: &[&str] = &["vacant", "absentee", "lead", "owner occ", "high equity"];

fn field<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| object.get(*name))
        .find(|value| !value.is_null())
}

fn invalid(field: &'static str, value: &Value) -> ValidationError {
    ValidationError::InvalidField {
        field,
        value: value.to_string(),
    }
}

/// Optional string field; blank counts as absent
fn text_field(value: Option<&Value>, name: &'static str) -> Result<Option<String>, ValidationError> {
    match value {
        None => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Some(other) => Err(invalid(name, other)),
    }
}

/// `"$245,000"`, `"245000"`, `"245,000.50"` -> f64
pub fn parse_money(raw: &str) -> Option<f64> {
    let caps = MONEY.captures(raw.trim())?;
    let whole = caps.get(1)?.as_str().replace(',', "");
    let fraction = caps.get(2).map_or("", |m| m.as_str());
    format!("{whole}{fraction}").parse().ok()
}

/// `"62%"` or `"62"` -> 62.0, only within `0..=100`
pub fn parse_percent(raw: &str) -> Option<f64> {
    let caps = PERCENT.captures(raw.trim())?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    (0.0..=100.0).contains(&value).then_some(value)
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" => Some(true),
        "no" | "n" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn money_field(value: Option<&Value>) -> Result<Option<f64>, ValidationError> {
    match value {
        None => Ok(None),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
            _ => Err(invalid("estimated_value", &Value::Number(n.clone()))),
        },
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v @ Value::String(s)) => parse_money(s)
            .map(Some)
            .ok_or_else(|| invalid("estimated_value", v)),
        Some(other) => Err(invalid("estimated_value", other)),
    }
}

fn percent_field(value: Option<&Value>) -> Result<Option<f64>, ValidationError> {
    match value {
        None => Ok(None),
        Some(v @ Value::Number(n)) => match n.as_f64() {
            Some(p) if (0.0..=100.0).contains(&p) => Ok(Some(p)),
            _ => Err(invalid("equity_percent", v)),
        },
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v @ Value::String(s)) => parse_percent(s)
            .map(Some)
            .ok_or_else(|| invalid("equity_percent", v)),
        Some(other) => Err(invalid("equity_percent", other)),
    }
}

fn flag_field(value: Option<&Value>) -> Result<Option<bool>, ValidationError> {
    match value {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(v @ Value::Number(n)) => match n.as_u64() {
            Some(1) => Ok(Some(true)),
            Some(0) => Ok(Some(false)),
            _ => Err(invalid("vacant", v)),
        },
        Some(v @ Value::String(s)) => parse_flag(s).map(Some).ok_or_else(|| invalid("vacant", v)),
        Some(other) => Err(invalid("vacant", other)),
    }
}

fn tags_field(value: Option<&Value>) -> Result<Vec<String>, ValidationError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                other => Err(invalid("tags", other)),
            })
            .filter(|tag| !matches!(tag, Ok(t) if t.is_empty()))
            .collect(),
        Some(other) => Err(invalid("tags", other)),
    }
}

fn source_id_field(value: Option<&Value>) -> Result<Option<String>, ValidationError> {
    match value {
        None => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        other => text_field(other, "source_id"),
    }
}

/// Stable id for cards without one: slug of the address
fn address_slug(address: &str) -> String {
    let mut slug = String::with_capacity(address.len() + 5);
    slug.push_str("addr-");
    let mut last_dash = true;
    for ch in address.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn is_title_case(line: &str) -> bool {
    line.split_whitespace().all(|word| {
        let mut chars = word.chars().filter(|c| c.is_alphabetic());
        match chars.next() {
            Some(first) => first.is_uppercase() && chars.all(char::is_lowercase),
            None => false,
        }
    })
}

fn is_tag_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    TAG_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn is_value_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    line.contains('$') || lower.contains("value") || lower.contains("est.")
}

/// Fields recovered from a card's free text
#[derive(Debug, Default)]
struct TextHints {
    address: Option<String>,
    owner: Option<String>,
    estimated_value: Option<f64>,
    tags: Vec<String>,
}

fn read_text(text: &str) -> TextHints {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let address = lines.iter().find(|l| ADDRESS_LINE.is_match(l)).map(|l| (*l).to_string());

    let owner = lines
        .iter()
        .filter(|l| Some(**l) != address.as_deref())
        .filter(|l| !is_tag_line(l) && !is_value_line(l))
        .find(|l| {
            let words: Vec<&str> = l.split_whitespace().collect();
            words.iter().any(|w| OWNER_MARKERS.contains(&w.trim_matches(|c: char| !c.is_alphanumeric())))
                || (words.len() <= 3 && is_title_case(l))
        })
        .map(|l| (*l).to_string());

    let estimated_value = lines
        .iter()
        .filter(|l| is_value_line(l))
        .find_map(|l| MONEY_IN_TEXT.find(l).and_then(|m| parse_money(m.as_str())));

    let tags = lines
        .iter()
        .filter(|l| is_tag_line(l))
        .map(|l| (*l).to_string())
        .collect();

    TextHints {
        address,
        owner,
        estimated_value,
        tags,
    }
}

fn vacant_from_tags(tags: &[String]) -> Option<bool> {
    tags.iter()
        .any(|t| t.to_lowercase().contains("vacant"))
        .then_some(true)
}

fn merge_tags(explicit: Vec<String>, derived: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::with_capacity(explicit.len() + derived.len());
    for tag in explicit.into_iter().chain(derived) {
        if !tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            tags.push(tag);
        }
    }
    tags
}

/// Validate and type one candidate
///
/// # Errors
///
/// `NotRecordShaped` for non-objects, `MissingField` when no address (or id)
/// can be established, `InvalidField` when a present field has the wrong type
/// or an unknown representation.
pub fn normalize(candidate: &Candidate) -> Result<PropertyRecord, ValidationError> {
    let Value::Object(object) = &candidate.payload else {
        return Err(ValidationError::NotRecordShaped);
    };

    let text = text_field(field(object, &["text"]), "text")?;
    let hints = text.as_deref().map(read_text).unwrap_or_default();

    let address = text_field(field(object, &["address", "propertyAddress", "property_address"]), "address")?
        .or(hints.address)
        .ok_or(ValidationError::MissingField("address"))?;

    let source_id = source_id_field(field(object, &["sourceId", "source_id", "id", "propertyId"]))?
        .unwrap_or_else(|| address_slug(&address));
    if source_id == "addr" {
        return Err(ValidationError::MissingField("source_id"));
    }

    let owner = text_field(field(object, &["owner", "ownerName", "owner_name"]), "owner")?
        .or(hints.owner);
    let estimated_value =
        money_field(field(object, &["estimatedValue", "estimated_value", "value"]))?
            .or(hints.estimated_value);
    let equity_percent = percent_field(field(object, &["equityPercent", "equity_percent", "equity"]))?;
    let tags = merge_tags(tags_field(field(object, &["tags", "chips"]))?, hints.tags);
    let vacant = flag_field(field(object, &["vacant", "isVacant"]))?.or_else(|| vacant_from_tags(&tags));

    Ok(PropertyRecord {
        source_id,
        region_key: candidate.region_key.clone(),
        fields: PropertyFields {
            address,
            owner,
            estimated_value,
            equity_percent,
            vacant,
            tags,
        },
        extracted_at: Utc::now(),
    })
}

/// Layer the text of a card's detail view over a normalized record
///
/// Owner and value read from the detail view win over the card's. Tags are
/// merged, and `vacant` is only derived when the card left it unknown.
/// Returns whether the record changed.
pub fn enrich(record: &mut PropertyRecord, detail_text: &str) -> bool {
    let hints = read_text(detail_text);
    let before = record.fields.clone();
    let fields = &mut record.fields;

    if hints.owner.is_some() {
        fields.owner = hints.owner;
    }
    if hints.estimated_value.is_some() {
        fields.estimated_value = hints.estimated_value;
    }
    fields.tags = merge_tags(std::mem::take(&mut fields.tags), hints.tags);
    if fields.vacant.is_none() {
        fields.vacant = vacant_from_tags(&fields.tags);
    }

    record.fields != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(payload: Value) -> Candidate {
        Candidate {
            region_key: "90210".into(),
            position: 0,
            payload,
        }
    }

    #[test]
    fn test_known_representations_are_coerced() {
        let record = normalize(&candidate(json!({
            "sourceId": "dm-1",
            "address": "123 Main St, Springfield",
            "owner": "Jane Roe",
            "estimatedValue": "$245,000",
            "equityPercent": "62%",
            "vacant": "yes",
            "tags": ["Absentee", "High Equity"]
        })))
        .expect("valid candidate");

        assert_eq!(record.source_id, "dm-1");
        assert_eq!(record.region_key, "90210");
        assert_eq!(record.fields.estimated_value, Some(245_000.0));
        assert_eq!(record.fields.equity_percent, Some(62.0));
        assert_eq!(record.fields.vacant, Some(true));
        assert_eq!(record.fields.tags, vec!["Absentee", "High Equity"]);
    }

    #[test]
    fn test_wrong_types_are_rejected_not_guessed() {
        let err = normalize(&candidate(json!({
            "sourceId": "dm-2", "address": "1 Elm St", "estimatedValue": "about 200k"
        })))
        .expect_err("fuzzy money rejected");
        assert!(matches!(err, ValidationError::InvalidField { field: "estimated_value", .. }));

        let err = normalize(&candidate(json!({
            "sourceId": "dm-3", "address": "1 Elm St", "equityPercent": "140%"
        })))
        .expect_err("out of range percent rejected");
        assert!(matches!(err, ValidationError::InvalidField { field: "equity_percent", .. }));

        let err = normalize(&candidate(json!({
            "sourceId": "dm-4", "address": "1 Elm St", "vacant": "maybe"
        })))
        .expect_err("unknown flag rejected");
        assert!(matches!(err, ValidationError::InvalidField { field: "vacant", .. }));

        let err = normalize(&candidate(json!({"sourceId": true, "address": "1 Elm St"})))
            .expect_err("boolean id rejected");
        assert!(matches!(err, ValidationError::InvalidField { field: "source_id", .. }));
    }

    #[test]
    fn test_missing_and_non_record_candidates() {
        assert_eq!(
            normalize(&candidate(json!("truncated card"))),
            Err(ValidationError::NotRecordShaped)
        );
        assert_eq!(
            normalize(&candidate(json!([1, 2]))),
            Err(ValidationError::NotRecordShaped)
        );
        assert_eq!(
            normalize(&candidate(json!({"sourceId": "dm-5", "owner": "Jane"}))),
            Err(ValidationError::MissingField("address"))
        );
    }

    #[test]
    fn test_free_text_card_heuristics() {
        let record = normalize(&candidate(json!({
            "sourceId": null,
            "text": "4521 Oak Ridge Dr\nSunset Holdings LLC\nEst. Value $312,500\nVacant\nAbsentee Owner",
            "tags": ["High Equity"]
        })))
        .expect("text card normalizes");

        assert_eq!(record.fields.address, "4521 Oak Ridge Dr");
        assert_eq!(record.fields.owner.as_deref(), Some("Sunset Holdings LLC"));
        assert_eq!(record.fields.estimated_value, Some(312_500.0));
        assert_eq!(record.fields.vacant, Some(true));
        assert_eq!(
            record.fields.tags,
            vec!["High Equity", "Vacant", "Absentee Owner"]
        );
        assert_eq!(record.source_id, "addr-4521-oak-ridge-dr");
    }

    #[test]
    fn test_detail_view_enriches_record() {
        let mut record = normalize(&candidate(json!({
            "sourceId": "dm-7",
            "address": "88 Birch Ln",
            "owner": "J Smith",
            "estimatedValue": "$150,000",
            "tags": ["Absentee Owner"]
        })))
        .expect("valid candidate");

        let changed = enrich(
            &mut record,
            "88 Birch Ln\nJohn Smith Trust\nEstimated Value $172,400\nVacant\nabsentee owner",
        );

        assert!(changed);
        assert_eq!(record.fields.address, "88 Birch Ln");
        assert_eq!(record.fields.owner.as_deref(), Some("John Smith Trust"));
        assert_eq!(record.fields.estimated_value, Some(172_400.0));
        assert_eq!(record.fields.tags, vec!["Absentee Owner", "Vacant"]);
        assert_eq!(record.fields.vacant, Some(true));

        // Nothing new in the view leaves the record alone
        assert!(!enrich(&mut record, "88 Birch Ln"));
    }

    #[test]
    fn test_parsers() {
        assert_eq!(parse_money("245000"), Some(245_000.0));
        assert_eq!(parse_money("$1,250,000.50"), Some(1_250_000.5));
        assert_eq!(parse_money("$24,50"), None);
        assert_eq!(parse_percent("62.5 %"), Some(62.5));
        assert_eq!(parse_percent("-3%"), None);
        assert_eq!(parse_flag("No"), Some(false));
        assert_eq!(parse_flag("sometimes"), None);
    }
}
