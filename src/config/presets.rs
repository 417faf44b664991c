//! Built-in search presets
//!
//! Every preset starts from the base filters and layers its tier on top.
//! Later layers override earlier ones by predicate name, so explicit
//! per-region filters always win over a preset.

use super::types::{FilterPredicate, FilterValue};

/// Names accepted by [`preset`]
pub const PRESET_NAMES: &[&str] = &["base", "max-distress", "aging-equity", "cashflow", "commercial"];

const MULTIFAMILY_TYPES: &[&str] = &[
    "Duplex (2 Units, Any Combination)",
    "Triplex (3 Units, Any Combination)",
    "Quadruplex (4 Units, Any Combination)",
    "Multi-family Dwellings (generic, 2+)",
    "Garden Apt, Court Apt (5+ Units)",
    "Apartment House (5+ Units)",
    "Apartment House (100+ Units)",
];

const COMMERCIAL_TYPES: &[&str] = &[
    "Commercial (general)",
    "Commercial Building",
    "Retail/residential (mixed Use)",
    "Warehouse (industrial)",
    "Neighborhood Shopping Center, Strip Center/mall, Enterprise Zone",
    "Office Bldg (general)",
    "Vacant Land (general)",
    "Commercial-vacant Land",
    "Mixed Use",
];

/// Filters applied to every preset
#[must_use]
pub fn base_filters() -> Vec<FilterPredicate> {
    vec![
        FilterPredicate::toggle("Off Market"),
        FilterPredicate::toggle("High Equity"),
        FilterPredicate::toggle("Absentee Owners"),
        FilterPredicate::toggle("Out of State Owners"),
        FilterPredicate::new("Owner Occupied", FilterValue::Toggle(false)),
        FilterPredicate::range("Estimated Equity Percent", ">50"),
        FilterPredicate::range("Number of Mortgages", "<=2"),
        FilterPredicate::range("Estimated Loan Balance (Total)", "<1000000"),
        FilterPredicate::toggle("Contact Has Phone Number?"),
        FilterPredicate::toggle("Contact Has Email Address?"),
        FilterPredicate::new("Corporate Owned?", FilterValue::Toggle(false)),
        FilterPredicate::range("Ownership Length (Years)", ">8"),
        FilterPredicate::toggle("Owner Has Multiple Properties"),
        FilterPredicate::range("Year Built", "<=2005"),
        FilterPredicate::range("Living Area (sqft)", ">800"),
        FilterPredicate::range("Condition", "Fair or Poor"),
    ]
}

fn tier(name: &str) -> Option<Vec<FilterPredicate>> {
    let filters = match name {
        "base" => Vec::new(),
        "max-distress" => vec![
            FilterPredicate::toggle("Preforeclosures"),
            FilterPredicate::toggle("Probates"),
            FilterPredicate::toggle("Tax Delinquent"),
            FilterPredicate::toggle("Vacant Homes"),
            FilterPredicate::toggle("Tired Landlords"),
            FilterPredicate::toggle("Zombie Properties"),
        ],
        "aging-equity" => vec![
            FilterPredicate::toggle("Senior Owners"),
            FilterPredicate::toggle("Free and Clear"),
            FilterPredicate::toggle("Intrafamily Transfer"),
            FilterPredicate::toggle("Likely to Move"),
            FilterPredicate::range("Long Ownership (Years)", ">12"),
        ],
        "cashflow" => vec![
            FilterPredicate::choice("Property Types", MULTIFAMILY_TYPES.iter().copied()),
            FilterPredicate::toggle("Tired Landlords"),
            FilterPredicate::toggle("Absentee Owners"),
        ],
        "commercial" => vec![
            FilterPredicate::choice("Property Types", COMMERCIAL_TYPES.iter().copied()),
            FilterPredicate::toggle("Tax Delinquent"),
            FilterPredicate::toggle("Preforeclosures"),
            FilterPredicate::toggle("Vacant Homes"),
        ],
        _ => return None,
    };
    Some(filters)
}

/// Normalize a user-supplied preset name (`"Max Distress"` -> `"max-distress"`)
fn canonical(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Resolve a preset by name; `None` if unknown
#[must_use]
pub fn preset(name: &str) -> Option<Vec<FilterPredicate>> {
    let tier = tier(&canonical(name))?;
    Some(merge([base_filters(), tier]))
}

/// Merge filter layers in order; a later predicate replaces an earlier one
/// with the same name but keeps the earlier position
pub fn merge<I>(layers: I) -> Vec<FilterPredicate>
where
    I: IntoIterator<Item = Vec<FilterPredicate>>,
{
    let mut merged: Vec<FilterPredicate> = Vec::new();
    for predicate in layers.into_iter().flatten() {
        match merged
            .iter_mut()
            .find(|existing| existing.name.eq_ignore_ascii_case(&predicate.name))
        {
            Some(existing) => existing.value = predicate.value,
            None => merged.push(predicate),
        }
    }
    merged
}
