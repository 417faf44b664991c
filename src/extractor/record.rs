use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Typed property fields; every value already passed validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFields {
    pub address: String,
    pub owner: Option<String>,
    pub estimated_value: Option<f64>,
    /// Percentage in `0.0..=100.0`
    pub equity_percent: Option<f64>,
    pub vacant: Option<bool>,
    pub tags: Vec<String>,
}

/// A validated record ready for upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Dedup and upsert key; non-empty and unique within its region
    pub source_id: String,
    pub region_key: String,
    pub fields: PropertyFields,
    pub extracted_at: DateTime<Utc>,
}
