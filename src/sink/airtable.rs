//! Airtable implementation of [`RecordSink`]
//!
//! One `PATCH /{base}/{table}` per record with `performUpsert` merging on the
//! "Source ID" column, so re-uploads update in place.
//!
//! Before the first upload the table's live columns are read from the meta
//! API (`GET /meta/bases/{base}/tables`) and every record is cut down to
//! them, so a column missing from the table drops that value instead of
//! failing the record. When the schema cannot be read, records go out whole.

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

use super::RecordSink;
use crate::config::{RunConfig, Secret};
use crate::error::{ConfigError, UploadError};
use crate::extractor::PropertyRecord;
use crate::utils::constants::{SINK_MERGE_FIELD, SINK_REQUEST_TIMEOUT_SECS};

#[derive(Debug, Deserialize)]
struct BaseSchema {
    tables: Vec<TableSchema>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    id: String,
    name: String,
    #[serde(default)]
    fields: Vec<ColumnSchema>,
}

#[derive(Debug, Deserialize)]
struct ColumnSchema {
    name: String,
}

#[derive(Debug, Clone)]
pub struct AirtableSink {
    client: Client,
    endpoint: Url,
    schema_endpoint: Url,
    table: String,
    api_key: Secret,
    /// Live column names, fetched once and shared by clones; `None` inside
    /// when the schema could not be read
    columns: Arc<OnceCell<Option<HashSet<String>>>>,
}

fn with_segments(base_url: &str, segments: &[&str]) -> Result<Url, ConfigError> {
    let mut url = Url::parse(base_url).map_err(|e| ConfigError::Invalid {
        field: "sink_base_url",
        reason: e.to_string(),
    })?;
    url.path_segments_mut()
        .map_err(|()| ConfigError::Invalid {
            field: "sink_base_url",
            reason: format!("{base_url} cannot be used as a base URL"),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl AirtableSink {
    /// # Errors
    /// `ConfigError::Invalid` when the base URL cannot address a table or the
    /// HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        endpoint_id: &str,
        collection_name: &str,
        api_key: Secret,
    ) -> Result<Self, ConfigError> {
        let endpoint = with_segments(base_url, &[endpoint_id, collection_name])?;
        let schema_endpoint = with_segments(base_url, &["meta", "bases", endpoint_id, "tables"])?;

        let client = Client::builder()
            .timeout(Duration::from_secs(SINK_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "sink",
                reason: format!("HTTP client could not be built: {e}"),
            })?;

        Ok(Self {
            client,
            endpoint,
            schema_endpoint,
            table: collection_name.to_string(),
            api_key,
            columns: Arc::new(OnceCell::new()),
        })
    }

    /// # Errors
    /// See [`AirtableSink::new`].
    pub fn from_config(config: &RunConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.sink_base_url(),
            config.sink_endpoint_id(),
            config.sink_collection_name(),
            config.sink_api_key().clone(),
        )
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn live_columns(&self) -> Option<&HashSet<String>> {
        self.columns
            .get_or_init(|| self.fetch_columns())
            .await
            .as_ref()
    }

    async fn fetch_columns(&self) -> Option<HashSet<String>> {
        let response = match self
            .client
            .get(self.schema_endpoint.clone())
            .bearer_auth(self.api_key.expose())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Airtable schema request failed, uploading all columns: {e}");
                return None;
            }
        };
        let status = response.status();
        if !status.is_success() {
            warn!(
                "Airtable schema request returned HTTP {}, uploading all columns",
                status.as_u16()
            );
            return None;
        }
        let schema: BaseSchema = match response.json().await {
            Ok(schema) => schema,
            Err(e) => {
                warn!("Airtable schema unreadable, uploading all columns: {e}");
                return None;
            }
        };

        let Some(table) = schema
            .tables
            .into_iter()
            .find(|t| t.name == self.table || t.id == self.table)
        else {
            warn!("Table {} not in the base schema, uploading all columns", self.table);
            return None;
        };
        let columns: HashSet<String> = table.fields.into_iter().map(|c| c.name).collect();
        if columns.is_empty() {
            return None;
        }
        info!("Airtable table {} has {} columns", self.table, columns.len());
        Some(columns)
    }
}

/// Keep only the columns the table has; the merge column always stays
#[must_use]
pub fn subset_to_schema(mut fields: Map<String, Value>, columns: &HashSet<String>) -> Map<String, Value> {
    fields.retain(|name, _| {
        let keep = name == SINK_MERGE_FIELD || columns.contains(name);
        if !keep {
            debug!("Dropping column {name}, not in the table");
        }
        keep
    });
    fields
}

/// Title Case column map; absent and empty values are left out
#[must_use]
pub fn record_fields(record: &PropertyRecord) -> Map<String, Value> {
    let fields = &record.fields;
    let mut map = Map::new();
    map.insert(SINK_MERGE_FIELD.to_string(), json!(record.source_id));
    map.insert("Property Address".to_string(), json!(fields.address));
    if let Some(owner) = fields.owner.as_deref().filter(|o| !o.is_empty()) {
        map.insert("Owner Name".to_string(), json!(owner));
    }
    if let Some(value) = fields.estimated_value {
        map.insert("Estimated Value".to_string(), json!(value));
    }
    if let Some(equity) = fields.equity_percent {
        map.insert("Equity Percent".to_string(), json!(equity));
    }
    if let Some(vacant) = fields.vacant {
        map.insert("Vacant".to_string(), json!(vacant));
    }
    if !fields.tags.is_empty() {
        map.insert("Status".to_string(), json!(fields.tags.join(", ")));
    }
    if !record.region_key.is_empty() {
        map.insert("Source ZIP".to_string(), json!(record.region_key));
    }
    map
}

fn classify_status(status: StatusCode, body: &str) -> UploadError {
    let detail = format!("HTTP {}: {}", status.as_u16(), body.chars().take(200).collect::<String>());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        UploadError::Transient(detail)
    } else {
        UploadError::Permanent(detail)
    }
}

#[async_trait]
impl RecordSink for AirtableSink {
    async fn upsert(&self, record: &PropertyRecord) -> Result<(), UploadError> {
        let mut fields = record_fields(record);
        if let Some(columns) = self.live_columns().await {
            fields = subset_to_schema(fields, columns);
        }
        let body = json!({
            "performUpsert": { "fieldsToMergeOn": [SINK_MERGE_FIELD] },
            "records": [{ "fields": fields }],
        });

        let response = self
            .client
            .patch(self.endpoint.clone())
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            debug!("Upserted {} ({})", record.source_id, status.as_u16());
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(classify_status(status, &text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::PropertyFields;
    use chrono::Utc;

    fn record() -> PropertyRecord {
        PropertyRecord {
            source_id: "dm-1".into(),
            region_key: "90210".into(),
            fields: PropertyFields {
                address: "123 Main St".into(),
                owner: Some(String::new()),
                estimated_value: Some(245_000.0),
                equity_percent: None,
                vacant: Some(false),
                tags: vec!["Vacant".into(), "Absentee".into()],
            },
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn test_fields_are_title_case_and_pruned() {
        let fields = record_fields(&record());
        assert_eq!(fields["Source ID"], json!("dm-1"));
        assert_eq!(fields["Status"], json!("Vacant, Absentee"));
        assert_eq!(fields["Vacant"], json!(false));
        assert!(!fields.contains_key("Owner Name"));
        assert!(!fields.contains_key("Equity Percent"));
    }

    #[test]
    fn test_endpoint_is_base_table_path() {
        let sink = AirtableSink::new("https://api.airtable.com/v0", "app123", "Deal Leads", Secret::new("k"))
            .expect("valid sink");
        assert_eq!(sink.endpoint().as_str(), "https://api.airtable.com/v0/app123/Deal%20Leads");
        assert_eq!(
            sink.schema_endpoint.as_str(),
            "https://api.airtable.com/v0/meta/bases/app123/tables"
        );
    }

    #[test]
    fn test_unknown_columns_are_dropped() {
        let columns: HashSet<String> = ["Property Address", "Status"].into_iter().map(String::from).collect();
        let fields = subset_to_schema(record_fields(&record()), &columns);

        let mut names: Vec<&str> = fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["Property Address", "Source ID", "Status"]);
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(classify_status(StatusCode::TOO_MANY_REQUESTS, ""), UploadError::Transient(_)));
        assert!(matches!(classify_status(StatusCode::BAD_GATEWAY, ""), UploadError::Transient(_)));
        assert!(matches!(classify_status(StatusCode::REQUEST_TIMEOUT, ""), UploadError::Transient(_)));
        assert!(matches!(classify_status(StatusCode::UNPROCESSABLE_ENTITY, ""), UploadError::Permanent(_)));
        assert!(matches!(classify_status(StatusCode::UNAUTHORIZED, ""), UploadError::Permanent(_)));
    }
}
