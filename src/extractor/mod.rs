//! Record extraction
//!
//! Pages from the navigation driver are split into candidates, validated by
//! [`normalize`], and deduplicated per region before anything is uploaded.

pub mod candidate;
pub mod normalize;
pub mod record;

use log::{debug, warn};
use std::collections::HashSet;

pub use candidate::{Candidate, extract};
pub use normalize::{enrich, normalize};
pub use record::{PropertyFields, PropertyRecord};

use crate::error::ValidationError;
use crate::navigation::RawResultPage;

/// Per-region extraction state
///
/// The first record seen for a `source_id` wins; later ones are dropped and
/// counted. Candidates failing validation never leave this type.
#[derive(Debug)]
pub struct RegionExtractor {
    region_key: String,
    seen: HashSet<String>,
    extracted: usize,
    duplicates: usize,
    invalid: usize,
}

impl RegionExtractor {
    #[must_use]
    pub fn new(region_key: impl Into<String>) -> Self {
        Self {
            region_key: region_key.into(),
            seen: HashSet::new(),
            extracted: 0,
            duplicates: 0,
            invalid: 0,
        }
    }

    /// Valid, first-seen records of one page, in result order
    pub fn process(&mut self, page: RawResultPage) -> Vec<PropertyRecord> {
        let mut records = Vec::with_capacity(page.candidates.len());

        for candidate in extract(page) {
            match normalize(&candidate) {
                Ok(record) => {
                    if self.seen.insert(record.source_id.clone()) {
                        self.extracted += 1;
                        records.push(record);
                    } else {
                        self.duplicates += 1;
                        debug!(
                            "Dropping duplicate {} at position {} in region {}",
                            record.source_id, candidate.position, self.region_key
                        );
                    }
                }
                Err(ValidationError::NotRecordShaped) => {
                    self.invalid += 1;
                    warn!(
                        "Skipping non-record candidate at position {} in region {}",
                        candidate.position, self.region_key
                    );
                }
                Err(e) => {
                    self.invalid += 1;
                    warn!(
                        "Skipping candidate at position {} in region {}: {e}",
                        candidate.position, self.region_key
                    );
                }
            }
        }

        records
    }

    #[must_use]
    pub fn region_key(&self) -> &str {
        &self.region_key
    }

    /// Valid records emitted so far
    #[must_use]
    pub fn extracted(&self) -> usize {
        self.extracted
    }

    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Candidates that failed validation
    #[must_use]
    pub fn invalid(&self) -> usize {
        self.invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(offset: usize, candidates: Vec<serde_json::Value>) -> RawResultPage {
        RawResultPage {
            region_key: "90210".into(),
            offset,
            candidates,
        }
    }

    #[test]
    fn test_first_record_wins_and_counters() {
        let mut extractor = RegionExtractor::new("90210");

        let first = extractor.process(page(
            0,
            vec![
                json!({"sourceId": "a", "address": "100 First St", "owner": "Ann"}),
                json!("broken"),
                json!({"sourceId": "b", "address": "200 Second St"}),
            ],
        ));
        let second = extractor.process(page(
            3,
            vec![
                json!({"sourceId": "a", "address": "100 First St", "owner": "Someone Else"}),
                json!({"sourceId": "c"}),
            ],
        ));

        let ids: Vec<_> = first.iter().map(|r| r.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(first[0].fields.owner.as_deref(), Some("Ann"));
        assert!(second.is_empty());

        assert_eq!(extractor.extracted(), 2);
        assert_eq!(extractor.duplicates(), 1);
        assert_eq!(extractor.invalid(), 2);
    }
}
