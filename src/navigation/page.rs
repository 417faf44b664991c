use serde_json::Value;

/// Unextracted result content for one region at one pagination offset
///
/// Only the extractor interprets `candidates`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResultPage {
    pub region_key: String,
    /// Number of candidates yielded for this region before this page
    pub offset: usize,
    pub candidates: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageLoad {
    Page(RawResultPage),
    Exhausted,
}
