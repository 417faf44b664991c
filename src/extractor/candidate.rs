use serde_json::Value;

use crate::navigation::RawResultPage;

/// One untyped result card, tagged with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub region_key: String,
    /// Position in the region's result list
    pub position: usize,
    pub payload: Value,
}

/// Split a page into its candidates
///
/// Consumes the page: the returned iterator is finite and cannot be
/// restarted.
pub fn extract(page: RawResultPage) -> impl Iterator<Item = Candidate> {
    let RawResultPage {
        region_key,
        offset,
        candidates,
    } = page;
    candidates
        .into_iter()
        .enumerate()
        .map(move |(i, payload)| Candidate {
            region_key: region_key.clone(),
            position: offset + i,
            payload,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_positions_continue_from_offset() {
        let page = RawResultPage {
            region_key: "90210".into(),
            offset: 5,
            candidates: vec![json!({"a": 1}), json!("junk")],
        };
        let positions: Vec<_> = extract(page).map(|c| c.position).collect();
        assert_eq!(positions, vec![5, 6]);
    }
}
