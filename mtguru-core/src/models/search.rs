//! The pinned `mtguru/1` search wire schema.
//!
//! One schema, shared by the proxy routes, the gateway route, and the CLI.
//! The historical pass-through shape (`{matches: {matches: []}}`) and the
//! client's duck-typed multi-shape decoding are retired: anything that does
//! not decode as `SearchResponse` is an error, not a fallback case.

use serde::{Deserialize, Serialize};

use super::card::CardMetadata;

/// One entry in a search result set. Scores are cosine similarity in [0, 1],
/// higher is more similar; result sets arrive ordered descending by score
/// (tie-break unspecified by the index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub score: f64,
    pub metadata: CardMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub count: usize,
    pub matches: Vec<Match>,
}

impl SearchResponse {
    pub fn new(matches: Vec<Match>) -> Self {
        Self {
            count: matches.len(),
            matches,
        }
    }
}

/// Structured equality filters on card metadata. An empty field means
/// unconstrained, matching what the browser client has always sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub set_type: String,
    #[serde(default)]
    pub colors: String,
    #[serde(default)]
    pub rarity: String,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.set_type.is_empty() && self.colors.is_empty() && self.rarity.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_count_tracks_matches() {
        let response = SearchResponse::new(vec![Match {
            id: "a".to_string(),
            score: 0.9,
            metadata: CardMetadata::default(),
        }]);
        assert_eq!(response.count, 1);
    }

    #[test]
    fn test_filters_decode_from_client_payload() {
        let filters: SearchFilters = serde_json::from_value(serde_json::json!({
            "set_type": "expansion",
            "colors": "",
            "rarity": "rare"
        }))
        .unwrap();
        assert_eq!(filters.set_type, "expansion");
        assert!(filters.colors.is_empty());
        assert!(!filters.is_empty());
    }

    #[test]
    fn test_empty_filters() {
        let filters: SearchFilters = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(filters.is_empty());
    }

    #[test]
    fn test_response_serializes_pinned_shape() {
        let response = SearchResponse::new(vec![]);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, serde_json::json!({ "count": 0, "matches": [] }));
    }
}
