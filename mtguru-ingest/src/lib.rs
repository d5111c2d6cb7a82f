//! Bulk ingestion of Scryfall card data into the MTGuru vector index.
//!
//! Pipeline: parse a Scryfall bulk-data JSON file into typed cards, drop
//! tokens and duplicate oracle ids, generate a semantic "guru prompt" per
//! card via the server's `/prompt` route, then upload each card via
//! `/insert` with bounded concurrency. Per-card failures are logged and
//! counted; they never abort the run.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use mtguru_core::models::{map_colors, CardMetadata};

/// Default number of in-flight card uploads.
pub const DEFAULT_CONCURRENCY: usize = 30;

// ============================================================================
// Card records
// ============================================================================

/// One card from a Scryfall bulk-data export. Only the fields the pipeline
/// needs; everything else in the export is ignored on parse.
#[derive(Debug, Clone, Deserialize)]
pub struct Card {
    pub oracle_id: String,
    pub name: String,
    #[serde(default)]
    pub released_at: String,
    #[serde(default)]
    pub mana_cost: String,
    #[serde(default)]
    pub cmc: f64,
    #[serde(default)]
    pub type_line: String,
    pub oracle_text: Option<String>,
    pub power: Option<String>,
    pub toughness: Option<String>,
    pub loyalty: Option<String>,
    #[serde(default)]
    pub image_uris: HashMap<String, String>,
    #[serde(default)]
    pub scryfall_uri: String,
    pub color_identity: Option<Vec<String>>,
    pub keywords: Option<Vec<String>>,
    pub produced_mana: Option<Vec<String>>,
    pub set_name: Option<String>,
    pub set_type: Option<String>,
    pub rarity: Option<String>,
}

/// The field subset sent to `/prompt` for description generation. Kept lean:
/// identifiers, URLs, and set data would only distract the model.
#[derive(Debug, Default, Serialize)]
pub struct PromptFields {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mana_cost: String,
    pub cmc: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub type_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toughness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loyalty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_identity: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub produced_mana: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
}

impl From<&Card> for PromptFields {
    fn from(card: &Card) -> Self {
        Self {
            mana_cost: card.mana_cost.clone(),
            cmc: card.cmc,
            type_line: card.type_line.clone(),
            oracle_text: card.oracle_text.clone(),
            power: card.power.clone(),
            toughness: card.toughness.clone(),
            loyalty: card.loyalty.clone(),
            color_identity: card.color_identity.clone(),
            keywords: card.keywords.clone(),
            produced_mana: card.produced_mana.clone(),
            rarity: card.rarity.clone(),
        }
    }
}

// ============================================================================
// Pure pipeline steps
// ============================================================================

/// Token cards are printed game pieces, not real cards; they never enter
/// the index.
pub fn is_token(type_line: &str) -> bool {
    type_line.contains("Token")
}

/// The text that gets embedded: type line, generated description, rules
/// text, produced mana, keywords. Newlines are flattened so the embedding
/// model sees one continuous phrase.
pub fn vector_text(card: &Card, guru_prompt: &str) -> String {
    let mut text = format!("{}.", card.type_line);
    if !guru_prompt.is_empty() {
        text.push_str(": ");
        text.push_str(guru_prompt);
    }
    if let Some(oracle_text) = &card.oracle_text {
        text.push(' ');
        text.push_str(oracle_text);
    }
    if let Some(produced) = &card.produced_mana {
        text.push_str(" Produces ");
        text.push_str(&produced.join(","));
        text.push_str("mana.");
    }
    if let Some(keywords) = &card.keywords {
        if !keywords.is_empty() {
            text.push(' ');
            text.push_str(&keywords.join(","));
        }
    }
    text.trim().replace('\n', " ")
}

/// Metadata stored alongside the vector and returned verbatim on match.
pub fn card_metadata(card: &Card) -> CardMetadata {
    CardMetadata {
        name: card.name.clone(),
        set_name: card.set_name.clone().unwrap_or_default(),
        set_type: card.set_type.clone().unwrap_or_default(),
        rarity: card.rarity.clone().unwrap_or_default(),
        colors: map_colors(card.color_identity.as_deref().unwrap_or(&[])),
        image_url: card.image_uris.get("normal").cloned().unwrap_or_default(),
        scryfall_uri: card.scryfall_uri.clone(),
        release_date: card.released_at.clone(),
    }
}

/// Load cards from a Scryfall bulk JSON array.
pub fn load_cards(path: &Path) -> Result<Vec<Card>, IngestError> {
    let file = std::fs::File::open(path)?;
    let cards: Vec<Card> = serde_json::from_reader(std::io::BufReader::new(file))?;
    Ok(cards)
}

/// Drop duplicate oracle ids, first occurrence wins. Bulk exports list one
/// record per printing, so reprints show up many times.
pub fn dedup_cards(cards: Vec<Card>) -> Vec<Card> {
    let total = cards.len();
    let mut seen = HashSet::new();
    let unique: Vec<Card> = cards
        .into_iter()
        .filter(|card| seen.insert(card.oracle_id.clone()))
        .collect();

    tracing::info!(
        unique = unique.len(),
        duplicates = total - unique.len(),
        "Deduplicated cards"
    );
    unique
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Invalid oracle id: {0}")]
    InvalidOracleId(String),
}

// ============================================================================
// Server client
// ============================================================================

#[derive(Debug, Deserialize)]
struct PromptResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
pub struct InsertAck {
    pub mutation_id: String,
    pub count: usize,
}

/// HTTP client for a running MTGuru server.
#[derive(Debug, Clone)]
pub struct IngestClient {
    http: reqwest::Client,
    server_url: String,
}

impl IngestClient {
    pub fn new(server_url: &str) -> Result<Self, IngestError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        Ok(Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    /// Ask the server for a one-phrase semantic description of the card.
    pub async fn generate_prompt(&self, fields: &PromptFields) -> Result<String, IngestError> {
        let url = format!("{}/prompt", self.server_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "data": fields }))
            .send()
            .await?;

        let decoded: PromptResponse = Self::decode(response).await?;
        Ok(decoded.response)
    }

    /// Upload one card: the server embeds the text and upserts it.
    pub async fn insert_card(
        &self,
        id: &str,
        text: &str,
        metadata: &CardMetadata,
    ) -> Result<InsertAck, IngestError> {
        let url = format!("{}/insert", self.server_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "id": id,
                "data": text,
                "metadata": metadata,
            }))
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, IngestError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub total: usize,
    pub skipped_tokens: usize,
    pub duplicates: usize,
    pub invalid_ids: usize,
    pub inserted: usize,
    pub failed: usize,
}

async fn process_card(client: &IngestClient, card: &Card) -> Result<(), IngestError> {
    if Uuid::parse_str(&card.oracle_id).is_err() {
        return Err(IngestError::InvalidOracleId(card.oracle_id.clone()));
    }

    // Description generation only helps when there is rules text or keywords
    // to describe. A failed prompt call costs the enhancement, not the card.
    let mut guru_prompt = String::new();
    if card.oracle_text.is_some() || card.keywords.is_some() {
        match client.generate_prompt(&PromptFields::from(card)).await {
            Ok(prompt) => {
                tracing::info!(card = %card.name, prompt = %prompt, "Prompt received");
                guru_prompt = prompt;
            }
            Err(e) => {
                tracing::warn!(card = %card.name, error = %e, "Prompt generation failed");
            }
        }
    }

    let text = vector_text(card, &guru_prompt);
    let metadata = card_metadata(card);
    let ack = client.insert_card(&card.oracle_id, &text, &metadata).await?;

    tracing::info!(
        card = %card.name,
        mutation_id = %ack.mutation_id,
        "Card uploaded to vector index"
    );
    Ok(())
}

/// Run the full pipeline over a bulk export already loaded into memory.
pub async fn run_ingest(
    client: &IngestClient,
    cards: Vec<Card>,
    concurrency: usize,
) -> IngestReport {
    let mut report = IngestReport {
        total: cards.len(),
        ..IngestReport::default()
    };

    let (cards, skipped): (Vec<Card>, Vec<Card>) =
        cards.into_iter().partition(|c| !is_token(&c.type_line));
    report.skipped_tokens = skipped.len();

    let before_dedup = cards.len();
    let cards = dedup_cards(cards);
    report.duplicates = before_dedup - cards.len();

    let results: Vec<Result<(), IngestError>> = stream::iter(cards.iter())
        .map(|card| async move { process_card(client, card).await })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    for result in results {
        match result {
            Ok(()) => report.inserted += 1,
            Err(IngestError::InvalidOracleId(id)) => {
                tracing::warn!(oracle_id = %id, "Skipping card with invalid oracle id");
                report.invalid_ids += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, "Card upload failed");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        total = report.total,
        inserted = report.inserted,
        skipped_tokens = report.skipped_tokens,
        duplicates = report.duplicates,
        invalid_ids = report.invalid_ids,
        failed = report.failed,
        "Ingest run complete"
    );
    report
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ORACLE_ID: &str = "7b5c24ab-1234-5678-9abc-def012345678";
    const OTHER_ID: &str = "deadbeef-cafe-4abe-8ace-feeddeadbeef";

    fn storm_crow() -> Card {
        serde_json::from_value(serde_json::json!({
            "oracle_id": ORACLE_ID,
            "name": "Storm Crow",
            "released_at": "1996-06-10",
            "mana_cost": "{1}{U}",
            "cmc": 2.0,
            "type_line": "Creature — Bird",
            "oracle_text": "Flying",
            "power": "1",
            "toughness": "2",
            "image_uris": { "normal": "https://img.example/crow.jpg" },
            "scryfall_uri": "https://scryfall.com/card/all/crow",
            "color_identity": ["U"],
            "keywords": ["Flying"],
            "set_name": "Alliances",
            "set_type": "expansion",
            "rarity": "common"
        }))
        .expect("card parses")
    }

    #[test]
    fn test_is_token() {
        assert!(is_token("Token Creature — Soldier"));
        assert!(!is_token("Creature — Bird"));
    }

    #[test]
    fn test_vector_text_full_card() {
        let card = storm_crow();
        let text = vector_text(&card, "small blue flier");
        assert_eq!(
            text,
            "Creature — Bird.: small blue flier Flying Flying"
        );
    }

    #[test]
    fn test_vector_text_without_prompt_or_keywords() {
        let mut card = storm_crow();
        card.keywords = None;
        let text = vector_text(&card, "");
        assert_eq!(text, "Creature — Bird. Flying");
    }

    #[test]
    fn test_vector_text_flattens_newlines_and_produced_mana() {
        let mut card = storm_crow();
        card.oracle_text = Some("Flying\nWhen this dies, draw a card.".to_string());
        card.keywords = None;
        card.produced_mana = Some(vec!["U".to_string(), "W".to_string()]);
        let text = vector_text(&card, "");
        assert!(!text.contains('\n'));
        assert!(text.contains("Produces U,Wmana."));
    }

    #[test]
    fn test_card_metadata_maps_colors_and_image() {
        let metadata = card_metadata(&storm_crow());
        assert_eq!(metadata.name, "Storm Crow");
        assert_eq!(metadata.colors, vec!["Blue"]);
        assert_eq!(metadata.image_url, "https://img.example/crow.jpg");
        assert_eq!(metadata.set_type, "expansion");
        assert_eq!(metadata.release_date, "1996-06-10");
    }

    #[test]
    fn test_dedup_first_occurrence_wins() {
        let mut a = storm_crow();
        a.name = "First".to_string();
        let mut b = storm_crow();
        b.name = "Second".to_string();
        let mut c = storm_crow();
        c.oracle_id = OTHER_ID.to_string();

        let unique = dedup_cards(vec![a, b, c]);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].name, "First");
    }

    #[test]
    fn test_prompt_fields_omit_empty() {
        let mut card = storm_crow();
        card.mana_cost = String::new();
        card.power = None;
        let value = serde_json::to_value(PromptFields::from(&card)).unwrap();
        assert!(value.get("mana_cost").is_none());
        assert!(value.get("power").is_none());
        assert_eq!(value["type_line"], "Creature — Bird");
        assert_eq!(value["oracle_text"], "Flying");
    }

    #[tokio::test]
    async fn test_generate_prompt_round_trip() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .and(body_partial_json(
                serde_json::json!({ "data": { "type_line": "Creature — Bird" } }),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "response": "small blue flier" }),
            ))
            .mount(&mock_server)
            .await;

        let client = IngestClient::new(&mock_server.uri()).unwrap();
        let prompt = client
            .generate_prompt(&PromptFields::from(&storm_crow()))
            .await
            .unwrap();
        assert_eq!(prompt, "small blue flier");
    }

    #[tokio::test]
    async fn test_insert_card_surfaces_server_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/insert"))
            .respond_with(ResponseTemplate::new(502).set_body_string("embedding_failed"))
            .mount(&mock_server)
            .await;

        let client = IngestClient::new(&mock_server.uri()).unwrap();
        let result = client
            .insert_card(ORACLE_ID, "text", &CardMetadata::default())
            .await;

        match result {
            Err(IngestError::Server { status, body }) => {
                assert_eq!(status, 502);
                assert!(body.contains("embedding_failed"));
            }
            other => panic!("Expected server error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_ingest_filters_and_counts() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "response": "small blue flier" }),
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/insert"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "mutation_id": "mut-1", "count": 1 }),
            ))
            .mount(&mock_server)
            .await;

        let mut token = storm_crow();
        token.oracle_id = OTHER_ID.to_string();
        token.type_line = "Token Creature — Bird".to_string();

        let mut invalid = storm_crow();
        invalid.oracle_id = "not-a-uuid".to_string();

        let duplicate = storm_crow();

        let client = IngestClient::new(&mock_server.uri()).unwrap();
        let report = run_ingest(
            &client,
            vec![storm_crow(), duplicate, token, invalid],
            4,
        )
        .await;

        assert_eq!(report.total, 4);
        assert_eq!(report.skipped_tokens, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.invalid_ids, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.failed, 0);
    }
}
