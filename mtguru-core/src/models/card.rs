use serde::{Deserialize, Serialize};

/// Flat metadata stored with each card vector at insert time and returned
/// verbatim on match. Values are scalars or string arrays only — Vectorize
/// rejects nested metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub set_name: String,
    #[serde(default)]
    pub set_type: String,
    #[serde(default)]
    pub rarity: String,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub scryfall_uri: String,
    #[serde(default)]
    pub release_date: String,
}

/// Map color-identity letters to words. Unknown letters pass through
/// unchanged with a warning.
pub fn map_colors(letters: &[String]) -> Vec<String> {
    letters
        .iter()
        .map(|letter| match letter.to_uppercase().as_str() {
            "B" => "Black".to_string(),
            "U" => "Blue".to_string(),
            "G" => "Green".to_string(),
            "R" => "Red".to_string(),
            "W" => "White".to_string(),
            _ => {
                tracing::warn!(color = %letter, "Could not recognise color");
                letter.clone()
            }
        })
        .collect()
}
