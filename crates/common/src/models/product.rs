//! Product record entity

use serde::{Deserialize, Deserializer, Serialize};

/// Aspect entries kept per product
pub const MAX_ASPECTS: usize = 5;

/// One extracted product feature with its review sentiment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aspect {
    /// Feature name, e.g. "battery life"
    pub aspect: String,

    /// positive, negative or neutral
    pub sentiment: String,

    /// Sentiment strength in [0, 1]
    pub score: f32,
}

/// Immutable product snapshot as stored alongside its vector
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: String,

    pub title: String,

    pub brand: String,

    pub price: f32,

    pub avg_rating: f32,

    pub review_count: u32,

    /// Aggregate review sentiment in [0, 1]
    pub sentiment_score: f32,

    /// Abstractive summary of the product's reviews
    #[serde(rename = "abstracted_summary", alias = "summary")]
    pub summary: String,

    #[serde(default, deserialize_with = "at_most_five_aspects")]
    pub aspects: Vec<Aspect>,
}

impl ProductRecord {
    /// Text handed to the relevance model for this product
    pub fn rerank_document(&self) -> String {
        format!("{} {}", self.title, self.summary)
    }
}

fn at_most_five_aspects<'de, D>(deserializer: D) -> Result<Vec<Aspect>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut aspects = Vec::<Aspect>::deserialize(deserializer)?;
    aspects.truncate(MAX_ASPECTS);
    Ok(aspects)
}
