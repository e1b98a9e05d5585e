//! In-memory collaborators for unit tests

use crate::rerank::RelevanceModel;
use crate::retrieval::{KeywordScorer, VectorHit, VectorIndex};
use async_trait::async_trait;
use shopsage_common::embeddings::Embedder;
use shopsage_common::errors::{AppError, Result};
use shopsage_common::models::ProductRecord;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Product with predictable text fields
pub fn product(id: &str, review_count: u32, sentiment_score: f32) -> ProductRecord {
    ProductRecord {
        product_id: id.to_string(),
        title: format!("Product {}", id),
        brand: "Acme".to_string(),
        price: 19.99,
        avg_rating: 4.2,
        review_count,
        sentiment_score,
        summary: format!("Reviewers liked {}", id),
        aspects: Vec::new(),
    }
}

/// Embedder returning a fixed vector and counting calls
pub struct CountingEmbedder {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::EmbeddingError {
                message: "model offline".to_string(),
            });
        }
        Ok(vec![0.5, 0.5, 0.5, 0.5])
    }

    fn model_name(&self) -> &str {
        "counting"
    }

    fn dimension(&self) -> usize {
        4
    }
}

/// Vector index serving canned hits and records
pub struct FakeVectorIndex {
    hits: Vec<VectorHit>,
    records: Vec<ProductRecord>,
    fail_search: bool,
    fail_fetch: AtomicBool,
    reverse_fetch: AtomicBool,
    search_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    last_limit: Mutex<Option<usize>>,
    last_fetch_ids: Mutex<Vec<u64>>,
}

impl FakeVectorIndex {
    pub fn with_hits(hits: &[(&str, f32)]) -> Self {
        Self {
            hits: hits
                .iter()
                .map(|(id, score)| VectorHit {
                    point_id: Some(Self::point_id_of(id)),
                    product_id: Some(id.to_string()),
                    score: *score,
                })
                .collect(),
            records: Vec::new(),
            fail_search: false,
            fail_fetch: AtomicBool::new(false),
            reverse_fetch: AtomicBool::new(false),
            search_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            last_limit: Mutex::new(None),
            last_fetch_ids: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails as if the store were down
    pub fn failing() -> Self {
        let index = Self {
            fail_search: true,
            ..Self::with_hits(&[])
        };
        index.fail_fetches();
        index
    }

    pub fn with_records(mut self, records: Vec<ProductRecord>) -> Self {
        self.records = records;
        self
    }

    /// Stable numeric id for a product id (FNV-1a)
    pub fn point_id_of(product_id: &str) -> u64 {
        product_id
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
                (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
            })
    }

    pub fn reverse_fetch_order(&self) {
        self.reverse_fetch.store(true, Ordering::SeqCst);
    }

    pub fn fail_fetches(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn last_limit(&self) -> Option<usize> {
        *self.last_limit.lock().unwrap()
    }

    pub fn last_fetch_ids(&self) -> Vec<u64> {
        self.last_fetch_ids.lock().unwrap().clone()
    }

    fn unavailable() -> AppError {
        AppError::VectorStoreError {
            message: "collection not found".to_string(),
        }
    }
}

#[async_trait]
impl VectorIndex for FakeVectorIndex {
    async fn nearest_neighbors(&self, _vector: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_limit.lock().unwrap() = Some(limit);
        if self.fail_search {
            return Err(Self::unavailable());
        }
        Ok(self.hits.iter().take(limit).cloned().collect())
    }

    async fn fetch_by_ids(&self, ids: &[u64]) -> Result<Vec<ProductRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_fetch_ids.lock().unwrap() = ids.to_vec();
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }

        let mut records: Vec<ProductRecord> = ids
            .iter()
            .filter_map(|id| {
                self.records
                    .iter()
                    .find(|r| Self::point_id_of(&r.product_id) == *id)
                    .cloned()
            })
            .collect();
        if self.reverse_fetch.load(Ordering::SeqCst) {
            records.reverse();
        }
        Ok(records)
    }

    async fn point_count(&self) -> Result<u64> {
        if self.fail_search {
            return Err(Self::unavailable());
        }
        Ok(self.records.len() as u64)
    }
}

/// Keyword scorer returning the same raw scores for every query
pub struct FixedKeywordScorer {
    scores: Vec<f32>,
    fail: bool,
    calls: AtomicUsize,
    last_tokens: Mutex<Vec<String>>,
}

impl FixedKeywordScorer {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            fail: false,
            calls: AtomicUsize::new(0),
            last_tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(vec![0.0, 0.0])
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_tokens(&self) -> Vec<String> {
        self.last_tokens.lock().unwrap().clone()
    }
}

impl KeywordScorer for FixedKeywordScorer {
    fn scores(&self, tokens: &[String]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_tokens.lock().unwrap() = tokens.to_vec();
        if self.fail {
            return Err(AppError::Internal {
                message: "index not loaded".to_string(),
            });
        }
        Ok(self.scores.clone())
    }

    fn corpus_len(&self) -> usize {
        self.scores.len()
    }
}

/// Relevance model returning scripted scores in input order
pub struct ScriptedRelevanceModel {
    scores: Vec<f32>,
    fail: bool,
    calls: AtomicUsize,
    last_pairs: Mutex<Vec<(String, String)>>,
}

impl ScriptedRelevanceModel {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            fail: false,
            calls: AtomicUsize::new(0),
            last_pairs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_pairs(&self) -> Vec<(String, String)> {
        self.last_pairs.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelevanceModel for ScriptedRelevanceModel {
    async fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_pairs.lock().unwrap() = pairs.to_vec();
        if self.fail {
            return Err(AppError::Internal {
                message: "reranker offline".to_string(),
            });
        }
        Ok(self.scores.iter().take(pairs.len()).copied().collect())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
