//! Okapi BM25 over a pre-tokenized corpus
//!
//! Built once from the keyword index artifact and read-only afterwards.

use super::KeywordScorer;
use shopsage_common::errors::Result;
use std::collections::HashMap;

const DEFAULT_K1: f32 = 1.5;
const DEFAULT_B: f32 = 0.75;

/// In-memory BM25 index with per-term postings
pub struct Bm25Index {
    /// term -> (corpus position, term frequency)
    postings: HashMap<String, Vec<(usize, u32)>>,
    idf: HashMap<String, f32>,
    doc_lens: Vec<u32>,
    avg_doc_len: f32,
    k1: f32,
    b: f32,
}

impl Bm25Index {
    /// Index a tokenized corpus with the usual k1 = 1.5, b = 0.75
    pub fn new(corpus: &[Vec<String>]) -> Self {
        Self::with_params(corpus, DEFAULT_K1, DEFAULT_B)
    }

    pub fn with_params(corpus: &[Vec<String>], k1: f32, b: f32) -> Self {
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
        let mut doc_lens = Vec::with_capacity(corpus.len());

        for (position, tokens) in corpus.iter().enumerate() {
            doc_lens.push(tokens.len() as u32);

            let mut frequencies: HashMap<&str, u32> = HashMap::new();
            for token in tokens {
                *frequencies.entry(token.as_str()).or_insert(0) += 1;
            }
            for (term, tf) in frequencies {
                postings.entry(term.to_string()).or_default().push((position, tf));
            }
        }

        let total_len: u64 = doc_lens.iter().map(|&l| l as u64).sum();
        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            total_len as f32 / doc_lens.len() as f32
        };

        // Lucene-style IDF never goes negative, so scores stay >= 0
        let n = corpus.len() as f32;
        let idf = postings
            .iter()
            .map(|(term, docs)| {
                let df = docs.len() as f32;
                (term.clone(), (1.0 + (n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();

        Self {
            postings,
            idf,
            doc_lens,
            avg_doc_len,
            k1,
            b,
        }
    }

    fn length_norm(&self, position: usize) -> f32 {
        if self.avg_doc_len == 0.0 {
            return 1.0;
        }
        1.0 - self.b + self.b * self.doc_lens[position] as f32 / self.avg_doc_len
    }
}

impl KeywordScorer for Bm25Index {
    fn scores(&self, tokens: &[String]) -> Result<Vec<f32>> {
        let mut scores = vec![0.0f32; self.doc_lens.len()];

        // Repeated query tokens count once per occurrence
        for token in tokens {
            let (Some(docs), Some(&idf)) = (self.postings.get(token), self.idf.get(token)) else {
                continue;
            };
            for &(position, tf) in docs {
                let tf = tf as f32;
                let denom = tf + self.k1 * self.length_norm(position);
                scores[position] += idf * tf * (self.k1 + 1.0) / denom;
            }
        }

        Ok(scores)
    }

    fn corpus_len(&self) -> usize {
        self.doc_lens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Vec<String>> {
        [
            "wireless bluetooth earbuds with charging case",
            "wired earbuds",
            "stainless steel water bottle",
            "bluetooth speaker waterproof bluetooth",
        ]
        .iter()
        .map(|doc| doc.split_whitespace().map(str::to_string).collect())
        .collect()
    }

    fn tokens(query: &str) -> Vec<String> {
        query.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_one_score_per_document() {
        let index = Bm25Index::new(&corpus());
        let scores = index.scores(&tokens("earbuds")).unwrap();
        assert_eq!(scores.len(), 4);
        assert_eq!(index.corpus_len(), 4);
    }

    #[test]
    fn test_matching_documents_outscore_non_matching() {
        let index = Bm25Index::new(&corpus());
        let scores = index.scores(&tokens("bluetooth earbuds")).unwrap();

        assert!(scores[0] > scores[1]);
        assert!(scores[0] > scores[3]);
        assert_eq!(scores[2], 0.0);
        assert!(scores.iter().all(|&s| s >= 0.0));
    }

    #[test]
    fn test_shorter_document_wins_on_equal_tf() {
        let index = Bm25Index::new(&corpus());
        let scores = index.scores(&tokens("earbuds")).unwrap();
        // "wired earbuds" is shorter than the first document
        assert!(scores[1] > scores[0]);
    }

    #[test]
    fn test_unknown_terms_score_zero() {
        let index = Bm25Index::new(&corpus());
        let scores = index.scores(&tokens("trampoline")).unwrap();
        assert!(scores.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_empty_corpus() {
        let index = Bm25Index::new(&[]);
        assert!(index.scores(&tokens("anything")).unwrap().is_empty());
    }
}
