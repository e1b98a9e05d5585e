//! Static lookup artifacts loaded once at startup
//!
//! Both files are produced offline. Anything missing or inconsistent is
//! an [`AppError::Artifact`]; the engine refuses to start without them.

use crate::retrieval::Bm25Index;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shopsage_common::errors::{AppError, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let artifact_error = |message: String| AppError::Artifact {
        path: path.display().to_string(),
        message,
    };

    let bytes = std::fs::read(path).map_err(|e| artifact_error(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| artifact_error(format!("corrupt artifact: {}", e)))
}

/// Tokenized corpus plus the product id at each corpus position
#[derive(Debug, Deserialize)]
pub struct KeywordIndexArtifact {
    pub product_ids: Vec<String>,
    pub corpus: Vec<Vec<String>>,
}

impl KeywordIndexArtifact {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let artifact: Self = read_json(path)?;

        if artifact.product_ids.len() != artifact.corpus.len() {
            return Err(AppError::Artifact {
                path: path.display().to_string(),
                message: format!(
                    "{} product ids for {} corpus documents",
                    artifact.product_ids.len(),
                    artifact.corpus.len()
                ),
            });
        }

        info!(
            path = %path.display(),
            documents = artifact.corpus.len(),
            "Keyword index loaded"
        );
        Ok(artifact)
    }

    /// Build the BM25 scorer and hand back the aligned id list
    pub fn into_index(self) -> (Bm25Index, Vec<String>) {
        (Bm25Index::new(&self.corpus), self.product_ids)
    }
}

/// Product id to vector-index point id
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct IdMapping(HashMap<String, u64>);

impl IdMapping {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mapping: Self = read_json(path)?;
        info!(path = %path.display(), entries = mapping.len(), "Id mapping loaded");
        Ok(mapping)
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    pub fn get(&self, product_id: &str) -> Option<u64> {
        self.0.get(product_id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
