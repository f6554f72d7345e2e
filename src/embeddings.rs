use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Embedding { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// A model that turns text into vectors.
///
/// Documents and queries are embedded separately because retrieval models
/// encode the two sides of a search differently.
#[allow(async_fn_in_trait)]
pub trait Embedder {
    /// Embed document chunks; the result has the same length and order as `texts`
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a search query
    async fn embed_query(&self, text: &str) -> Result<Embedding>;
}
