use crate::chunking::{estimate_token_count, TextChunk};
use crate::config::QdrantConfig;
use crate::embeddings::Embedding;
use anyhow::{Context, Result};
use log::debug;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;

/// A retrieved chunk together with its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

/// Storage and similarity search for embedded chunks
#[allow(async_fn_in_trait)]
pub trait VectorStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    async fn create_collection(&self, collection: &str, dimension: u64) -> Result<()>;

    async fn delete_collection(&self, collection: &str) -> Result<()>;

    /// Number of points currently stored in the collection
    async fn point_count(&self, collection: &str) -> Result<u64>;

    /// Store chunks with their embeddings, appending after existing points
    async fn store_chunks(
        &self,
        collection: &str,
        chunks: Vec<TextChunk>,
        embeddings: Vec<Embedding>,
    ) -> Result<()>;

    /// Nearest chunks to `query_embedding`, most similar first
    async fn search(
        &self,
        collection: &str,
        query_embedding: Embedding,
        limit: u64,
    ) -> Result<Vec<ScoredChunk>>;
}

/// Client for interacting with Qdrant
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    /// Create a new Qdrant client
    pub fn new(config: QdrantConfig) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = config.api_key {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder
            .build()
            .with_context(|| format!("Failed to connect to Qdrant at {}", config.url))?;

        Ok(QdrantStore { client })
    }
}

impl VectorStore for QdrantStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        match self.client.collection_info(collection).await {
            Ok(_) => Ok(true),
            Err(qdrant_client::QdrantError::ResponseError { status })
                if status.code() == tonic::Code::NotFound =>
            {
                Ok(false)
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to check collection existence: {}",
                e
            )),
        }
    }

    async fn create_collection(&self, collection: &str, dimension: u64) -> Result<()> {
        let create_collection = CreateCollectionBuilder::new(collection)
            .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine));

        self.client
            .create_collection(create_collection)
            .await
            .with_context(|| format!("Failed to create collection {}", collection))?;

        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.client
            .delete_collection(collection)
            .await
            .with_context(|| format!("Failed to delete collection {}", collection))?;

        Ok(())
    }

    async fn point_count(&self, collection: &str) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .with_context(|| format!("Failed to count points in collection {}", collection))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn store_chunks(
        &self,
        collection: &str,
        chunks: Vec<TextChunk>,
        embeddings: Vec<Embedding>,
    ) -> Result<()> {
        if chunks.len() != embeddings.len() {
            anyhow::bail!(
                "Cannot store {} chunks with {} embeddings",
                chunks.len(),
                embeddings.len()
            );
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let first_id = self.point_count(collection).await?;
        let points = build_points(first_id, &chunks, embeddings);
        let count = points.len();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .with_context(|| format!("Failed to upsert points in collection {}", collection))?;

        debug!(
            "Stored {} points in {} starting at id {}",
            count, collection, first_id
        );
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_embedding: Embedding,
        limit: u64,
    ) -> Result<Vec<ScoredChunk>> {
        let search_request =
            SearchPointsBuilder::new(collection, query_embedding.values, limit).with_payload(true);

        let search_response = self
            .client
            .search_points(search_request)
            .await
            .with_context(|| format!("Failed to search collection {}", collection))?;

        Ok(search_response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                let chunk = chunk_from_payload(&scored_point.payload, collection)?;
                Some(ScoredChunk {
                    chunk,
                    score: scored_point.score,
                })
            })
            .collect())
    }
}

fn chunk_payload(chunk: &TextChunk) -> HashMap<String, Value> {
    HashMap::from([
        ("text".to_string(), Value::from(chunk.text.clone())),
        (
            "document_id".to_string(),
            Value::from(chunk.document_id.clone()),
        ),
        (
            "chunk_index".to_string(),
            Value::from(chunk.chunk_index as i64),
        ),
        (
            "start_position".to_string(),
            Value::from(chunk.start_position as i64),
        ),
    ])
}

/// One point per chunk, with ids counting up from `first_id`
fn build_points(
    first_id: u64,
    chunks: &[TextChunk],
    embeddings: Vec<Embedding>,
) -> Vec<PointStruct> {
    chunks
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(offset, (chunk, embedding))| {
            PointStruct::new(first_id + offset as u64, embedding.values, chunk_payload(chunk))
        })
        .collect()
}

/// Convert a search hit back into a chunk; points without text are skipped
fn chunk_from_payload(payload: &HashMap<String, Value>, fallback_id: &str) -> Option<TextChunk> {
    let text = payload.get("text")?.as_str()?;
    let document_id = payload
        .get("document_id")
        .and_then(|v| v.as_str())
        .map(|id| id.to_string())
        .unwrap_or_else(|| fallback_id.to_string());
    let integer = |key: &str| {
        payload
            .get(key)
            .and_then(|v| v.as_integer())
            .map(|v| v as usize)
            .unwrap_or(0)
    };

    Some(TextChunk {
        token_count: estimate_token_count(text),
        text: text.to_string(),
        document_id,
        chunk_index: integer("chunk_index"),
        start_position: integer("start_position"),
    })
}

/// Generate a collection name from a file name
pub fn collection_name_for(file_name: &str) -> String {
    // Replace non-alphanumeric characters with underscores and convert to lowercase
    let name = file_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase();

    format!("rag_{}", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::PointId;

    #[test]
    fn test_collection_name_for() {
        assert_eq!(collection_name_for("Annual Report-2023.pdf"), "rag_annual_report_2023_pdf");
        assert_eq!(collection_name_for("notes"), "rag_notes");
    }

    #[test]
    fn test_payload_round_trip() {
        let chunk = TextChunk {
            text: "Qdrant stores vectors.".to_string(),
            token_count: estimate_token_count("Qdrant stores vectors."),
            document_id: "guide.pdf".to_string(),
            chunk_index: 7,
            start_position: 1234,
        };

        let payload = chunk_payload(&chunk);
        assert_eq!(chunk_from_payload(&payload, "rag_guide_pdf"), Some(chunk));
    }

    #[test]
    fn test_build_points_continues_after_existing_ids() {
        let chunks: Vec<TextChunk> = ["first", "second", "third"]
            .iter()
            .enumerate()
            .map(|(i, text)| TextChunk {
                text: text.to_string(),
                token_count: 1,
                document_id: "appendix.pdf".to_string(),
                chunk_index: i,
                start_position: i * 10,
            })
            .collect();
        let embeddings = vec![
            Embedding::new(vec![1.0, 0.0]),
            Embedding::new(vec![0.0, 1.0]),
            Embedding::new(vec![0.5, 0.5]),
        ];

        let points = build_points(5, &chunks, embeddings);

        let ids: Vec<_> = points.iter().map(|p| p.id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                Some(PointId::from(5u64)),
                Some(PointId::from(6u64)),
                Some(PointId::from(7u64))
            ]
        );
        for (point, chunk) in points.iter().zip(&chunks) {
            assert_eq!(
                chunk_from_payload(&point.payload, "rag_appendix_pdf").as_ref(),
                Some(chunk)
            );
        }
    }

    #[test]
    fn test_build_points_from_empty_collection() {
        let chunk = TextChunk {
            text: "only".to_string(),
            token_count: 1,
            document_id: "a.txt".to_string(),
            chunk_index: 0,
            start_position: 0,
        };
        let points = build_points(0, &[chunk], vec![Embedding::new(vec![1.0])]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, Some(PointId::from(0u64)));
    }

    #[test]
    fn test_payload_without_text_is_skipped() {
        let payload = HashMap::from([("document_id".to_string(), Value::from("a.pdf"))]);
        assert_eq!(chunk_from_payload(&payload, "rag_a"), None);
    }

    #[test]
    fn test_payload_defaults() {
        let payload = HashMap::from([("text".to_string(), Value::from("orphan"))]);
        let chunk = chunk_from_payload(&payload, "rag_docs").unwrap();
        assert_eq!(chunk.document_id, "rag_docs");
        assert_eq!(chunk.chunk_index, 0);
        assert_eq!(chunk.start_position, 0);
    }
}
