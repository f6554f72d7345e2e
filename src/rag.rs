use crate::chunking::{ChunkingConfig, TextChunk, TextSplitter};
use crate::database::{ScoredChunk, VectorStore};
use crate::document::Document;
use crate::embeddings::Embedder;
use crate::generation::{build_rag_prompt, Generator};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::fmt;
use std::io::{BufRead, Write};

/// Answer given when retrieval finds nothing to ground a response on
pub const NO_CONTEXT_ANSWER: &str = "No relevant information found in the indexed documents.";

/// Outcome of indexing a batch of documents
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestReport {
    pub collection: String,
    pub documents: usize,
    pub skipped_documents: usize,
    pub chunks: usize,
    pub dimension: usize,
}

/// A generated answer with the chunks it was grounded on
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredChunk>,
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text.trim())?;
        if !self.sources.is_empty() {
            write!(f, "\n\nSources:")?;
            for (i, source) in self.sources.iter().enumerate() {
                write!(
                    f,
                    "\n  [{}] {} (chunk {}, score {:.3})",
                    i + 1,
                    source.chunk.document_id,
                    source.chunk.chunk_index,
                    source.score
                )?;
            }
        }
        Ok(())
    }
}

/// RAG (Retrieval-Augmented Generation) engine
pub struct RagEngine<E, S, G> {
    embedder: E,
    store: S,
    generator: G,
    splitter: TextSplitter,
}

impl<E, S, G> RagEngine<E, S, G>
where
    E: Embedder,
    S: VectorStore,
    G: Generator,
{
    /// Create a new RAG engine
    pub fn new(embedder: E, store: S, generator: G, chunking: ChunkingConfig) -> Self {
        RagEngine {
            embedder,
            store,
            generator,
            splitter: TextSplitter::new(chunking),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Check if the collection exists
    pub async fn collection_exists(&self, collection: &str) -> Result<bool> {
        self.store.collection_exists(collection).await
    }

    /// Chunk, embed and store documents in `collection`
    pub async fn ingest(
        &self,
        collection: &str,
        documents: &[Document],
        recreate: bool,
    ) -> Result<IngestReport> {
        let mut report = IngestReport {
            collection: collection.to_string(),
            ..IngestReport::default()
        };

        let mut chunks: Vec<TextChunk> = Vec::new();
        for document in documents {
            let document_chunks = self.splitter.split_document(document);
            if document_chunks.is_empty() {
                warn!("Document {} produced no chunks, skipping", document.document_id);
                report.skipped_documents += 1;
                continue;
            }
            info!(
                "Split {} into {} chunks",
                document.document_id,
                document_chunks.len()
            );
            report.documents += 1;
            chunks.extend(document_chunks);
        }

        if chunks.is_empty() {
            warn!("Nothing to index; collection {} left untouched", collection);
            return Ok(report);
        }

        info!("Generating embeddings for {} chunks...", chunks.len());
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_documents(&texts)
            .await
            .context("Failed to embed chunks")?;

        if embeddings.len() != chunks.len() {
            anyhow::bail!(
                "Embedder returned {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            );
        }
        let dimension = embeddings.first().map(|e| e.dimension()).unwrap_or(0);
        if dimension == 0 || embeddings.iter().any(|e| e.dimension() != dimension) {
            anyhow::bail!("Embedder returned empty or inconsistent embedding dimensions");
        }

        let exists = self.store.collection_exists(collection).await?;
        if exists && recreate {
            info!("Dropping existing collection: {}", collection);
            self.store.delete_collection(collection).await?;
        }
        if !exists || recreate {
            info!("Creating collection {} ({} dimensions)", collection, dimension);
            self.store
                .create_collection(collection, dimension as u64)
                .await?;
        }

        report.chunks = chunks.len();
        report.dimension = dimension;
        self.store
            .store_chunks(collection, chunks, embeddings)
            .await?;

        info!(
            "Indexed {} chunks from {} document(s) into {}",
            report.chunks, report.documents, collection
        );
        Ok(report)
    }

    /// Index a single document into `collection` unless the collection already exists.
    ///
    /// Returns whether indexing happened. A document with no extractable text is an
    /// error, since the collection would otherwise never be created.
    pub async fn index_if_missing(&self, collection: &str, document: &Document) -> Result<bool> {
        if self.store.collection_exists(collection).await? {
            info!("Using existing collection: {}", collection);
            return Ok(false);
        }

        let report = self
            .ingest(collection, std::slice::from_ref(document), false)
            .await?;
        if report.chunks == 0 {
            anyhow::bail!("{} produced no text to index", document.document_id);
        }
        Ok(true)
    }

    /// Retrieve the chunks most similar to `question`
    pub async fn retrieve(
        &self,
        collection: &str,
        question: &str,
        top_k: u64,
    ) -> Result<Vec<ScoredChunk>> {
        let question_embedding = self
            .embedder
            .embed_query(question)
            .await
            .context("Failed to embed question")?;

        let chunks = self
            .store
            .search(collection, question_embedding, top_k)
            .await?;
        debug!("Retrieved {} chunks from {}", chunks.len(), collection);
        Ok(chunks)
    }

    /// Answer a question from the documents in `collection`
    pub async fn answer(&self, collection: &str, question: &str, top_k: u64) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            anyhow::bail!("Question must not be empty");
        }

        let sources = self.retrieve(collection, question, top_k).await?;
        if sources.is_empty() {
            return Ok(Answer {
                text: NO_CONTEXT_ANSWER.to_string(),
                sources,
            });
        }

        let prompt = build_rag_prompt(question, &sources);
        let text = self
            .generator
            .generate(&prompt)
            .await
            .context("Failed to generate answer")?;

        Ok(Answer { text, sources })
    }

    /// Run the query loop for a collection until `exit`, `quit` or end of input
    pub async fn run_query_loop<R, W>(
        &self,
        collection: &str,
        top_k: u64,
        mut input: R,
        mut output: W,
    ) -> Result<()>
    where
        R: BufRead,
        W: Write,
    {
        writeln!(
            output,
            "Ready to answer questions about {}. Type 'exit' to quit.",
            collection
        )?;

        let mut buffer = String::new();
        loop {
            write!(output, "\nYour question: ")?;
            output.flush()?;

            buffer.clear();
            if input.read_line(&mut buffer)? == 0 {
                break;
            }

            let question = buffer.trim();
            if question.is_empty() {
                continue;
            }
            if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
                break;
            }

            // Service errors end only this question; I/O errors end the loop
            match self.answer(collection, question, top_k).await {
                Ok(answer) => writeln!(output, "\n{}", answer)?,
                Err(e) => {
                    error!("Failed to answer question: {:#}", e);
                    writeln!(output, "\nError: {:#}", e)?;
                }
            }
        }

        writeln!(output, "Goodbye!")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_display_lists_sources() {
        let answer = Answer {
            text: "Borrowing.\n".to_string(),
            sources: vec![ScoredChunk {
                chunk: TextChunk {
                    text: "...".to_string(),
                    token_count: 1,
                    document_id: "book.pdf".to_string(),
                    chunk_index: 3,
                    start_position: 0,
                },
                score: 0.8123,
            }],
        };

        assert_eq!(
            answer.to_string(),
            "Borrowing.\n\nSources:\n  [1] book.pdf (chunk 3, score 0.812)"
        );
    }

    #[test]
    fn test_answer_display_without_sources() {
        let answer = Answer {
            text: NO_CONTEXT_ANSWER.to_string(),
            sources: Vec::new(),
        };
        assert_eq!(answer.to_string(), NO_CONTEXT_ANSWER);
    }
}
