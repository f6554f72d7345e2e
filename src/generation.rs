use anyhow::Result;

use crate::database::ScoredChunk;

/// A hosted language model that completes a prompt
#[allow(async_fn_in_trait)]
pub trait Generator {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Build the question-answering prompt from retrieved chunks
pub fn build_rag_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    let context = chunks
        .iter()
        .map(|scored| scored.chunk.text.as_str())
        .collect::<Vec<&str>>()
        .join("\n\n");

    format!(
        "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Keep the answer concise.\n\n\
Context:\n{}\n\n\
Question: {}\n\n\
Answer:",
        context,
        question.trim()
    )
}
