use anyhow::{Context, Result};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{GeminiConfig, GenerationOptions};
use crate::embeddings::{Embedder, Embedding};
use crate::generation::Generator;

/// Client for interacting with Gemini API
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a new Gemini client. Fails when no API key is configured.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        let client = reqwest::Client::new();
        Ok(GeminiClient {
            config,
            api_key,
            client,
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            model_path(model),
            method
        )
    }

    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach Gemini endpoint {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "API request failed: {} {}",
                status,
                error_text
            ));
        }

        response
            .json()
            .await
            .context("Failed to decode Gemini response")
    }

    fn embed_request<'a>(&'a self, text: &'a str, task_type: TaskType) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: model_path(&self.config.embedding_model),
            content: Content::user(text),
            task_type,
            output_dimensionality: self.config.embedding_dimension,
        }
    }

    /// Generate text using the configured chat model
    pub async fn generate_text(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content::user(prompt)],
            generation_config: GenerationConfig::from(options),
        };

        let url = self.endpoint(&self.config.chat_model, "generateContent");
        let response: GenerateResponse = self.post_json(&url, &request).await?;
        response.into_text()
    }
}

impl Embedder for GeminiClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        let url = self.endpoint(&self.config.embedding_model, "batchEmbedContents");

        for batch in texts.chunks(self.config.embedding_batch_size.max(1)) {
            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|text| self.embed_request(text, TaskType::RetrievalDocument))
                    .collect(),
            };

            let response: BatchEmbedResponse = self.post_json(&url, &request).await?;
            if response.embeddings.len() != batch.len() {
                anyhow::bail!(
                    "Gemini returned {} embeddings for a batch of {} texts",
                    response.embeddings.len(),
                    batch.len()
                );
            }

            debug!("Embedded batch of {} chunks", batch.len());
            embeddings.extend(
                response
                    .embeddings
                    .into_iter()
                    .map(|data| Embedding::new(data.values)),
            );
        }

        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        let request = self.embed_request(text, TaskType::RetrievalQuery);
        let url = self.endpoint(&self.config.embedding_model, "embedContent");

        let response: EmbedContentResponse = self.post_json(&url, &request).await?;
        Ok(Embedding::new(response.embedding.values))
    }
}

impl Generator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_text(prompt, &self.config.generation).await
    }
}

/// Model names may be configured with or without the `models/` prefix
fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

// Shared request/response structures for the Gemini API

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<u32>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize, Debug)]
struct EmbedContentResponse {
    embedding: EmbeddingData,
}

#[derive(Deserialize, Debug)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
    role: &'static str,
}

impl<'a> Content<'a> {
    fn user(text: &'a str) -> Self {
        Content {
            parts: vec![Part { text }],
            role: "user",
        }
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

impl From<&GenerationOptions> for GenerationConfig {
    fn from(options: &GenerationOptions) -> Self {
        GenerationConfig {
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            max_output_tokens: options.max_output_tokens,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateResponse {
    /// Extract the generated text from the response
    fn into_text(self) -> Result<String> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            anyhow::bail!("Prompt was blocked by Gemini: {}", reason);
        }

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No response generated"))?;
        let finish_reason = candidate.finish_reason;

        candidate
            .content
            .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
            .ok_or_else(|| match finish_reason {
                Some(reason) => anyhow::anyhow!("No response generated (finish reason: {})", reason),
                None => anyhow::anyhow!("No response generated"),
            })
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> GeminiClient {
        GeminiClient::new(GeminiConfig {
            api_key: Some("test-key".to_string()),
            base_url: "https://example.test/v1beta/".to_string(),
            embedding_dimension: Some(256),
            ..GeminiConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_requires_api_key() {
        assert!(GeminiClient::new(GeminiConfig::default()).is_err());
    }

    #[test]
    fn test_endpoint() {
        let client = client();
        assert_eq!(
            client.endpoint("text-embedding-004", "embedContent"),
            "https://example.test/v1beta/models/text-embedding-004:embedContent"
        );
        assert_eq!(
            client.endpoint("models/gemini-2.0-flash", "generateContent"),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_embed_request_body() {
        let client = client();
        let request = client.embed_request("hello", TaskType::RetrievalQuery);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "models/text-embedding-004",
                "content": { "parts": [{ "text": "hello" }], "role": "user" },
                "taskType": "RETRIEVAL_QUERY",
                "outputDimensionality": 256
            })
        );
    }

    #[test]
    fn test_generate_request_body() {
        let request = GenerateRequest {
            contents: vec![Content::user("prompt")],
            generation_config: GenerationConfig::from(&GenerationOptions::default()),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(value["generationConfig"]["topK"], 40);
        assert_eq!(value["contents"][0]["parts"][0]["text"], "prompt");
    }

    #[test]
    fn test_generate_response_text() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "42" }], "role": "model" },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(response.into_text().unwrap(), "42");
    }

    #[test]
    fn test_generate_response_blocked() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        let err = response.into_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));

        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{ "finishReason": "MAX_TOKENS" }]
        }))
        .unwrap();
        let err = response.into_text().unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn test_batch_embed_response() {
        let response: BatchEmbedResponse = serde_json::from_value(json!({
            "embeddings": [{ "values": [0.1, 0.2] }, { "values": [0.3, 0.4] }]
        }))
        .unwrap();
        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(response.embeddings[1].values, vec![0.3, 0.4]);
    }
}
