//! Gemini embedding backend

use super::{EmbeddingConfig, EmbeddingError, status_error};
use serde::{Deserialize, Serialize};

const PROVIDER: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const TASK_TYPE: &str = "RETRIEVAL_DOCUMENT";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

/// Client for `models/{model}:batchEmbedContents`
pub struct GeminiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    qualified_model: String,
    dim: usize,
}

impl GeminiEmbedder {
    pub(super) fn new(client: reqwest::Client, config: &EmbeddingConfig) -> Self {
        let model = config.model.trim_start_matches("models/").to_string();
        Self {
            client,
            base_url: config
                .host
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: config.api_key.clone(),
            qualified_model: format!("models/{model}"),
            model,
            dim: config.dim,
        }
    }

    /// Model name
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Output dimension
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:batchEmbedContents",
            self.base_url.trim_end_matches('/'),
            self.qualified_model
        )
    }

    fn request<'a>(&'a self, texts: &'a [String]) -> BatchRequest<'a> {
        // Gemini is always told the output dimensionality.
        BatchRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: &self.qualified_model,
                    content: Content {
                        parts: [Part { text }],
                    },
                    task_type: TASK_TYPE,
                    output_dimensionality: self.dim,
                })
                .collect(),
        }
    }

    pub(super) async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut builder = self.client.post(self.endpoint()).json(&self.request(texts));
        if let Some(key) = &self.api_key {
            builder = builder.header("x-goog-api-key", key);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| EmbeddingError::Transport {
                provider: PROVIDER,
                source,
            })?;
        if !response.status().is_success() {
            return Err(status_error(PROVIDER, response).await);
        }

        let body: BatchResponse =
            response
                .json()
                .await
                .map_err(|source| EmbeddingError::Transport {
                    provider: PROVIDER,
                    source,
                })?;
        Ok(body.embeddings.into_iter().map(|e| e.values).collect())
    }
}
