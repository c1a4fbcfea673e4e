//! OpenAI-compatible embedding backend

use super::{EmbeddingConfig, EmbeddingError, status_error};
use serde::{Deserialize, Serialize};

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Client for `POST {base}/embeddings`
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dim: usize,
    send_dimensions: bool,
}

impl OpenAiEmbedder {
    pub(super) fn new(client: reqwest::Client, config: &EmbeddingConfig) -> Self {
        Self {
            client,
            base_url: config
                .host
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dim: config.dim,
            send_dimensions: config.send_dimensions,
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
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }

    pub(super) async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
            dimensions: self.send_dimensions.then_some(self.dim),
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
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

        let body: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|source| EmbeddingError::Transport {
                    provider: PROVIDER,
                    source,
                })?;
        Ok(into_ordered_vectors(body))
    }
}

/// Responses may list items out of order; `index` is authoritative.
fn into_ordered_vectors(mut body: EmbeddingResponse) -> Vec<Vec<f32>> {
    body.data.sort_by_key(|item| item.index);
    body.data.into_iter().map(|item| item.embedding).collect()
}
