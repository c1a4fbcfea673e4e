//! Embedding providers used when vectors have to be regenerated.
//!
//! The backend is picked once from configuration. The file migration never
//! embeds anything and runs with [`EmbeddingProvider::Disabled`].

mod gemini;
mod openai;

pub use gemini::GeminiEmbedder;
pub use openai::OpenAiEmbedder;

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during embedding generation.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Provider answered 429
    #[error("rate limited by {provider}: {message}")]
    RateLimited {
        /// Backend name
        provider: &'static str,
        /// Response body
        message: String,
    },

    /// Non-success HTTP status
    #[error("{provider} returned HTTP {status}: {message}")]
    Http {
        /// Backend name
        provider: &'static str,
        /// Status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Network or decoding failure
    #[error("request to {provider} failed: {source}")]
    Transport {
        /// Backend name
        provider: &'static str,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// Response was well-formed JSON but not a usable answer
    #[error("invalid response from {provider}: {message}")]
    InvalidResponse {
        /// Backend name
        provider: &'static str,
        /// What was wrong
        message: String,
    },

    /// Returned vectors have the wrong length
    #[error("embedding dimension mismatch: got {got}, expected {expected}")]
    DimensionMismatch {
        /// Length returned by the provider
        got: usize,
        /// Configured dimension
        expected: usize,
    },

    /// Embedding was requested from a run that must not embed
    #[error("embedding function should not be called during migration")]
    Disabled,
}

/// Supported embedding backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EmbeddingBinding {
    /// OpenAI-compatible `/embeddings` endpoint
    #[value(name = "openai")]
    OpenAi,
    /// Google Gemini `batchEmbedContents`
    Gemini,
}

/// Settings for the embedding backend
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Backend
    pub binding: EmbeddingBinding,
    /// Model name
    pub model: String,
    /// Output dimension
    pub dim: usize,
    /// Base URL override
    pub host: Option<String>,
    /// API key
    pub api_key: Option<String>,
    /// Ask the provider for `dim` explicitly
    pub send_dimensions: bool,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Closed set of embedding backends
pub enum EmbeddingProvider {
    /// OpenAI-compatible API
    OpenAi(OpenAiEmbedder),
    /// Gemini API
    Gemini(GeminiEmbedder),
    /// Refuses every request
    Disabled {
        /// Dimension of the tables the run writes
        dim: usize,
    },
}

impl EmbeddingProvider {
    /// Build the configured backend
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| EmbeddingError::Transport {
                provider: "http-client",
                source,
            })?;

        Ok(match config.binding {
            EmbeddingBinding::OpenAi => Self::OpenAi(OpenAiEmbedder::new(client, config)),
            EmbeddingBinding::Gemini => Self::Gemini(GeminiEmbedder::new(client, config)),
        })
    }

    /// Provider that errors if called
    #[must_use]
    pub const fn disabled(dim: usize) -> Self {
        Self::Disabled { dim }
    }

    /// Output dimension
    #[must_use]
    pub const fn dim(&self) -> usize {
        match self {
            Self::OpenAi(e) => e.dim(),
            Self::Gemini(e) => e.dim(),
            Self::Disabled { dim } => *dim,
        }
    }

    /// Model name, if the backend has one
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::OpenAi(e) => Some(e.model()),
            Self::Gemini(e) => Some(e.model()),
            Self::Disabled { .. } => None,
        }
    }

    /// Embed `texts`, one vector per text in input order
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = match self {
            Self::OpenAi(e) => e.embed(texts).await?,
            Self::Gemini(e) => e.embed(texts).await?,
            Self::Disabled { .. } => return Err(EmbeddingError::Disabled),
        };
        check_vectors(vectors, texts.len(), self.dim())
    }
}

fn check_vectors(
    vectors: Vec<Vec<f32>>,
    expected_count: usize,
    dim: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingError::InvalidResponse {
            provider: "embedding",
            message: format!("expected {expected_count} vectors, got {}", vectors.len()),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(EmbeddingError::DimensionMismatch {
            got: bad.len(),
            expected: dim,
        });
    }
    Ok(vectors)
}

/// Map a non-success response to an error
async fn status_error(provider: &'static str, response: reqwest::Response) -> EmbeddingError {
    let status = response.status();
    let message = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        EmbeddingError::RateLimited { provider, message }
    } else {
        EmbeddingError::Http {
            provider,
            status: status.as_u16(),
            message,
        }
    }
}
