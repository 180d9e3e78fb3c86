use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::{Error, Result},
};

const SERVICE: &str = "embedding provider";

/// Text used to check the provider at start-up and learn its dimension.
const PROBE_TEXT: &str = "cambio climático";

/// Turns text into fixed-length vectors.
///
/// Implementations must be deterministic for identical input and model, and
/// every vector they return must have the same dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the model producing the vectors.
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts; the output order matches the input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a fixed probe string and return the vector dimension.
pub async fn probe(embedder: &dyn Embedder) -> Result<usize> {
    let vector = embedder.embed(PROBE_TEXT).await?;
    if vector.is_empty() {
        return Err(Error::upstream(SERVICE, "probe returned an empty vector"));
    }
    Ok(vector.len())
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Client for any server exposing an OpenAI-compatible `/embeddings` route
/// (text-embeddings-inference, Ollama, OpenAI).
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.embedding_url.clone(),
            config.embedding_model.clone(),
            config.embedding_api_key.clone(),
            config.request_timeout,
        )
    }

    async fn call_api(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input,
        };

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                service: SERVICE,
                status: Some(status.as_u16()),
                message: body,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        order_embeddings(parsed.data, input.len())
    }
}

/// Put the returned vectors back in request order and check the count.
fn order_embeddings(
    mut data: Vec<EmbeddingData>,
    expected: usize,
) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(Error::upstream(
            SERVICE,
            format!(
                "returned {} embeddings for {expected} inputs",
                data.len()
            ),
        ));
    }

    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }

    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.call_api(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::upstream(SERVICE, "no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.call_api(texts).await
    }
}
