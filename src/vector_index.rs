use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;

use crate::{
    config::Config,
    corpus::ChunkPayload,
    error::{Error, Result},
};

const SERVICE: &str = "qdrant";

/// Characters escaped when a collection name is placed in a URL path.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
}

/// A vector and its payload, ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(String),
}

/// A query hit. Higher scores are more similar.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredPoint {
    pub id: PointId,
    pub score: f32,
    #[serde(default)]
    pub payload: ChunkPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub point_count: u64,
    pub vector_count: Option<u64>,
    pub status: String,
    pub vectors_config: serde_json::Value,
}

/// Nearest-neighbour store holding the corpus chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Base URL or other human-readable location of the index.
    fn location(&self) -> &str;

    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<()>;

    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Write points, overwriting any existing point with the same id.
    async fn upsert(&self, name: &str, points: Vec<Point>) -> Result<()>;

    /// The `limit` nearest points to `vector`, best first.
    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionsList {
    collections: Vec<CollectionName>,
}

#[derive(Debug, Deserialize)]
struct CollectionName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Exists {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct RawCollectionInfo {
    #[serde(default)]
    status: String,
    #[serde(default)]
    points_count: Option<u64>,
    #[serde(default)]
    vectors_count: Option<u64>,
    #[serde(default)]
    config: serde_json::Value,
}

impl From<RawCollectionInfo> for CollectionInfo {
    fn from(raw: RawCollectionInfo) -> Self {
        let vectors_config = raw
            .config
            .pointer("/params/vectors")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        Self {
            point_count: raw.points_count.unwrap_or(0),
            vector_count: raw.vectors_count,
            status: raw.status,
            vectors_config,
        }
    }
}

/// Client for the Qdrant HTTP API.
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantIndex {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.qdrant_url.clone(),
            config.qdrant_api_key.clone(),
            config.request_timeout,
        )
    }

    fn collection_url(&self, name: &str, suffix: &str) -> String {
        format!(
            "{}/collections/{}{suffix}",
            self.base_url,
            utf8_percent_encode(name, PATH_SEGMENT)
        )
    }

    async fn send<T: DeserializeOwned>(
        &self,
        mut request: RequestBuilder,
        collection: Option<&str>,
    ) -> Result<T> {
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND
            && let Some(name) = collection
        {
            return Err(Error::NotFound {
                kind: "collection",
                name: name.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                service: SERVICE,
                status: Some(status.as_u16()),
                message: error_message(&body),
            });
        }

        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.result)
    }
}

/// Pull `status.error` out of a Qdrant error body, falling back to the body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/status/error")
                .and_then(|e| e.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn location(&self) -> &str {
        &self.base_url
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let request = self.client.get(format!("{}/collections", self.base_url));
        let list: CollectionsList = self.send(request, None).await?;
        Ok(list.collections.into_iter().map(|c| c.name).collect())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let request = self.client.get(self.collection_url(name, "/exists"));
        let exists: Exists = self.send(request, None).await?;
        Ok(exists.exists)
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<()> {
        let request = self.client.put(self.collection_url(name, "")).json(
            &json!({ "vectors": { "size": dimension, "distance": distance } }),
        );
        let _: serde_json::Value = self.send(request, None).await?;
        tracing::info!(collection = name, dimension, "created collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let request = self.client.delete(self.collection_url(name, ""));
        let _: serde_json::Value = self.send(request, None).await?;
        tracing::info!(collection = name, "deleted collection");
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<Point>) -> Result<()> {
        let count = points.len();
        let request = self
            .client
            .put(self.collection_url(name, "/points?wait=true"))
            .json(&json!({ "points": points }));
        let _: serde_json::Value = self.send(request, Some(name)).await?;
        tracing::debug!(collection = name, count, "upserted points");
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let request = self
            .client
            .post(self.collection_url(name, "/points/query"))
            .json(&json!({
                "query": vector,
                "limit": limit,
                "with_payload": true,
            }));
        let result: QueryResult = self.send(request, Some(name)).await?;
        Ok(result.points)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let request = self.client.get(self.collection_url(name, ""));
        let raw: RawCollectionInfo = self.send(request, Some(name)).await?;
        Ok(raw.into())
    }
}
