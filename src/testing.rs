//! In-process stand-ins for the external services, used by unit tests.

use std::{
    collections::{BTreeMap, HashMap, hash_map::DefaultHasher},
    hash::{Hash, Hasher},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{
    corpus::{ChunkMetadata, ChunkPayload},
    embedding::Embedder,
    error::{Error, Result},
    generator::{Answer, AnswerGenerator, UnavailableReason},
    retrieval::{ResultMetadata, SearchResult},
    vector_index::{
        CollectionInfo,
        Distance,
        Point,
        PointId,
        ScoredPoint,
        VectorIndex,
    },
};

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}

pub fn search_result(score: f32, content: &str) -> SearchResult {
    SearchResult {
        score,
        content: content.to_string(),
        chapter_title: "Capítulo".to_string(),
        section_title: "Sección".to_string(),
        metadata: ResultMetadata::default(),
    }
}

/// Bag-of-words embedder: each lowercase word is hashed into a bucket.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model(&self) -> &str {
        "hashing-test"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

struct Collection {
    dimension: usize,
    points: BTreeMap<u64, Point>,
}

/// Brute-force cosine index kept in memory.
#[derive(Default)]
pub struct MemoryIndex {
    collections: Mutex<HashMap<String, Collection>>,
}

impl MemoryIndex {
    pub fn payload(&self, name: &str, id: u64) -> Option<ChunkPayload> {
        let collections = self.collections.lock().ok()?;
        collections
            .get(name)?
            .points
            .get(&id)
            .map(|p| p.payload.clone())
    }

    fn missing(name: &str) -> Error {
        Error::NotFound {
            kind: "collection",
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn location(&self) -> &str {
        "memory"
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collections.lock().unwrap().keys().cloned().collect())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.lock().unwrap().contains_key(name))
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        _distance: Distance,
    ) -> Result<()> {
        self.collections.lock().unwrap().insert(
            name.to_string(),
            Collection {
                dimension,
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.lock().unwrap().remove(name);
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<Point>) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        let collection =
            collections.get_mut(name).ok_or_else(|| Self::missing(name))?;
        for point in points {
            if point.vector.len() != collection.dimension {
                return Err(Error::upstream("memory", "dimension mismatch"));
            }
            collection.points.insert(point.id, point);
        }
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.lock().unwrap();
        let collection =
            collections.get(name).ok_or_else(|| Self::missing(name))?;

        let mut hits: Vec<ScoredPoint> = collection
            .points
            .values()
            .map(|p| ScoredPoint {
                id: PointId::Num(p.id),
                score: cosine(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let collections = self.collections.lock().unwrap();
        let collection =
            collections.get(name).ok_or_else(|| Self::missing(name))?;
        let count = collection.points.len() as u64;
        Ok(CollectionInfo {
            point_count: count,
            vector_count: Some(count),
            status: "green".to_string(),
            vectors_config: serde_json::json!({
                "size": collection.dimension,
                "distance": "Cosine",
            }),
        })
    }
}

/// Index returning fixed scores, one point per score, in the given order.
pub struct ScriptedIndex {
    scores: Vec<f32>,
}

impl ScriptedIndex {
    pub fn new(scores: Vec<f32>) -> Self {
        Self { scores }
    }
}

#[async_trait]
impl VectorIndex for ScriptedIndex {
    fn location(&self) -> &str {
        "scripted"
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(vec!["clima_test".to_string()])
    }

    async fn collection_exists(&self, _name: &str) -> Result<bool> {
        Ok(true)
    }

    async fn create_collection(
        &self,
        _name: &str,
        _dimension: usize,
        _distance: Distance,
    ) -> Result<()> {
        Ok(())
    }

    async fn delete_collection(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, _name: &str, _points: Vec<Point>) -> Result<()> {
        Ok(())
    }

    async fn query(
        &self,
        _name: &str,
        _vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        Ok(self
            .scores
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, &score)| ScoredPoint {
                id: PointId::Num(i as u64),
                score,
                payload: ChunkPayload {
                    metadata: ChunkMetadata {
                        chapter_number: 1,
                        chapter_title: "Ch1".to_string(),
                        section_type: "note".to_string(),
                        section_title: format!("Passage {i}"),
                        ..Default::default()
                    },
                    content: format!("passage {i}"),
                    uploaded_at: None,
                    chunk_id: Some(i as u64),
                },
            })
            .collect())
    }

    async fn collection_info(&self, _name: &str) -> Result<CollectionInfo> {
        Ok(CollectionInfo {
            point_count: self.scores.len() as u64,
            vector_count: None,
            status: "green".to_string(),
            vectors_config: serde_json::Value::Null,
        })
    }
}

/// Index whose every call fails as if the server were down.
pub struct FailingIndex;

impl FailingIndex {
    fn error() -> Error {
        Error::Upstream {
            service: "qdrant",
            status: Some(503),
            message: "unavailable".to_string(),
        }
    }
}

#[async_trait]
impl VectorIndex for FailingIndex {
    fn location(&self) -> &str {
        "failing"
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Err(Self::error())
    }

    async fn collection_exists(&self, _name: &str) -> Result<bool> {
        Err(Self::error())
    }

    async fn create_collection(
        &self,
        _name: &str,
        _dimension: usize,
        _distance: Distance,
    ) -> Result<()> {
        Err(Self::error())
    }

    async fn delete_collection(&self, _name: &str) -> Result<()> {
        Err(Self::error())
    }

    async fn upsert(&self, _name: &str, _points: Vec<Point>) -> Result<()> {
        Err(Self::error())
    }

    async fn query(
        &self,
        _name: &str,
        _vector: &[f32],
        _limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        Err(Self::error())
    }

    async fn collection_info(&self, _name: &str) -> Result<CollectionInfo> {
        Err(Self::error())
    }
}

/// Generator returning a canned answer and recording the prompts it saw.
pub struct StaticGenerator {
    answer: Answer,
    prompts: Mutex<Vec<String>>,
}

impl StaticGenerator {
    pub fn answering(text: &str) -> Self {
        Self {
            answer: Answer::Generated(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: UnavailableReason) -> Self {
        Self {
            answer: Answer::Unavailable(reason),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerGenerator for StaticGenerator {
    fn model(&self) -> &str {
        "static-test"
    }

    async fn complete(&self, prompt: &str) -> Answer {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answer.clone()
    }
}
