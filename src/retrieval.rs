use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    embedding::Embedder,
    error::{Error, Result},
    generator::{Answer, AnswerGenerator, UnavailableReason, build_prompt},
    vector_index::{ScoredPoint, VectorIndex},
};

/// Largest number of results a single request may ask for.
pub const MAX_LIMIT: usize = 20;

/// Default number of results per request.
pub const DEFAULT_LIMIT: usize = 5;

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub score: f32,
    pub content: String,
    pub chapter_title: String,
    pub section_title: String,
    pub metadata: ResultMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub section_type: String,
    pub word_count: u32,
    pub key_terms: Vec<String>,
    pub chapter_number: u32,
    pub document_title: String,
}

impl From<ScoredPoint> for SearchResult {
    fn from(point: ScoredPoint) -> Self {
        let payload = point.payload;
        let meta = payload.metadata;
        Self {
            score: point.score,
            content: payload.content,
            chapter_title: meta.chapter_title,
            section_title: meta.section_title,
            metadata: ResultMetadata {
                section_type: meta.section_type,
                word_count: meta.word_count,
                key_terms: meta.key_terms,
                chapter_number: meta.chapter_number,
                document_title: meta.document_title,
            },
        }
    }
}

/// Check request parameters before anything reaches an upstream service.
pub fn validate(
    question: &str,
    limit: usize,
    score_threshold: f32,
) -> Result<()> {
    if question.trim().is_empty() {
        return Err(Error::Validation("question must not be empty".into()));
    }
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(Error::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        )));
    }
    if !(0.0..=1.0).contains(&score_threshold) {
        return Err(Error::Validation(format!(
            "score_threshold must be between 0 and 1, got {score_threshold}"
        )));
    }
    Ok(())
}

/// Drop results scoring below `threshold`.
///
/// A threshold of exactly 0 disables filtering altogether, so results with
/// negative similarity are kept in that case.
pub fn apply_threshold(
    results: Vec<SearchResult>,
    threshold: f32,
) -> Vec<SearchResult> {
    if threshold > 0.0 {
        results.into_iter().filter(|r| r.score >= threshold).collect()
    } else {
        results
    }
}

/// Embeds questions, queries the index and optionally asks the generator.
///
/// Components that failed to initialize are absent; operations needing them
/// fail with [`Error::Unavailable`].
#[derive(Clone)]
pub struct Retriever {
    collection: String,
    embedder: Option<Arc<dyn Embedder>>,
    index: Option<Arc<dyn VectorIndex>>,
    generator: Option<Arc<dyn AnswerGenerator>>,
}

impl Retriever {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            embedder: None,
            index: None,
            generator: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn embedder(&self) -> Option<&dyn Embedder> {
        self.embedder.as_deref()
    }

    pub fn index(&self) -> Option<&dyn VectorIndex> {
        self.index.as_deref()
    }

    pub fn generator(&self) -> Option<&dyn AnswerGenerator> {
        self.generator.as_deref()
    }

    fn require_index(&self) -> Result<&dyn VectorIndex> {
        self.index().ok_or(Error::Unavailable("vector index"))
    }

    /// The `limit` nearest chunks to `question`, unfiltered, best first.
    pub async fn search(
        &self,
        question: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let embedder = self
            .embedder()
            .ok_or(Error::Unavailable("embedding provider"))?;
        let index = self.require_index()?;

        let vector = embedder.embed(question).await?;
        let points = index.query(&self.collection, &vector, limit).await?;

        tracing::debug!(
            collection = %self.collection,
            hits = points.len(),
            "queried index"
        );
        Ok(points.into_iter().map(SearchResult::from).collect())
    }

    /// Retrieve chunks for `question`, keeping those scoring at least
    /// `score_threshold`, in the order the index ranked them.
    ///
    /// An empty outcome, before or after filtering, is
    /// [`Error::NoResults`].
    pub async fn retrieve(
        &self,
        question: &str,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        validate(question, limit, score_threshold)?;

        let results = self.search(question, limit).await?;
        if results.is_empty() {
            return Err(Error::NoResults { threshold: None });
        }

        let results = apply_threshold(results, score_threshold);
        if results.is_empty() {
            return Err(Error::NoResults {
                threshold: Some(score_threshold),
            });
        }
        Ok(results)
    }

    /// Ask the generator to answer `question` from `context`.
    pub async fn answer(
        &self,
        question: &str,
        context: &[SearchResult],
    ) -> Answer {
        let Some(generator) = self.generator() else {
            return Answer::Unavailable(UnavailableReason::NotConfigured);
        };

        let prompt = build_prompt(question, context);
        let answer = generator.complete(&prompt).await;
        if let Answer::Unavailable(reason) = &answer {
            tracing::warn!(%reason, "no answer generated");
        }
        answer
    }

    /// Like [`Retriever::answer`], but reports [`UnavailableReason::Disabled`]
    /// without calling the generator when `use_llm` is false.
    pub async fn answer_if(
        &self,
        use_llm: bool,
        question: &str,
        context: &[SearchResult],
    ) -> Answer {
        if !use_llm {
            return Answer::Unavailable(UnavailableReason::Disabled);
        }
        self.answer(question, context).await
    }
}
