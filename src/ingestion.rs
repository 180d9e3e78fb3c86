use kdam::{BarExt, tqdm};

use crate::{
    corpus::Chunk,
    embedding::Embedder,
    error::{Error, Result},
    vector_index::{Distance, Point, VectorIndex},
};

/// Default number of chunks embedded per provider request.
pub const DEFAULT_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub collection: String,
    pub batch_size: usize,
    /// Drop and recreate the collection instead of writing into it.
    pub recreate: bool,
    pub show_progress: bool,
}

impl IngestOptions {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            recreate: false,
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub chunks: usize,
    pub dimension: usize,
    pub created_collection: bool,
}

/// Embed `chunks` and write them to the index as one batch.
///
/// Point ids are the chunk ids, so re-ingesting the same corpus into an
/// existing collection overwrites the previous points.
pub async fn ingest(
    chunks: &[Chunk],
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    options: &IngestOptions,
) -> Result<IngestReport> {
    if chunks.is_empty() {
        tracing::warn!("corpus has no sections, nothing to ingest");
        return Ok(IngestReport {
            chunks: 0,
            dimension: 0,
            created_collection: false,
        });
    }

    let vectors = embed_chunks(chunks, embedder, options).await?;
    let dimension = vectors[0].len();
    if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
        return Err(Error::upstream(
            "embedding provider",
            "returned vectors of inconsistent dimension",
        ));
    }

    let created_collection =
        ensure_collection(index, options, dimension).await?;

    let uploaded_at = chrono::Utc::now().to_rfc3339();
    let points: Vec<Point> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| Point {
            id: chunk.id,
            vector,
            payload: chunk.to_payload(&uploaded_at),
        })
        .collect();

    index.upsert(&options.collection, points).await?;
    tracing::info!(
        collection = %options.collection,
        chunks = chunks.len(),
        dimension,
        "ingested corpus"
    );

    Ok(IngestReport {
        chunks: chunks.len(),
        dimension,
        created_collection,
    })
}

async fn embed_chunks(
    chunks: &[Chunk],
    embedder: &dyn Embedder,
    options: &IngestOptions,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = options.batch_size.max(1);
    let mut bar = options
        .show_progress
        .then(|| tqdm!(total = chunks.len(), desc = "Embedding"));

    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> =
            batch.iter().map(|c| c.content.clone()).collect();
        let embedded = embedder.embed_batch(&texts).await?;
        if embedded.len() != texts.len() {
            return Err(Error::upstream(
                "embedding provider",
                format!(
                    "returned {} vectors for {} texts",
                    embedded.len(),
                    texts.len()
                ),
            ));
        }
        vectors.extend(embedded);

        if let Some(bar) = bar.as_mut() {
            bar.update(batch.len())?;
        }
    }

    if bar.is_some() {
        eprintln!();
    }
    Ok(vectors)
}

/// Make sure the target collection exists. Returns whether it was created.
async fn ensure_collection(
    index: &dyn VectorIndex,
    options: &IngestOptions,
    dimension: usize,
) -> Result<bool> {
    let name = options.collection.as_str();
    let exists = index.collection_exists(name).await?;

    if exists && !options.recreate {
        tracing::info!(collection = name, "using existing collection");
        return Ok(false);
    }
    if exists {
        index.delete_collection(name).await?;
    }

    index
        .create_collection(name, dimension, Distance::Cosine)
        .await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        corpus::{self, Chapter, Document, Section},
        testing::{HashingEmbedder, MemoryIndex},
    };

    fn document(sections: usize) -> Document {
        Document {
            title: "Clima".to_string(),
            chapters: vec![Chapter {
                number: 1,
                title: "Causas".to_string(),
                sections: (0..sections)
                    .map(|i| Section {
                        kind: "note".to_string(),
                        content: format!("section number {i} about methane"),
                        title: None,
                        metadata: None,
                    })
                    .collect(),
            }],
        }
    }

    #[tokio::test]
    async fn ingest_creates_collection_and_writes_every_chunk() {
        let chunks = corpus::flatten(&document(5));
        let embedder = HashingEmbedder::new(32);
        let index = MemoryIndex::default();
        let mut options = IngestOptions::new("clima");
        options.batch_size = 2;

        let report = ingest(&chunks, &embedder, &index, &options).await.unwrap();

        assert_eq!(
            report,
            IngestReport {
                chunks: 5,
                dimension: 32,
                created_collection: true,
            }
        );
        let info = index.collection_info("clima").await.unwrap();
        assert_eq!(info.point_count, 5);

        let stored = index.payload("clima", 3).unwrap();
        assert_eq!(stored.chunk_id, Some(3));
        assert_eq!(stored.content, "section number 3 about methane");
        assert!(stored.uploaded_at.is_some());
    }

    #[tokio::test]
    async fn reingest_overwrites_points_by_id() {
        let chunks = corpus::flatten(&document(3));
        let embedder = HashingEmbedder::new(16);
        let index = MemoryIndex::default();
        let options = IngestOptions::new("clima");

        ingest(&chunks, &embedder, &index, &options).await.unwrap();
        let report = ingest(&chunks, &embedder, &index, &options).await.unwrap();

        assert!(!report.created_collection);
        let info = index.collection_info("clima").await.unwrap();
        assert_eq!(info.point_count, 3);
    }

    #[tokio::test]
    async fn recreate_drops_stale_points() {
        let embedder = HashingEmbedder::new(16);
        let index = MemoryIndex::default();
        let mut options = IngestOptions::new("clima");

        ingest(&corpus::flatten(&document(4)), &embedder, &index, &options)
            .await
            .unwrap();

        options.recreate = true;
        let report =
            ingest(&corpus::flatten(&document(2)), &embedder, &index, &options)
                .await
                .unwrap();

        assert!(report.created_collection);
        let info = index.collection_info("clima").await.unwrap();
        assert_eq!(info.point_count, 2);
    }

    #[tokio::test]
    async fn empty_corpus_is_a_no_op() {
        let embedder = HashingEmbedder::new(16);
        let index = MemoryIndex::default();

        let report = ingest(&[], &embedder, &index, &IngestOptions::new("clima"))
            .await
            .unwrap();

        assert_eq!(report.chunks, 0);
        assert!(!index.collection_exists("clima").await.unwrap());
    }
}
