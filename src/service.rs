use std::sync::Arc;

use serde::Serialize;

use crate::{
    config::Config,
    embedding::{self, Embedder, HttpEmbedder},
    generator::OpenRouterGenerator,
    retrieval::Retriever,
    vector_index::{CollectionInfo, QdrantIndex, VectorIndex},
};

/// Shared state built once at start-up and handed to every request.
pub struct ServiceContext {
    pub config: Config,
    pub retriever: Retriever,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub index_connected: bool,
    pub embedding_loaded: bool,
    pub generator_available: bool,
    pub collection_info: Option<CollectionInfo>,
    pub timestamp: String,
}

impl ServiceContext {
    pub fn new(config: Config, retriever: Retriever) -> Self {
        Self { config, retriever }
    }

    /// Connect to the configured services.
    ///
    /// A service that cannot be reached is logged and left out, so the
    /// process still starts and reports itself as unhealthy.
    pub async fn initialize(config: Config) -> Self {
        let mut retriever = Retriever::new(config.collection_name.clone());

        match QdrantIndex::from_config(&config) {
            Ok(index) => match index.list_collections().await {
                Ok(collections) => {
                    tracing::info!(
                        url = %index.location(),
                        ?collections,
                        "connected to qdrant"
                    );
                    retriever = retriever.with_index(Arc::new(index));
                }
                Err(e) => {
                    tracing::error!(
                        url = %config.qdrant_url,
                        "failed to connect to qdrant: {e}"
                    );
                }
            },
            Err(e) => tracing::error!("failed to build qdrant client: {e}"),
        }

        match HttpEmbedder::from_config(&config) {
            Ok(embedder) => match embedding::probe(&embedder).await {
                Ok(dimension) => {
                    tracing::info!(
                        model = %config.embedding_model,
                        dimension,
                        "embedding provider ready"
                    );
                    retriever = retriever.with_embedder(Arc::new(embedder));
                }
                Err(e) => {
                    tracing::error!(
                        model = %config.embedding_model,
                        url = %config.embedding_url,
                        "failed to initialize embedding provider: {e}"
                    );
                }
            },
            Err(e) => {
                tracing::error!("failed to build embedding client: {e}")
            }
        }

        match OpenRouterGenerator::from_config(&config) {
            Some(generator) => {
                tracing::info!(
                    model = %config.generator_model,
                    "generator configured"
                );
                retriever = retriever.with_generator(Arc::new(generator));
            }
            None => {
                tracing::warn!("OPENROUTER_API_KEY not set, answers disabled");
            }
        }

        Self::new(config, retriever)
    }

    pub fn embedding_model(&self) -> &str {
        self.retriever
            .embedder()
            .map(Embedder::model)
            .unwrap_or(self.config.embedding_model.as_str())
    }

    /// Probe the live state of every component.
    pub async fn health(&self) -> HealthReport {
        let collection = self.retriever.collection();
        let mut index_connected = false;
        let mut collection_info = None;

        if let Some(index) = self.retriever.index() {
            match index.collection_exists(collection).await {
                Ok(exists) => index_connected = exists,
                Err(e) => tracing::warn!("qdrant health check failed: {e}"),
            }
            if index_connected {
                match index.collection_info(collection).await {
                    Ok(info) => collection_info = Some(info),
                    Err(e) => {
                        tracing::warn!("could not read collection info: {e}")
                    }
                }
            }
        }

        let embedding_loaded = self.retriever.embedder().is_some();
        let generator_available = self.retriever.generator().is_some();

        HealthReport {
            status: health_status(
                index_connected,
                embedding_loaded,
                generator_available,
            ),
            index_connected,
            embedding_loaded,
            generator_available,
            collection_info,
            timestamp: chrono::Local::now().to_rfc3339(),
        }
    }
}

pub fn health_status(
    index_connected: bool,
    embedding_loaded: bool,
    generator_available: bool,
) -> HealthStatus {
    match (index_connected && embedding_loaded, generator_available) {
        (false, _) => HealthStatus::Unhealthy,
        (true, false) => HealthStatus::Degraded,
        (true, true) => HealthStatus::Healthy,
    }
}
