//! climate-rag - retrieval-augmented question answering over a climate-change
//! corpus.
//!
//! The corpus is a structured JSON document. Every section becomes one chunk,
//! embedded through an OpenAI-compatible embeddings endpoint and stored in
//! [Qdrant](https://qdrant.tech). Questions are embedded the same way, matched
//! against the collection, and optionally answered by a hosted language model
//! through [OpenRouter](https://openrouter.ai).
//!
//! # Quick start
//!
//! ```no_run
//! use climate_rag::{Config, ServiceContext};
//!
//! # async fn run() -> climate_rag::Result<()> {
//! let context = ServiceContext::initialize(Config::from_env()?).await;
//!
//! let results = context
//!     .retriever
//!     .retrieve("¿Qué gases causan el efecto invernadero?", 5, 0.3)
//!     .await?;
//! for r in &results {
//!     println!("{} - {} ({:.3})", r.chapter_title, r.section_title, r.score);
//! }
//!
//! let question = "¿Qué gases causan el efecto invernadero?";
//! let answer = context.retriever.answer(question, &results).await;
//! if let Some(text) = answer.text() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod ingestion;
pub mod mcp;
pub mod retrieval;
pub mod server;
pub mod service;
pub mod vector_index;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use embedding::{Embedder, HttpEmbedder};
pub use error::{Error, Result};
pub use generator::{Answer, AnswerGenerator, OpenRouterGenerator};
pub use retrieval::{Retriever, SearchResult};
pub use service::ServiceContext;
pub use vector_index::{QdrantIndex, VectorIndex};
