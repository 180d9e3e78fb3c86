use std::{net::SocketAddr, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
pub const DEFAULT_COLLECTION_NAME: &str = "documentos_clima";
pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:8080/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str =
    "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";
pub const DEFAULT_GENERATOR_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_GENERATOR_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CORPUS_PATH: &str = "climate_change_structured.json";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Process-wide settings, read once at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub collection_name: String,
    pub embedding_url: String,
    pub embedding_model: String,
    pub embedding_api_key: Option<String>,
    pub generator_api_key: Option<String>,
    pub generator_model: String,
    pub generator_url: String,
    pub generator_timeout: Duration,
    /// Bound on every index and embedding request.
    pub request_timeout: Duration,
    pub corpus_path: PathBuf,
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Read the configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first if present;
    /// variables already set in the environment take precedence over it.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let get_or =
            |key: &str, default: &str| get(key).unwrap_or_else(|| default.into());

        let seconds = |key: &str, default: u64| match get(key) {
            Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|e| {
                Error::Config(format!(
                    "{key} must be a whole number of seconds: {e}"
                ))
            }),
            None => Ok(Duration::from_secs(default)),
        };
        let generator_timeout = seconds(
            "GENERATOR_TIMEOUT_SECS",
            DEFAULT_GENERATOR_TIMEOUT_SECS,
        )?;
        let request_timeout =
            seconds("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;

        let bind_addr = parse_bind_addr(&get_or("BIND_ADDR", DEFAULT_BIND_ADDR))?;

        Ok(Self {
            qdrant_url: trim_base_url(get_or("QDRANT_URL", DEFAULT_QDRANT_URL)),
            qdrant_api_key: get("QDRANT_API_KEY"),
            collection_name: get_or("COLLECTION_NAME", DEFAULT_COLLECTION_NAME),
            embedding_url: trim_base_url(get_or(
                "EMBEDDING_URL",
                DEFAULT_EMBEDDING_URL,
            )),
            embedding_model: get_or("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            embedding_api_key: get("EMBEDDING_API_KEY"),
            generator_api_key: get("OPENROUTER_API_KEY"),
            generator_model: get_or("OPENROUTER_MODEL", DEFAULT_GENERATOR_MODEL),
            generator_url: trim_base_url(get_or(
                "OPENROUTER_URL",
                DEFAULT_GENERATOR_URL,
            )),
            generator_timeout,
            request_timeout,
            corpus_path: PathBuf::from(get_or(
                "JSON_DATA_PATH",
                DEFAULT_CORPUS_PATH,
            )),
            bind_addr,
        })
    }

    /// Whether an answer generator can be constructed at all.
    pub fn generator_configured(&self) -> bool {
        self.generator_api_key.is_some()
    }
}

pub fn parse_bind_addr(raw: &str) -> Result<SocketAddr> {
    raw.parse().map_err(|e| {
        Error::Config(format!("invalid bind address '{raw}': {e}"))
    })
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
