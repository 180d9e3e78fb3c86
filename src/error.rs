pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{0} is not initialized")]
    Unavailable(&'static str),

    #[error("{}", no_results_message(*threshold))]
    NoResults { threshold: Option<f32> },

    #[error("{service} error{}: {message}", status_suffix(*status))]
    Upstream {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },
}

impl Error {
    pub(crate) fn upstream(
        service: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Upstream {
            service,
            status: None,
            message: message.into(),
        }
    }
}

fn no_results_message(threshold: Option<f32>) -> String {
    match threshold {
        Some(t) => format!("no results with score >= {t}"),
        None => "no relevant results for the query".to_string(),
    }
}

fn status_suffix(status: Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}
