//! Answer generation from retrieved passages.
//!
//! Generation is best-effort: every failure mode is reported as
//! [`Answer::Unavailable`] so callers can still return the search results.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{config::Config, retrieval::SearchResult};

/// Sentence the model must use when the context does not answer the question.
pub const INSUFFICIENT_INFORMATION: &str = "No encontré información suficiente en la base de conocimiento para responder esta pregunta";

const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.3;
const REFERER: &str = "http://localhost";

/// Outcome of an answer request.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Generated(String),
    Unavailable(UnavailableReason),
}

impl Answer {
    pub fn text(&self) -> Option<&str> {
        match self {
            Answer::Generated(text) => Some(text),
            Answer::Unavailable(_) => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Answer::Generated(text) => Some(text),
            Answer::Unavailable(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnavailableReason {
    /// No API key was configured.
    NotConfigured,
    /// The caller asked for search results only.
    Disabled,
    Timeout,
    Status(u16),
    Transport(String),
    Malformed(String),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "generator not configured"),
            Self::Disabled => write!(f, "generation disabled for this request"),
            Self::Timeout => write!(f, "generator timed out"),
            Self::Status(code) => write!(f, "generator returned status {code}"),
            Self::Transport(e) => write!(f, "generator request failed: {e}"),
            Self::Malformed(e) => write!(f, "malformed generator response: {e}"),
        }
    }
}

/// A hosted language model that writes answers grounded in passages.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    fn model(&self) -> &str;

    /// Send a fully built prompt. Never fails; problems become
    /// [`Answer::Unavailable`].
    async fn complete(&self, prompt: &str) -> Answer;
}

/// Build the grounded-answer prompt for `question` over `context`.
///
/// Passages are joined with a blank line, in the given order.
pub fn build_prompt(question: &str, context: &[SearchResult]) -> String {
    let passages = context
        .iter()
        .map(|r| r.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Eres un asistente especializado en cambio climático. Responde la pregunta del usuario basándote ÚNICAMENTE en el contexto proporcionado.

CONTEXTO:
{passages}

PREGUNTA: {question}

INSTRUCCIONES CRÍTICAS:
- Responde en el MISMO IDIOMA que la pregunta
- Usa ÚNICAMENTE información del contexto proporcionado
- Sé conciso y preciso (máximo 200 palabras)
- Si el contexto no contiene información relevante, di específicamente \"{INSUFFICIENT_INFORMATION}\"
- No inventes información ni cites fuentes externas
- Si el contexto está en inglés pero la pregunta en español, traduce la información al español

RESPUESTA:
"
    )
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenRouter (OpenAI-compatible) chat completions client.
pub struct OpenRouterGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenRouterGenerator {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.generator_api_key.clone()?;
        Some(Self::new(
            config.generator_url.clone(),
            api_key,
            config.generator_model.clone(),
            config.generator_timeout,
        ))
    }
}

#[async_trait]
impl AnswerGenerator for OpenRouterGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Answer {
        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .timeout(self.timeout)
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "max_tokens": MAX_TOKENS,
                "temperature": TEMPERATURE,
            }));

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Answer::Unavailable(UnavailableReason::Timeout);
            }
            Err(e) => {
                return Answer::Unavailable(UnavailableReason::Transport(
                    e.to_string(),
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %body, "generator error");
            return Answer::Unavailable(UnavailableReason::Status(
                status.as_u16(),
            ));
        }

        match response.json::<ChatResponse>().await {
            Ok(parsed) => extract_answer(parsed),
            Err(e) if e.is_timeout() => {
                Answer::Unavailable(UnavailableReason::Timeout)
            }
            Err(e) => {
                Answer::Unavailable(UnavailableReason::Malformed(e.to_string()))
            }
        }
    }
}

fn extract_answer(response: ChatResponse) -> Answer {
    match response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
    {
        Some(text) if !text.trim().is_empty() => {
            Answer::Generated(text.trim().to_string())
        }
        _ => Answer::Unavailable(UnavailableReason::Malformed(
            "response had no message content".to_string(),
        )),
    }
}
