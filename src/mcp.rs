use std::sync::Arc;

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    config::Config,
    error::{self, Error},
    generator::Answer,
    retrieval::{DEFAULT_LIMIT, SearchResult},
    service::ServiceContext,
};

const SNIPPET_MAX_CHARS: usize = 200;

#[derive(Clone)]
pub struct ClimateMcpServer {
    context: Arc<ServiceContext>,
    tool_router: ToolRouter<Self>,
}

impl ClimateMcpServer {
    pub fn new(context: Arc<ServiceContext>) -> Self {
        Self {
            context,
            tool_router: Self::tool_router(),
        }
    }

    /// Retrieve for `question`, treating "nothing relevant" as an empty list.
    async fn retrieve(
        &self,
        question: &str,
        limit: Option<usize>,
        min_score: Option<f32>,
    ) -> Result<Vec<SearchResult>, rmcp::ErrorData> {
        match self
            .context
            .retriever
            .retrieve(
                question,
                limit.unwrap_or(DEFAULT_LIMIT),
                min_score.unwrap_or(0.0),
            )
            .await
        {
            Ok(results) => Ok(results),
            Err(Error::NoResults { .. }) => Ok(Vec::new()),
            Err(e @ Error::Validation(_)) => {
                Err(rmcp::ErrorData::invalid_params(e.to_string(), None))
            }
            Err(e) => Err(mcp_error("retrieval failed", e)),
        }
    }
}

#[tool_router(router = tool_router)]
impl ClimateMcpServer {
    /// Semantic search over the climate-change corpus.
    #[tool(
        name = "climate_search",
        description = "Find the passages of the climate-change corpus closest to a question. Returns scored passages with chapter and section titles."
    )]
    pub async fn climate_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let results = self
            .retrieve(&params.question, params.limit, params.min_score)
            .await?;

        let summary = format_search_summary(&results, &params.question);
        let structured = serde_json::to_value(SearchResponse {
            question: params.question,
            result_count: results.len(),
            results,
        })
        .map_err(|e| mcp_error("failed to serialize search results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }

    /// Grounded answer composed from the best passages.
    #[tool(
        name = "climate_query",
        description = "Answer a question about climate change using only passages retrieved from the corpus. Falls back to the passages alone when no language model is available."
    )]
    pub async fn climate_query(
        &self,
        params: Parameters<QueryParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let results = self
            .retrieve(&params.question, params.limit, params.min_score)
            .await?;

        let answer = if results.is_empty() {
            None
        } else {
            let use_llm = params.use_llm.unwrap_or(true);
            match self
                .context
                .retriever
                .answer_if(use_llm, &params.question, &results)
                .await
            {
                Answer::Generated(text) => Some(text),
                Answer::Unavailable(_) => None,
            }
        };

        let summary = match &answer {
            Some(text) => text.clone(),
            None => format_search_summary(&results, &params.question),
        };
        let structured = serde_json::to_value(QueryResponse {
            question: params.question,
            answer,
            result_count: results.len(),
            results,
        })
        .map_err(|e| mcp_error("failed to serialize answer", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for ClimateMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("climate-rag", env!("CARGO_PKG_VERSION"))
                    .with_title("climate-rag MCP"),
            )
            .with_instructions(
                "Use climate_search to find passages about climate change and climate_query for a grounded answer.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Natural-language question.
    pub question: String,
    /// Maximum number of passages, 1 to 20 (default: 5).
    pub limit: Option<usize>,
    /// Minimum similarity score between 0 and 1 (default: 0).
    pub min_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    /// Natural-language question.
    pub question: String,
    /// Maximum number of passages used as context (default: 5).
    pub limit: Option<usize>,
    /// Minimum similarity score between 0 and 1 (default: 0).
    pub min_score: Option<f32>,
    /// Ask the language model for an answer (default: true).
    pub use_llm: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    question: String,
    result_count: usize,
    results: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    question: String,
    answer: Option<String>,
    result_count: usize,
    results: Vec<SearchResult>,
}

fn format_search_summary(results: &[SearchResult], question: &str) -> String {
    if results.is_empty() {
        return format!("No relevant passages found for \"{question}\"");
    }

    let mut lines = Vec::with_capacity(results.len() + 1);
    let suffix = if results.len() == 1 { "" } else { "s" };
    lines.push(format!(
        "Found {} passage{} for \"{question}\":",
        results.len(),
        suffix
    ));

    for r in results {
        lines.push(format!(
            "{:.3} [{}] {}: {}",
            r.score,
            r.chapter_title,
            r.section_title,
            snippet(&r.content)
        ));
    }

    lines.join("\n")
}

fn snippet(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > SNIPPET_MAX_CHARS {
        let cut: String = flat.chars().take(SNIPPET_MAX_CHARS).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(config: Config) -> error::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let context = ServiceContext::initialize(config).await;
        let server = ClimateMcpServer::new(Arc::new(context));

        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            Error::Config(format!("MCP server initialization failed: {e}"))
        })?;
        running
            .waiting()
            .await
            .map_err(|e| Error::Config(format!("MCP server error: {e}")))?;
        Ok(())
    })
}
