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
use tracing::info;

use crate::{
    error,
    pipeline::{Answer, AnswerOutcome, RagPipeline},
    retriever::RetrievedChunk,
};

#[derive(Clone)]
pub struct GroundragMcpServer {
    pipeline: Arc<RagPipeline>,
    tool_router: ToolRouter<Self>,
}

impl GroundragMcpServer {
    pub fn new(pipeline: Arc<RagPipeline>) -> Self {
        Self {
            pipeline,
            tool_router: Self::tool_router(),
        }
    }

    fn top_k(&self, requested: Option<usize>) -> Result<usize, rmcp::ErrorData> {
        match requested {
            Some(0) => Err(rmcp::ErrorData::invalid_params(
                "topK must be at least 1",
                None,
            )),
            Some(k) => Ok(k),
            None => Ok(self.pipeline.top_k()),
        }
    }
}

#[tool_router(router = tool_router)]
impl GroundragMcpServer {
    /// Retrieve ranked chunks for a query without generating an answer.
    #[tool(
        name = "groundrag_retrieve",
        description = "Find the knowledge-base passages most relevant to a query, with similarity scores."
    )]
    pub async fn groundrag_retrieve(
        &self,
        params: Parameters<QueryParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let top_k = self.top_k(params.top_k)?;
        let query = params.query;

        let pipeline = Arc::clone(&self.pipeline);
        let task_query = query.clone();
        let retrieval = tokio::task::spawn_blocking(move || {
            pipeline.retriever().retrieve(&task_query, top_k)
        })
        .await
        .map_err(|e| mcp_error("retrieval task failed", e))?
        .map_err(|e| mcp_error("retrieval failed", e))?;

        let results: Vec<ChunkItem> = retrieval
            .chunks()
            .iter()
            .enumerate()
            .map(|(i, c)| ChunkItem::new(i + 1, c))
            .collect();

        let summary = format_retrieve_summary(&results, &query);
        let structured = serde_json::to_value(RetrieveResponse {
            query,
            result_count: results.len(),
            results,
        })
        .map_err(|e| mcp_error("failed to serialize retrieval", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }

    /// Answer a question from the knowledge base.
    #[tool(
        name = "groundrag_answer",
        description = "Answer a question using only the knowledge base. Replies with a fixed refusal sentence when the passages do not contain the answer."
    )]
    pub async fn groundrag_answer(
        &self,
        params: Parameters<QueryParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let top_k = self.top_k(params.top_k)?;
        let query = params.query;

        let pipeline = Arc::clone(&self.pipeline);
        let task_query = query.clone();
        let answer = tokio::task::spawn_blocking(move || {
            pipeline.answer_with(&task_query, top_k)
        })
        .await
        .map_err(|e| mcp_error("answer task failed", e))?;

        let is_error = answer.outcome.is_failure();
        let text = answer.text.clone();
        let structured = serde_json::to_value(AnswerResponse::new(query, answer))
            .map_err(|e| mcp_error("failed to serialize answer", e))?;

        let mut result = CallToolResult::success(vec![Content::text(text)]);
        result.structured_content = Some(structured);
        result.is_error = Some(is_error);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for GroundragMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("groundrag", env!("CARGO_PKG_VERSION"))
                    .with_title("groundrag MCP"),
            )
            .with_instructions(
                "Use groundrag_answer for questions about the knowledge base. Use groundrag_retrieve to inspect the supporting passages.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    /// The question or search text.
    pub query: String,
    /// Number of passages to retrieve (default: the server's --top-k).
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    query: String,
    result_count: usize,
    results: Vec<ChunkItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChunkItem {
    rank: usize,
    chunk_id: String,
    ordinal: usize,
    document: String,
    text: String,
    score: f32,
}

impl ChunkItem {
    fn new(rank: usize, chunk: &RetrievedChunk) -> Self {
        Self {
            rank,
            chunk_id: chunk.id.clone(),
            ordinal: chunk.ordinal,
            document: chunk.document.clone(),
            text: chunk.text.clone(),
            score: chunk.score,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnswerResponse {
    query: String,
    answer: String,
    outcome: AnswerOutcome,
    grounded: bool,
    context: Vec<ChunkItem>,
}

impl AnswerResponse {
    fn new(query: String, answer: Answer) -> Self {
        Self {
            query,
            grounded: answer.is_grounded(),
            outcome: answer.outcome,
            context: answer
                .context
                .iter()
                .enumerate()
                .map(|(i, c)| ChunkItem::new(i + 1, c))
                .collect(),
            answer: answer.text,
        }
    }
}

fn format_retrieve_summary(results: &[ChunkItem], query: &str) -> String {
    if results.is_empty() {
        return format!("No relevant context found for \"{query}\"");
    }

    let mut lines = Vec::with_capacity(results.len() + 1);
    let suffix = if results.len() == 1 { "" } else { "s" };
    lines.push(format!(
        "Found {} passage{} for \"{query}\":",
        results.len(),
        suffix
    ));

    for item in results {
        lines.push(format!(
            "{} {:.3} {}: {}",
            item.chunk_id, item.score, item.document, item.text
        ));
    }

    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

/// Serve the pipeline over MCP stdio until the client disconnects.
pub fn run_mcp(pipeline: RagPipeline) -> error::Result<()> {
    let pipeline = Arc::new(pipeline);
    let server = GroundragMcpServer::new(Arc::clone(&pipeline));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    info!(
        retriever = pipeline.retriever().name(),
        generator = pipeline.generator().name(),
        "starting MCP server on stdio"
    );

    let result = runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    });

    // Blocking HTTP clients inside the pipeline must not be dropped on a
    // runtime thread.
    drop(runtime);
    drop(pipeline);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chunking::ChunkStrategy,
        corpus::Corpus,
        embedding::HashEmbedder,
        generation::EchoGenerator,
        prompt::REFUSAL_SENTENCE,
        retriever::{EmbeddingOptions, EmbeddingRetriever},
    };

    fn server() -> GroundragMcpServer {
        let chunks = Corpus::builtin().chunks(ChunkStrategy::Lines).unwrap();
        let retriever = EmbeddingRetriever::build(
            chunks,
            Arc::new(HashEmbedder::default()),
            EmbeddingOptions::default(),
        )
        .unwrap();
        let pipeline =
            RagPipeline::new(Arc::new(retriever), Arc::new(EchoGenerator), 1)
                .unwrap();
        GroundragMcpServer::new(Arc::new(pipeline))
    }

    fn summary(result: &CallToolResult) -> String {
        result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn retrieve_tool_returns_ranked_chunks() {
        let server = server();
        let result = server
            .groundrag_retrieve(Parameters(QueryParams {
                query: "cloud storage price".to_string(),
                top_k: Some(2),
            }))
            .await
            .unwrap();

        let structured = result.structured_content.clone().expect("structured");
        let results = structured
            .get("results")
            .and_then(|v| v.as_array())
            .expect("results array");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].get("rank").and_then(|v| v.as_u64()), Some(1));

        let first = results[0].get("score").and_then(|v| v.as_f64()).unwrap();
        let second = results[1].get("score").and_then(|v| v.as_f64()).unwrap();
        assert!(first >= second);
        assert!(summary(&result).contains("Found 2 passages"));
    }

    #[tokio::test]
    async fn retrieve_tool_caps_at_corpus_size() {
        let result = server()
            .groundrag_retrieve(Parameters(QueryParams {
                query: "company offices".to_string(),
                top_k: Some(10),
            }))
            .await
            .unwrap();
        let structured = result.structured_content.expect("structured");
        assert_eq!(
            structured.get("resultCount").and_then(|v| v.as_u64()),
            Some(3)
        );
    }

    #[tokio::test]
    async fn answer_tool_returns_grounded_prompt() {
        let result = server()
            .groundrag_answer(Parameters(QueryParams {
                query: "How much does Product B cost?".to_string(),
                top_k: None,
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(false));
        let structured = result.structured_content.clone().expect("structured");
        assert_eq!(
            structured.get("outcome").and_then(|v| v.as_str()),
            Some("grounded")
        );
        assert_eq!(
            structured
                .get("context")
                .and_then(|v| v.as_array())
                .map(Vec::len),
            Some(1)
        );
        assert!(summary(&result).contains(REFUSAL_SENTENCE));
    }

    #[tokio::test]
    async fn zero_top_k_is_invalid() {
        let err = server()
            .groundrag_retrieve(Parameters(QueryParams {
                query: "x".to_string(),
                top_k: Some(0),
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("topK"));
    }
}
