//! Wikipedia Tool
//!
//! Looks up background facts the model needs before it can do the maths.

use std::sync::Arc;

use async_trait::async_trait;

use solver_core::{ParameterSchema, Result as CoreResult, Tool, ToolCall, ToolResult, ToolSchema};

use crate::wiki::WikiSource;

const TOOL_NAME: &str = "wikipedia";

/// Longest query forwarded to the search API
pub const MAX_QUERY_CHARS: usize = 300;

/// Pages summarised per lookup
pub const DEFAULT_TOP_K: usize = 3;

/// Observation length cap
pub const DEFAULT_MAX_CHARS: usize = 4000;

const NO_RESULTS: &str = "No good Wikipedia Search Result was found";

/// Tool that summarises the top Wikipedia hits for a query
pub struct WikipediaTool {
    wiki: Arc<dyn WikiSource>,
    top_k: usize,
    max_chars: usize,
}

impl WikipediaTool {
    pub fn new(wiki: Arc<dyn WikiSource>) -> Self {
        Self {
            wiki,
            top_k: DEFAULT_TOP_K,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    #[must_use]
    pub const fn max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Search and render the observation text
    async fn lookup(&self, query: &str) -> crate::Result<String> {
        let query: String = query.chars().take(MAX_QUERY_CHARS).collect();
        let titles = self.wiki.search(&query, self.top_k).await?;

        let mut pages = Vec::new();
        for title in titles {
            match self.wiki.summary(&title).await {
                Ok(Some(summary)) => pages.push(format!("Page: {title}\nSummary: {summary}")),
                Ok(None) => {}
                Err(e) => tracing::debug!(%title, error = %e, "Skipping page"),
            }
        }

        if pages.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }

        Ok(pages.join("\n\n").chars().take(self.max_chars).collect())
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: TOOL_NAME.into(),
            description: "Search Wikipedia for information. Use it for facts, definitions and constants the question depends on.".into(),
            parameters: vec![ParameterSchema::required_string(
                "query",
                "Search terms (e.g., 'speed of light', 'Pythagorean theorem')",
            )],
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let query = call.text_arg("query").unwrap_or_default();

        match self.lookup(&query).await {
            Ok(output) => Ok(ToolResult::success(TOOL_NAME, output)),
            Err(e) => Ok(ToolResult::failure(TOOL_NAME, e.to_string())),
        }
    }
}
