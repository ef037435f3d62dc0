//! Reasoning Tool
//!
//! Sends a logic question to the LLM with a step-by-step prompt.

use std::sync::Arc;

use async_trait::async_trait;

use solver_core::{
    AgentError, GenerationOptions, LlmProvider, Message, ParameterSchema, Result as CoreResult,
    Tool, ToolCall, ToolResult, ToolSchema,
};

const TOOL_NAME: &str = "reasoning";

/// Prompt template; `{question}` is substituted
pub const REASONING_PROMPT: &str = "You are an agent to solve the mathematical question.
Logically arrive at the solution and give the detailed explanation pointwise.

Question: {question}
Answer:
";

/// Tool that answers logic and reasoning questions directly with the LLM
pub struct ReasoningTool {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl ReasoningTool {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self { provider, options }
    }
}

#[async_trait]
impl Tool for ReasoningTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: TOOL_NAME.into(),
            description: "Answer logic-based and reasoning questions with a pointwise explanation.".into(),
            parameters: vec![ParameterSchema::required_string(
                "question",
                "The question to reason about",
            )],
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let question = call.text_arg("question").unwrap_or_default();
        let prompt = REASONING_PROMPT.replace("{question}", question.trim());

        let completion = self
            .provider
            .complete(&[Message::user(prompt)], &self.options)
            .await
            .map_err(|e| AgentError::ToolExecution(e.to_string()))?;

        Ok(ToolResult::success(TOOL_NAME, completion.content.trim()))
    }
}

#[cfg(test)]
mod tests {
    use solver_core::mock::ScriptedProvider;

    use super::*;

    #[tokio::test]
    async fn test_prompt_and_answer() {
        let provider = Arc::new(
            ScriptedProvider::new().reply("1. Each box has 4 apples.\n2. 3 boxes make 12.\n"),
        );
        let tool = ReasoningTool::new(provider.clone(), GenerationOptions::default());

        let result = tool
            .execute(&ToolCall::new("reasoning").arg("question", "3 boxes of 4 apples?"))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.ends_with("3 boxes make 12."));

        let sent = &provider.requests()[0][0].content;
        assert!(sent.starts_with("You are an agent to solve the mathematical question."));
        assert!(sent.contains("Question: 3 boxes of 4 apples?\nAnswer:"));
    }

    #[tokio::test]
    async fn test_provider_error_is_tool_error() {
        let provider = Arc::new(ScriptedProvider::new().fail(AgentError::RateLimited("429".into())));
        let tool = ReasoningTool::new(provider, GenerationOptions::default());

        let err = tool
            .execute(&ToolCall::new("reasoning").arg("question", "why?"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolExecution(_)));
    }
}
