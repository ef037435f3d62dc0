//! # math-tools
//!
//! Tools and prompt for the maths problem solving agent.
//!
//! ## Tools
//!
//! ```text
//! ┌──────────────┬────────────────────────────────────────────────┐
//! │  wikipedia   │  facts and constants from Wikipedia            │
//! │  calculator  │  meval, with LLM translation of word problems  │
//! │  reasoning   │  step-by-step explanation from the LLM         │
//! └──────────────┴────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod svckit;
pub mod wiki;

use std::sync::Arc;

use solver_core::{Agent, AgentBuilder, GenerationOptions, LlmProvider};

pub use error::{Result, ToolkitError};
pub use wiki::{MediaWikiClient, StaticWiki, WikiSource};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{CalculatorTool, ReasoningTool, WikipediaTool};
}

/// System prompt for the maths assistant agent
pub const MATH_ASSISTANT_PROMPT: &str = r#"You are an agent that solves mathematical questions.
Logically arrive at the solution and give a detailed explanation, point by point.

## How to Work

1. Think about what the question needs.
2. When a fact or constant is missing, use `wikipedia`.
3. For any arithmetic, use `calculator` rather than computing in your head.
4. For logic puzzles and word problems that need an explanation, use `reasoning`.
5. Call one tool at a time and wait for its result.

To call a tool, reply with a JSON block in this exact format:
```tool
{"tool": "tool_name", "arguments": {"arg1": "value1"}}
```

When you know the answer, reply with:
Final Answer: <your explanation and result>"#;

/// Agent settings that are not tied to a provider
#[derive(Clone, Debug)]
pub struct AssistantSettings {
    /// Generation options for the agent and its LLM-backed tools
    pub generation: GenerationOptions,

    /// Maximum completions per question
    pub max_iterations: usize,

    /// Stream tokens from the provider
    pub stream: bool,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            generation: GenerationOptions::default(),
            max_iterations: 10,
            stream: false,
        }
    }
}

impl AssistantSettings {
    /// Read `GROQ_MODEL` and `AGENT_MAX_ITERATIONS`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let model = std::env::var("GROQ_MODEL").unwrap_or(defaults.generation.model);
        let max_iterations = std::env::var("AGENT_MAX_ITERATIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_iterations);

        Self {
            generation: GenerationOptions::for_model(model),
            max_iterations,
            stream: false,
        }
    }

    /// Same settings with streaming switched on or off
    #[must_use]
    pub fn streaming(&self, stream: bool) -> Self {
        Self {
            stream,
            ..self.clone()
        }
    }
}

/// Assemble the maths assistant: prompt plus the three tools over one provider
pub fn math_assistant(
    provider: Arc<dyn LlmProvider>,
    wiki: Arc<dyn WikiSource>,
    settings: &AssistantSettings,
) -> solver_core::Result<Agent> {
    let generation = settings.generation.clone();

    AgentBuilder::new()
        .provider(provider.clone())
        .system_prompt(MATH_ASSISTANT_PROMPT)
        .generation(generation.clone())
        .max_iterations(settings.max_iterations)
        .stream(settings.stream)
        .tool(tools::WikipediaTool::new(wiki))
        .tool(tools::CalculatorTool::with_llm(provider.clone(), generation.deterministic()))
        .tool(tools::ReasoningTool::new(provider, generation))
        .build()
}

#[cfg(test)]
mod tests {
    use solver_core::{AgentEvent, Role, mock::ScriptedProvider};
    use tokio::sync::mpsc;

    use super::*;

    fn wiki() -> Arc<dyn WikiSource> {
        Arc::new(StaticWiki::new().page("Percentage", "A percentage is a number expressed as a fraction of 100."))
    }

    #[test]
    fn test_assistant_registers_tools() {
        let agent = math_assistant(
            Arc::new(ScriptedProvider::new()),
            wiki(),
            &AssistantSettings::default(),
        )
        .unwrap();

        assert_eq!(agent.tools().names(), vec!["calculator", "reasoning", "wikipedia"]);
        let prompt = agent.build_system_prompt();
        assert!(prompt.starts_with("You are an agent that solves mathematical questions."));
        assert!(prompt.contains("### calculator"));
    }

    #[tokio::test]
    async fn test_percentage_question_end_to_end() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .reply("I need the calculator.\n```tool\n{\"tool\": \"calculator\", \"arguments\": {\"expression\": \"10 / 100 * 100\"}}\n```")
                .reply("Final Answer: 10 percent of 100 is 10."),
        );
        let agent = math_assistant(provider.clone(), wiki(), &AssistantSettings::default()).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let answer = agent.ask("What is 10 percent of 100?", Some(&tx)).await.unwrap();
        assert_eq!(answer, "10 percent of 100 is 10.");

        let mut saw_observation = false;
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::ToolEnd { tool, output, success } = event {
                assert_eq!(tool, "calculator");
                assert!(success);
                assert_eq!(output, "Answer: 10");
                saw_observation = true;
            }
        }
        assert!(saw_observation);

        let second_request = &provider.requests()[1];
        assert_eq!(second_request.last().map(|m| m.role), Some(Role::Tool));
    }

    #[test]
    fn test_settings_streaming_toggle() {
        let settings = AssistantSettings::default().streaming(true);
        assert!(settings.stream);
        assert_eq!(settings.max_iterations, 10);
    }
}
