//! Reasoning Loop
//!
//! Implements the zero-shot ReAct (Reason + Act) pattern. The model thinks,
//! optionally calls a tool, reads the observation and eventually answers.
//! Each step is reported as an [`AgentEvent`] so a UI can render the
//! model's reasoning while it happens.

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::tool::{ToolCall, ToolRegistry, ToolResult};

const TOOL_BLOCK_START: &str = "```tool";
const TOOL_CODE_SUFFIX: &str = "_code";
const FENCE: &str = "```";
const FINAL_ANSWER_LABEL: &str = "Final Answer:";

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt preamble
    pub system_prompt: String,

    /// Maximum completions per run before giving up
    pub max_iterations: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Whether to append tool descriptions to system prompt
    pub inject_tool_descriptions: bool,

    /// Use the provider's streaming API and emit token events
    pub stream: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 10,
            generation: GenerationOptions::default(),
            inject_tool_descriptions: true,
            stream: false,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant.

When you need to use a tool, respond with a JSON block in this exact format:
```tool
{"tool": "tool_name", "arguments": {"arg1": "value1"}}
```

After receiving tool results, synthesize them into a helpful response.
If you can answer directly without tools, do so.
Be concise and accurate."#;

/// Observable step of an agent run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Text the model wrote before choosing a tool
    Thought { text: String },

    /// A tool is about to run
    ToolStart { tool: String, input: serde_json::Value },

    /// A tool finished; `output` is the observation fed back to the model
    ToolEnd { tool: String, success: bool, output: String },

    /// The model opened a tool block that could not be parsed
    ParseError { message: String },

    /// Streamed text delta from the model
    Token { delta: String },

    /// Final answer
    Answer { text: String },
}

/// Channel the agent reports its steps on
pub type EventSink = mpsc::UnboundedSender<AgentEvent>;

/// What a model reply asks the loop to do next
#[derive(Debug)]
enum Step {
    Act { thought: String, call: ToolCall },
    Malformed(String),
    Finish(String),
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Build the full system prompt including tool descriptions
    pub fn build_system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.clone();

        if self.config.inject_tool_descriptions && !self.tools.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.tools.generate_prompt_section());
        }

        prompt
    }

    /// Answer a single question in a fresh conversation
    pub async fn ask(&self, question: &str, events: Option<&EventSink>) -> Result<String> {
        let mut conversation = Conversation::with_system_prompt(self.build_system_prompt());
        conversation.push(Message::user(question));
        self.run(&mut conversation, events).await
    }

    /// Drive the loop until the model gives a final answer
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        events: Option<&EventSink>,
    ) -> Result<String> {
        for iteration in 1..=self.config.max_iterations {
            tracing::debug!(
                iteration,
                tokens = conversation.estimate_tokens(),
                "Requesting completion"
            );

            let content = self.next_reply(conversation, events).await?;
            conversation.push(Message::assistant(&content));

            match parse_step(&content) {
                Step::Act { thought, mut call } => {
                    if call.id.is_none() {
                        call.id = Some(uuid::Uuid::new_v4().to_string());
                    }
                    if !thought.is_empty() {
                        emit(events, AgentEvent::Thought { text: thought });
                    }
                    emit(
                        events,
                        AgentEvent::ToolStart {
                            tool: call.name.clone(),
                            input: serde_json::to_value(&call.arguments)?,
                        },
                    );

                    tracing::debug!(tool = %call.name, "Executing tool");
                    let result = self.execute_tool(&call).await;

                    emit(
                        events,
                        AgentEvent::ToolEnd {
                            tool: result.name.clone(),
                            success: result.success,
                            output: result.output.clone(),
                        },
                    );
                    conversation.push(Message::tool(format_tool_result(&result), call.id));
                }
                Step::Malformed(message) => {
                    tracing::debug!(%message, "Unparseable tool call");
                    emit(events, AgentEvent::ParseError { message: message.clone() });
                    conversation.push(Message::tool(
                        format!(
                            "[Invalid tool call] {message}\nReply with a valid ```tool block or give your final answer."
                        ),
                        None,
                    ));
                }
                Step::Finish(answer) => {
                    emit(events, AgentEvent::Answer { text: answer.clone() });
                    return Ok(answer);
                }
            }
        }

        Err(AgentError::MaxIterations(self.config.max_iterations))
    }

    /// Request one completion, streaming deltas when configured
    async fn next_reply(
        &self,
        conversation: &Conversation,
        events: Option<&EventSink>,
    ) -> Result<String> {
        if !self.config.stream {
            let completion = self
                .provider
                .complete(conversation.messages(), &self.config.generation)
                .await?;
            return Ok(completion.content);
        }

        let mut stream = self
            .provider
            .complete_stream(conversation.messages(), &self.config.generation)
            .await?;

        let mut content = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.delta.is_empty() {
                content.push_str(&chunk.delta);
                emit(events, AgentEvent::Token { delta: chunk.delta });
            }
            if chunk.done {
                break;
            }
        }

        Ok(content)
    }

    /// Execute a tool call; failures become failed observations
    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        match self.tools.execute(call).await {
            Ok(result) => result.with_id(call.id.clone()),
            Err(e) => ToolResult::failure(call.name.clone(), format!("Error: {e}"))
                .with_id(call.id.clone()),
        }
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

fn emit(events: Option<&EventSink>, event: AgentEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is watching
        let _ = tx.send(event);
    }
}

fn format_tool_result(result: &ToolResult) -> String {
    if result.success {
        format!("[Tool '{}' returned]\n{}", result.name, result.output)
    } else {
        format!("[Tool '{}' failed]\n{}", result.name, result.output)
    }
}

/// Classify a model reply
fn parse_step(content: &str) -> Step {
    if let Some((start_idx, body_idx)) = find_tool_block(content) {
        let after_marker = &content[body_idx..];
        let body = after_marker
            .find(FENCE)
            .map_or(after_marker, |end_idx| &after_marker[..end_idx]);

        return match serde_json::from_str::<ToolCall>(body.trim()) {
            Ok(call) => Step::Act {
                thought: content[..start_idx].trim().to_string(),
                call,
            },
            Err(e) => Step::Malformed(format!("Could not parse tool call: {e}")),
        };
    }

    if let Some((start, call)) = parse_inline_tool_call(content) {
        return Step::Act {
            thought: content[..start].trim().to_string(),
            call,
        };
    }

    Step::Finish(strip_final_answer(content))
}

/// Start of the first ```` ```tool ```` or ```` ```tool_code ```` fence and of its body
///
/// The marker must end at whitespace so other fence labels are not mistaken
/// for a tool block.
fn find_tool_block(content: &str) -> Option<(usize, usize)> {
    content.match_indices(TOOL_BLOCK_START).find_map(|(start, _)| {
        let mut body = start + TOOL_BLOCK_START.len();
        if content[body..].starts_with(TOOL_CODE_SUFFIX) {
            body += TOOL_CODE_SUFFIX.len();
        }
        content[body..]
            .chars()
            .next()
            .is_none_or(char::is_whitespace)
            .then_some((start, body))
    })
}

/// Bare JSON object with a "tool" key
fn parse_inline_tool_call(content: &str) -> Option<(usize, ToolCall)> {
    if !content.contains(r#""tool""#) {
        return None;
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }

    serde_json::from_str::<ToolCall>(&content[start..=end])
        .ok()
        .map(|call| (start, call))
}

fn strip_final_answer(content: &str) -> String {
    content
        .rfind(FINAL_ANSWER_LABEL)
        .map_or(content, |idx| &content[idx + FINAL_ANSWER_LABEL.len()..])
        .trim()
        .to_string()
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn tool<T: crate::tool::Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn generation(mut self, options: GenerationOptions) -> Self {
        self.config.generation = options;
        self
    }

    #[must_use]
    pub const fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    #[must_use]
    pub const fn stream(mut self, stream: bool) -> Self {
        self.config.stream = stream;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        if self.config.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be at least 1".into()));
        }

        Ok(Agent::new(provider, Arc::new(self.tools), self.config))
    }
}
