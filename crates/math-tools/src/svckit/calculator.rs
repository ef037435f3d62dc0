//! Calculator Tool
//!
//! Evaluates arithmetic with `meval`. Word problems that are not already an
//! expression are first translated into one by the LLM.

use std::sync::Arc;

use async_trait::async_trait;

use solver_core::{
    GenerationOptions, LlmProvider, Message, ParameterSchema, Result as CoreResult, Tool,
    ToolCall, ToolResult, ToolSchema,
};

use crate::error::{Result, ToolkitError};

const TOOL_NAME: &str = "calculator";

const TRANSLATE_PROMPT: &str = r#"Rewrite the math problem below as a single arithmetic expression.

Allowed: numbers, + - * / ^ %, parentheses, sqrt, abs, exp, ln, sin, cos, tan, floor, ceil, round, pi, e.
Reply with the expression alone inside a text block, like this:

```text
(37593 * 67) / 2
```

If no calculation is needed, reply with "Answer: <value>" instead.

Problem: {question}"#;

/// Expression produced by the LLM
#[derive(Debug, PartialEq)]
enum Translation {
    Expression(String),
    Answer(String),
}

/// LLM used to turn word problems into expressions
struct Translator {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

/// Tool that evaluates mathematical expressions
pub struct CalculatorTool {
    translator: Option<Translator>,
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

impl CalculatorTool {
    /// Pure evaluator, no LLM fallback
    pub const fn new() -> Self {
        Self { translator: None }
    }

    /// Evaluator that asks the LLM to translate non-expressions
    pub fn with_llm(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self {
            translator: Some(Translator { provider, options }),
        }
    }

    async fn solve(&self, input: &str) -> Result<String> {
        let direct = match evaluate(input) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let Some(translator) = &self.translator else {
            return Err(direct);
        };

        tracing::debug!(input, "Translating problem into an expression");
        let prompt = TRANSLATE_PROMPT.replace("{question}", input);
        let completion = translator
            .provider
            .complete(&[Message::user(prompt)], &translator.options)
            .await
            .map_err(|e| ToolkitError::Translation(e.to_string()))?;

        match parse_translation(&completion.content)? {
            Translation::Expression(expr) => evaluate(&expr),
            Translation::Answer(answer) => Ok(answer),
        }
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: TOOL_NAME.into(),
            description: "Solve mathematical expressions. Accepts an arithmetic expression or a short word problem.".into(),
            parameters: vec![ParameterSchema::required_string(
                "expression",
                "Expression to evaluate (e.g., '2 + 2', '0.1 * 100', 'sqrt(16)')",
            )],
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let input = call.text_arg("expression").unwrap_or_default();

        match self.solve(input.trim()).await {
            Ok(value) => Ok(ToolResult::success(TOOL_NAME, format!("Answer: {value}"))),
            Err(e) => Ok(ToolResult::failure(TOOL_NAME, e.to_string())),
        }
    }
}

/// Evaluate an expression and format the value
fn evaluate(expr: &str) -> Result<String> {
    let normalized = expr.trim().replace("**", "^");
    if normalized.is_empty() {
        return Err(ToolkitError::Expression("empty expression".into()));
    }

    let value = meval::eval_str(&normalized)
        .map_err(|e| ToolkitError::Expression(format!("'{}': {e}", expr.trim())))?;

    if !value.is_finite() {
        return Err(ToolkitError::Expression(format!(
            "'{}' does not have a finite value",
            expr.trim()
        )));
    }

    Ok(format_number(value))
}

/// Integers without decimals, everything else to ten places with trailing zeros trimmed
#[allow(clippy::cast_possible_truncation)]
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.10}")
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

/// Pull the expression (or direct answer) out of the LLM reply
fn parse_translation(reply: &str) -> Result<Translation> {
    if let Some(start) = reply.find("```text") {
        let after = &reply[start + "```text".len()..];
        let body = after.find("```").map_or(after, |end| &after[..end]);
        let expr = body.trim();
        if !expr.is_empty() {
            return Ok(Translation::Expression(expr.to_string()));
        }
    }

    if let Some(idx) = reply.find("Answer:") {
        let answer = reply[idx + "Answer:".len()..].trim();
        if !answer.is_empty() {
            return Ok(Translation::Answer(answer.to_string()));
        }
    }

    Err(ToolkitError::Translation(format!("unknown format: {}", reply.trim())))
}

#[cfg(test)]
mod tests {
    use solver_core::{AgentError, mock::ScriptedProvider};

    use super::*;

    async fn run(tool: &CalculatorTool, input: &str) -> ToolResult {
        tool.execute(&ToolCall::new("calculator").arg("expression", input))
            .await
            .unwrap()
    }

    #[test]
    fn test_evaluate() {
        assert_eq!(evaluate("2 + 2").unwrap(), "4");
        assert_eq!(evaluate("10 * 5").unwrap(), "50");
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), "20");
        assert_eq!(evaluate("2 ^ 8").unwrap(), "256");
        assert_eq!(evaluate("2 ** 3").unwrap(), "8");
        assert_eq!(evaluate("sqrt(16)").unwrap(), "4");
        assert_eq!(evaluate("0.1 * 100").unwrap(), "10");
        assert!(evaluate("10 / 3").unwrap().starts_with("3.333"));
    }

    #[test]
    fn test_evaluate_rejects_garbage() {
        assert!(evaluate("").is_err());
        assert!(evaluate("ten percent of a hundred").is_err());
        assert!(evaluate("1 / 0").is_err());
    }

    #[test]
    fn test_parse_translation() {
        assert_eq!(
            parse_translation("```text\n0.10 * 100\n```").unwrap(),
            Translation::Expression("0.10 * 100".into())
        );
        assert_eq!(
            parse_translation("Answer: 42").unwrap(),
            Translation::Answer("42".into())
        );
        assert!(parse_translation("I am not sure").is_err());
    }

    #[tokio::test]
    async fn test_expression_without_llm() {
        let result = run(&CalculatorTool::new(), "37593 * 67").await;
        assert!(result.success);
        assert_eq!(result.output, "Answer: 2518731");
    }

    #[tokio::test]
    async fn test_word_problem_without_llm_fails() {
        let result = run(&CalculatorTool::new(), "what is 10 percent of 100").await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_word_problem_translated() {
        let provider = Arc::new(ScriptedProvider::new().reply("```text\n100 * 10 / 100\n```"));
        let tool = CalculatorTool::with_llm(provider.clone(), GenerationOptions::default());

        let result = run(&tool, "what is 10 percent of 100").await;
        assert!(result.success);
        assert_eq!(result.output, "Answer: 10");

        let prompt = &provider.requests()[0][0].content;
        assert!(prompt.contains("Problem: what is 10 percent of 100"));
    }

    #[tokio::test]
    async fn test_translation_failure_reported() {
        let provider = Arc::new(
            ScriptedProvider::new().fail(AgentError::ProviderUnavailable("down".into())),
        );
        let tool = CalculatorTool::with_llm(provider, GenerationOptions::default());

        let result = run(&tool, "half of a dozen").await;
        assert!(!result.success);
        assert!(result.output.contains("down"));
    }
}
