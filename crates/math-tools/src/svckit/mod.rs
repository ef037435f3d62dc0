//! Service Kit - Agent Tools
//!
//! Tools that implement `solver_core::Tool` for the maths assistant.

mod calculator;
mod reasoning;
mod wikipedia;

pub use calculator::CalculatorTool;
pub use reasoning::{REASONING_PROMPT, ReasoningTool};
pub use wikipedia::WikipediaTool;
