//! # solver-runtime
//!
//! Hosted LLM providers for the maths problem solver.
//!
//! ## Providers
//!
//! - **Groq** (default): hosted inference over the OpenAI-compatible API
//!
//! ## Usage
//!
//! ```rust,ignore
//! use solver_runtime::{GroqConfig, GroqProvider};
//!
//! let provider = GroqProvider::from_config(GroqConfig::from_env().with_api_key(key))?;
//! let agent = AgentBuilder::new()
//!     .provider(Arc::new(provider))
//!     .build()?;
//! ```

#[cfg(feature = "groq")]
pub mod groq;

#[cfg(feature = "groq")]
pub use groq::{GroqConfig, GroqProvider, build_http_client};

// Re-export core types for convenience
pub use solver_core::{AgentError, LlmProvider, Message, Result, Role};
