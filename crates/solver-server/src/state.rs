//! Application State

use std::sync::Arc;

use math_tools::{AssistantSettings, WikiSource, math_assistant};
use solver_core::{Agent, LlmProvider, MemorySessionStore};
use solver_runtime::{GroqConfig, GroqProvider};

/// Builds a provider for one API key
pub type ProviderFactory = Arc<dyn Fn(&str) -> Arc<dyn LlmProvider> + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Chat sessions, one per browser
    pub sessions: Arc<MemorySessionStore>,

    /// LLM provider per API key (Groq in production)
    pub providers: ProviderFactory,

    /// Encyclopedia behind the `wikipedia` tool
    pub wiki: Arc<dyn WikiSource>,

    /// Model and loop limits
    pub settings: AssistantSettings,

    /// Key used when a request does not bring its own
    pub default_api_key: Option<String>,
}

impl AppState {
    pub fn new(
        providers: ProviderFactory,
        wiki: Arc<dyn WikiSource>,
        settings: AssistantSettings,
        default_api_key: Option<String>,
    ) -> Self {
        Self {
            sessions: Arc::new(MemorySessionStore::new()),
            providers,
            wiki,
            settings,
            default_api_key,
        }
    }

    /// Replace the session store, e.g. with configured limits
    #[must_use]
    pub fn with_session_store(mut self, sessions: MemorySessionStore) -> Self {
        self.sessions = Arc::new(sessions);
        self
    }

    /// State backed by Groq, sharing one HTTP client across keys
    pub fn groq(
        client: reqwest::Client,
        config: GroqConfig,
        wiki: Arc<dyn WikiSource>,
        settings: AssistantSettings,
    ) -> Self {
        let default_api_key = config.has_api_key().then(|| config.api_key.clone());
        let providers: ProviderFactory = Arc::new(move |api_key: &str| {
            Arc::new(GroqProvider::with_client(
                client.clone(),
                config.with_api_key(api_key),
            )) as Arc<dyn LlmProvider>
        });

        Self::new(providers, wiki, settings, default_api_key)
    }

    /// The request's key when it carries a non-blank one, else the server's
    pub fn resolve_api_key(&self, requested: Option<&str>) -> Option<String> {
        requested
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(ToString::to_string)
            .or_else(|| self.default_api_key.clone())
    }

    /// Fresh agent for one question
    pub fn agent(&self, api_key: &str, stream: bool) -> solver_core::Result<Agent> {
        let provider = (self.providers)(api_key);
        math_assistant(provider, self.wiki.clone(), &self.settings.streaming(stream))
    }
}
