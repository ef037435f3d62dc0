//! Server Configuration

use std::time::Duration;

use math_tools::AssistantSettings;
use solver_core::session::{DEFAULT_CAPACITY, DEFAULT_IDLE_TIMEOUT};
use solver_runtime::GroqConfig;

/// Everything the server reads from the environment at startup
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,

    /// Directory holding the built frontend
    pub static_dir: String,

    /// Groq connection settings; `api_key` is the server-side fallback key
    pub groq: GroqConfig,

    /// Model and loop limits for the assistant
    pub assistant: AssistantSettings,

    /// Sessions idle this long are dropped
    pub session_idle: Duration,

    /// Most sessions kept in memory
    pub session_capacity: usize,
}

impl ServerConfig {
    /// Read `BIND_ADDR`, `STATIC_DIR`, `SESSION_IDLE_SECS`, `SESSION_CAPACITY`
    /// plus the Groq and assistant variables
    pub fn from_env() -> Self {
        let session_idle = env_number("SESSION_IDLE_SECS")
            .map_or(DEFAULT_IDLE_TIMEOUT, Duration::from_secs);
        let session_capacity = env_number("SESSION_CAPACITY")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_CAPACITY);

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            static_dir: std::env::var("STATIC_DIR").unwrap_or_else(|_| "static".into()),
            groq: GroqConfig::from_env(),
            assistant: AssistantSettings::from_env(),
            session_idle,
            session_capacity,
        }
    }

    /// How often idle sessions are swept
    pub fn sweep_interval(&self) -> Duration {
        (self.session_idle / 4).clamp(Duration::from_secs(1), Duration::from_secs(60))
    }

    /// Server-side key, if one is configured
    pub fn default_api_key(&self) -> Option<String> {
        self.groq.has_api_key().then(|| self.groq.api_key.clone())
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|n| *n > 0)
}
