//! Client configuration.
//!
//! Defaults come from the environment so binaries work without flags:
//!
//! - `HACKJUDGE_SERVER_URL`: backend base URL (default `http://localhost:8000`)
//! - `HACKJUDGE_AGENTS`: comma-separated agent registry
//! - `HACKJUDGE_FALLBACK_ATTEMPTS`: result pulls after a stream loss (default 1)
//! - `HACKJUDGE_FALLBACK_INTERVAL_MS`: pause between pulls (default 2000)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fallback::FallbackPolicy;
use crate::registry::AgentRegistry;
use crate::tracker::ConcurrencyPolicy;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL, without trailing slash
    pub server_url: String,
    /// User agent sent with every request
    pub user_agent: String,
    /// Agents expected to report progress
    pub registry: AgentRegistry,
    /// How many agents may be reported active at once
    pub concurrency: ConcurrencyPolicy,
    /// Behaviour after the stream drops
    pub fallback: FallbackPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let registry = std::env::var("HACKJUDGE_AGENTS")
            .ok()
            .map(|list| AgentRegistry::parse_list(&list))
            .filter(|registry| !registry.is_empty())
            .unwrap_or_default();

        let mut fallback = FallbackPolicy::default();
        if let Some(attempts) = env_parse::<u32>("HACKJUDGE_FALLBACK_ATTEMPTS") {
            fallback = fallback.with_attempts(attempts);
        }
        if let Some(interval_ms) = env_parse::<u64>("HACKJUDGE_FALLBACK_INTERVAL_MS") {
            fallback = fallback.with_interval(Duration::from_millis(interval_ms));
        }

        ClientConfig {
            server_url: normalize_url(
                &std::env::var("HACKJUDGE_SERVER_URL")
                    .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string()),
            ),
            user_agent: format!("hackjudge-client/{}", env!("CARGO_PKG_VERSION")),
            registry,
            concurrency: ConcurrencyPolicy::default(),
            fallback,
        }
    }
}

impl ClientConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific server
    pub fn new(server_url: &str) -> Self {
        Self::default().with_server_url(server_url)
    }

    pub fn with_server_url(mut self, server_url: &str) -> Self {
        self.server_url = normalize_url(server_url);
        self
    }

    pub fn with_registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_concurrency(mut self, concurrency: ConcurrencyPolicy) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.trim().parse().ok())
}
