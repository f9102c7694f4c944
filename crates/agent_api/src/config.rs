use std::collections::BTreeMap;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::url::DEFAULT_BASE_URL;

/// Transport configuration for agent server requests.
#[derive(Debug, Clone)]
pub struct AgentApiConfig {
    /// Bearer token passed to `Authorization`. Self-hosted servers may run without one.
    pub auth_token: Option<String>,
    /// Identifier of the agent every message call targets.
    pub agent_id: String,
    /// Base URL of the agent server.
    pub base_url: String,
    /// Optional project slug sent as `X-Project`.
    pub project: Option<String>,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional connect timeout. Streams have no overall deadline.
    pub timeout: Option<Duration>,
    /// Backoff applied to ancillary (list/retrieve) calls.
    pub retry: RetryPolicy,
}

impl Default for AgentApiConfig {
    fn default() -> Self {
        Self {
            auth_token: None,
            agent_id: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            project: None,
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl AgentApiConfig {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            ..Self::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }
}
