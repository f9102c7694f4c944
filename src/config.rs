//! Environment configuration.

use std::env;
use std::time::Duration;

use agent_api::AgentApiConfig;
use thiserror::Error;

pub const BASE_URL_VAR: &str = "AGENT_CHAT_BASE_URL";
pub const TOKEN_VAR: &str = "AGENT_CHAT_TOKEN";
pub const AGENT_ID_VAR: &str = "AGENT_CHAT_AGENT_ID";
pub const PROJECT_VAR: &str = "AGENT_CHAT_PROJECT";
pub const TIMEOUT_VAR: &str = "AGENT_CHAT_TIMEOUT_SEC";
pub const TRANSPORT_VAR: &str = "AGENT_CHAT_TRANSPORT";
pub const SHOW_SYSTEM_VAR: &str = "AGENT_CHAT_SHOW_SYSTEM";
pub const LOG_VAR: &str = "AGENT_CHAT_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Http,
    Mock,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Mock => "mock",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{AGENT_ID_VAR} is required for the http transport")]
    MissingAgentId,

    #[error("{TIMEOUT_VAR} must be a positive number of seconds, got '{0}'")]
    InvalidTimeout(String),

    #[error("unsupported transport '{0}'. Available transports: http, mock")]
    UnknownTransport(String),
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub base_url: Option<String>,
    pub auth_token: Option<String>,
    pub agent_id: Option<String>,
    pub project: Option<String>,
    pub timeout: Option<Duration>,
    pub transport: TransportKind,
    pub show_system: bool,
    pub log_filter: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout = match env_string_opt(TIMEOUT_VAR) {
            Some(raw) => Some(parse_timeout(&raw)?),
            None => None,
        };
        let transport = match env_string_opt(TRANSPORT_VAR) {
            Some(raw) => parse_transport(&raw)?,
            None => TransportKind::Http,
        };

        Ok(Self {
            base_url: env_string_opt(BASE_URL_VAR),
            auth_token: env_string_opt(TOKEN_VAR),
            agent_id: env_string_opt(AGENT_ID_VAR),
            project: env_string_opt(PROJECT_VAR),
            timeout,
            transport,
            show_system: env_flag(SHOW_SYSTEM_VAR),
            log_filter: env_string_opt(LOG_VAR).or_else(|| env_string_opt("RUST_LOG")),
        })
    }

    /// Transport settings for the http client.
    pub fn api_config(&self) -> Result<AgentApiConfig, ConfigError> {
        let agent_id = self.agent_id.as_deref().ok_or(ConfigError::MissingAgentId)?;
        let mut config = AgentApiConfig::new(agent_id);

        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(token) = &self.auth_token {
            config = config.with_auth_token(token);
        }
        if let Some(project) = &self.project {
            config = config.with_project(project);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        Ok(config)
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds)),
        _ => Err(ConfigError::InvalidTimeout(raw.to_string())),
    }
}

fn parse_transport(raw: &str) -> Result<TransportKind, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "http" => Ok(TransportKind::Http),
        "mock" => Ok(TransportKind::Mock),
        _ => Err(ConfigError::UnknownTransport(raw.trim().to_string())),
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
