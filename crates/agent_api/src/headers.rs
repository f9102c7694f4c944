use std::collections::BTreeMap;

use crate::config::AgentApiConfig;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_PROJECT: &str = "x-project";
pub const HEADER_USER_AGENT: &str = "user-agent";

pub const ACCEPT_EVENT_STREAM: &str = "text/event-stream";
pub const ACCEPT_JSON: &str = "application/json";

/// Build a deterministic header map for agent server requests.
///
/// Keys are lowercase; configured extra headers override the defaults.
pub fn build_headers(config: &AgentApiConfig, accept: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();

    if let Some(token) = config.auth_token.as_deref().and_then(sanitize_nonempty) {
        headers.insert(HEADER_AUTHORIZATION.to_owned(), format!("Bearer {token}"));
    }
    if let Some(project) = config.project.as_deref().and_then(sanitize_nonempty) {
        headers.insert(HEADER_PROJECT.to_owned(), project);
    }

    headers.insert(HEADER_ACCEPT.to_owned(), accept.to_owned());
    headers.insert(HEADER_CONTENT_TYPE.to_owned(), ACCEPT_JSON.to_owned());

    let user_agent = config
        .user_agent
        .as_deref()
        .and_then(sanitize_nonempty)
        .unwrap_or_else(default_user_agent);
    headers.insert(HEADER_USER_AGENT.to_owned(), user_agent);

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    headers
}

pub fn default_user_agent() -> String {
    format!(
        "agent_chat/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

fn sanitize_nonempty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}
