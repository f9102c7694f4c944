use url::Url;

use crate::error::ApiError;

/// Default base URL for the hosted agent service.
pub const DEFAULT_BASE_URL: &str = "https://api.letta.com";

/// Resolved endpoint set for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEndpoints {
    base: Url,
    agent_id: String,
}

impl AgentEndpoints {
    pub fn new(base_url: &str, agent_id: &str) -> Result<Self, ApiError> {
        let agent_id = agent_id.trim();
        if agent_id.is_empty() {
            return Err(ApiError::MissingAgentId);
        }
        Ok(Self {
            base: normalize_base_url(base_url)?,
            agent_id: agent_id.to_owned(),
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// `POST` target for the SSE streaming send.
    pub fn stream_messages(&self) -> Url {
        self.join(&["v1", "agents", &self.agent_id, "messages", "stream"])
    }

    /// `POST` target for the batch send, `GET` target for history.
    pub fn messages(&self) -> Url {
        self.join(&["v1", "agents", &self.agent_id, "messages"])
    }

    pub fn agent(&self) -> Url {
        self.join(&["v1", "agents", &self.agent_id])
    }

    pub fn agents(&self) -> Url {
        self.join(&["v1", "agents"])
    }

    fn join(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }
}

/// Normalize a base URL: default when blank, drop trailing slashes and a
/// trailing `/v1` so endpoint joins never double it.
///
/// ```
/// use agent_api::url::normalize_base_url;
/// let url = normalize_base_url("http://localhost:8283/v1/").unwrap();
/// assert_eq!(url.as_str(), "http://localhost:8283/");
/// ```
pub fn normalize_base_url(input: &str) -> Result<Url, ApiError> {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/v1").unwrap_or(trimmed);

    let url = Url::parse(trimmed).map_err(|error| ApiError::InvalidBaseUrl(format!("{base}: {error}")))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::InvalidBaseUrl(format!(
            "{base}: expected an http(s) URL"
        )));
    }
    Ok(url)
}
