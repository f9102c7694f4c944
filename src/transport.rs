use agent_api::{
    AgentApiClient, AgentChunk, AgentSummary, ApiError, CancellationSignal, MessageRequest,
    StreamSummary,
};
use agent_transport_mock::ScriptedTransport;
use conversation::AgentTransport;
use thiserror::Error;

use crate::config::{ConfigError, EnvConfig, TransportKind};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build http client: {0}")]
    Client(#[from] ApiError),
}

/// The transports the binary can drive a conversation over.
pub enum ChatTransport {
    Http(AgentApiClient),
    /// Offline echo agent.
    Mock(ScriptedTransport),
}

impl ChatTransport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Http(_) => TransportKind::Http,
            Self::Mock(_) => TransportKind::Mock,
        }
    }
}

pub fn transport_for_config(config: &EnvConfig) -> Result<ChatTransport, TransportError> {
    match config.transport {
        TransportKind::Mock => Ok(ChatTransport::Mock(ScriptedTransport::new())),
        TransportKind::Http => {
            let client = AgentApiClient::new(config.api_config()?)?;
            Ok(ChatTransport::Http(client))
        }
    }
}

impl AgentTransport for ChatTransport {
    async fn stream_message(
        &self,
        request: &MessageRequest,
        cancel: Option<&CancellationSignal>,
        on_chunk: &mut dyn FnMut(AgentChunk),
    ) -> Result<StreamSummary, ApiError> {
        match self {
            Self::Http(client) => client.stream_message(request, cancel, on_chunk).await,
            Self::Mock(mock) => mock.stream_message(request, cancel, on_chunk).await,
        }
    }

    async fn send_message(
        &self,
        request: &MessageRequest,
        cancel: Option<&CancellationSignal>,
    ) -> Result<Vec<AgentChunk>, ApiError> {
        match self {
            Self::Http(client) => client.send_message(request, cancel).await,
            Self::Mock(mock) => mock.send_message(request, cancel).await,
        }
    }

    async fn list_messages(&self, limit: Option<u32>) -> Result<Vec<AgentChunk>, ApiError> {
        match self {
            Self::Http(client) => AgentTransport::list_messages(client, limit).await,
            Self::Mock(mock) => mock.list_messages(limit).await,
        }
    }

    async fn list_agents(&self) -> Result<Vec<AgentSummary>, ApiError> {
        match self {
            Self::Http(client) => AgentTransport::list_agents(client).await,
            Self::Mock(mock) => mock.list_agents().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(transport: TransportKind, agent_id: Option<&str>) -> EnvConfig {
        EnvConfig {
            base_url: None,
            auth_token: None,
            agent_id: agent_id.map(ToOwned::to_owned),
            project: None,
            timeout: None,
            transport,
            show_system: false,
            log_filter: None,
        }
    }

    #[test]
    fn mock_transport_needs_no_agent_id() {
        let transport = transport_for_config(&config(TransportKind::Mock, None))
            .expect("mock transport should resolve");
        assert_eq!(transport.kind(), TransportKind::Mock);
    }

    #[test]
    fn http_transport_requires_agent_id() {
        let error = match transport_for_config(&config(TransportKind::Http, None)) {
            Ok(_) => panic!("http without an agent id should fail"),
            Err(error) => error,
        };
        assert!(matches!(error, TransportError::Config(ConfigError::MissingAgentId)));
        assert!(error.to_string().contains("AGENT_CHAT_AGENT_ID"));

        let transport = transport_for_config(&config(TransportKind::Http, Some("agent-1")))
            .expect("http transport should resolve");
        assert_eq!(transport.kind(), TransportKind::Http);
    }

    #[test]
    fn invalid_base_url_surfaces_as_client_error() {
        let mut config = config(TransportKind::Http, Some("agent-1"));
        config.base_url = Some("not a url".to_string());

        let error = match transport_for_config(&config) {
            Ok(_) => panic!("an unparseable base url should fail"),
            Err(error) => error,
        };
        assert!(matches!(error, TransportError::Client(ApiError::InvalidBaseUrl(_))));
    }

    #[tokio::test]
    async fn mock_transport_echoes_through_the_enum() {
        let transport = ChatTransport::Mock(ScriptedTransport::new());
        let chunks = transport
            .send_message(&MessageRequest::user_text("ping"), None)
            .await
            .expect("mock batch succeeds");

        let text: String = chunks
            .iter()
            .filter_map(|chunk| match chunk {
                AgentChunk::AssistantToken { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "You said: ping");
    }
}
