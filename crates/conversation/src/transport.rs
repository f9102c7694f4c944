use agent_api::{
    AgentApiClient, AgentChunk, AgentSummary, ApiError, CancellationSignal, MessageRequest,
    StreamSummary,
};

/// Operations the conversation needs from an agent server.
///
/// Message sends are single attempts; ancillary calls may retry internally.
#[allow(async_fn_in_trait)]
pub trait AgentTransport {
    /// Streams one send, handing each chunk to `on_chunk` in arrival order.
    async fn stream_message(
        &self,
        request: &MessageRequest,
        cancel: Option<&CancellationSignal>,
        on_chunk: &mut dyn FnMut(AgentChunk),
    ) -> Result<StreamSummary, ApiError>;

    /// Sends one message through the synchronous endpoint.
    async fn send_message(
        &self,
        request: &MessageRequest,
        cancel: Option<&CancellationSignal>,
    ) -> Result<Vec<AgentChunk>, ApiError>;

    async fn list_messages(&self, limit: Option<u32>) -> Result<Vec<AgentChunk>, ApiError>;

    async fn list_agents(&self) -> Result<Vec<AgentSummary>, ApiError>;
}

impl AgentTransport for AgentApiClient {
    async fn stream_message(
        &self,
        request: &MessageRequest,
        cancel: Option<&CancellationSignal>,
        on_chunk: &mut dyn FnMut(AgentChunk),
    ) -> Result<StreamSummary, ApiError> {
        self.stream_with_handler(request, cancel, on_chunk).await
    }

    async fn send_message(
        &self,
        request: &MessageRequest,
        cancel: Option<&CancellationSignal>,
    ) -> Result<Vec<AgentChunk>, ApiError> {
        self.send_batch(request, cancel).await
    }

    async fn list_messages(&self, limit: Option<u32>) -> Result<Vec<AgentChunk>, ApiError> {
        AgentApiClient::list_messages(self, limit).await
    }

    async fn list_agents(&self) -> Result<Vec<AgentSummary>, ApiError> {
        AgentApiClient::list_agents(self).await
    }
}
