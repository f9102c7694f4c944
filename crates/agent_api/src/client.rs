use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AgentApiConfig;
use crate::error::ApiError;
use crate::events::{decode_chunk, AgentChunk};
use crate::headers::{build_headers, ACCEPT_EVENT_STREAM, ACCEPT_JSON};
use crate::payload::{AgentSummary, BatchResponse, MessageRequest};
use crate::sse::{SseFrame, SseStreamParser};
use crate::url::AgentEndpoints;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct AgentApiClient {
    http: Client,
    config: AgentApiConfig,
    endpoints: AgentEndpoints,
}

/// What a completed stream reported besides its chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub chunks: usize,
    pub malformed: usize,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StreamResult {
    pub chunks: Vec<AgentChunk>,
    pub summary: StreamSummary,
}

impl AgentApiClient {
    pub fn new(config: AgentApiConfig) -> Result<Self, ApiError> {
        let endpoints = AgentEndpoints::new(&config.base_url, &config.agent_id)?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build().map_err(ApiError::Transport)?;
        Ok(Self {
            http,
            config,
            endpoints,
        })
    }

    pub fn config(&self) -> &AgentApiConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &AgentEndpoints {
        &self.endpoints
    }

    pub fn build_headers(&self, accept: &str) -> Result<HeaderMap, ApiError> {
        let headers = build_headers(&self.config, accept);
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|error| {
                ApiError::InvalidHeader {
                    name: key.clone(),
                    message: error.to_string(),
                }
            })?;
            let value = HeaderValue::from_str(&value).map_err(|error| ApiError::InvalidHeader {
                name: key.clone(),
                message: error.to_string(),
            })?;
            out.insert(name, value);
        }
        Ok(out)
    }

    pub fn build_stream_request(&self, request: &MessageRequest) -> Result<RequestBuilder, ApiError> {
        Ok(self
            .http
            .post(self.endpoints.stream_messages())
            .headers(self.build_headers(ACCEPT_EVENT_STREAM)?)
            .json(request))
    }

    pub fn build_batch_request(&self, request: &MessageRequest) -> Result<RequestBuilder, ApiError> {
        Ok(self
            .http
            .post(self.endpoints.messages())
            .headers(self.build_headers(ACCEPT_JSON)?)
            .json(&request.for_batch()))
    }

    /// Streams one send, handing each decoded chunk to `on_chunk` in arrival order.
    ///
    /// Message sends are never retried here: a rate limit surfaces as a
    /// `RateLimit`-classified error for the caller to present.
    pub async fn stream_with_handler<F>(
        &self,
        request: &MessageRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_chunk: F,
    ) -> Result<StreamSummary, ApiError>
    where
        F: FnMut(AgentChunk),
    {
        let response = self
            .send_once(self.build_stream_request(request)?, cancellation)
            .await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();
        let mut summary = StreamSummary::default();

        loop {
            let Some(next) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            let next = next.map_err(|error| ApiError::Disconnected {
                message: error.to_string(),
            })?;
            for frame in parser.feed(&next) {
                process_frame(frame, &mut summary, &mut on_chunk)?;
            }
        }

        for frame in parser.finish() {
            process_frame(frame, &mut summary, &mut on_chunk)?;
        }

        if is_cancelled(cancellation) {
            return Err(ApiError::Cancelled);
        }

        summary.malformed = parser.malformed_count();
        debug!(
            chunks = summary.chunks,
            malformed = summary.malformed,
            stop_reason = ?summary.stop_reason,
            "stream drained"
        );
        Ok(summary)
    }

    pub async fn stream(
        &self,
        request: &MessageRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<StreamResult, ApiError> {
        let mut chunks = Vec::new();
        let summary = self
            .stream_with_handler(request, cancellation, |chunk| chunks.push(chunk))
            .await?;
        Ok(StreamResult { chunks, summary })
    }

    /// Sends one message through the synchronous endpoint and returns the
    /// ordered chunk list, including trailing stop/usage signals.
    pub async fn send_batch(
        &self,
        request: &MessageRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Vec<AgentChunk>, ApiError> {
        let response = self
            .send_once(self.build_batch_request(request)?, cancellation)
            .await?;
        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .map_err(ApiError::from)?;
        let chunks = decode_batch_body(&body)?;
        info!(chunks = chunks.len(), "batch send completed");
        Ok(chunks)
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentSummary>, ApiError> {
        self.get_json_with_retry(self.endpoints.agents()).await
    }

    pub async fn retrieve_agent(&self) -> Result<AgentSummary, ApiError> {
        self.get_json_with_retry(self.endpoints.agent()).await
    }

    /// Stored conversation history for the configured agent, oldest first.
    pub async fn list_messages(&self, limit: Option<u32>) -> Result<Vec<AgentChunk>, ApiError> {
        let mut url = self.endpoints.messages();
        if let Some(limit) = limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }
        let values: Vec<Value> = self.get_json_with_retry(url).await?;
        Ok(decode_values(values))
    }

    async fn get_json_with_retry<T>(&self, url: Url) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        self.config
            .retry
            .execute(|attempt| {
                let url = url.clone();
                async move {
                    debug!(%url, attempt, "ancillary request");
                    let builder = self
                        .http
                        .get(url)
                        .headers(self.build_headers(ACCEPT_JSON)?);
                    let response = self.send_once(builder, None).await?;
                    response.json::<T>().await.map_err(ApiError::from)
                }
            })
            .await
    }

    async fn send_once(
        &self,
        builder: RequestBuilder,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, ApiError> {
        if is_cancelled(cancellation) {
            return Err(ApiError::Cancelled);
        }

        let response = await_or_cancel(builder.send(), cancellation)
            .await?
            .map_err(ApiError::from)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .unwrap_or_default();
        let error = ApiError::from_status(status, &body);
        warn!(status = status.as_u16(), class = %error.class(), "request rejected");
        Err(error)
    }
}

fn process_frame<F>(
    frame: SseFrame,
    summary: &mut StreamSummary,
    on_chunk: &mut F,
) -> Result<(), ApiError>
where
    F: FnMut(AgentChunk),
{
    match frame {
        SseFrame::Failed(message) => Err(ApiError::StreamFailed { message }),
        SseFrame::Chunk(chunk) => {
            if let AgentChunk::StopReason { reason } = &chunk {
                summary.stop_reason = Some(reason.clone());
            }
            summary.chunks += 1;
            on_chunk(chunk);
            Ok(())
        }
    }
}

/// Decode a batch send body: either `{ "messages": [...], ... }` or a bare array.
pub fn decode_batch_body(body: &str) -> Result<Vec<AgentChunk>, ApiError> {
    let value: Value = serde_json::from_str(body)?;
    if let Value::Array(values) = value {
        return Ok(decode_values(values));
    }

    let response: BatchResponse = serde_json::from_value(value)?;
    let mut chunks = decode_values(response.messages);

    let has_stop = chunks
        .iter()
        .any(|chunk| matches!(chunk, AgentChunk::StopReason { .. }));
    if !has_stop {
        match response.stop_reason {
            Some(Value::String(reason)) => chunks.push(AgentChunk::StopReason { reason }),
            Some(value @ Value::Object(_)) => chunks.extend(decode_values(vec![value])),
            _ => {}
        }
    }
    if let Some(usage) = response.usage.filter(|usage| !usage.is_null()) {
        chunks.push(AgentChunk::UsageStatistics { usage });
    }

    Ok(chunks)
}

fn decode_values(values: Vec<Value>) -> Vec<AgentChunk> {
    values
        .iter()
        .filter_map(|value| match decode_chunk(value) {
            Ok(chunk) => Some(chunk),
            Err(error) => {
                warn!(reason = %error.reason, "skipping malformed chunk in batch response");
                None
            }
        })
        .collect()
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn process_frame_tracks_stop_reason_and_forwards_in_order() {
        let frames = SseStreamParser::parse_frames(concat!(
            "data: {\"message_type\":\"assistant_message_token\",\"token\":\"A\"}\n\n",
            "data: {\"message_type\":\"assistant_message_token\",\"token\":\"B\"}\n\n",
            "data: {\"message_type\":\"stop_reason\",\"stop_reason\":\"end_turn\"}\n\n",
        ));

        let mut summary = StreamSummary::default();
        let mut observed = Vec::new();
        for frame in frames {
            process_frame(frame, &mut summary, &mut |chunk| observed.push(chunk))
                .expect("frames should process");
        }

        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(
            observed,
            vec![AgentChunk::token("A"), AgentChunk::token("B"), AgentChunk::stop("end_turn")]
        );
    }

    #[test]
    fn process_frame_turns_failure_into_stream_error() {
        let mut summary = StreamSummary::default();
        let error = process_frame(
            SseFrame::Failed("boom".to_owned()),
            &mut summary,
            &mut |_| panic!("no chunk expected"),
        )
        .expect_err("failure frame should error");

        assert!(matches!(error, ApiError::StreamFailed { ref message } if message == "boom"));
    }

    #[test]
    fn batch_body_appends_trailing_stop_and_usage() {
        let body = json!({
            "messages": [
                {"message_type": "reasoning_message", "reasoning": "think"},
                {"message_type": "assistant_message", "content": "done"},
                {"message_type": "mystery"},
                "not an object"
            ],
            "stop_reason": {"message_type": "stop_reason", "stop_reason": "end_turn"},
            "usage": {"message_type": "usage_statistics", "total_tokens": 12}
        })
        .to_string();

        let chunks = decode_batch_body(&body).expect("batch body should decode");
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[0], AgentChunk::reasoning("think"));
        assert_eq!(chunks[1], AgentChunk::assistant("done"));
        assert!(matches!(chunks[2], AgentChunk::Unknown { .. }));
        assert_eq!(chunks[3], AgentChunk::stop("end_turn"));
        assert!(matches!(chunks[4], AgentChunk::UsageStatistics { .. }));
    }

    #[test]
    fn batch_body_accepts_bare_array() {
        let chunks = decode_batch_body(r#"[{"message_type":"assistant_message","text":"hi"}]"#)
            .expect("bare array should decode");
        assert_eq!(chunks, vec![AgentChunk::assistant("hi")]);
    }
}
