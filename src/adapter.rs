//! Invocation Adapter: translates domain requests into remote RPCs,
//! retries classified transient failures with exponential backoff under a
//! caller-supplied deadline, and maps remote/transport errors into the
//! domain error taxonomy.

use crate::error::{classify, AgentError, ErrorKind, LowLevelError};
use crate::remote::{RemoteClient, RemoteRequest};
use crate::stream_reader::{self, StreamReader};
use crate::types::{validate_input, AgentInput, AgentResponse};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tunables for the `Adapter`. Caller-supplied; the core never parses
/// environment variables or config files itself.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Additional attempts after the first on retryable failures.
    pub max_retries: u32,
    /// Backoff for attempt 1.
    pub initial_backoff: Duration,
    /// Upper bound for backoff.
    pub max_backoff: Duration,
    /// Per-call end-to-end deadline, combined with the caller's own
    /// deadline by taking whichever is shorter.
    pub request_timeout: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// `backoff(n) = min(initial_backoff * 2^(n-1), max_backoff)` for `n >= 1`.
pub fn backoff(attempt: u32, initial_backoff: Duration, max_backoff: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(32);
    let factor = 1u64 << shift;
    let millis = (initial_backoff.as_millis() as u64).saturating_mul(factor);
    Duration::from_millis(millis).min(max_backoff)
}

/// Mediates between domain-level invocation requests and the remote Agent
/// Service RPC.
pub struct Adapter<C: RemoteClient> {
    client: Arc<C>,
    agent_id: String,
    agent_alias_id: String,
    config: AdapterConfig,
}

impl<C: RemoteClient> Adapter<C> {
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` if `agent_id` or `agent_alias_id` is empty.
    pub fn new(
        client: Arc<C>,
        agent_id: impl Into<String>,
        agent_alias_id: impl Into<String>,
        config: AdapterConfig,
    ) -> Result<Self, AgentError> {
        let agent_id = agent_id.into();
        let agent_alias_id = agent_alias_id.into();
        if agent_id.is_empty() {
            return Err(AgentError::invalid_input("agent_id must not be empty"));
        }
        if agent_alias_id.is_empty() {
            return Err(AgentError::invalid_input(
                "agent_alias_id must not be empty",
            ));
        }
        Ok(Self {
            client,
            agent_id,
            agent_alias_id,
            config,
        })
    }

    /// Issues a single logical call, draining any event stream internally
    /// and returning an accumulated response. Preserves chunk order in
    /// `content` and citation arrival order.
    pub async fn invoke_agent(
        &self,
        cancellation: CancellationToken,
        input: AgentInput,
    ) -> (AgentResponse, Option<AgentError>) {
        if let Err(err) = validate_input(&input) {
            return (AgentResponse::default(), Some(err));
        }

        let deadline = self.effective_deadline();
        let channel = match self
            .call_with_retry(&cancellation, request_from(&self.agent_id, &self.agent_alias_id, &input), deadline)
            .await
        {
            Ok(channel) => channel,
            Err(err) => return (AgentResponse::default(), Some(err)),
        };

        let request_id = channel.request_id.clone();
        let mut reader = StreamReader::new(channel, cancellation);
        let (content, citations, err) = stream_reader::drain(&mut reader).await;
        reader.close();

        let response = AgentResponse {
            content,
            citations,
            metadata: Default::default(),
            request_id,
        };
        (response, err)
    }

    /// Issues the same call but returns a [`StreamReader`] already attached
    /// to the remote event channel; the caller must `close` it.
    pub async fn invoke_agent_stream(
        &self,
        cancellation: CancellationToken,
        input: AgentInput,
    ) -> Result<StreamReader, AgentError> {
        validate_input(&input)?;

        let deadline = self.effective_deadline();
        let channel = self
            .call_with_retry(&cancellation, request_from(&self.agent_id, &self.agent_alias_id, &input), deadline)
            .await?;

        Ok(StreamReader::new(channel, cancellation))
    }

    fn effective_deadline(&self) -> Instant {
        Instant::now() + self.config.request_timeout
    }

    async fn call_with_retry(
        &self,
        cancellation: &CancellationToken,
        request: RemoteRequest,
        deadline: Instant,
    ) -> Result<crate::remote::RemoteEventChannel, AgentError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            if cancellation.is_cancelled() {
                return Err(AgentError::cancelled());
            }
            if Instant::now() >= deadline {
                return Err(AgentError::timeout("Adapter deadline exceeded"));
            }

            match self.client.invoke(request.clone(), cancellation).await {
                Ok(channel) => return Ok(channel),
                Err(low_level) => {
                    let classified = classify_for_retry(low_level);
                    if !classified.retryable || attempt > self.config.max_retries {
                        return Err(classified);
                    }

                    debug!(
                        attempt,
                        kind = %classified.kind,
                        "retrying after transient Adapter failure"
                    );

                    let wait = backoff(attempt, self.config.initial_backoff, self.config.max_backoff);
                    let remaining = deadline.saturating_duration_since(Instant::now());

                    tokio::select! {
                        biased;
                        _ = cancellation.cancelled() => {
                            return Err(AgentError::cancelled());
                        }
                        _ = tokio::time::sleep(remaining) => {
                            return Err(AgentError::timeout("Adapter deadline exceeded during backoff"));
                        }
                        _ = tokio::time::sleep(wait) => {
                            continue;
                        }
                    }
                }
            }
        }
    }
}

fn classify_for_retry(low_level: LowLevelError) -> AgentError {
    match low_level {
        LowLevelError::Cancelled => AgentError::cancelled(),
        LowLevelError::DeadlineExceeded => AgentError::timeout("request deadline exceeded"),
        other => classify(other),
    }
}

fn request_from(agent_id: &str, agent_alias_id: &str, input: &AgentInput) -> RemoteRequest {
    RemoteRequest {
        agent_id: agent_id.to_string(),
        agent_alias_id: agent_alias_id.to_string(),
        session_id: input.session_id().to_string(),
        input_text: input.message().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::{FakeRemoteClient, ScriptedCall};
    use crate::remote::RemoteEvent;

    fn chunk(text: &str) -> RemoteEvent {
        RemoteEvent::Chunk {
            text: text.to_string(),
            citations: vec![],
        }
    }

    fn fast_config() -> AdapterConfig {
        AdapterConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn backoff_formula_matches_spec_vector() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_secs(5);
        assert_eq!(backoff(1, initial, max), Duration::from_millis(100));
        assert_eq!(backoff(2, initial, max), Duration::from_millis(200));
        assert_eq!(backoff(3, initial, max), Duration::from_millis(400));
        assert_eq!(backoff(7, initial, max), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn plain_success_preserves_chunk_and_citation_order() {
        let client = Arc::new(FakeRemoteClient::new(vec![ScriptedCall::Events(vec![
            chunk("Hello "),
            chunk("world!"),
        ])]));
        let adapter = Adapter::new(client, "agent-1", "alias-1", fast_config()).unwrap();
        let input = AgentInput::new("session-1", "hi", vec![]).unwrap();

        let (response, err) = adapter
            .invoke_agent(CancellationToken::new(), input)
            .await;

        assert!(err.is_none());
        assert_eq!(response.content, "Hello world!");
    }

    #[tokio::test]
    async fn retries_on_throttling_then_succeeds() {
        let client = Arc::new(FakeRemoteClient::new(vec![
            ScriptedCall::Fail(LowLevelError::Throttled("slow down".into())),
            ScriptedCall::Fail(LowLevelError::Throttled("slow down".into())),
            ScriptedCall::Fail(LowLevelError::Throttled("slow down".into())),
            ScriptedCall::Events(vec![chunk("ok")]),
        ]));
        let adapter = Adapter::new(Arc::clone(&client), "agent-1", "alias-1", fast_config()).unwrap();
        let input = AgentInput::new("session-1", "hi", vec![]).unwrap();

        let (response, err) = adapter
            .invoke_agent(CancellationToken::new(), input)
            .await;

        assert!(err.is_none());
        assert_eq!(response.content, "ok");
        assert_eq!(client.call_count(), 4);
    }

    #[tokio::test]
    async fn retry_exhausted_returns_rate_limit() {
        let client = Arc::new(FakeRemoteClient::new(vec![
            ScriptedCall::Fail(LowLevelError::Throttled("a".into())),
            ScriptedCall::Fail(LowLevelError::Throttled("b".into())),
            ScriptedCall::Fail(LowLevelError::Throttled("c".into())),
            ScriptedCall::Fail(LowLevelError::Throttled("d".into())),
        ]));
        let adapter = Adapter::new(Arc::clone(&client), "agent-1", "alias-1", fast_config()).unwrap();
        let input = AgentInput::new("session-1", "hi", vec![]).unwrap();

        let (_, err) = adapter
            .invoke_agent(CancellationToken::new(), input)
            .await;

        let err = err.unwrap();
        assert_eq!(err.kind, ErrorKind::RateLimit);
        assert!(err.retryable);
        assert_eq!(client.call_count(), 4);
    }

    #[tokio::test]
    async fn non_retryable_failure_stops_after_one_attempt() {
        let client = Arc::new(FakeRemoteClient::new(vec![ScriptedCall::Fail(
            LowLevelError::Unauthorized("denied".into()),
        )]));
        let adapter = Adapter::new(Arc::clone(&client), "agent-1", "alias-1", fast_config()).unwrap();
        let input = AgentInput::new("session-1", "hi", vec![]).unwrap();

        let (_, err) = adapter
            .invoke_agent(CancellationToken::new(), input)
            .await;

        let err = err.unwrap();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert!(!err.retryable);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_during_backoff_stops_retries_early() {
        let client = Arc::new(FakeRemoteClient::new(vec![
            ScriptedCall::Fail(LowLevelError::Throttled("a".into())),
            ScriptedCall::Fail(LowLevelError::Throttled("b".into())),
            ScriptedCall::Fail(LowLevelError::Throttled("c".into())),
            ScriptedCall::Fail(LowLevelError::Throttled("d".into())),
        ]));
        let mut config = fast_config();
        config.initial_backoff = Duration::from_secs(1);
        config.max_backoff = Duration::from_secs(1);
        let adapter = Adapter::new(Arc::clone(&client), "agent-1", "alias-1", config).unwrap();
        let input = AgentInput::new("session-1", "hi", vec![]).unwrap();

        let token = CancellationToken::new();
        let cancel_token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel_token.cancel();
        });

        let (_, err) = adapter.invoke_agent(token, input).await;
        let err = err.unwrap();
        assert_eq!(err.kind, ErrorKind::NetworkError);
        assert!(!err.retryable);
        assert!(client.call_count() < 4, "cancellation must cut retries short");
    }

    #[tokio::test]
    async fn empty_stream_yields_empty_response_no_error() {
        let client = Arc::new(FakeRemoteClient::new(vec![ScriptedCall::Events(vec![])]));
        let adapter = Adapter::new(client, "agent-1", "alias-1", fast_config()).unwrap();
        let input = AgentInput::new("session-1", "hi", vec![]).unwrap();

        let (response, err) = adapter
            .invoke_agent(CancellationToken::new(), input)
            .await;

        assert!(err.is_none());
        assert_eq!(response.content, "");
        assert!(response.citations.is_empty());
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_construction_reaches_the_adapter() {
        let client = Arc::new(FakeRemoteClient::new(vec![ScriptedCall::Events(vec![
            chunk("should never be reached"),
        ])]));
        let _adapter = Adapter::new(Arc::clone(&client), "agent-1", "alias-1", fast_config()).unwrap();

        assert!(AgentInput::new("", "x", vec![]).is_err());
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn construction_rejects_empty_agent_identifiers() {
        let client = Arc::new(FakeRemoteClient::new(vec![]));
        assert!(Adapter::new(Arc::clone(&client), "", "alias-1", fast_config()).is_err());
        assert!(Adapter::new(client, "agent-1", "", fast_config()).is_err());
    }

    #[tokio::test]
    async fn distinct_sessions_share_no_adapter_local_state() {
        let client = Arc::new(FakeRemoteClient::new(vec![
            ScriptedCall::Events(vec![chunk("for session one")]),
            ScriptedCall::Events(vec![chunk("for session two")]),
        ]));
        let adapter = Adapter::new(Arc::clone(&client), "agent-1", "alias-1", fast_config()).unwrap();

        let input_a = AgentInput::new("session-a", "hi", vec![]).unwrap();
        let (resp_a, _) = adapter.invoke_agent(CancellationToken::new(), input_a).await;

        let input_b = AgentInput::new("session-b", "hi", vec![]).unwrap();
        let (resp_b, _) = adapter.invoke_agent(CancellationToken::new(), input_b).await;

        assert_eq!(resp_a.content, "for session one");
        assert_eq!(resp_b.content, "for session two");
        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].session_id, "session-a");
        assert_eq!(requests[1].session_id, "session-b");
    }
}
