//! Production `RemoteClient` implementation over HTTP.
//!
//! The real remote protocol (AWS-event-stream-shaped chunk/trace framing)
//! is replaced here with a simpler newline-delimited-JSON framing over a
//! chunked HTTP response -- the core only depends on the [`super::RemoteClient`]
//! trait, so the exact wire encoding is an implementation detail of this
//! module, not of the invocation core. Each line is a JSON object with a
//! `type` discriminator (`"chunk"`, `"trace"`, or anything else, which is
//! treated as an opaque implementation-defined variant).

use super::{convert_citation, RemoteClient, RemoteEvent, RemoteEventChannel, RemoteRequest, WireCitation};
use crate::error::LowLevelError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Talks to a remote Agent Service over HTTP, decoding its streamed
/// response body into [`RemoteEvent`]s.
pub struct HttpRemoteAgentClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl HttpRemoteAgentClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("failed to build HTTP client"),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn invoke_url(&self, agent_id: &str, agent_alias_id: &str) -> String {
        format!(
            "{}/agents/{agent_id}/aliases/{agent_alias_id}/invoke",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteAgentClient {
    async fn invoke(
        &self,
        request: RemoteRequest,
        cancellation: &CancellationToken,
    ) -> Result<RemoteEventChannel, LowLevelError> {
        let url = self.invoke_url(&request.agent_id, &request.agent_alias_id);
        let send_future = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "sessionId": request.session_id,
                "inputText": request.input_text,
            }))
            .send();

        let response = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(LowLevelError::Cancelled),
            result = send_future => result?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(http_status_error(status, body));
        }

        let request_id = response
            .headers()
            .get("x-amzn-requestid")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let tail_error = Arc::new(Mutex::new(None));
        let tail_error_writer = Arc::clone(&tail_error);
        let cancellation = cancellation.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            loop {
                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => {
                        *tail_error_writer.lock().unwrap() = Some(LowLevelError::Cancelled);
                        return;
                    }
                    next = byte_stream.next() => {
                        match next {
                            Some(Ok(bytes)) => {
                                buffer.push_str(&String::from_utf8_lossy(&bytes));
                                while let Some(pos) = buffer.find('\n') {
                                    let line = buffer[..pos].trim().to_string();
                                    buffer.drain(..=pos);
                                    if line.is_empty() {
                                        continue;
                                    }
                                    if tx.send(decode_event(&line)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                *tail_error_writer.lock().unwrap() = Some(LowLevelError::Http(e));
                                return;
                            }
                            None => {
                                let trailing = buffer.trim();
                                if !trailing.is_empty() {
                                    let _ = tx.send(decode_event(trailing)).await;
                                }
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(RemoteEventChannel {
            rx,
            tail_error,
            request_id,
        })
    }
}

fn http_status_error(status: StatusCode, body: String) -> LowLevelError {
    match status.as_u16() {
        429 => LowLevelError::Throttled(body),
        401 | 403 => LowLevelError::Unauthorized(body),
        400 | 422 => LowLevelError::InvalidInput(body),
        500..=599 => LowLevelError::RemoteFault {
            message: body,
            retryable: true,
        },
        _ => LowLevelError::RemoteFault {
            message: body,
            retryable: false,
        },
    }
}

/// Decodes one newline-framed JSON object into a [`RemoteEvent`].
///
/// A JSON syntax error is a `Decode` failure; valid JSON with no `type`
/// field is a `MalformedEvent` failure (the event "cannot even be decoded
/// to a variant tag"); any other `type` value is carried through as
/// `RemoteEvent::Unknown`, never as an error.
fn decode_event(line: &str) -> Result<RemoteEvent, LowLevelError> {
    let value: Value = serde_json::from_str(line)?;
    let tag = value.get("type").and_then(Value::as_str);
    match tag {
        Some("chunk") => {
            let text = value
                .get("bytes")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let citations = value
                .get("attribution")
                .and_then(|a| a.get("citations"))
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|raw| serde_json::from_value::<WireCitation>(raw.clone()).ok())
                        .filter_map(|wire| convert_citation(&wire))
                        .collect()
                })
                .unwrap_or_default();
            Ok(RemoteEvent::Chunk { text, citations })
        }
        Some("trace") => Ok(RemoteEvent::Trace(value)),
        Some(_) => Ok(RemoteEvent::Unknown(value)),
        None => Err(LowLevelError::MalformedEvent(format!(
            "event had no \"type\" field: {value}"
        ))),
    }
}
