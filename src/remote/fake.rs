//! In-process fake [`RemoteClient`] for unit tests.
//!
//! Mirrors the channel-pair shape used by the crate's other fakes: the
//! test drives a [`FakeRemoteClient`] by queuing up scripted responses
//! (either a canned event sequence or a canned failure), then hands the
//! client to the code under test. Every `invoke` call consumes the next
//! queued script entry, so tests that exercise retries can queue one
//! failure per attempt followed by a success.

use super::{RemoteClient, RemoteEvent, RemoteEventChannel, RemoteRequest};
use crate::error::LowLevelError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One scripted outcome for a single `invoke` call.
pub enum ScriptedCall {
    /// Succeed and stream the given events, then close cleanly.
    Events(Vec<RemoteEvent>),
    /// Succeed, stream the given events, then close with a tail error.
    EventsThenTailError(Vec<RemoteEvent>, LowLevelError),
    /// Fail the call itself (no event stream produced).
    Fail(LowLevelError),
}

/// Records what the code under test actually sent, and plays back queued
/// [`ScriptedCall`]s one per invocation.
pub struct FakeRemoteClient {
    script: Mutex<Vec<ScriptedCall>>,
    pub requests: Mutex<Vec<RemoteRequest>>,
}

impl FakeRemoteClient {
    pub fn new(script: Vec<ScriptedCall>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().rev().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteClient for FakeRemoteClient {
    async fn invoke(
        &self,
        request: RemoteRequest,
        cancellation: &CancellationToken,
    ) -> Result<RemoteEventChannel, LowLevelError> {
        self.requests.lock().unwrap().push(request);

        if cancellation.is_cancelled() {
            return Err(LowLevelError::Cancelled);
        }

        let next = self
            .script
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(ScriptedCall::Fail(LowLevelError::RemoteFault {
                message: "fake client script exhausted".into(),
                retryable: false,
            }));

        match next {
            ScriptedCall::Fail(err) => Err(err),
            ScriptedCall::Events(events) => Ok(make_channel(events, None)),
            ScriptedCall::EventsThenTailError(events, tail) => {
                Ok(make_channel(events, Some(tail)))
            }
        }
    }
}

fn make_channel(events: Vec<RemoteEvent>, tail: Option<LowLevelError>) -> RemoteEventChannel {
    let (tx, rx) = mpsc::channel(events.len().max(1));
    for event in events {
        // Bounded by construction; the buffer above is sized to fit every
        // scripted event so this never blocks.
        let _ = tx.try_send(Ok(event));
    }
    let tail_error = Arc::new(Mutex::new(tail));
    drop(tx);
    RemoteEventChannel {
        rx,
        tail_error,
        request_id: "fake-request-id".to_string(),
    }
}
