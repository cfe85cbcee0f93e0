//! Remote Agent Service client abstraction.
//!
//! The wire protocol is opaque to callers of the core but observable here:
//! a single logical RPC accepts `{agent_id, agent_alias_id, session_id,
//! input_text}` and returns an event stream of `Chunk`, `Trace`, and
//! implementation-defined variants. [`RemoteClient`] is the seam the
//! `Adapter` depends on; [`http::HttpRemoteAgentClient`] is the production
//! implementation, and tests substitute their own.

pub mod http;

use crate::error::LowLevelError;
use crate::types::Citation;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The single logical RPC request sent to the remote Agent Service.
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub agent_id: String,
    pub agent_alias_id: String,
    pub session_id: String,
    pub input_text: String,
}

/// One event pulled from the remote channel, already reduced to what the
/// `StreamReader` needs. Citation conversion (`convert_citation`'s
/// bit-exact mapping) happens before events reach this type.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// A text fragment plus any citations attached to it.
    Chunk {
        text: String,
        citations: Vec<Citation>,
    },
    /// Diagnostic data, always ignored for content.
    Trace(Value),
    /// An implementation-defined variant the core doesn't recognize, but
    /// which decoded to *some* variant tag -- treated as opaque trace data,
    /// never as `MalformedStream`.
    Unknown(Value),
}

/// One item of the remote event channel: either a decoded event or a
/// per-item decode failure (surfaced by `StreamReader::read` as a
/// recoverable `MalformedStream`, never torn down).
pub type RemoteItem = Result<RemoteEvent, LowLevelError>;

/// A live remote event channel plus its tail-error accessor.
///
/// The channel terminates by closing (`rx.recv()` returns `None`); at that
/// point `tail_error` reports whether the close was clean or represents a
/// stream-level failure (e.g. a dropped connection), distinct from a
/// per-item decode error delivered through the channel itself.
pub struct RemoteEventChannel {
    pub rx: mpsc::Receiver<RemoteItem>,
    pub tail_error: Arc<Mutex<Option<LowLevelError>>>,
    /// Request id assigned by the remote service to this invocation, if any.
    pub request_id: String,
}

/// Abstraction over the remote Agent Service, the seam the `Adapter` calls
/// through. Implementations that wrap a callback-driven SDK should adapt it
/// into this single-channel shape, shuttling events through a bounded
/// buffer if necessary.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn invoke(
        &self,
        request: RemoteRequest,
        cancellation: &CancellationToken,
    ) -> Result<RemoteEventChannel, LowLevelError>;
}

/// Wire-level citation record, matching the remote protocol's
/// `Attribution`/`Citation` shape exactly.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WireCitation {
    #[serde(default)]
    pub generated_response_part: Option<WireGeneratedResponsePart>,
    #[serde(default)]
    pub retrieved_references: Vec<WireRetrievedReference>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WireGeneratedResponsePart {
    #[serde(default)]
    pub text_response_part: Option<WireTextResponsePart>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WireTextResponsePart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WireRetrievedReference {
    #[serde(default)]
    pub content: Option<WireContent>,
    #[serde(default)]
    pub location: Option<WireLocation>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WireContent {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WireLocation {
    #[serde(default)]
    pub s3_location: Option<WireS3Location>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WireS3Location {
    #[serde(default)]
    pub uri: Option<String>,
}

/// Converts one wire `Citation` into a domain [`Citation`], applying the
/// bit-exact mapping:
///
/// - `excerpt` <- `generated_response_part.text_response_part.text`
/// - taking the *first* retrieved reference:
///   `source_name` <- `reference.content.text`
///   `source_id` / `url` <- `reference.location.s3_location.uri`
///   `metadata` <- `reference.metadata` (copy, empty map if absent)
///
/// All string fields default to empty when the underlying field is absent.
/// Returns `None` when the converted citation would be empty and must be
/// dropped rather than constructed.
pub fn convert_citation(raw: &WireCitation) -> Option<Citation> {
    let excerpt = raw
        .generated_response_part
        .as_ref()
        .and_then(|g| g.text_response_part.as_ref())
        .and_then(|t| t.text.clone())
        .unwrap_or_default();

    let first_reference = raw.retrieved_references.first();
    let source_name = first_reference
        .and_then(|r| r.content.as_ref())
        .and_then(|c| c.text.clone())
        .unwrap_or_default();
    let uri = first_reference
        .and_then(|r| r.location.as_ref())
        .and_then(|l| l.s3_location.as_ref())
        .and_then(|s| s.uri.clone())
        .unwrap_or_default();
    let metadata = first_reference
        .and_then(|r| r.metadata.clone())
        .unwrap_or_default();

    let citation = Citation {
        source_id: uri.clone(),
        source_name,
        excerpt,
        url: uri,
        confidence: None,
        metadata,
    };

    if citation.is_empty() {
        None
    } else {
        Some(citation)
    }
}

#[cfg(test)]
pub mod fake;
