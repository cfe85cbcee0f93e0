//! Data model: `AgentInput`, `Citation`, `AgentResponse`, `Frame`.

use crate::error::AgentError;
use serde_json::{Map, Value};

/// Maximum `message` length in bytes (not characters).
pub const MAX_MESSAGE_BYTES: usize = 25_000;

/// Immutable per-session chat request.
///
/// Every string field is guaranteed non-empty once constructed -- the
/// fallible constructor is the only public way to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInput {
    session_id: String,
    message: String,
    knowledge_base_ids: Vec<String>,
}

impl AgentInput {
    /// Validates and constructs an `AgentInput`.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_INPUT` if `session_id` or `message` is empty, if
    /// `message` exceeds [`MAX_MESSAGE_BYTES`], or if any
    /// `knowledge_base_ids` element is empty.
    pub fn new(
        session_id: impl Into<String>,
        message: impl Into<String>,
        knowledge_base_ids: Vec<String>,
    ) -> Result<Self, AgentError> {
        let input = Self {
            session_id: session_id.into(),
            message: message.into(),
            knowledge_base_ids,
        };
        validate_input(&input)?;
        Ok(input)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn knowledge_base_ids(&self) -> &[String] {
        &self.knowledge_base_ids
    }
}

/// Validates the fields of an already-constructed `AgentInput`.
///
/// Exposed separately from [`AgentInput::new`] so callers at the `Adapter`
/// boundary (`InvokeAgent`/`InvokeAgentStream`) can re-check input
/// independently of how it was built, per the per-call validation contract.
pub fn validate_input(input: &AgentInput) -> Result<(), AgentError> {
    if input.session_id.is_empty() {
        return Err(AgentError::invalid_input("session_id must not be empty"));
    }
    if input.message.is_empty() {
        return Err(AgentError::invalid_input("message must not be empty"));
    }
    if input.message.len() > MAX_MESSAGE_BYTES {
        return Err(AgentError::invalid_input(format!(
            "message exceeds maximum length of {MAX_MESSAGE_BYTES} bytes"
        )));
    }
    if input.knowledge_base_ids.iter().any(|id| id.is_empty()) {
        return Err(AgentError::invalid_input(
            "knowledge_base_ids must not contain empty elements",
        ));
    }
    Ok(())
}

/// Structured attribution record associated with a generated response segment.
///
/// At least one of `excerpt`, `source_name`, or `source_id` is guaranteed
/// non-empty -- the wire-to-domain converter drops citations that fail this
/// invariant rather than constructing them.
#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub source_id: String,
    pub source_name: String,
    pub excerpt: String,
    pub url: String,
    pub confidence: Option<f64>,
    pub metadata: Map<String, Value>,
}

impl Citation {
    /// `true` when none of `excerpt`, `source_name`, `source_id` carry
    /// content -- such a citation must never be constructed as `Some`.
    pub fn is_empty(&self) -> bool {
        self.excerpt.is_empty() && self.source_name.is_empty() && self.source_id.is_empty()
    }
}

/// Accumulated result of a non-streaming `InvokeAgent` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentResponse {
    pub content: String,
    pub citations: Vec<Citation>,
    pub metadata: Map<String, Value>,
    pub request_id: String,
}

/// One frame written to a [`crate::stream_processor::ChunkWriter`].
///
/// Exactly one `Done` *or* one `Error` is emitted as the terminal frame per
/// stream; `Content` and `CitationFrame` may appear any number of times
/// before it.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Content(String),
    CitationFrame(Citation),
    Error {
        kind: crate::error::ErrorKind,
        message: String,
    },
    Done,
}
