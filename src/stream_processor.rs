//! Stream Processor: drives a `StreamReader` to completion against
//! `ChunkWriter`, enforcing the stream/chunk timeout pair and the
//! exactly-one-terminal-frame guarantee.

use crate::error::{AgentError, ErrorKind};
use crate::stream_reader::StreamReader;
use crate::types::{Citation, Frame};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::warn;

/// Sink the processor writes [`Frame`]s to. Implementations adapt this to
/// whatever transport carries frames to the end-user session (WebSocket,
/// SSE, an in-process channel, ...).
#[async_trait]
pub trait ChunkWriter: Send + Sync {
    async fn write_content_chunk(&mut self, text: &str) -> Result<(), AgentError>;
    async fn write_citation_chunk(&mut self, citation: &Citation) -> Result<(), AgentError>;
    async fn write_error_chunk(&mut self, kind: ErrorKind, message: &str) -> Result<(), AgentError>;
    async fn write_done_chunk(&mut self) -> Result<(), AgentError>;
}

/// Tunables for [`process`].
#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// Overall ceiling on the stream's lifetime from the first `read` call.
    pub stream_timeout: Duration,
    /// Ceiling on the gap between two consecutive `read` completions.
    pub chunk_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            stream_timeout: Duration::from_secs(5 * 60),
            chunk_timeout: Duration::from_secs(30),
        }
    }
}

/// Drains `reader` into `writer`, writing exactly one terminal frame
/// (`Done` or `Error`) and calling `reader.close()` exactly once before
/// returning, on every exit path including panics further up the call
/// stack (the reader's own `Drop` impl is the panic-safety backstop).
///
/// - A malformed chunk from the reader is skipped without writing any
///   frame for it -- it is not content, not a citation, not an error frame.
/// - A content-chunk write failure is terminal: the processor stops
///   reading, attempts to write an `Error` frame (best-effort), and
///   returns the write failure.
/// - A citation-chunk write failure is non-terminal: it is logged and
///   the processor keeps reading. Citations are a secondary channel and
///   their loss must never abort an in-progress response.
/// - `chunk_timeout` firing after some content has already been written
///   is reported to the caller as `Timeout`, matching what is written.
/// - `chunk_timeout` firing before any content has been written is
///   reported to the caller as `Timeout`, but the frame written is
///   `Error{kind: ServiceError}` -- a client opening a connection that
///   stalls from the very first byte looks identical to a generic
///   remote-side fault from the outside, so the two must not be
///   conflated by kind on the wire, even though the caller's returned
///   error still carries the precise `Timeout` kind for logging/retry
///   decisions.
pub async fn process(
    reader: &mut StreamReader,
    writer: &mut dyn ChunkWriter,
    config: ProcessorConfig,
) -> Result<(), AgentError> {
    let stream_deadline = Instant::now() + config.stream_timeout;
    let mut produced_any_content = false;

    let result = run(reader, writer, config, stream_deadline, &mut produced_any_content).await;

    reader.close();

    match &result {
        Ok(()) => {
            let _ = writer.write_done_chunk().await;
        }
        Err(err) => {
            let (frame_kind, frame_message) = if err.kind == ErrorKind::Timeout && !produced_any_content {
                (ErrorKind::ServiceError, "remote stream produced no content before timing out")
            } else {
                (err.kind, err.message.as_str())
            };
            let _ = writer.write_error_chunk(frame_kind, frame_message).await;
        }
    }

    result
}

async fn run(
    reader: &mut StreamReader,
    writer: &mut dyn ChunkWriter,
    config: ProcessorConfig,
    stream_deadline: Instant,
    produced_any_content: &mut bool,
) -> Result<(), AgentError> {
    loop {
        if Instant::now() >= stream_deadline {
            return Err(AgentError::timeout("stream exceeded its overall deadline"));
        }

        let remaining_stream = stream_deadline.saturating_duration_since(Instant::now());
        let chunk_budget = config.chunk_timeout.min(remaining_stream);

        let outcome = tokio::time::timeout(chunk_budget, reader.read()).await;

        let (text, done, err) = match outcome {
            Ok(read_result) => read_result,
            Err(_elapsed) => {
                return Err(AgentError::timeout(if *produced_any_content {
                    "stream stalled: no chunk received within chunk_timeout"
                } else {
                    "stream produced no content before chunk_timeout"
                }));
            }
        };

        if let Some(err) = err {
            if err.kind == ErrorKind::MalformedStream {
                warn!(message = %err.message, "skipping malformed stream chunk");
                continue;
            }
            return Err(err);
        }

        if !text.is_empty() {
            if let Err(write_err) = writer.write_content_chunk(&text).await {
                return Err(write_err);
            }
            *produced_any_content = true;
        }

        while let Some(citation) = reader.read_citation() {
            if let Err(write_err) = writer.write_citation_chunk(&citation).await {
                warn!(error = %write_err, "dropping citation after write failure");
            }
        }

        if done {
            return Ok(());
        }
    }
}
