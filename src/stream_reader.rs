//! Stream Reader: a bounded pull iterator over the remote event channel,
//! with a side buffer for out-of-band citation events and strict
//! completion semantics.

use crate::error::{classify, AgentError, ErrorKind};
use crate::remote::{RemoteEvent, RemoteEventChannel};
use crate::types::Citation;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

/// Private mutable state, touched only by the (serialized) caller of
/// `read`/`read_citation`/`close`.
struct ReaderState {
    done: bool,
    buffered_text: VecDeque<String>,
    buffered_citations: VecDeque<Citation>,
}

/// Pull iterator over a remote event channel.
///
/// Constructed by the `Adapter` once a streaming RPC succeeds; the caller
/// then owns it exclusively and must call [`StreamReader::close`] on every
/// exit path. Not safe for concurrent calls from multiple threads --
/// callers must serialize `read`/`read_citation`/`close`.
pub struct StreamReader {
    channel: RemoteEventChannel,
    cancellation: CancellationToken,
    state: ReaderState,
    request_id: String,
}

impl StreamReader {
    pub fn new(channel: RemoteEventChannel, cancellation: CancellationToken) -> Self {
        let request_id = channel.request_id.clone();
        Self {
            channel,
            cancellation,
            state: ReaderState {
                done: false,
                buffered_text: VecDeque::new(),
                buffered_citations: VecDeque::new(),
            },
            request_id,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Pulls the next content chunk.
    ///
    /// Exactly one of three shapes holds per call:
    /// - `(chunk, false, None)` -- the next content chunk (possibly empty).
    /// - `("", true, None)` -- terminal success.
    /// - `("", true, Some(err))` -- terminal failure; every subsequent call
    ///   reports `("", true, None)`.
    ///
    /// A fourth, recoverable shape is used for a single malformed chunk:
    /// `("", false, Some(err))` with `err.kind == MalformedStream` -- the
    /// stream is *not* torn down, and the caller is expected to call `read`
    /// again.
    pub async fn read(&mut self) -> (String, bool, Option<AgentError>) {
        if self.state.done {
            return (String::new(), true, None);
        }
        if let Some(text) = self.state.buffered_text.pop_front() {
            return (text, false, None);
        }

        loop {
            tokio::select! {
                biased;

                _ = self.cancellation.cancelled() => {
                    self.state.done = true;
                    return (String::new(), true, Some(AgentError::cancelled()));
                }

                maybe_item = self.channel.rx.recv() => {
                    match maybe_item {
                        Some(Ok(RemoteEvent::Chunk { text, citations })) => {
                            for citation in citations {
                                self.state.buffered_citations.push_back(citation);
                            }
                            return (text, false, None);
                        }
                        Some(Ok(RemoteEvent::Trace(_))) | Some(Ok(RemoteEvent::Unknown(_))) => {
                            // Diagnostic/opaque events never end the stream.
                            continue;
                        }
                        Some(Err(low_level)) => {
                            // A single malformed chunk is recoverable: report
                            // it without setting `done`, so the caller keeps
                            // reading.
                            return (String::new(), false, Some(classify(low_level)));
                        }
                        None => {
                            self.state.done = true;
                            let tail = self.channel.tail_error.lock().unwrap().take();
                            return match tail {
                                None => (String::new(), true, None),
                                Some(low_level) => (String::new(), true, Some(classify(low_level))),
                            };
                        }
                    }
                }
            }
        }
    }

    /// Returns the next buffered citation, or `None` if none is currently
    /// available. Never blocks on the network -- citations only ever
    /// arrive attached to a content chunk already consumed by `read`.
    pub fn read_citation(&mut self) -> Option<Citation> {
        self.state.buffered_citations.pop_front()
    }

    /// Idempotent. Marks the reader done and releases the remote channel.
    pub fn close(&mut self) -> Option<AgentError> {
        if self.state.done {
            return None;
        }
        self.state.done = true;
        self.channel.rx.close();
        None
    }

    pub fn is_done(&self) -> bool {
        self.state.done
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        // Best-effort cleanup so the remote channel is released even if a
        // caller panics before reaching an explicit `close()`.
        self.channel.rx.close();
    }
}

/// Helper shared by non-streaming callers (`Adapter::invoke_agent`) that
/// need to fully drain a reader into accumulated content and citations.
/// Malformed chunks are skipped exactly like the `StreamProcessor` does;
/// any other terminal error is returned.
pub(crate) async fn drain(
    reader: &mut StreamReader,
) -> (String, Vec<Citation>, Option<AgentError>) {
    let mut content = String::new();
    let mut citations = Vec::new();
    loop {
        let (chunk, done, err) = reader.read().await;
        if let Some(err) = err {
            if err.kind == ErrorKind::MalformedStream {
                continue;
            }
            return (content, citations, Some(err));
        }
        content.push_str(&chunk);
        while let Some(citation) = reader.read_citation() {
            citations.push(citation);
        }
        if done {
            return (content, citations, None);
        }
    }
}
