//! Agent invocation core.
//!
//! Mediates between an end-user chat session and a remote managed agent
//! service: validates and forwards a single turn's input, retries
//! transient remote failures with bounded exponential backoff, and streams
//! the response back chunk-by-chunk with attached citations.
//!
//! # Architecture
//!
//! - `error`: the closed error taxonomy (`ErrorKind`/`AgentError`) every
//!   public surface returns, plus the low-level-to-domain classifier.
//! - `types`: the data model (`AgentInput`, `Citation`, `AgentResponse`,
//!   `Frame`).
//! - `remote`: the `RemoteClient` seam and its production HTTP
//!   implementation.
//! - `stream_reader`: the pull iterator over a remote event channel.
//! - `adapter`: `Adapter`, the entry point -- `invoke_agent` and
//!   `invoke_agent_stream`.
//! - `stream_processor`: drives a `StreamReader` into a `ChunkWriter`.
//! - `session`: documents (and checks) that no session-keyed mutable
//!   state exists anywhere in the above.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use agent_invocation_core::{Adapter, AdapterConfig, AgentInput};
//! use agent_invocation_core::remote::http::HttpRemoteAgentClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Arc::new(HttpRemoteAgentClient::new(
//!         "https://agents.example.internal",
//!         "api-key",
//!     ));
//!     let adapter = Adapter::new(client, "agent-1", "alias-1", AdapterConfig::default())
//!         .expect("non-empty agent identifiers");
//!
//!     let input = AgentInput::new("session-1", "what's the status of order 42?", vec![])
//!         .expect("well-formed input");
//!     let (response, err) = adapter.invoke_agent(CancellationToken::new(), input).await;
//!     if let Some(err) = err {
//!         eprintln!("invocation failed: {err}");
//!     } else {
//!         println!("{}", response.content);
//!     }
//! }
//! ```

pub mod adapter;
pub mod error;
pub mod remote;
pub mod session;
pub mod stream_processor;
pub mod stream_reader;
pub mod types;

pub use adapter::{Adapter, AdapterConfig};
pub use error::{AgentError, ErrorKind};
pub use stream_processor::{process, ChunkWriter, ProcessorConfig};
pub use stream_reader::StreamReader;
pub use types::{AgentInput, AgentResponse, Citation, Frame};
