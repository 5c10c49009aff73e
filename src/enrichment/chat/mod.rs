//! OpenAI-compatible chat-completion runtime.
//!
//! Works against the OpenAI API and any server exposing the same
//! `/chat/completions` endpoint (a local Ollama instance serves it under
//! `/v1`). One [`ChatClient`] per endpoint is shared by every stage that
//! uses it; each stage gets its own [`ChatRuntime`] with its model and
//! prompt template.

mod adapter;
mod client;
pub mod dto;
mod runtime;

pub use adapter::{parse_content, strip_code_fence};
pub use client::ChatClient;
pub(crate) use client::transport_error;
pub use runtime::ChatRuntime;
