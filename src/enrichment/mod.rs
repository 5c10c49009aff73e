//! Enrichment stages and the runtimes that answer them.
//!
//! # Architecture
//!
//! This module follows a clean separation between:
//! - **Domain models** (`domain.rs`) - stage requests/responses and errors
//! - **Tasks** (`tasks.rs`) - one type per stage with its validation
//! - **Runtimes** - `chat` (OpenAI-compatible, incl. Ollama) and `deepl`,
//!   each split into DTOs, adapter, and HTTP client
//! - **Prompts** (`prompts.rs`) - versioned templates for chat runtimes
//! - **Retry** (`retry.rs`) - backoff for transient failures
//! - **Registry** (`registry.rs`) - builds runtimes from the config
//!
//! Provider wire formats stop at the runtime. Everything past
//! [`traits::TaskRuntime`] sees only the domain types, so providers can be
//! swapped per stage in the config without touching the pipeline.
//!
//! # Usage
//!
//! ```ignore
//! use lexicard::enrichment::registry;
//!
//! let config = lexicard::config::load(None);
//! let pipeline = registry::build_pipeline(&config, pool)?;
//! let outcome = pipeline.process_batch(&lookups).await;
//! ```

pub mod chat;
pub mod deepl;
pub mod domain;
pub mod prompts;
pub mod registry;
pub mod retry;
pub mod tasks;
pub mod traits;

pub use domain::{InvocationError, ProviderError, TaskId};
pub use traits::{Task, TaskRuntime};
