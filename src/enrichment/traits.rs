//! Stage contracts and the runtime trait every provider implements.
//!
//! A [`Task`] names one stage and fixes its request/response pair. A
//! [`TaskRuntime`] is anything that can answer that task: a chat-completion
//! model, a translation API, or a scripted mock in tests. The pipeline only
//! ever talks to `dyn TaskRuntime<T>`, so it never branches on the provider.
//!
//! # Example
//!
//! ```ignore
//! use lexicard::enrichment::tasks::SenseTask;
//! use lexicard::enrichment::traits::TaskRuntime;
//!
//! async fn define(runtime: &dyn TaskRuntime<SenseTask>, request: &SenseRequest) {
//!     let sense = runtime.invoke(request).await?;
//! }
//! ```

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

use super::domain::{ProviderError, TaskId};

/// A pipeline stage: its identity and typed input/output.
pub trait Task: Send + Sync + 'static {
    const ID: TaskId;

    type Request: Serialize + fmt::Debug + Send + Sync;
    type Response: Serialize + DeserializeOwned + fmt::Debug + Clone + Send + Sync;

    /// Validate and normalize a provider's answer before it is cached.
    ///
    /// Errors returned here are fatal for the record.
    fn accept(response: Self::Response) -> Result<Self::Response, ProviderError> {
        Ok(response)
    }
}

/// A provider able to answer task `T`.
#[async_trait]
pub trait TaskRuntime<T: Task>: Send + Sync {
    /// Provider and model, e.g. `openai:gpt-5-mini`. Part of the cache key.
    fn provider_id(&self) -> String;

    /// Rate-limit bucket shared by every runtime talking to the same service.
    fn provider(&self) -> &str;

    /// Version of the prompt or request template. Part of the cache key.
    fn prompt_version(&self) -> &str;

    /// Answer one request.
    async fn invoke(&self, request: &T::Request) -> Result<T::Response, ProviderError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Responder<T> = Box<
        dyn Fn(&<T as Task>::Request) -> Result<<T as Task>::Response, ProviderError>
            + Send
            + Sync,
    >;

    /// Runtime that answers from a closure and counts invocations.
    pub struct ScriptedRuntime<T: Task> {
        provider: String,
        model: String,
        prompt_version: String,
        responder: Responder<T>,
        calls: AtomicUsize,
    }

    impl<T: Task> ScriptedRuntime<T> {
        pub fn new(
            responder: impl Fn(&T::Request) -> Result<T::Response, ProviderError>
            + Send
            + Sync
            + 'static,
        ) -> Self {
            Self {
                provider: "mock".to_string(),
                model: "scripted".to_string(),
                prompt_version: "v1".to_string(),
                responder: Box::new(responder),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with_prompt_version(mut self, version: &str) -> Self {
            self.prompt_version = version.to_string();
            self
        }

        pub fn with_provider(mut self, provider: &str) -> Self {
            self.provider = provider.to_string();
            self
        }

        /// Number of times `invoke` was called.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<T: Task> TaskRuntime<T> for ScriptedRuntime<T> {
        fn provider_id(&self) -> String {
            format!("{}:{}", self.provider, self.model)
        }

        fn provider(&self) -> &str {
            &self.provider
        }

        fn prompt_version(&self) -> &str {
            &self.prompt_version
        }

        async fn invoke(&self, request: &T::Request) -> Result<T::Response, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.responder)(request)
        }
    }

    mod tests {
        use super::*;
        use crate::enrichment::domain::{CollocationRequest, CollocationResponse};
        use crate::enrichment::tasks::CollocationTask;

        fn request() -> CollocationRequest {
            CollocationRequest {
                lemma: "zamek".to_string(),
                part_of_speech: "noun".to_string(),
                language: "pl".to_string(),
            }
        }

        #[tokio::test]
        async fn test_scripted_runtime_counts_calls() {
            let runtime = ScriptedRuntime::<CollocationTask>::new(|req| {
                Ok(CollocationResponse {
                    collocations: vec![format!("stary {}", req.lemma)],
                })
            });

            let response = runtime.invoke(&request()).await.unwrap();
            assert_eq!(response.collocations, vec!["stary zamek"]);
            runtime.invoke(&request()).await.unwrap();
            assert_eq!(runtime.calls(), 2);
        }

        #[tokio::test]
        async fn test_scripted_runtime_returns_error() {
            let runtime = ScriptedRuntime::<CollocationTask>::new(|_| Err(ProviderError::Timeout))
                .with_provider("ollama");

            assert_eq!(runtime.invoke(&request()).await, Err(ProviderError::Timeout));
            assert_eq!(runtime.provider(), "ollama");
            assert_eq!(runtime.provider_id(), "ollama:scripted");
        }
    }
}
