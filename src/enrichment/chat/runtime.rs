//! [`TaskRuntime`] implementation on top of [`ChatClient`].

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

use super::{ChatClient, adapter};
use crate::enrichment::domain::ProviderError;
use crate::enrichment::prompts;
use crate::enrichment::traits::{Task, TaskRuntime};

/// Answers task `T` by prompting a chat model with a versioned template.
pub struct ChatRuntime<T: Task> {
    client: Arc<ChatClient>,
    model: String,
    prompt_version: String,
    template: &'static str,
    _task: PhantomData<fn() -> T>,
}

impl<T: Task> ChatRuntime<T> {
    /// Returns `None` if no template exists for `T` at `prompt_version`.
    pub fn new(
        client: Arc<ChatClient>,
        model: impl Into<String>,
        prompt_version: impl Into<String>,
    ) -> Option<Self> {
        let prompt_version = prompt_version.into();
        let template = prompts::template(T::ID, &prompt_version)?;
        Some(Self {
            client,
            model: model.into(),
            prompt_version,
            template,
            _task: PhantomData,
        })
    }
}

#[async_trait]
impl<T: Task> TaskRuntime<T> for ChatRuntime<T> {
    fn provider_id(&self) -> String {
        format!("{}:{}", self.client.provider(), self.model)
    }

    fn provider(&self) -> &str {
        self.client.provider()
    }

    fn prompt_version(&self) -> &str {
        &self.prompt_version
    }

    async fn invoke(&self, request: &T::Request) -> Result<T::Response, ProviderError> {
        let prompt = prompts::render(self.template, request)?;
        let content = self.client.complete(&self.model, &prompt).await?;
        adapter::parse_content::<T::Response>(&content)
    }
}
