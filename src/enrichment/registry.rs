//! Builds the stage runtimes a [`Config`] asks for.
//!
//! HTTP clients are created once per provider and shared by every stage
//! that uses that provider. Credentials are checked here, before any
//! lookup is read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePool;

use super::chat::{ChatClient, ChatRuntime};
use super::deepl::{DeepLClient, DeepLRuntime};
use super::retry::RetryPolicy;
use super::tasks::{CandidateTask, CollocationTask, HintTask, SenseTask, TranslationTask};
use super::traits::{Task, TaskRuntime};
use crate::cache::StageCache;
use crate::config::{Config, RuntimeKind, TaskSetting};
use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, PipelineSettings, ProviderLimits, Stages};

/// Pipeline wired from `config`, caching into `pool`.
pub fn build_pipeline(config: &Config, pool: SqlitePool) -> Result<Pipeline> {
    let stages = build_stages(config)?;
    let limits = ProviderLimits::new(config.pipeline.concurrency, config.providers.limits());
    Ok(Pipeline::new(
        stages,
        StageCache::new(pool),
        limits,
        pipeline_settings(config),
    ))
}

pub fn pipeline_settings(config: &Config) -> PipelineSettings {
    PipelineSettings {
        concurrency: config.pipeline.concurrency,
        retry: RetryPolicy {
            max_attempts: config.pipeline.max_attempts,
            base_delay: Duration::from_millis(config.pipeline.base_backoff_ms),
            max_delay: Duration::from_millis(config.pipeline.max_backoff_ms),
        },
        target_language: config.languages.target.clone(),
    }
}

/// One runtime per stage. The hint stage is `None` when disabled.
pub fn build_stages(config: &Config) -> Result<Stages> {
    let mut clients = Clients::new(config);
    let tasks = &config.tasks;

    let hint = if tasks.hint.enabled {
        Some(clients.chat_stage::<HintTask>("hint", &tasks.hint)?)
    } else {
        None
    };

    Ok(Stages {
        candidate: clients.chat_stage::<CandidateTask>("candidate", &tasks.candidate)?,
        sense: clients.chat_stage::<SenseTask>("sense", &tasks.sense)?,
        translation: clients.translation_stage(&tasks.translation)?,
        collocation: clients.chat_stage::<CollocationTask>("collocation", &tasks.collocation)?,
        hint,
    })
}

/// Lazily created, shared provider clients.
struct Clients<'a> {
    config: &'a Config,
    timeout: Duration,
    chat: HashMap<RuntimeKind, Arc<ChatClient>>,
    deepl: Option<Arc<DeepLClient>>,
}

impl<'a> Clients<'a> {
    fn new(config: &'a Config) -> Self {
        Self {
            config,
            timeout: Duration::from_secs(config.pipeline.request_timeout_secs.max(1)),
            chat: HashMap::new(),
            deepl: None,
        }
    }

    fn chat_stage<T: Task>(
        &mut self,
        name: &str,
        setting: &TaskSetting,
    ) -> Result<Arc<dyn TaskRuntime<T>>> {
        let client = self
            .chat_client(setting.runtime)
            .map_err(|e| e.context(format!("tasks.{}", name)))?;
        let runtime = ChatRuntime::<T>::new(client, &setting.model, &setting.prompt_version)
            .ok_or_else(|| {
                Error::config(format!(
                    "tasks.{}: no prompt template for version {:?}",
                    name, setting.prompt_version
                ))
            })?;
        Ok(Arc::new(runtime))
    }

    fn translation_stage(&mut self, setting: &TaskSetting) -> Result<Arc<dyn TaskRuntime<TranslationTask>>> {
        if setting.runtime != RuntimeKind::DeepL {
            return self.chat_stage::<TranslationTask>("translation", setting);
        }

        let client = match &self.deepl {
            Some(client) => client.clone(),
            None => {
                let api_key = non_empty(&self.config.credentials.deepl_api_key).ok_or_else(|| {
                    Error::config(
                        "tasks.translation uses deepl but no DeepL API key is set \
                         (credentials.deepl_api_key or DEEPL_API_KEY)",
                    )
                })?;
                let client = DeepLClient::new(
                    api_key,
                    self.config.providers.deepl.base_url.clone(),
                    self.timeout,
                )
                .map_err(|e| Error::config(e.to_string()))?;
                let client = Arc::new(client);
                self.deepl = Some(client.clone());
                client
            }
        };
        Ok(Arc::new(DeepLRuntime::new(client)))
    }

    fn chat_client(&mut self, kind: RuntimeKind) -> Result<Arc<ChatClient>> {
        if let Some(client) = self.chat.get(&kind) {
            return Ok(client.clone());
        }

        let providers = &self.config.providers;
        let (endpoint, api_key) = match kind {
            RuntimeKind::OpenAi => {
                let key = non_empty(&self.config.credentials.openai_api_key).ok_or_else(|| {
                    Error::config(
                        "no OpenAI API key is set (credentials.openai_api_key or OPENAI_API_KEY)",
                    )
                })?;
                (&providers.openai, Some(key))
            }
            RuntimeKind::Ollama => (&providers.ollama, None),
            RuntimeKind::DeepL => {
                return Err(Error::config("the deepl runtime only supports translation"));
            }
        };
        let base_url = endpoint.base_url.clone().ok_or_else(|| {
            Error::config(format!("providers.{}.base_url is not set", kind.as_str()))
        })?;

        let client = ChatClient::new(kind.as_str(), base_url, api_key, self.timeout)
            .map_err(|e| Error::config(e.to_string()))?;
        let client = Arc::new(client);
        self.chat.insert(kind, client.clone());
        Ok(client)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> Config {
        let mut config = Config::default();
        config.credentials.openai_api_key = Some("sk-test".to_string());
        config
    }

    #[test]
    fn test_default_stages_use_openai() {
        let stages = build_stages(&config_with_key()).unwrap();
        assert_eq!(stages.candidate.provider(), "openai");
        assert_eq!(stages.sense.provider_id(), "openai:gpt-5-mini");
        assert_eq!(stages.translation.prompt_version(), "v1");
    }

    #[test]
    fn test_openai_requires_key() {
        let mut config = Config::default();
        config.credentials.openai_api_key = Some("  ".to_string());
        let err = build_stages(&config).err().unwrap();
        assert!(err.to_string().contains("OpenAI API key"));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let mut config = Config::default();
        for setting in [
            &mut config.tasks.candidate,
            &mut config.tasks.sense,
            &mut config.tasks.translation,
            &mut config.tasks.collocation,
        ] {
            setting.runtime = RuntimeKind::Ollama;
            setting.model = "llama3".to_string();
        }
        config.tasks.hint.enabled = false;

        let stages = build_stages(&config).unwrap();
        assert_eq!(stages.collocation.provider_id(), "ollama:llama3");
        assert!(stages.hint.is_none());
    }

    #[test]
    fn test_deepl_translation() {
        let mut config = config_with_key();
        config.tasks.translation.runtime = RuntimeKind::DeepL;
        assert!(build_stages(&config).is_err());

        config.credentials.deepl_api_key = Some("key:fx".to_string());
        let stages = build_stages(&config).unwrap();
        assert_eq!(stages.translation.provider(), "deepl");
    }

    #[test]
    fn test_unknown_prompt_version() {
        let mut config = config_with_key();
        config.tasks.sense.prompt_version = "v99".to_string();
        let err = build_stages(&config).err().unwrap();
        assert!(err.to_string().contains("v99"));
    }

    #[test]
    fn test_pipeline_settings_from_config() {
        let mut config = Config::default();
        config.pipeline.max_attempts = 2;
        config.pipeline.base_backoff_ms = 10;
        config.languages.target = "de".to_string();

        let settings = pipeline_settings(&config);
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(settings.retry.base_delay, Duration::from_millis(10));
        assert_eq!(settings.target_language, "de");
    }
}
