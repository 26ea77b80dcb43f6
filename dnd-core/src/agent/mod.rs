//! Language-model agents.
//!
//! Every agent is an [`AgentCore`] (system prompt, model settings, retry
//! policy) on top of a shared [`TextGenerator`]. Calls are stateless: all
//! history an agent needs is rendered into the prompt by the caller.

pub mod chronicler;
pub mod dm;
pub mod output;
pub mod player;
pub mod task;

pub use chronicler::ChroniclerAgent;
pub use dm::DmAgent;
pub use output::{ParseError, StructuredOutput};
pub use player::PlayerAgent;
pub use task::{Task, TaskError, TaskInputs};

use crate::config::{AgentSettings, RetryPolicy};
use async_trait::async_trait;
use claude::{Claude, Message, Request, StopReason};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from an agent call.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{agent} returned unusable output for '{task}' after {attempts} attempt(s): {source}")]
    Parse {
        agent: String,
        task: String,
        attempts: u32,
        #[source]
        source: ParseError,
    },

    #[error("External service error: {0}")]
    ExternalService(#[from] GenerationError),

    #[error(transparent)]
    MissingInput(#[from] TaskError),

    #[error("Cancelled before calling the model")]
    Aborted,
}

/// Failure reported by a [`TextGenerator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct GenerationError(pub String);

impl From<claude::Error> for GenerationError {
    fn from(e: claude::Error) -> Self {
        GenerationError(e.to_string())
    }
}

/// The shape a task's reply must take.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputFormat {
    Text,
    Json { name: &'static str, schema: Value },
}

/// One call to the text-generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Name of the task, for routing and logs.
    pub task: String,
    pub system: String,
    pub prompt: String,
    pub format: OutputFormat,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl GenerationRequest {
    /// System prompt with the output format instructions appended.
    pub fn system_with_format(&self) -> String {
        match &self.format {
            OutputFormat::Text => self.system.clone(),
            OutputFormat::Json { name, schema } => {
                let schema = serde_json::to_string_pretty(schema).unwrap_or_default();
                format!(
                    "{}\n\nRespond with a single JSON object ({name}) and nothing else. \
                     It must follow this JSON schema:\n{schema}",
                    self.system
                )
            }
        }
    }
}

/// The external text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

#[async_trait]
impl TextGenerator for Claude {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let api_request = Request::new(vec![Message::user(request.prompt.clone())])
            .with_system(request.system_with_format())
            .with_model(request.model.clone())
            .with_max_tokens(request.max_tokens)
            .with_temperature(request.temperature);

        let response = self.complete(api_request).await?;
        if response.stop_reason == StopReason::MaxTokens {
            warn!(task = %request.task, "reply truncated at max_tokens");
        }
        debug!(
            task = %request.task,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "model replied"
        );
        Ok(response.text)
    }
}

/// Shared cancellation flag, checked before every model call.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so play can continue.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What every agent shares: identity, prompt, settings and the generator.
#[derive(Clone)]
pub struct AgentCore {
    name: String,
    system_prompt: String,
    settings: AgentSettings,
    retry: RetryPolicy,
    generator: Arc<dyn TextGenerator>,
    abort: AbortHandle,
}

impl std::fmt::Debug for AgentCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCore")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl AgentCore {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        settings: AgentSettings,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            settings,
            retry: RetryPolicy::default(),
            generator,
            abort: AbortHandle::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Run a task whose reply is free text.
    pub async fn run_text(&self, task: &Task, inputs: &TaskInputs) -> Result<String, AgentError> {
        self.execute(task, inputs, OutputFormat::Text, output::decode_text)
            .await
    }

    /// Run a task whose reply is a JSON value of type `T`.
    pub async fn run_structured<T: StructuredOutput>(
        &self,
        task: &Task,
        inputs: &TaskInputs,
    ) -> Result<T, AgentError> {
        self.run_checked(task, inputs, |_: &T| Ok(())).await
    }

    /// Like [`run_structured`](Self::run_structured) with an extra check that
    /// depends on the call site. A failed check counts as a parse failure.
    pub async fn run_checked<T, F>(
        &self,
        task: &Task,
        inputs: &TaskInputs,
        check: F,
    ) -> Result<T, AgentError>
    where
        T: StructuredOutput,
        F: Fn(&T) -> Result<(), String> + Send + Sync,
    {
        let format = OutputFormat::Json {
            name: T::output_name(),
            schema: T::output_schema(),
        };
        self.execute(task, inputs, format, |reply| {
            let value = output::decode_json::<T>(reply)?;
            check(&value).map_err(ParseError::Invalid)?;
            Ok(value)
        })
        .await
    }

    async fn execute<T, D>(
        &self,
        task: &Task,
        inputs: &TaskInputs,
        format: OutputFormat,
        decode: D,
    ) -> Result<T, AgentError>
    where
        D: Fn(&str) -> Result<T, ParseError> + Send + Sync,
    {
        let prompt = task.render(inputs)?;
        let attempts = self.retry.attempts();
        let mut last_error = ParseError::Empty;

        for attempt in 1..=attempts {
            if self.abort.is_aborted() {
                return Err(AgentError::Aborted);
            }
            if attempt > 1 && !self.retry.backoff.is_zero() {
                tokio::time::sleep(self.retry.backoff).await;
            }

            let request = GenerationRequest {
                task: task.name.to_string(),
                system: self.system_prompt.clone(),
                prompt: if attempt == 1 {
                    prompt.clone()
                } else {
                    format!(
                        "{prompt}\n\nYour previous reply could not be used: {last_error}. \
                         Answer again and follow the expected output exactly."
                    )
                },
                format: format.clone(),
                model: self.settings.model.clone(),
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
            };

            debug!(agent = %self.name, task = task.name, attempt, "calling model");
            let reply = self.generator.generate(&request).await?;

            match decode(&reply) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        agent = %self.name,
                        task = task.name,
                        attempt,
                        error = %e,
                        "unusable reply"
                    );
                    last_error = e;
                }
            }
        }

        Err(AgentError::Parse {
            agent: self.name.clone(),
            task: task.name.to_string(),
            attempts,
            source: last_error,
        })
    }
}
