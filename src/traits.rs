//! External collaborator capabilities.
//!
//! The core depends on these traits, never on a concrete LLM, ASR, or
//! cross-encoder implementation — callers inject an implementation that
//! wraps whatever inference engine they run.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;

/// Dense embedding function over text. Pure function of its inputs and
/// the configured model identity; changing the model requires a rebuild
/// of any store built against the old one.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identity, used as part of the store's effective schema.
    fn model_id(&self) -> &str;

    /// Embedding dimensionality.
    fn dimension(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// The local generation engine's tokenizer and completion surface.
#[async_trait]
pub trait CompletionEngine: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>>;

    fn decode(&self, tokens: &[u32]) -> Result<String>;

    fn context_size(&self) -> usize;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Speech-to-text capability. `params` is opaque to the core; a caller
/// wrapping a VAD-aware backend can pass windowing hints through it.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        path: &std::path::Path,
        params: &TranscribeParams,
    ) -> Result<String>;
}

/// Opaque parameters threaded through to the transcription backend.
#[derive(Debug, Clone, Default)]
pub struct TranscribeParams {
    pub language_hint: Option<String>,
    pub extra: HashMap<String, String>,
}

/// Cross-encoder reranking capability: score `(query, candidate)` pairs.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    fn model_id(&self) -> &str;

    async fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>>;
}

/// One capability with three hooks, replacing an abstract base class with
/// mixed validation/preprocess/execute/postprocess methods. Default
/// `validate` checks `required_inputs()` are all present; default
/// `postprocess` is identity.
#[async_trait]
pub trait Task: Send + Sync {
    fn task_id(&self) -> &str;

    /// Keys that must be present in `inputs` for `execute` to run.
    fn required_inputs(&self) -> &[&str] {
        &[]
    }

    fn validate(&self, inputs: &HashMap<String, String>) -> Result<()> {
        for key in self.required_inputs() {
            if !inputs.contains_key(*key) {
                return Err(crate::error::RetrievalErr::InvalidPath {
                    path: Default::default(),
                    cause: format!("missing required input '{key}' for task '{}'", self.task_id()),
                });
            }
        }
        Ok(())
    }

    async fn execute(&self, inputs: &HashMap<String, String>) -> Result<String>;

    async fn postprocess(&self, output: String) -> Result<String> {
        Ok(output)
    }
}

/// A task constructor, registered under its task id.
pub type TaskFactory = std::sync::Arc<dyn Fn() -> std::sync::Arc<dyn Task> + Send + Sync>;

/// Explicit registry mapping a task identifier to a constructor, replacing
/// dynamic plugin discovery (directory traversal + module import) with a
/// table populated at startup.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    factories: HashMap<String, TaskFactory>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_id: impl Into<String>, factory: TaskFactory) {
        self.factories.insert(task_id.into(), factory);
    }

    pub fn create(&self, task_id: &str) -> Result<std::sync::Arc<dyn Task>> {
        self.factories
            .get(task_id)
            .map(|f| f())
            .ok_or_else(|| crate::error::RetrievalErr::UnknownTask(task_id.to_string()))
    }

    pub fn registered_ids(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTask;

    #[async_trait]
    impl Task for EchoTask {
        fn task_id(&self) -> &str {
            "echo"
        }

        fn required_inputs(&self) -> &[&str] {
            &["text"]
        }

        async fn execute(&self, inputs: &HashMap<String, String>) -> Result<String> {
            Ok(inputs.get("text").cloned().unwrap_or_default())
        }
    }

    #[test]
    fn validate_rejects_missing_input() {
        let task = EchoTask;
        let inputs = HashMap::new();
        assert!(task.validate(&inputs).is_err());
    }

    #[test]
    fn validate_accepts_present_input() {
        let task = EchoTask;
        let mut inputs = HashMap::new();
        inputs.insert("text".to_string(), "hi".to_string());
        assert!(task.validate(&inputs).is_ok());
    }

    #[test]
    fn registry_creates_registered_task() {
        let mut registry = TaskRegistry::new();
        registry.register("echo", std::sync::Arc::new(|| std::sync::Arc::new(EchoTask)));
        let task = registry.create("echo").unwrap();
        assert_eq!(task.task_id(), "echo");
    }

    #[test]
    fn registry_errors_on_unknown_id() {
        let registry = TaskRegistry::new();
        assert!(registry.create("missing").is_err());
    }
}
