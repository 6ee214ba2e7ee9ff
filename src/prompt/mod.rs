//! Token-budgeted prompt assembly (§4.10).
//!
//! Given conversation history, a RAG context string, and a user query, the
//! assembler fits all three into the model's context window under a
//! template, trading context-window budget between history and RAG
//! context according to `context_allocation_ratio`.

use std::path::Path;

use crate::error::Result;
use crate::error::RetrievalErr;
use crate::traits::CompletionEngine;

/// Minimum remaining token budget required to include an ellipsis-truncated
/// tail of an overflowing history turn, rather than dropping it entirely.
const MIN_TRUNCATED_TAIL_TOKENS: i64 = 50;

const SENTINEL_NO_CONTEXT: &str = "No relevant documents found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One turn of conversation history.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    fn render(&self) -> String {
        let label = match self.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        format!("{label}: {}", self.content)
    }
}

/// A prompt template with `{history}`, `{context}`, and `{query}`
/// placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    raw: String,
}

impl PromptTemplate {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RetrievalErr::invalid_path(path, e.to_string()))?;
        Ok(Self::new(raw))
    }

    /// Token count of the template shell with placeholders stripped out.
    fn shell_tokens(&self, engine: &dyn CompletionEngine) -> Result<usize> {
        let shell = self
            .raw
            .replace("{history}", "")
            .replace("{context}", "")
            .replace("{query}", "");
        Ok(engine.tokenize(&shell)?.len())
    }

    fn render(&self, history: &str, context: &str, query: &str) -> String {
        self.raw
            .replace("{history}", history)
            .replace("{context}", context)
            .replace("{query}", query)
    }
}

/// Assembles a token-budgeted prompt from history, RAG context, and a
/// query, per the configured template and generation reservation.
pub struct PromptAssembler {
    template: PromptTemplate,
    completion_engine: std::sync::Arc<dyn CompletionEngine>,
    n_predict: usize,
    context_allocation_ratio: f64,
}

impl PromptAssembler {
    pub fn new(
        template: PromptTemplate,
        completion_engine: std::sync::Arc<dyn CompletionEngine>,
        n_predict: usize,
        context_allocation_ratio: f64,
    ) -> Self {
        Self {
            template,
            completion_engine,
            n_predict,
            context_allocation_ratio,
        }
    }

    pub fn assemble(
        &self,
        history: &[ConversationTurn],
        context: &str,
        query: &str,
    ) -> Result<String> {
        let engine = self.completion_engine.as_ref();
        let context_limit = engine.context_size() as i64;
        let prompt_budget = context_limit - self.n_predict as i64;

        let template_tokens = self.template.shell_tokens(engine)? as i64;
        let query_tokens = engine.tokenize(query)?.len() as i64;
        let content_budget = prompt_budget - template_tokens - query_tokens;

        if content_budget <= 0 {
            tracing::warn!(
                prompt_budget,
                template_tokens,
                query_tokens,
                "content budget exhausted by template and query, emitting bare template"
            );
            return Ok(self.template.render("", "", query));
        }

        let rag_budget = (content_budget as f64 * self.context_allocation_ratio).round() as i64;
        let history_budget = content_budget - rag_budget;

        let truncated_context = self.truncate_context(context, rag_budget.max(0))?;
        let history_text = self.build_history(history, history_budget.max(0))?;

        let final_context = if history_text.is_empty() && truncated_context.is_empty() {
            SENTINEL_NO_CONTEXT.to_string()
        } else {
            truncated_context
        };

        Ok(self.template.render(&history_text, &final_context, query))
    }

    /// Tail-truncate `context` to at most `budget` tokens by re-decoding the
    /// token prefix.
    fn truncate_context(&self, context: &str, budget: i64) -> Result<String> {
        if context.is_empty() || budget <= 0 {
            return Ok(String::new());
        }
        let engine = self.completion_engine.as_ref();
        let tokens = engine.tokenize(context)?;
        if (tokens.len() as i64) <= budget {
            return Ok(context.to_string());
        }
        let prefix = &tokens[..budget as usize];
        engine.decode(prefix)
    }

    /// Walk `history` newest-to-oldest, prepending whole turns while the
    /// running total stays within `budget`. The first turn that would
    /// overflow is either tail-truncated with an ellipsis (if enough budget
    /// remains) or dropped, and the walk stops there.
    fn build_history(&self, history: &[ConversationTurn], budget: i64) -> Result<String> {
        if budget <= 0 {
            return Ok(String::new());
        }
        let engine = self.completion_engine.as_ref();
        let mut included: Vec<String> = Vec::new();
        let mut used: i64 = 0;

        for turn in history.iter().rev() {
            let rendered = turn.render();
            let turn_tokens = engine.tokenize(&rendered)?.len() as i64;

            if used + turn_tokens <= budget {
                included.push(rendered);
                used += turn_tokens;
                continue;
            }

            let remaining = budget - used;
            if remaining > MIN_TRUNCATED_TAIL_TOKENS {
                let tokens = engine.tokenize(&rendered)?;
                let keep = remaining as usize;
                let tail = &tokens[tokens.len().saturating_sub(keep)..];
                let decoded = engine.decode(tail)?;
                included.push(format!("...{decoded}"));
            }
            break;
        }

        included.reverse();
        Ok(included.join("\n"))
    }
}
