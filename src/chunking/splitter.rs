//! Recursive character splitter: try the first separator, recurse to the
//! next on any piece still over budget, hard character cut as the base
//! case. Overlap is applied across adjacent final chunks (§4.2).

use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::error::Result;
use crate::error::RetrievalErr;
use crate::types::Chunk;
use crate::types::MetaValue;

/// Ordered separators tried largest-unit-first before falling back to a
/// hard character cut.
fn default_separators() -> Vec<String> {
    vec![
        "\n\n".to_string(),
        "\n".to_string(),
        ". ".to_string(),
        " ".to_string(),
    ]
}

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub chunk_size_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub separators: Vec<String>,
    pub keep_separator: bool,
    pub tiktoken_model: String,
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_tokens == 0 {
            return Err(RetrievalErr::ConfigError {
                field: "chunk_size_tokens".to_string(),
                cause: "must be positive".to_string(),
            });
        }
        if self.chunk_overlap_tokens >= self.chunk_size_tokens {
            return Err(RetrievalErr::ConfigError {
                field: "chunk_overlap_tokens".to_string(),
                cause: format!(
                    "must be < chunk_size_tokens ({}), got {}",
                    self.chunk_size_tokens, self.chunk_overlap_tokens
                ),
            });
        }
        Ok(())
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: 400,
            chunk_overlap_tokens: 50,
            separators: default_separators(),
            keep_separator: true,
            tiktoken_model: "gpt-3.5-turbo".to_string(),
        }
    }
}

impl From<&crate::config::ChunkingConfig> for ChunkerConfig {
    fn from(config: &crate::config::ChunkingConfig) -> Self {
        Self {
            chunk_size_tokens: config.rag_chunk_size.max(0) as usize,
            chunk_overlap_tokens: config.rag_chunk_overlap.max(0) as usize,
            separators: config.rag_separators.clone().unwrap_or_else(default_separators),
            keep_separator: config.rag_keep_separator,
            tiktoken_model: config.rag_model_name_for_tiktoken.clone(),
        }
    }
}

/// Splits whole-document `Chunk`s into token-bounded pieces.
///
/// Token counting uses the configured tiktoken encoding as the declared
/// fallback when no CompletionEngine tokenizer is supplied.
pub struct TextChunker {
    bpe: Arc<CoreBPE>,
    config: ChunkerConfig,
}

impl TextChunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        let bpe = tiktoken_rs::get_bpe_from_model(&config.tiktoken_model)
            .or_else(|_| tiktoken_rs::cl100k_base())
            .map_err(|e| RetrievalErr::ConfigError {
                field: "tiktoken_model".to_string(),
                cause: e.to_string(),
            })?;
        Ok(Self {
            bpe: Arc::new(bpe),
            config,
        })
    }

    fn token_len(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Budget available to a piece before the previous chunk's overlap tail
    /// is prepended to it. Reserving the overlap up front keeps every final
    /// chunk, post-overlap, within `chunk_size_tokens` (§8 invariant 3).
    /// `ChunkerConfig::validate` guarantees `chunk_overlap_tokens <
    /// chunk_size_tokens`, so this is always >= 1.
    fn effective_budget(&self) -> usize {
        self.config
            .chunk_size_tokens
            .saturating_sub(self.config.chunk_overlap_tokens)
    }

    /// Split one whole-document chunk into token-bounded chunks, inheriting
    /// and augmenting metadata with `original_source` and
    /// `chunk_index_in_doc`. Determinism: identical input and parameters
    /// always produce identical chunk boundaries.
    pub fn chunk(&self, input: &Chunk) -> Vec<Chunk> {
        let pieces = self.split_recursive(&input.content, &self.config.separators);
        let overlapped = self.apply_overlap(pieces);

        overlapped
            .into_iter()
            .enumerate()
            .map(|(index, content)| {
                let mut metadata = input.metadata.clone();
                metadata.insert(
                    "original_source".to_string(),
                    MetaValue::Str(input.source.display().to_string()),
                );
                metadata.insert(
                    "chunk_index_in_doc".to_string(),
                    MetaValue::Int(index as i64),
                );
                Chunk {
                    content,
                    source: input.source.clone(),
                    metadata,
                }
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let budget = self.effective_budget();
        if self.token_len(text) <= budget {
            return vec![text.to_string()];
        }

        let Some((sep, rest)) = separators.split_first() else {
            return self.hard_cut(text);
        };

        let pieces = self.split_by_separator(text, sep);
        let mut result = Vec::new();
        let mut current = String::new();

        for piece in pieces {
            if piece.is_empty() {
                continue;
            }
            if self.token_len(&piece) > budget {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
                result.extend(self.split_recursive(&piece, rest));
                continue;
            }

            let candidate = format!("{current}{piece}");
            if current.is_empty() || self.token_len(&candidate) <= budget {
                current = candidate;
            } else {
                result.push(std::mem::take(&mut current));
                current = piece;
            }
        }
        if !current.is_empty() {
            result.push(current);
        }
        result
    }

    fn split_by_separator(&self, text: &str, sep: &str) -> Vec<String> {
        if sep.is_empty() {
            return text.chars().map(|c| c.to_string()).collect();
        }
        let parts: Vec<&str> = text.split(sep).collect();
        let last = parts.len().saturating_sub(1);
        parts
            .into_iter()
            .enumerate()
            .map(|(i, part)| {
                if self.config.keep_separator && i < last {
                    format!("{part}{sep}")
                } else {
                    part.to_string()
                }
            })
            .collect()
    }

    /// Base case: no separator left fits. Accumulate characters up to the
    /// token budget.
    fn hard_cut(&self, text: &str) -> Vec<String> {
        let budget = self.effective_budget();
        let mut result = Vec::new();
        let mut current = String::new();
        for c in text.chars() {
            let candidate = format!("{current}{c}");
            if !current.is_empty() && self.token_len(&candidate) > budget {
                result.push(std::mem::take(&mut current));
                current.push(c);
            } else {
                current = candidate;
            }
        }
        if !current.is_empty() {
            result.push(current);
        }
        result
    }

    /// Prepend the token-level tail of the previous chunk to each
    /// subsequent chunk so consecutive chunks share ≤ `chunk_overlap_tokens`
    /// tokens.
    fn apply_overlap(&self, pieces: Vec<String>) -> Vec<String> {
        if self.config.chunk_overlap_tokens == 0 || pieces.len() < 2 {
            return pieces;
        }

        let mut result = Vec::with_capacity(pieces.len());
        let mut prev: Option<String> = None;
        for piece in pieces {
            match &prev {
                None => result.push(piece.clone()),
                Some(prev_text) => {
                    let prev_tokens = self.bpe.encode_ordinary(prev_text);
                    let tail_start =
                        prev_tokens.len().saturating_sub(self.config.chunk_overlap_tokens);
                    let tail_tokens = &prev_tokens[tail_start..];
                    let tail_text = self.bpe.decode(tail_tokens.to_vec()).unwrap_or_default();
                    result.push(format!("{tail_text}{piece}"));
                }
            }
            prev = Some(piece);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> TextChunker {
        TextChunker::new(ChunkerConfig {
            chunk_size_tokens: size,
            chunk_overlap_tokens: overlap,
            ..ChunkerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn chunker_config_from_chunking_config_carries_overrides() {
        let chunking = crate::config::ChunkingConfig {
            rag_chunk_size: 800,
            rag_chunk_overlap: 100,
            rag_separators: Some(vec!["\n".to_string()]),
            rag_keep_separator: false,
            rag_model_name_for_tiktoken: "gpt-4".to_string(),
        };
        let config = ChunkerConfig::from(&chunking);
        assert_eq!(config.chunk_size_tokens, 800);
        assert_eq!(config.chunk_overlap_tokens, 100);
        assert_eq!(config.separators, vec!["\n".to_string()]);
        assert!(!config.keep_separator);
        assert_eq!(config.tiktoken_model, "gpt-4");
    }

    #[test]
    fn config_rejects_overlap_ge_size() {
        let config = ChunkerConfig {
            chunk_size_tokens: 10,
            chunk_overlap_tokens: 10,
            ..ChunkerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn short_text_yields_one_chunk() {
        let chunker = chunker(400, 50);
        let input = Chunk::new("alpha beta gamma", "/doc.txt");
        let chunks = chunker.chunk(&input);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "alpha beta gamma");
    }

    #[test]
    fn every_chunk_respects_token_budget() {
        let chunker = chunker(5, 1);
        let text = "one two three four five six seven eight nine ten eleven twelve".repeat(3);
        let input = Chunk::new(text, "/doc.txt");
        let chunks = chunker.chunk(&input);
        for chunk in &chunks {
            assert!(chunker.token_len(&chunk.content) <= 5);
        }
        assert!(chunks.len() > 1);
    }

    #[test]
    fn chunk_index_in_doc_is_contiguous_from_zero() {
        let chunker = chunker(5, 0);
        let text = "one two three four five six seven eight nine ten";
        let input = Chunk::new(text, "/doc.txt");
        let chunks = chunker.chunk(&input);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(
                chunk.metadata.get("chunk_index_in_doc"),
                Some(&MetaValue::Int(i as i64))
            );
        }
    }

    #[test]
    fn metadata_is_inherited_and_augmented() {
        let chunker = chunker(400, 50);
        let input = Chunk::new("alpha beta", "/doc.pdf").with_meta("page", 1i64);
        let chunks = chunker.chunk(&input);
        assert_eq!(chunks[0].metadata.get("page"), Some(&MetaValue::Int(1)));
        assert!(chunks[0].metadata.contains_key("original_source"));
    }

    #[test]
    fn determinism_same_input_same_boundaries() {
        let chunker = chunker(5, 1);
        let text = "one two three four five six seven eight nine ten";
        let input = Chunk::new(text, "/doc.txt");
        let first = chunker.chunk(&input);
        let second = chunker.chunk(&input);
        let first_contents: Vec<_> = first.iter().map(|c| &c.content).collect();
        let second_contents: Vec<_> = second.iter().map(|c| &c.content).collect();
        assert_eq!(first_contents, second_contents);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = chunker(400, 50);
        let input = Chunk::new("", "/empty.txt");
        let chunks = chunker.chunk(&input);
        assert!(chunks.is_empty());
    }

    #[test]
    fn zero_overlap_does_not_duplicate_content() {
        let chunker = chunker(5, 0);
        let text = "one two three four five six seven eight";
        let input = Chunk::new(text, "/doc.txt");
        let chunks = chunker.chunk(&input);
        let rejoined: String = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join("");
        assert!(rejoined.contains("one"));
        assert!(rejoined.contains("eight"));
    }
}
