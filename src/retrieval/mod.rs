//! Query-time retrieval: embed, optionally expand via HyDE, search the
//! vector store, and optionally rerank with a cross-encoder (§4.9).

use std::sync::Arc;

use crate::config::RetrievalEngineConfig;
use crate::embeddings::HydeCache;
use crate::error::Result;
use crate::error::RetrievalErr;
use crate::storage::VectorStore;
use crate::traits::CompletionEngine;
use crate::traits::CrossEncoder;
use crate::traits::Embedder;
use crate::types::RetrievalQuery;
use crate::types::RetrievalResult;
use crate::types::StoreMatch;

const HYDE_PROMPT_PREFIX: &str =
    "Write a short passage that would answer the following question:\n\n";

/// Answers a `RetrievalQuery` against a `VectorStore`.
///
/// The simple path embeds the query text directly. The advanced path
/// (enabled by `rag_use_hyde`/`rag_use_reranking` in the supplied config)
/// expands the query into a hypothetical answer before embedding it, and
/// reranks the initial candidate set against the *original* query text
/// with a cross-encoder. Both expansions degrade gracefully to the simple
/// path when their collaborator is absent or fails.
pub struct RetrievalEngine {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalEngineConfig,
    completion_engine: Option<Arc<dyn CompletionEngine>>,
    cross_encoder: Option<Arc<dyn CrossEncoder>>,
    hyde_cache: Option<HydeCache>,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalEngineConfig,
    ) -> Self {
        let hyde_cache = config
            .rag_use_hyde
            .then(|| HydeCache::new(config.hyde_cache_size));
        Self {
            store,
            embedder,
            config,
            completion_engine: None,
            cross_encoder: None,
            hyde_cache,
        }
    }

    /// Enable HyDE query expansion. Without this, `rag_use_hyde` is a
    /// no-op and the engine falls back to embedding the raw query text.
    pub fn with_completion_engine(mut self, engine: Arc<dyn CompletionEngine>) -> Self {
        self.completion_engine = Some(engine);
        self
    }

    /// Enable cross-encoder reranking. Without this, `rag_use_reranking`
    /// is a no-op.
    pub fn with_cross_encoder(mut self, cross_encoder: Arc<dyn CrossEncoder>) -> Self {
        self.cross_encoder = Some(cross_encoder);
        self
    }

    pub fn has_hyde(&self) -> bool {
        self.config.rag_use_hyde && self.completion_engine.is_some()
    }

    pub fn has_reranking(&self) -> bool {
        self.config.rag_use_reranking && self.cross_encoder.is_some()
    }

    /// Run retrieval and return chunk texts ranked highest-relevance first.
    pub async fn retrieve(&self, query: &RetrievalQuery) -> Result<RetrievalResult> {
        if query.is_empty() {
            return Err(RetrievalErr::EmptyQuery);
        }

        let search_text = self.expand_query(&query.text).await;

        // Simple path (no HyDE, no reranking): query for `rag_n_result` and
        // return that many texts as-is. Advanced path: an initial candidate
        // set (20 when reranking, else `rag_n_result_final`) is narrowed to
        // `rag_n_result_final` after the optional rerank (§4.9).
        let simple_path = !self.has_hyde() && !self.has_reranking();
        let (n_initial, n_final) = if simple_path {
            let n = self.config.rag_n_result.max(1) as usize;
            (n, n)
        } else {
            let n_final = self.config.rag_n_result_final.max(1) as usize;
            let n_initial = if self.has_reranking() {
                n_final.max(20)
            } else {
                n_final
            };
            (n_initial, n_final)
        };

        let embedding = self.embedder.embed(&[search_text]).await?;
        let embedding = embedding.into_iter().next().unwrap_or_default();

        let matches = self
            .store
            .query(&embedding, n_initial, query.filter.as_ref())
            .await?;

        let ranked = if self.has_reranking() {
            self.rerank(&query.text, matches).await?
        } else {
            matches
        };

        Ok(ranked
            .into_iter()
            .take(n_final)
            .map(|m| m.text)
            .collect())
    }

    /// Expand `text` into a hypothetical-document query via the configured
    /// `CompletionEngine`, memoized through the HyDE cache. Falls back to
    /// the original text when HyDE is disabled, unconfigured, or fails.
    async fn expand_query(&self, text: &str) -> String {
        if !self.has_hyde() {
            return text.to_string();
        }
        let Some(cache) = &self.hyde_cache else {
            return text.to_string();
        };
        if let Some(cached) = cache.get(text) {
            return cached;
        }
        let engine = self.completion_engine.as_ref().unwrap();
        let prompt = format!("{HYDE_PROMPT_PREFIX}{text}");
        match engine.complete(&prompt).await {
            Ok(hypothetical) if !hypothetical.trim().is_empty() => {
                cache.put(text, hypothetical.clone());
                hypothetical
            }
            Ok(_) => text.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "HyDE expansion failed, falling back to raw query");
                text.to_string()
            }
        }
    }

    /// Score `matches` against the original query text and sort by
    /// descending relevance. Falls back to the store's own ranking if the
    /// cross-encoder errors.
    async fn rerank(&self, query_text: &str, matches: Vec<StoreMatch>) -> Result<Vec<StoreMatch>> {
        let cross_encoder = self.cross_encoder.as_ref().unwrap();
        let pairs: Vec<(String, String)> = matches
            .iter()
            .map(|m| (query_text.to_string(), m.text.clone()))
            .collect();

        match cross_encoder.score(&pairs).await {
            Ok(scores) if scores.len() == matches.len() => {
                let mut scored: Vec<(f32, StoreMatch)> =
                    scores.into_iter().zip(matches).collect();
                scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
                Ok(scored.into_iter().map(|(_, m)| m).collect())
            }
            Ok(_) => {
                tracing::warn!("cross-encoder returned a mismatched score count, skipping rerank");
                Ok(matches)
            }
            Err(e) => {
                tracing::warn!(error = %e, "cross-encoder rerank failed, keeping store ranking");
                Ok(matches)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;
    use crate::types::MetadataFilter;
    use async_trait::async_trait;

    struct EchoEmbedder;

    #[async_trait]
    impl Embedder for EchoEmbedder {
        fn model_id(&self) -> &str {
            "echo"
        }
        fn dimension(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    struct FixedStore {
        matches: Vec<StoreMatch>,
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn add_chunks(
            &self,
            _ids: Vec<String>,
            _texts: Vec<String>,
            _embeddings: Vec<Vec<f32>>,
            _metadatas: Vec<Metadata>,
        ) -> Result<()> {
            Ok(())
        }
        async fn query(
            &self,
            _embedding: &[f32],
            n: usize,
            _filter: Option<&MetadataFilter>,
        ) -> Result<Vec<StoreMatch>> {
            Ok(self.matches.iter().take(n).cloned().collect())
        }
        async fn delete_by_ids(&self, _ids: &[String]) -> Result<()> {
            Ok(())
        }
        async fn delete_by_metadata(&self, _filter: &MetadataFilter) -> Result<()> {
            Ok(())
        }
        async fn count(&self) -> Result<usize> {
            Ok(self.matches.len())
        }
    }

    struct StubCompletionEngine {
        reply: String,
    }

    #[async_trait]
    impl CompletionEngine for StubCompletionEngine {
        fn tokenize(&self, _text: &str) -> Result<Vec<u32>> {
            Ok(Vec::new())
        }
        fn decode(&self, _tokens: &[u32]) -> Result<String> {
            Ok(String::new())
        }
        fn context_size(&self) -> usize {
            2048
        }
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.reply.clone())
        }
    }

    struct ReverseCrossEncoder;

    #[async_trait]
    impl CrossEncoder for ReverseCrossEncoder {
        fn model_id(&self) -> &str {
            "reverse"
        }
        async fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
            Ok((0..pairs.len()).rev().map(|i| i as f32).collect())
        }
    }

    fn store_match(id: &str, text: &str) -> StoreMatch {
        StoreMatch {
            id: id.to_string(),
            text: text.to_string(),
            metadata: Metadata::new(),
            distance: 0.0,
        }
    }

    fn engine_with(matches: Vec<StoreMatch>, config: RetrievalEngineConfig) -> RetrievalEngine {
        let store = Arc::new(FixedStore { matches });
        RetrievalEngine::new(store, Arc::new(EchoEmbedder), config)
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let engine = engine_with(Vec::new(), RetrievalEngineConfig::default());
        let result = engine.retrieve(&RetrievalQuery::new("   ")).await;
        assert!(matches!(result, Err(RetrievalErr::EmptyQuery)));
    }

    #[tokio::test]
    async fn simple_path_returns_store_texts_in_order() {
        let matches = vec![store_match("a", "alpha"), store_match("b", "beta")];
        let mut config = RetrievalEngineConfig::default();
        config.rag_use_hyde = false;
        config.rag_n_result_final = 2;
        let engine = engine_with(matches, config);

        let result = engine.retrieve(&RetrievalQuery::new("find alpha")).await.unwrap();
        assert_eq!(result, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[tokio::test]
    async fn simple_path_uses_rag_n_result_not_rag_n_result_final() {
        let matches = vec![
            store_match("a", "alpha"),
            store_match("b", "beta"),
            store_match("c", "gamma"),
        ];
        let mut config = RetrievalEngineConfig::default();
        config.rag_use_hyde = false;
        config.rag_n_result = 3;
        config.rag_n_result_final = 1;
        let engine = engine_with(matches, config);

        let result = engine.retrieve(&RetrievalQuery::new("find alpha")).await.unwrap();
        assert_eq!(
            result,
            vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()]
        );
    }

    #[tokio::test]
    async fn hyde_without_completion_engine_falls_back_to_raw_query() {
        let matches = vec![store_match("a", "alpha")];
        let config = RetrievalEngineConfig::default();
        let engine = engine_with(matches, config);
        assert!(!engine.has_hyde());

        let result = engine.retrieve(&RetrievalQuery::new("find alpha")).await.unwrap();
        assert_eq!(result, vec!["alpha".to_string()]);
    }

    #[tokio::test]
    async fn hyde_expansion_is_cached_after_first_call() {
        let matches = vec![store_match("a", "alpha")];
        let mut config = RetrievalEngineConfig::default();
        config.rag_use_hyde = true;
        let engine = engine_with(matches, config).with_completion_engine(Arc::new(
            StubCompletionEngine {
                reply: "a hypothetical passage".to_string(),
            },
        ));
        assert!(engine.has_hyde());

        engine.retrieve(&RetrievalQuery::new("find alpha")).await.unwrap();
        assert_eq!(
            engine.hyde_cache.as_ref().unwrap().get("find alpha"),
            Some("a hypothetical passage".to_string())
        );
    }

    #[tokio::test]
    async fn reranking_reorders_by_cross_encoder_score() {
        let matches = vec![
            store_match("a", "alpha"),
            store_match("b", "beta"),
            store_match("c", "gamma"),
        ];
        let mut config = RetrievalEngineConfig::default();
        config.rag_use_hyde = false;
        config.rag_use_reranking = true;
        config.rag_n_result_final = 2;
        let engine =
            engine_with(matches, config).with_cross_encoder(Arc::new(ReverseCrossEncoder));
        assert!(engine.has_reranking());

        let result = engine.retrieve(&RetrievalQuery::new("find gamma")).await.unwrap();
        assert_eq!(result, vec!["gamma".to_string(), "beta".to_string()]);
    }

    #[tokio::test]
    async fn filter_is_forwarded_to_the_store() {
        let matches = vec![store_match("a", "alpha")];
        let mut config = RetrievalEngineConfig::default();
        config.rag_use_hyde = false;
        let engine = engine_with(matches, config);

        let mut query = RetrievalQuery::new("find alpha");
        query.filter = Some(MetadataFilter::eq("type", "pdf"));
        let result = engine.retrieve(&query).await.unwrap();
        assert_eq!(result, vec!["alpha".to_string()]);
    }
}
