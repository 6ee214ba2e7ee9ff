//! Embedding providers and HyDE memoization.

pub mod hyde_cache;
pub mod openai;

pub use hyde_cache::HydeCache;
pub use openai::OpenAiEmbedder;
