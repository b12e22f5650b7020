//! # sourcebook-embed
//!
//! Text embedding generation for the sourcebook retrieval pipeline, built on
//! local ONNX models via FastEmbed. Designed for async operation with a small
//! provider trait so retrieval code never depends on a concrete model runtime.
//!
//! ## Features
//!
//! - **Local ONNX Models**: Run embedding models locally without external API calls
//! - **Async-First Design**: Full async/await support with tokio integration
//! - **Model Caching**: Loaded models are shared process-wide per configuration
//! - **Embedding Caching**: Bounded content-addressed cache keyed by text hash
//! - **Half-Precision**: Memory-efficient f16 embeddings, L2-normalized at generation
//!
//! ## Quick Start
//!
//! ```no_run
//! use sourcebook_embed::{CachedProvider, EmbedConfig, EmbeddingCache, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = EmbedConfig::default();
//! let cache = EmbeddingCache::new(config.cache_capacity);
//! let provider = CachedProvider::new(FastEmbedProvider::create(config).await?, cache);
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//! println!("Generated {} embeddings of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: Provider configuration with validated knobs
//! - [`provider`]: The [`EmbeddingProvider`] trait and its implementations
//! - [`cache`]: Bounded FIFO cache for finished embeddings
//! - [`error`]: Error types and result handling
//!
//! Every vector leaving this crate is L2-normalized in f32 before conversion
//! to f16, so inner product on stored vectors equals cosine similarity.

pub mod cache;
pub mod config;
pub mod error;
pub mod provider;

// Re-export main types for easy access
pub use cache::{ContentHash, EmbeddingCache, content_hash};
pub use config::EmbedConfig;
pub use error::{EmbedError, Result};
pub use provider::{CachedProvider, EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
