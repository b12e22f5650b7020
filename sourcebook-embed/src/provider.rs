//! Embedding provider implementations.
//!
//! [`FastEmbedProvider`] runs a local ONNX sentence-transformer via fastembed
//! and produces L2-normalized half-precision vectors. Loaded models are cached
//! process-wide, keyed by a hash of the full configuration, so multiple
//! providers with the same configuration share one model instance.
//!
//! [`CachedProvider`] wraps any provider with a bounded content-addressed
//! embedding cache: texts already embedded are never sent to the model again,
//! and repeated texts within a single batch are embedded once.
//!
//! Normalization happens exactly once, in f32, before the conversion to f16.
//! Downstream similarity search relies on every stored and query vector being
//! unit-length so that inner product equals cosine similarity.

use crate::cache::{ContentHash, EmbeddingCache, content_hash};
use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use fnv::FnvHasher;
use futures::StreamExt;
use half::f16;
use std::collections::{HashMap, HashSet};
use std::hash::Hasher;
use std::sync::{Arc, Mutex, OnceLock};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result from a vector of f16 embeddings.
    ///
    /// The dimension is inferred from the first embedding vector; an empty
    /// result has dimension 0.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Type alias for cached model entries (model, dimension)
type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

/// Global cache for initialized embedding models to avoid reloading
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

/// Get the global model cache
fn get_model_cache() -> &'static Mutex<HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Map a configured model name onto a built-in fastembed model.
fn builtin_model(name: &str) -> Result<EmbeddingModel> {
    match name {
        "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "all-MiniLM-L12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        other => Err(EmbedError::invalid_config(format!(
            "Unknown embedding model: {other}"
        ))),
    }
}

/// L2-normalize each vector in f32, then convert to f16. Zero vectors are
/// converted unchanged.
fn normalized_f16(embeddings: Vec<Vec<f32>>) -> Vec<Vec<f16>> {
    embeddings
        .into_iter()
        .map(|embedding| {
            let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            let scale = if norm > 0.0 { 1.0 / norm } else { 1.0 };
            embedding
                .into_iter()
                .map(|x| f16::from_f32(x * scale))
                .collect()
        })
        .collect()
}

/// FastEmbed-based embedding provider using real ONNX models
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Option<Arc<Mutex<TextEmbedding>>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Creates a new uninitialized provider. Call [`initialize`](Self::initialize)
    /// before embedding, or use [`create`](Self::create).
    pub fn new(config: EmbedConfig) -> Self {
        Self {
            config,
            model: None,
            dimension: 384, // all-MiniLM-L6-v2 dimension until the probe runs
        }
    }

    /// Loads the embedding model, reusing a process-wide cached instance when
    /// an identical configuration was loaded before.
    pub async fn initialize(&mut self) -> Result<()> {
        self.config.validate()?;
        tracing::info!(
            "Initializing FastEmbed provider for model: {}",
            self.config.model_name()
        );

        let cache_key = self.create_cache_key();
        let cached_data = {
            let cache = get_model_cache().lock().unwrap();
            cache
                .get(&cache_key)
                .map(|(model, dim)| (Arc::clone(model), *dim))
        };
        if let Some((cached_model, cached_dimension)) = cached_data {
            tracing::info!("Using cached model for: {}", self.config.model_name());
            self.model = Some(cached_model);
            self.dimension = cached_dimension;
            return Ok(());
        }

        let model_choice = builtin_model(self.config.model_name())?;

        // Load the model in a blocking task, probing the dimension with a
        // throwaway embedding.
        let model_name = self.config.model_name().to_string();
        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                tracing::info!("Loading embedding model: {model_name}");

                let init_options =
                    InitOptions::new(model_choice).with_show_download_progress(false);
                let mut model = TextEmbedding::try_new(init_options)
                    .map_err(|e| EmbedError::External { source: e })?;

                let probe = model
                    .embed(vec!["dimension probe".to_string()], None)
                    .map_err(|e| EmbedError::External { source: e })?;
                let dimension = probe.first().map(|emb| emb.len()).unwrap_or(384);

                tracing::info!("Model loaded successfully. Dimension: {dimension}");
                Ok((model, dimension))
            })
            .await??;

        let model_arc = Arc::new(Mutex::new(model));
        {
            let mut cache = get_model_cache().lock().unwrap();
            cache.insert(cache_key, (Arc::clone(&model_arc), dimension));
        }

        self.model = Some(model_arc);
        self.dimension = dimension;
        Ok(())
    }

    /// Creates and initializes a provider in one step.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut provider = Self::new(config);
        provider.initialize().await?;
        Ok(provider)
    }

    /// Create a cache key based on the model configuration
    fn create_cache_key(&self) -> String {
        // Serialize entire config to deterministic JSON
        let config_json =
            serde_json::to_string(&self.config).expect("Config should always serialize");

        // Hash with FNV for deterministic, fast hashing
        let mut hasher = FnvHasher::default();
        hasher.write(b"v1:");
        hasher.write(config_json.as_bytes());

        format!("v1:{:x}", hasher.finish())
    }

    /// Clears the global model cache.
    pub fn clear_cache() {
        let cache = get_model_cache();
        let mut cache_guard = cache.lock().unwrap();
        cache_guard.clear();
        tracing::info!("Model cache cleared");
    }

    /// Returns the number of cached models.
    pub fn cache_size() -> usize {
        let cache = get_model_cache();
        let cache_guard = cache.lock().unwrap();
        cache_guard.len()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let model = self.model.as_ref().ok_or_else(|| {
            EmbedError::invalid_config("Model not initialized. Call initialize() first.")
        })?;

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        // Each batch runs on the blocking pool under a deadline; `buffered`
        // bounds how many run at once and keeps results in input order.
        let timeout = self.config.batch_timeout();
        let batch_inputs: Vec<Vec<String>> = texts
            .chunks(self.config.batch_size)
            .map(|batch| batch.to_vec())
            .collect();
        let batch_futures = batch_inputs.into_iter().map(|batch| {
            let model = Arc::clone(model);
            async move {
                tracing::debug!("Processing batch of {} texts", batch.len());
                let task = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                    let mut model_guard = model.lock().unwrap();
                    model_guard
                        .embed(batch, None)
                        .map_err(|e| EmbedError::External { source: e })
                });
                match tokio::time::timeout(timeout, task).await {
                    Ok(join_result) => match join_result {
                        Ok(batch_result) => batch_result,
                        Err(join_err) => Err(EmbedError::from(join_err)),
                    },
                    Err(_) => Err(EmbedError::Timeout {
                        seconds: timeout.as_secs(),
                    }),
                }
            }
        });
        let batches: Vec<Result<Vec<Vec<f32>>>> = futures::stream::iter(batch_futures)
            .buffered(self.config.max_concurrent_batches)
            .collect()
            .await;

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in batches {
            all_embeddings.extend(normalized_f16(batch?));
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

/// Wraps a provider with a bounded content-addressed embedding cache.
///
/// Lookups and inserts key on the BLAKE3 hash of the text, so identical text
/// always maps to the identical stored vector. Within a single call, repeated
/// texts are embedded once and fanned back out to every position.
#[derive(Debug)]
pub struct CachedProvider<P> {
    inner: P,
    cache: EmbeddingCache,
}

impl<P: EmbeddingProvider> CachedProvider<P> {
    /// Wrap `inner` with the given cache.
    pub fn new(inner: P, cache: EmbeddingCache) -> Self {
        Self { inner, cache }
    }

    /// Number of embeddings currently cached.
    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for CachedProvider<P> {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let hashes: Vec<ContentHash> = texts.iter().map(|t| content_hash(t)).collect();
        let cached: Vec<Option<Vec<f16>>> = hashes.iter().map(|h| self.cache.get(h)).collect();

        // Deduplicated misses, in first-seen order.
        let mut seen = HashSet::new();
        let mut miss_hashes = Vec::new();
        let mut miss_texts = Vec::new();
        for (i, slot) in cached.iter().enumerate() {
            if slot.is_none() && seen.insert(hashes[i]) {
                miss_hashes.push(hashes[i]);
                miss_texts.push(texts[i].clone());
            }
        }

        let mut fresh: HashMap<ContentHash, Vec<f16>> = HashMap::new();
        if !miss_texts.is_empty() {
            tracing::debug!(
                "Embedding {} uncached of {} texts",
                miss_texts.len(),
                texts.len()
            );
            let result = self.inner.embed_texts(&miss_texts).await?;
            for (hash, embedding) in miss_hashes.into_iter().zip(result.embeddings) {
                self.cache.insert(hash, embedding.clone());
                fresh.insert(hash, embedding);
            }
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for (i, slot) in cached.into_iter().enumerate() {
            match slot.or_else(|| fresh.get(&hashes[i]).cloned()) {
                Some(embedding) => embeddings.push(embedding),
                None => {
                    return Err(EmbedError::embedding_gen(std::io::Error::other(
                        "provider returned fewer embeddings than requested",
                    )));
                }
            }
        }
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.inner.embedding_dimension()
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic provider that records how many texts reach the model.
    struct CountingProvider {
        texts_embedded: AtomicUsize,
        calls: AtomicUsize,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                texts_embedded: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }

        fn vector_for(text: &str) -> Vec<f16> {
            let hash = content_hash(text);
            let floats: Vec<f32> = hash[..8].iter().map(|b| *b as f32 - 127.5).collect();
            normalized_f16(vec![floats]).pop().unwrap()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
            let result = self.embed_texts(&[text.to_string()]).await?;
            Ok(result.embeddings.into_iter().next().unwrap())
        }

        async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(EmbeddingResult::new(
                texts.iter().map(|t| Self::vector_for(t)).collect(),
            ))
        }

        fn embedding_dimension(&self) -> usize {
            8
        }

        fn provider_name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn normalization_produces_unit_vectors() {
        let vectors = normalized_f16(vec![vec![3.0, 4.0], vec![0.0, 0.0]]);
        let norm: f32 = vectors[0].iter().map(|x| x.to_f32() * x.to_f32()).sum();
        assert!((norm.sqrt() - 1.0).abs() < 0.01);
        assert!(vectors[1].iter().all(|x| x.to_f32() == 0.0));
    }

    #[test]
    fn unknown_model_name_is_rejected() {
        assert!(matches!(
            builtin_model("no-such-model"),
            Err(EmbedError::InvalidConfig { .. })
        ));
        assert!(builtin_model("all-MiniLM-L6-v2").is_ok());
    }

    #[tokio::test]
    async fn cached_provider_skips_model_on_repeat() {
        let provider = CachedProvider::new(CountingProvider::new(), EmbeddingCache::new(16));
        let texts = vec!["alpha".to_string(), "beta".to_string()];

        let first = provider.embed_texts(&texts).await.unwrap();
        let second = provider.embed_texts(&texts).await.unwrap();

        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.embeddings, second.embeddings);
        assert_eq!(provider.cached_entries(), 2);
    }

    #[tokio::test]
    async fn repeated_texts_in_one_call_embed_once() {
        let provider = CachedProvider::new(CountingProvider::new(), EmbeddingCache::new(16));
        let texts = vec!["same".to_string(); 3];

        let result = provider.embed_texts(&texts).await.unwrap();

        assert_eq!(provider.inner.texts_embedded.load(Ordering::SeqCst), 1);
        assert_eq!(result.len(), 3);
        assert_eq!(result.embeddings[0], result.embeddings[1]);
        assert_eq!(result.embeddings[0], result.embeddings[2]);
    }

    #[tokio::test]
    async fn only_misses_reach_the_inner_provider() {
        let provider = CachedProvider::new(CountingProvider::new(), EmbeddingCache::new(16));
        provider
            .embed_texts(&["alpha".to_string()])
            .await
            .unwrap();
        provider
            .embed_texts(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();

        // Second call only embeds "beta".
        assert_eq!(provider.inner.texts_embedded.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_input_short_circuits() {
        let provider = CachedProvider::new(CountingProvider::new(), EmbeddingCache::new(16));
        let result = provider.embed_texts(&[]).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[ignore = "requires downloading the embedding model"]
    async fn real_model_produces_normalized_embeddings() {
        let provider = FastEmbedProvider::create(EmbedConfig::default())
            .await
            .unwrap();
        let result = provider
            .embed_texts(&["hello world".to_string()])
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.dimension, provider.embedding_dimension());
        let norm: f32 = result.embeddings[0]
            .iter()
            .map(|x| x.to_f32() * x.to_f32())
            .sum();
        assert!((norm.sqrt() - 1.0).abs() < 0.01);
    }
}
