//! # sourcebook-retriever
//!
//! Federated document retrieval over per-source vector indexes.
//!
//! Each ingested document becomes its own searchable index addressed by a
//! generated `file_id`. Queries name the sources they want answers from; the
//! retriever searches those indexes concurrently and blends semantic
//! similarity with lexical overlap into one ranked result list.
//!
//! ## Pipeline
//!
//! 1. [`lifecycle::LifecycleManager`] chunks a document (via
//!    `sourcebook-context`), embeds the chunks (via `sourcebook-embed`) and
//!    atomically persists the index.
//! 2. [`store::IndexStore`] holds one index per source, in SQLite or in
//!    memory, and answers single-source inner-product searches.
//! 3. [`retriever::Retriever`] fans a query out across sources and ranks the
//!    combined hits with [`scoring`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use sourcebook_retriever::config::RetrievalConfig;
//! use sourcebook_retriever::lifecycle::LifecycleManager;
//! use sourcebook_retriever::retriever::Retriever;
//! use sourcebook_retriever::store::open_store;
//! use sourcebook_embed::{EmbedConfig, FastEmbedProvider};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RetrievalConfig::default();
//! let store = open_store(&config.backend).await?;
//! let provider = Arc::new(FastEmbedProvider::create(EmbedConfig::default()).await?);
//!
//! let lifecycle = LifecycleManager::new(provider.clone(), store.clone(), &config)?;
//! let file_id = lifecycle.ingest_source("the document text").await?;
//!
//! let retriever = Retriever::new(provider, store, config);
//! let results = retriever.search_across("a question", &[file_id], 5).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod retriever;
pub mod scoring;
pub mod store;

pub use config::RetrievalConfig;
pub use error::{Result, RetrievalError};
pub use lifecycle::{IngestTicket, LifecycleManager};
pub use retriever::{Retriever, SearchResult};
pub use store::{ChunkHit, IndexStatus, IndexStore, StorageError, StoreBackend, open_store};
