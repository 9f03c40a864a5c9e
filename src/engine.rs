//! Engine assembly.
//!
//! [`Engine`] bundles the shared process-wide resources (database pool,
//! provider adapters, vector store, chunking/ingestion settings, and the
//! keyed lock maps) into one explicitly constructed value. Components
//! receive it by reference; there is no ambient global state.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::completion::{Completer, OpenAiCompleter};
use crate::config::{ChunkingConfig, Config, IngestionConfig};
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::Result;
use crate::locks::LockMap;
use crate::vector_store::{QdrantStore, VectorIndex};

pub struct Engine {
    pub(crate) pool: SqlitePool,
    pub(crate) completer: Arc<dyn Completer>,
    pub(crate) vectors: Arc<dyn VectorIndex>,
    pub(crate) chunking: ChunkingConfig,
    pub(crate) ingestion: IngestionConfig,
    pub(crate) conversation_locks: LockMap,
    pub(crate) ingest_locks: LockMap,
    embedder_factory: EmbedderFactory,
}

/// Builds an [`Embedder`] for a corpus's embedding model. Real deployments
/// construct OpenAI clients; tests inject fixed mock embedders.
type EmbedderFactory = Box<dyn Fn(&str) -> Result<Arc<dyn Embedder>> + Send + Sync>;

impl Engine {
    /// Wire up the production adapters from process configuration.
    ///
    /// Reads `OPENAI_API_KEY` once, here; the key lives inside the
    /// constructed clients for the rest of the process lifetime.
    pub fn new(config: &Config, pool: SqlitePool) -> Result<Self> {
        let provider = config.provider.clone();
        let completer: Arc<dyn Completer> = Arc::new(OpenAiCompleter::new(&provider)?);
        let vectors: Arc<dyn VectorIndex> = Arc::new(QdrantStore::new(&config.vector_store)?);

        let factory_provider = provider.clone();
        let embedder_factory: EmbedderFactory = Box::new(move |model| {
            Ok(Arc::new(OpenAiEmbedder::new(&factory_provider, model)?) as Arc<dyn Embedder>)
        });

        Ok(Self {
            pool,
            completer,
            vectors,
            chunking: config.chunking.clone(),
            ingestion: config.ingestion.clone(),
            conversation_locks: LockMap::new(),
            ingest_locks: LockMap::new(),
            embedder_factory,
        })
    }

    /// Assemble an engine from pre-built components. Used by tests to plug
    /// in mock providers and an in-memory vector index.
    pub fn with_components(
        pool: SqlitePool,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
        vectors: Arc<dyn VectorIndex>,
        chunking: ChunkingConfig,
        ingestion: IngestionConfig,
    ) -> Self {
        let embedder_factory: EmbedderFactory = Box::new(move |_| Ok(embedder.clone()));
        Self {
            pool,
            completer,
            vectors,
            chunking,
            ingestion,
            conversation_locks: LockMap::new(),
            ingest_locks: LockMap::new(),
            embedder_factory,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn vectors(&self) -> &Arc<dyn VectorIndex> {
        &self.vectors
    }

    /// Embedder for the given corpus embedding model.
    pub(crate) fn embedder_for(&self, model: &str) -> Result<Arc<dyn Embedder>> {
        (self.embedder_factory)(model)
    }
}
