// ── xmemory Atoms: Collaborator Traits ─────────────────────────────────────
// The seams between the engine and the outside world. The engine never
// constructs a concrete embedding provider or durable store itself; callers
// hand them in.

use crate::atoms::error::MemoryResult;
use crate::atoms::xmemory_types::SemanticMemory;
use async_trait::async_trait;
use std::path::Path;

/// Turns text into a fixed-length vector.
///
/// Dimensionality must match across every memory one manager handles.
/// Nothing validates this; mismatched vectors simply score 0.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>>;

    /// Name used in log lines and error messages.
    fn model_name(&self) -> &str;
}

/// Durable backing store for L2 memories. Read-only from the engine's side.
#[async_trait]
pub trait SemanticStore: Send + Sync {
    /// Up to `top_k` memories near `query_embedding`, in the store's own order.
    async fn search(&self, query_embedding: &[f32], top_k: usize)
        -> MemoryResult<Vec<SemanticMemory>>;

    async fn get_by_id(&self, memory_id: &str) -> MemoryResult<Option<SemanticMemory>>;

    /// Memories for the ids that still exist. Unknown ids are dropped.
    async fn get_by_ids(&self, memory_ids: &[String]) -> MemoryResult<Vec<SemanticMemory>>;
}

/// Whole-file storage used for every persisted document.
///
/// Paths are relative to the backend's root. Writes replace the file.
pub trait StorageBackend: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> MemoryResult<String>;

    fn write(&self, path: &Path, contents: &str) -> MemoryResult<()>;

    fn create_dir_all(&self, path: &Path) -> MemoryResult<()>;
}
