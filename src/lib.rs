//! xmemory: a hierarchical, persistent memory-retrieval engine for
//! long-running agents.
//!
//! Semantic memories (L2) are clustered online into themes (L3) and indexed
//! together with episodes (L1) and message references (L0) in an explicit
//! graph. Queries walk the hierarchy top-down under a token budget, answering
//! at theme level when one theme matches confidently and expanding to
//! semantics (and optionally episodes) when it does not.
//!
//! Layout follows the atoms/engine split: `atoms` holds pure types,
//! constants, the error enum and collaborator traits; `engine::xmemory`
//! holds everything that does work.

pub mod atoms;
pub mod engine;

pub use atoms::error::{MemoryError, MemoryResult};
pub use atoms::traits::{EmbeddingProvider, SemanticStore, StorageBackend};
pub use atoms::xmemory_types::*;
pub use engine::xmemory::{
    AdaptiveSearch, HierarchicalMemoryGraph, InMemorySemanticStore, MemoryFs, MemoryHierarchy,
    NativeFs, ThemeManager,
};
