// ── xmemory: Hierarchical Memory Module ─────────────────────────────────────
//
// Four-level memory hierarchy queried top-down under a token budget:
//   L3 Theme → L2 Semantic → L1 Episode → L0 Message
//
// Sub-modules:
//   - vector: cosine similarity, centroids, running means
//   - tokenizer: chars-per-token estimate used for every budget decision
//   - storage: whole-file backends (native, in-memory) + JSON/YAML helpers
//   - theme_manager: online clustering of L2 memories into L3 themes
//   - hierarchy_graph: node/edge index across all levels
//   - adaptive_search: budgeted theme → semantic → episode retrieval
//   - semantic_store: in-memory reference SemanticStore
//   - bridge: MemoryHierarchy facade (record, ingest, recall)
//   - config: TOML loading and validation for XMemoryConfig

pub mod adaptive_search;
pub mod bridge;
pub mod config;
pub mod hierarchy_graph;
pub mod semantic_store;
pub mod storage;
pub mod theme_manager;
pub mod tokenizer;
pub mod vector;

pub use adaptive_search::AdaptiveSearch;
pub use bridge::MemoryHierarchy;
pub use hierarchy_graph::{make_node_id, parse_node_id, HierarchicalMemoryGraph};
pub use semantic_store::InMemorySemanticStore;
pub use storage::{MemoryFs, NativeFs};
pub use theme_manager::{CentroidState, ThemeManager};
pub use tokenizer::{estimate_tokens, Tokenizer};
pub use vector::{compute_centroid, cosine_sim};
