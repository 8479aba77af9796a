// ── xmemory Atoms: Hierarchical Memory Types ───────────────────────────────
//
// Type definitions for the four-level memory hierarchy:
//   L3: Themes, L2: Semantics, L1: Episodes, L0: Messages
//
// These are pure data types (no logic beyond constructors, no I/O).
// Follows the project pattern: structs in atoms/, impls in engine/.
// Persisted and externally exchanged types use camelCase keys so documents
// written by older tooling keep loading.

use crate::atoms::constants::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Free-form metadata attached to hierarchy nodes.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 1: Levels & Attribution
// ═══════════════════════════════════════════════════════════════════════════

/// Level of a memory in the hierarchy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryLevel {
    /// Raw message. Referenced but not persisted by the engine.
    L0,
    /// Episode: a bounded unit of interaction.
    L1,
    /// Semantic: a single distilled fact.
    L2,
    /// Theme: a cluster of related semantics.
    L3,
}

impl MemoryLevel {
    /// All levels, finest first.
    pub const ALL: [MemoryLevel; 4] =
        [MemoryLevel::L0, MemoryLevel::L1, MemoryLevel::L2, MemoryLevel::L3];

    /// Id prefix that makes node ids globally distinguishable across levels.
    pub fn prefix(self) -> &'static str {
        match self {
            MemoryLevel::L0 => MESSAGE_PREFIX,
            MemoryLevel::L1 => EPISODE_PREFIX,
            MemoryLevel::L2 => SEMANTIC_PREFIX,
            MemoryLevel::L3 => THEME_PREFIX,
        }
    }
}

impl std::fmt::Display for MemoryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryLevel::L0 => write!(f, "L0"),
            MemoryLevel::L1 => write!(f, "L1"),
            MemoryLevel::L2 => write!(f, "L2"),
            MemoryLevel::L3 => write!(f, "L3"),
        }
    }
}

impl std::str::FromStr for MemoryLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L0" | "message" => Ok(MemoryLevel::L0),
            "L1" | "episode" => Ok(MemoryLevel::L1),
            "L2" | "semantic" => Ok(MemoryLevel::L2),
            "L3" | "theme" => Ok(MemoryLevel::L3),
            _ => Err(format!("Unknown memory level: {}", s)),
        }
    }
}

/// Visibility of a memory in a multi-agent team.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// Shared with the whole team.
    Team,
    /// Private to the owning agent.
    Agent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Agent,
    User,
}

/// Who created a memory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActorAttribution {
    /// Agent id or `user:{username}`.
    pub actor_id: String,
    pub actor_type: ActorType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 2: Memories (L1, L2) and Themes (L3)
// ═══════════════════════════════════════════════════════════════════════════

/// A semantic memory (L2): a single stored fact with its embedding.
/// Owned by the semantic store; the engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticMemory {
    pub memory_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    /// Back-reference to the theme this memory was filed under, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_id: Option<String>,
    /// L1 episodes this memory was distilled from.
    #[serde(default)]
    pub source_episodes: Vec<String>,
    /// Importance score (0.0–1.0).
    pub importance: f32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_accessed_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<MemoryScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorAttribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    /// Project/team run id used for partitioning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl SemanticMemory {
    /// Create a memory with neutral importance and no attribution.
    pub fn new(memory_id: impl Into<String>, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        let now = chrono::Utc::now();
        Self {
            memory_id: memory_id.into(),
            content: content.into(),
            embedding,
            theme_id: None,
            source_episodes: Vec::new(),
            importance: 0.5,
            created_at: now,
            last_accessed_at: now,
            scope: None,
            agent_id: None,
            actor: None,
            categories: None,
            run_id: None,
        }
    }
}

/// An episode memory (L1): one bounded segment of interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeMemory {
    pub episode_id: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// L0 message references. Messages themselves are not persisted.
    #[serde(default)]
    pub message_ids: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorAttribution>,
}

/// A theme (L3): a cluster of semantic memories around a centroid.
///
/// The centroid is never written to the theme index; it lives in the
/// separate embeddings document and is filled in lazily.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeNode {
    pub theme_id: String,
    pub summary: String,
    /// Mean embedding of the members. Empty until the centroid cache is loaded.
    #[serde(skip)]
    pub centroid: Vec<f32>,
    /// Member L2 ids, in attach order.
    pub semantic_ids: Vec<String>,
    /// Up to K nearest other themes, most similar first.
    #[serde(default)]
    pub neighbors: Vec<String>,
    /// Always equal to `semantic_ids.len()`.
    pub member_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<MemoryScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// A theme returned from ranking, with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ThemeMatch {
    pub theme: ThemeNode,
    pub score: f64,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 3: Theme Persistence Documents
// ═══════════════════════════════════════════════════════════════════════════

/// `themes/index.yaml`: theme metadata without centroids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeIndexData {
    pub version: String,
    pub themes: Vec<ThemeNode>,
    pub metadata: ThemeIndexMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeIndexMetadata {
    pub total_themes: usize,
    pub last_assimilation: Option<chrono::DateTime<chrono::Utc>>,
}

/// `themes/embeddings.json`: theme id → centroid.
pub type ThemeEmbeddingsData = BTreeMap<String, Vec<f32>>;

/// Summary of one `assimilate` batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssimilationReport {
    /// Memories attached to an existing theme.
    pub attached: usize,
    /// Singleton themes created for unmatched memories.
    pub created: usize,
    /// Themes that were split, and the number of themes the splits added.
    pub split: usize,
    pub split_added: usize,
    /// Themes folded into another theme.
    pub merged: usize,
    /// Theme count after the batch.
    pub total_themes: usize,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 4: Hierarchy Graph
// ═══════════════════════════════════════════════════════════════════════════

/// Kind of a hierarchy edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Child → parent containment (episode → semantic → theme).
    Parent,
    Sibling,
    Temporal,
    Knn,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::Parent => write!(f, "parent"),
            EdgeKind::Sibling => write!(f, "sibling"),
            EdgeKind::Temporal => write!(f, "temporal"),
            EdgeKind::Knn => write!(f, "knn"),
        }
    }
}

impl std::str::FromStr for EdgeKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parent" => Ok(EdgeKind::Parent),
            "sibling" => Ok(EdgeKind::Sibling),
            "temporal" => Ok(EdgeKind::Temporal),
            "knn" => Ok(EdgeKind::Knn),
            _ => Err(format!("Unknown edge kind: {}", s)),
        }
    }
}

/// A node in the hierarchy graph. `id` is `level.prefix() + raw_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub id: String,
    pub level: MemoryLevel,
    pub raw_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A directed, typed edge between two hierarchy nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub kind: EdgeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// `hierarchy-graph.json`: the complete node and edge set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyGraphData {
    pub nodes: Vec<HierarchyNode>,
    pub edges: Vec<HierarchyEdge>,
    pub version: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Node and edge counts for a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub by_level: BTreeMap<MemoryLevel, usize>,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 5: Search Types
// ═══════════════════════════════════════════════════════════════════════════

/// Options for one adaptive search call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdaptiveSearchOptions {
    pub top_k_themes: usize,
    pub top_k_semantics: usize,
    /// Upper bound on the summed token estimate of all returned results.
    pub max_token_budget: usize,
    pub expand_to_semantics: bool,
    pub expand_to_episodes: bool,
}

impl Default for AdaptiveSearchOptions {
    fn default() -> Self {
        Self {
            top_k_themes: DEFAULT_TOP_K_THEMES,
            top_k_semantics: DEFAULT_TOP_K_SEMANTICS,
            max_token_budget: DEFAULT_MAX_TOKEN_BUDGET,
            expand_to_semantics: true,
            expand_to_episodes: false,
        }
    }
}

/// A single retrieval result at some level of the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub level: MemoryLevel,
    pub id: String,
    pub content: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SearchResultMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<MemoryScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorAttribution>,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 6: Configuration
// ═══════════════════════════════════════════════════════════════════════════

/// Theme clustering knobs. Every value has a documented default in
/// `atoms::constants`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThemeConfig {
    /// Similarity needed to attach a memory to an existing theme.
    pub attach_threshold: f64,
    /// Members allowed before a theme is split.
    pub max_theme_size: usize,
    /// Similarity needed to merge two themes.
    pub merge_threshold: f64,
    /// Nearest neighbors kept per theme.
    pub knn_k: usize,
    /// Top-theme score that keeps adaptive search at theme level.
    pub expand_threshold: f64,
    /// Edge threshold for member clustering during split.
    pub cluster_threshold: f64,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            attach_threshold: DEFAULT_ATTACH_THRESHOLD,
            max_theme_size: DEFAULT_MAX_THEME_SIZE,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            knn_k: DEFAULT_KNN_K,
            expand_threshold: DEFAULT_EXPAND_THRESHOLD,
            cluster_threshold: DEFAULT_CLUSTER_THRESHOLD,
        }
    }
}

/// What a load does when a persisted document exists but cannot be parsed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Log a warning and continue with an empty structure.
    #[default]
    ResetOnCorrupt,
    /// Return the parse error to the caller.
    Propagate,
}

/// Top-level engine configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct XMemoryConfig {
    /// Directory holding `themes/` and `hierarchy-graph.json`.
    pub storage_root: PathBuf,
    pub load_policy: LoadPolicy,
    pub themes: ThemeConfig,
    pub search: AdaptiveSearchOptions,
}

impl Default for XMemoryConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(".xmemory"),
            load_policy: LoadPolicy::default(),
            themes: ThemeConfig::default(),
            search: AdaptiveSearchOptions::default(),
        }
    }
}

impl XMemoryConfig {
    /// Parse a TOML document. Missing keys fall back to defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
