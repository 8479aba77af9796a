// ── xmemory Atoms: Constants ───────────────────────────────────────────────
// All named constants for the crate live here.
// Every tunable default below is mirrored by a field in `ThemeConfig` or
// `AdaptiveSearchOptions`; changing one here changes the documented default.

// ── Theme clustering defaults ──────────────────────────────────────────────
/// Minimum cosine similarity for a new memory to join an existing theme.
pub const DEFAULT_ATTACH_THRESHOLD: f64 = 0.62;
/// A theme with more members than this is split.
pub const DEFAULT_MAX_THEME_SIZE: usize = 12;
/// Minimum centroid similarity for two themes to merge.
pub const DEFAULT_MERGE_THRESHOLD: f64 = 0.78;
/// Number of nearest neighbor themes kept per theme.
pub const DEFAULT_KNN_K: usize = 10;
/// Top-theme score at which search stays at theme granularity.
pub const DEFAULT_EXPAND_THRESHOLD: f64 = 0.75;
/// Edge threshold for the member similarity graph used when splitting.
pub const DEFAULT_CLUSTER_THRESHOLD: f64 = 0.66;

/// New themes take their summary from this many leading characters of the
/// first member's content.
pub const THEME_SUMMARY_MAX_CHARS: usize = 100;

// ── Adaptive search defaults ───────────────────────────────────────────────
pub const DEFAULT_TOP_K_THEMES: usize = 3;
pub const DEFAULT_TOP_K_SEMANTICS: usize = 10;
pub const DEFAULT_MAX_TOKEN_BUDGET: usize = 4000;

/// Episodes inherit their parent semantic's score times this factor.
pub const EPISODE_SCORE_DISCOUNT: f64 = 0.9;

/// Characters per estimated token used for budget accounting.
pub const AVG_CHARS_PER_TOKEN: usize = 4;

// ── Persisted layout ───────────────────────────────────────────────────────
// File names are stable identifiers: renaming any of them orphans existing
// storage roots.
pub const THEMES_DIR: &str = "themes";
pub const THEME_INDEX_FILE: &str = "index.yaml";
pub const THEME_EMBEDDINGS_FILE: &str = "embeddings.json";
pub const HIERARCHY_GRAPH_FILE: &str = "hierarchy-graph.json";

/// Version tag written into every persisted document.
pub const DOCUMENT_VERSION: &str = "1.0";

// ── Hierarchy node id prefixes ─────────────────────────────────────────────
pub const MESSAGE_PREFIX: &str = "M_";
pub const EPISODE_PREFIX: &str = "E_";
pub const SEMANTIC_PREFIX: &str = "S_";
pub const THEME_PREFIX: &str = "T_";

/// Metadata key under which an episode node keeps its title.
pub const EPISODE_TITLE_KEY: &str = "title";
/// Metadata key under which an episode node keeps its agent id.
pub const EPISODE_AGENT_KEY: &str = "agentId";
