// ── xmemory: Theme Manager (L3) ─────────────────────────────────────────────
//
// Online clustering of semantic memories (L2) into themes (L3).
//
// assimilate() runs four phases, always in this order, then persists:
//   1. Attach  – each memory joins its most similar theme when the cosine
//                similarity clears `attach_threshold`; otherwise it seeds a
//                new singleton theme. Centroids move by running mean.
//   2. Split   – themes above `max_theme_size` are re-clustered into
//                connected components of the member similarity graph
//                (`cluster_threshold` edges); components still too large are
//                halved.
//   3. Merge   – greedy pairwise merge in theme order when centroids clear
//                `merge_threshold` and the combined size still fits. The merged
//                centroid is the plain average of the two centroids.
//   4. KNN     – every theme keeps its `knn_k` most similar other themes.
//
// Persistence:
//   themes/index.yaml       – metadata only (ids, summaries, members, neighbors)
//   themes/embeddings.json  – centroids, loaded lazily on first search/assimilate
//
// Note: the attach update is a running mean while the merge update is an
// unweighted blend of two centroids. After a merge the centroid is NOT the
// true mean of the members. This is intentional and covered by a test.

use crate::atoms::constants::{
    THEMES_DIR, THEME_EMBEDDINGS_FILE, THEME_INDEX_FILE, THEME_SUMMARY_MAX_CHARS, DOCUMENT_VERSION,
};
use crate::atoms::error::MemoryResult;
use crate::atoms::traits::StorageBackend;
use crate::atoms::xmemory_types::{
    AssimilationReport, LoadPolicy, SemanticMemory, ThemeConfig, ThemeEmbeddingsData,
    ThemeIndexData, ThemeIndexMetadata, ThemeMatch, ThemeNode,
};
use crate::engine::xmemory::storage::{apply_load_policy, read_json, read_yaml, write_json, write_yaml};
use crate::engine::xmemory::vector::{compute_centroid, cosine_sim, incremental_mean};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Whether theme centroids have been read from `embeddings.json` yet.
///
/// Every centroid-dependent path (search, assimilate) goes through
/// `ensure_centroids_loaded`, which performs the read at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CentroidState {
    NotLoaded,
    Loaded,
}

/// Owns the L3 theme layer. Not internally synchronized: one instance per
/// storage root, mutated through `&mut self` only.
pub struct ThemeManager {
    backend: Arc<dyn StorageBackend>,
    config: ThemeConfig,
    load_policy: LoadPolicy,
    /// Themes in creation order. Merge and KNN iterate in this order.
    themes: Vec<ThemeNode>,
    centroid_state: CentroidState,
    /// Member embeddings seen by this instance, used to re-cluster on split.
    /// Not persisted.
    semantic_embeddings: HashMap<String, Vec<f32>>,
}

impl ThemeManager {
    pub fn new(backend: Arc<dyn StorageBackend>, config: ThemeConfig) -> Self {
        Self {
            backend,
            config,
            load_policy: LoadPolicy::default(),
            themes: Vec::new(),
            centroid_state: CentroidState::NotLoaded,
            semantic_embeddings: HashMap::new(),
        }
    }

    /// Set how `load_themes` treats an unreadable index.
    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    // ═════════════════════════════════════════════════════════════════════════
    // Persistence
    // ═════════════════════════════════════════════════════════════════════════

    fn index_path() -> PathBuf {
        PathBuf::from(THEMES_DIR).join(THEME_INDEX_FILE)
    }

    fn embeddings_path() -> PathBuf {
        PathBuf::from(THEMES_DIR).join(THEME_EMBEDDINGS_FILE)
    }

    /// Load theme metadata from `themes/index.yaml`.
    ///
    /// A missing index leaves the manager untouched. An unreadable index
    /// clears all themes under `ResetOnCorrupt` (the default) or returns the
    /// error under `Propagate`. Centroids are not read here.
    pub fn load_themes(&mut self) -> MemoryResult<()> {
        self.load_themes_with(self.load_policy)
    }

    /// Like `load_themes`, but always surfaces parse errors.
    pub fn try_load_themes(&mut self) -> MemoryResult<()> {
        self.load_themes_with(LoadPolicy::Propagate)
    }

    fn load_themes_with(&mut self, policy: LoadPolicy) -> MemoryResult<()> {
        let path = Self::index_path();
        if !self.backend.exists(&path) {
            return Ok(());
        }

        let outcome = read_yaml::<ThemeIndexData>(self.backend.as_ref(), &path);
        match apply_load_policy(outcome, policy, &path)? {
            Some(index) => {
                self.themes = index
                    .themes
                    .into_iter()
                    .map(|mut t| {
                        t.centroid = Vec::new();
                        t.member_count = t.semantic_ids.len();
                        t
                    })
                    .collect();
                info!("[xmemory::themes] Loaded {} themes from index", self.themes.len());
            }
            None => self.themes.clear(),
        }
        self.centroid_state = CentroidState::NotLoaded;
        Ok(())
    }

    /// Read centroids now, surfacing parse errors instead of absorbing them.
    pub fn try_load_centroids(&mut self) -> MemoryResult<()> {
        let path = Self::embeddings_path();
        let data = read_json::<ThemeEmbeddingsData>(self.backend.as_ref(), &path)?;
        self.install_centroids(data.unwrap_or_default());
        Ok(())
    }

    /// Lazily attach persisted centroids to loaded themes. Runs once per
    /// instance; an unreadable document counts as empty.
    fn ensure_centroids_loaded(&mut self) {
        if self.centroid_state == CentroidState::Loaded {
            return;
        }
        let path = Self::embeddings_path();
        let outcome = read_json::<ThemeEmbeddingsData>(self.backend.as_ref(), &path);
        let data = match apply_load_policy(outcome, LoadPolicy::ResetOnCorrupt, &path) {
            Ok(data) => data.unwrap_or_default(),
            Err(e) => {
                warn!("[xmemory::themes] Centroid load failed: {}", e);
                ThemeEmbeddingsData::new()
            }
        };
        self.install_centroids(data);
    }

    fn install_centroids(&mut self, data: ThemeEmbeddingsData) {
        let mut attached = 0usize;
        for theme in &mut self.themes {
            if let Some(centroid) = data.get(&theme.theme_id) {
                theme.centroid = centroid.clone();
                attached += 1;
            }
        }
        self.centroid_state = CentroidState::Loaded;
        debug!(
            "[xmemory::themes] Centroid cache loaded ({} of {} themes)",
            attached,
            self.themes.len()
        );
    }

    /// Write the index, and the centroid document if centroids are loaded.
    pub fn save_themes(&self) -> MemoryResult<()> {
        let index = ThemeIndexData {
            version: DOCUMENT_VERSION.to_string(),
            themes: self.themes.clone(),
            metadata: ThemeIndexMetadata {
                total_themes: self.themes.len(),
                last_assimilation: Some(Utc::now()),
            },
        };
        write_yaml(self.backend.as_ref(), &Self::index_path(), &index)?;

        if self.centroid_state == CentroidState::Loaded {
            let centroids: ThemeEmbeddingsData = self
                .themes
                .iter()
                .filter(|t| !t.centroid.is_empty())
                .map(|t| (t.theme_id.clone(), t.centroid.clone()))
                .collect();
            write_json(self.backend.as_ref(), &Self::embeddings_path(), &centroids)?;
        }
        Ok(())
    }

    // ═════════════════════════════════════════════════════════════════════════
    // Assimilation
    // ═════════════════════════════════════════════════════════════════════════

    /// Fold a batch of new semantic memories into the theme layer and persist.
    ///
    /// The only error path is the final write.
    pub fn assimilate(&mut self, memories: &[SemanticMemory]) -> MemoryResult<AssimilationReport> {
        self.ensure_centroids_loaded();

        for mem in memories {
            self.semantic_embeddings
                .insert(mem.memory_id.clone(), mem.embedding.clone());
        }

        let mut report = AssimilationReport::default();

        // ── 1. Attach ────────────────────────────────────────────────────────
        for mem in memories {
            if self.attach_semantic(mem) {
                report.attached += 1;
            } else {
                report.created += 1;
            }
        }

        // ── 2. Split ─────────────────────────────────────────────────────────
        let (split, split_added) = self.split_oversized_themes();
        report.split = split;
        report.split_added = split_added;

        // ── 3. Merge ─────────────────────────────────────────────────────────
        report.merged = self.merge_similar_themes();

        // ── 4. KNN ───────────────────────────────────────────────────────────
        self.recompute_knn();

        report.total_themes = self.themes.len();
        info!(
            "[xmemory::themes] Assimilated {} memories: {} attached, {} new, {} split (+{}), {} merged → {} themes",
            memories.len(),
            report.attached,
            report.created,
            report.split,
            report.split_added,
            report.merged,
            report.total_themes
        );

        self.save_themes()?;
        Ok(report)
    }

    /// Returns true when the memory joined an existing theme.
    fn attach_semantic(&mut self, mem: &SemanticMemory) -> bool {
        let mut best: Option<usize> = None;
        let mut best_sim = 0.0f64;

        for (idx, theme) in self.themes.iter().enumerate() {
            if theme.centroid.is_empty() {
                continue;
            }
            let sim = cosine_sim(&mem.embedding, &theme.centroid);
            if sim > best_sim {
                best_sim = sim;
                best = Some(idx);
            }
        }

        match best {
            Some(idx) if best_sim >= self.config.attach_threshold => {
                let theme = &mut self.themes[idx];
                let n = theme.member_count;
                theme.semantic_ids.push(mem.memory_id.clone());
                theme.member_count = theme.semantic_ids.len();
                theme.updated_at = Utc::now();
                theme.centroid = incremental_mean(&theme.centroid, n, &mem.embedding);
                debug!(
                    "[xmemory::themes] {} → theme {} (sim {:.3}, {} members)",
                    mem.memory_id, theme.theme_id, best_sim, theme.member_count
                );
                true
            }
            _ => {
                let now = Utc::now();
                let theme = ThemeNode {
                    theme_id: uuid::Uuid::new_v4().to_string(),
                    summary: mem.content.chars().take(THEME_SUMMARY_MAX_CHARS).collect(),
                    centroid: mem.embedding.clone(),
                    semantic_ids: vec![mem.memory_id.clone()],
                    neighbors: Vec::new(),
                    member_count: 1,
                    created_at: now,
                    updated_at: now,
                    scope: mem.scope,
                    agent_id: mem.agent_id.clone(),
                };
                debug!(
                    "[xmemory::themes] {} seeded new theme {} (best sim {:.3})",
                    mem.memory_id, theme.theme_id, best_sim
                );
                self.themes.push(theme);
                false
            }
        }
    }

    /// Returns (themes split, themes added by splitting).
    fn split_oversized_themes(&mut self) -> (usize, usize) {
        let oversized: Vec<usize> = self
            .themes
            .iter()
            .enumerate()
            .filter(|(_, t)| t.member_count > self.config.max_theme_size)
            .map(|(idx, _)| idx)
            .collect();

        let mut split = 0usize;
        let mut added: Vec<ThemeNode> = Vec::new();

        for idx in oversized {
            let mut clusters = self.cluster_semantics(&self.themes[idx].semantic_ids);
            if clusters.len() <= 1 {
                continue;
            }

            let now = Utc::now();
            let base_summary = self.themes[idx].summary.clone();
            for (i, cluster) in clusters.iter().enumerate().skip(1) {
                added.push(ThemeNode {
                    theme_id: uuid::Uuid::new_v4().to_string(),
                    summary: format!("{} (cluster {})", base_summary, i + 1),
                    centroid: self.cluster_centroid(cluster),
                    semantic_ids: cluster.clone(),
                    neighbors: Vec::new(),
                    member_count: cluster.len(),
                    created_at: now,
                    updated_at: now,
                    scope: self.themes[idx].scope,
                    agent_id: self.themes[idx].agent_id.clone(),
                });
            }

            let first = clusters.swap_remove(0);
            let centroid = self.cluster_centroid(&first);
            let theme = &mut self.themes[idx];
            debug!(
                "[xmemory::themes] Split theme {} ({} members) into {} clusters",
                theme.theme_id,
                theme.member_count,
                clusters.len() + 1
            );
            theme.member_count = first.len();
            theme.semantic_ids = first;
            theme.centroid = centroid;
            theme.updated_at = now;
            split += 1;
        }

        let added_count = added.len();
        self.themes.extend(added);
        (split, added_count)
    }

    /// Partition members into connected components of the similarity graph.
    ///
    /// Members whose embedding is not in this instance's cache have no edges
    /// and end up as singleton components. Any component still above
    /// `max_theme_size` is cut into two halves (first half gets the extra one).
    fn cluster_semantics(&self, semantic_ids: &[String]) -> Vec<Vec<String>> {
        let n = semantic_ids.len();
        if n <= self.config.max_theme_size {
            return vec![semantic_ids.to_vec()];
        }

        let embeddings: Vec<&[f32]> = semantic_ids
            .iter()
            .map(|id| {
                self.semantic_embeddings
                    .get(id)
                    .map(|e| e.as_slice())
                    .unwrap_or(&[])
            })
            .collect();

        // Adjacency lists, neighbors in ascending index order.
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
        for i in 0..n {
            for j in (i + 1)..n {
                if embeddings[i].is_empty() || embeddings[j].is_empty() {
                    continue;
                }
                if cosine_sim(embeddings[i], embeddings[j]) >= self.config.cluster_threshold {
                    adjacency[i].push(j);
                    adjacency[j].push(i);
                }
            }
        }
        for list in &mut adjacency {
            list.sort_unstable();
        }

        // Iterative DFS per unvisited member.
        let mut visited = vec![false; n];
        let mut components: Vec<Vec<String>> = Vec::new();
        for start in 0..n {
            if visited[start] {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start];
            while let Some(node) = stack.pop() {
                if visited[node] {
                    continue;
                }
                visited[node] = true;
                component.push(semantic_ids[node].clone());
                for &next in &adjacency[node] {
                    if !visited[next] {
                        stack.push(next);
                    }
                }
            }
            components.push(component);
        }

        let mut result = Vec::with_capacity(components.len() + 1);
        for component in components {
            if component.len() > self.config.max_theme_size {
                let mid = component.len().div_ceil(2);
                let (head, tail) = component.split_at(mid);
                result.push(head.to_vec());
                result.push(tail.to_vec());
            } else {
                result.push(component);
            }
        }
        result
    }

    /// True mean of the cached embeddings of the given members.
    fn cluster_centroid(&self, semantic_ids: &[String]) -> Vec<f32> {
        let embeddings: Vec<&[f32]> = semantic_ids
            .iter()
            .filter_map(|id| self.semantic_embeddings.get(id))
            .filter(|e| !e.is_empty())
            .map(|e| e.as_slice())
            .collect();
        compute_centroid(&embeddings)
    }

    /// Returns the number of themes folded into another theme.
    fn merge_similar_themes(&mut self) -> usize {
        let n = self.themes.len();
        let mut merged = vec![false; n];
        let mut merged_count = 0usize;

        for i in 0..n {
            if merged[i] {
                continue;
            }
            for j in (i + 1)..n {
                if merged[j] {
                    continue;
                }
                let (head, tail) = self.themes.split_at_mut(j);
                let t1 = &mut head[i];
                let t2 = &tail[0];

                if t1.centroid.is_empty() || t2.centroid.is_empty() {
                    continue;
                }

                let sim = cosine_sim(&t1.centroid, &t2.centroid);
                let combined = t1.member_count + t2.member_count;
                if sim >= self.config.merge_threshold && combined <= self.config.max_theme_size {
                    debug!(
                        "[xmemory::themes] Merging theme {} into {} (sim {:.3})",
                        t2.theme_id, t1.theme_id, sim
                    );
                    t1.semantic_ids.extend(t2.semantic_ids.iter().cloned());
                    t1.member_count = t1.semantic_ids.len();
                    let centroid = compute_centroid(&[t1.centroid.as_slice(), t2.centroid.as_slice()]);
                    t1.centroid = centroid;
                    t1.updated_at = Utc::now();
                    merged[j] = true;
                    merged_count += 1;
                }
            }
        }

        if merged_count > 0 {
            let mut idx = 0;
            self.themes.retain(|_| {
                let keep = !merged[idx];
                idx += 1;
                keep
            });
        }
        merged_count
    }

    fn recompute_knn(&mut self) {
        let k = self.config.knn_k;
        let neighbor_lists: Vec<Option<Vec<String>>> = self
            .themes
            .iter()
            .map(|theme| {
                if theme.centroid.is_empty() {
                    return None;
                }
                let mut sims: Vec<(&str, f64)> = self
                    .themes
                    .iter()
                    .filter(|other| other.theme_id != theme.theme_id && !other.centroid.is_empty())
                    .map(|other| (other.theme_id.as_str(), cosine_sim(&theme.centroid, &other.centroid)))
                    .collect();
                sims.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                Some(sims.into_iter().take(k).map(|(id, _)| id.to_string()).collect())
            })
            .collect();

        for (theme, neighbors) in self.themes.iter_mut().zip(neighbor_lists) {
            if let Some(neighbors) = neighbors {
                theme.neighbors = neighbors;
            }
        }
    }

    // ═════════════════════════════════════════════════════════════════════════
    // Search
    // ═════════════════════════════════════════════════════════════════════════

    /// Rank themes by centroid similarity to the query, best first.
    ///
    /// Themes without a centroid are skipped. Loads the centroid cache on
    /// first use.
    pub fn search_themes(&mut self, query_embedding: &[f32], top_k: usize) -> Vec<ThemeMatch> {
        self.ensure_centroids_loaded();

        let mut results: Vec<ThemeMatch> = self
            .themes
            .iter()
            .filter(|t| !t.centroid.is_empty())
            .map(|t| ThemeMatch {
                score: cosine_sim(query_embedding, &t.centroid),
                theme: t.clone(),
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        results
    }

    // ═════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═════════════════════════════════════════════════════════════════════════

    pub fn get_theme(&self, theme_id: &str) -> Option<&ThemeNode> {
        self.themes.iter().find(|t| t.theme_id == theme_id)
    }

    pub fn all_themes(&self) -> &[ThemeNode] {
        &self.themes
    }

    pub fn theme_count(&self) -> usize {
        self.themes.len()
    }

    pub fn centroid_state(&self) -> CentroidState {
        self.centroid_state
    }

    pub fn is_centroid_cache_loaded(&self) -> bool {
        self.centroid_state == CentroidState::Loaded
    }

    pub fn config(&self) -> &ThemeConfig {
        &self.config
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Tests
// ═════════════════════════════════════════════════════════════════════════════
