// ── xmemory: Adaptive Search ────────────────────────────────────────────────
//
// Top-down retrieval across the hierarchy under a token budget.
//
//   1. Rank themes (L3). No themes → semantic-only fallback from the store.
//   2. Confident top theme → answer with theme summaries only.
//   3. Otherwise expand: gather member ids of every ranked theme, fetch them
//      from the store, re-rank by cosine to the query, emit L2 results.
//   4. Optionally walk each emitted L2 node down to its L1 episodes.
//
// Budget rule, applied per tier: a candidate whose estimated cost does not
// fit the remaining budget is skipped (never truncated); a tier stops as soon
// as the remaining budget reaches zero. The summed cost of everything
// returned never exceeds `max_token_budget`.
//
// Store failures are logged and treated as "no results"; search itself never
// fails.

use crate::atoms::constants::{EPISODE_SCORE_DISCOUNT, EPISODE_TITLE_KEY};
use crate::atoms::traits::SemanticStore;
use crate::atoms::xmemory_types::{
    AdaptiveSearchOptions, MemoryLevel, SearchResult, SearchResultMetadata, SemanticMemory,
    ThemeMatch,
};
use crate::engine::xmemory::hierarchy_graph::{make_node_id, HierarchicalMemoryGraph};
use crate::engine::xmemory::theme_manager::ThemeManager;
use crate::engine::xmemory::tokenizer::Tokenizer;
use crate::engine::xmemory::vector::cosine_sim;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};

/// Remaining token allowance for one search call.
struct TokenBudget {
    remaining: usize,
    tokenizer: Tokenizer,
}

impl TokenBudget {
    fn new(max: usize, tokenizer: Tokenizer) -> Self {
        Self { remaining: max, tokenizer }
    }

    fn exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Deduct the cost of `text` if it fits. Returns whether it did.
    fn try_spend(&mut self, text: &str) -> bool {
        let cost = self.tokenizer.count_tokens(text);
        if cost <= self.remaining {
            self.remaining -= cost;
            true
        } else {
            false
        }
    }
}

/// One search session over a theme manager, a graph and a semantic store.
///
/// Borrows its collaborators; the theme manager is borrowed mutably because
/// ranking may trigger the lazy centroid load.
pub struct AdaptiveSearch<'a> {
    themes: &'a mut ThemeManager,
    graph: &'a HierarchicalMemoryGraph,
    store: &'a dyn SemanticStore,
    tokenizer: Tokenizer,
}

impl<'a> AdaptiveSearch<'a> {
    pub fn new(
        themes: &'a mut ThemeManager,
        graph: &'a HierarchicalMemoryGraph,
        store: &'a dyn SemanticStore,
    ) -> Self {
        Self {
            themes,
            graph,
            store,
            tokenizer: Tokenizer::heuristic(),
        }
    }

    /// Run one budgeted top-down query. Results are in emission order:
    /// L3, or L2 followed by any L1 episodes.
    pub async fn search(
        &mut self,
        query: &str,
        query_embedding: &[f32],
        options: &AdaptiveSearchOptions,
    ) -> Vec<SearchResult> {
        let ranked = self.themes.search_themes(query_embedding, options.top_k_themes);
        let mut budget = TokenBudget::new(options.max_token_budget, self.tokenizer);

        let Some(top) = ranked.first() else {
            debug!("[xmemory::search] No themes, falling back to semantic search");
            return self.search_semantics_only(query_embedding, options, &mut budget).await;
        };

        let confident = !options.expand_to_semantics || top.score >= self.themes.config().expand_threshold;
        debug!(
            "[xmemory::search] '{}': {} themes, top score {:.3} → {}",
            truncate_for_log(query),
            ranked.len(),
            top.score,
            if confident { "theme level" } else { "expand" }
        );

        if confident {
            let results = emit_themes(&ranked, &mut budget);
            self.log_done(&results, options, &budget);
            return results;
        }

        let mut results = self
            .expand_to_semantics(&ranked, query_embedding, options, &mut budget)
            .await;

        if options.expand_to_episodes && !budget.exhausted() {
            let episodes = self.expand_to_episodes(&results, &mut budget);
            results.extend(episodes);
        }

        self.log_done(&results, options, &budget);
        results
    }

    async fn search_semantics_only(
        &self,
        query_embedding: &[f32],
        options: &AdaptiveSearchOptions,
        budget: &mut TokenBudget,
    ) -> Vec<SearchResult> {
        let memories = match self.store.search(query_embedding, options.top_k_semantics).await {
            Ok(m) => m,
            Err(e) => {
                warn!("[xmemory::search] Semantic store search failed: {}", e);
                return Vec::new();
            }
        };
        let results = emit_semantics(rerank(memories, query_embedding), &HashMap::new(), budget);
        self.log_done(&results, options, budget);
        results
    }

    async fn expand_to_semantics(
        &self,
        ranked: &[ThemeMatch],
        query_embedding: &[f32],
        options: &AdaptiveSearchOptions,
        budget: &mut TokenBudget,
    ) -> Vec<SearchResult> {
        // Union of member ids in first-seen order, remembering the owning theme.
        let mut seen: HashSet<&str> = HashSet::new();
        let mut ids: Vec<String> = Vec::new();
        let mut owner: HashMap<String, String> = HashMap::new();
        for m in ranked {
            for id in &m.theme.semantic_ids {
                if seen.insert(id.as_str()) {
                    ids.push(id.clone());
                    owner.insert(id.clone(), m.theme.theme_id.clone());
                }
            }
        }

        let memories = match self.store.get_by_ids(&ids).await {
            Ok(m) => m,
            Err(e) => {
                warn!("[xmemory::search] Semantic store lookup failed: {}", e);
                Vec::new()
            }
        };
        if memories.len() < ids.len() {
            debug!(
                "[xmemory::search] {} of {} theme members missing from store",
                ids.len() - memories.len(),
                ids.len()
            );
        }

        let mut candidates = rerank(memories, query_embedding);
        candidates.truncate(options.top_k_semantics);
        emit_semantics(candidates, &owner, budget)
    }

    fn expand_to_episodes(&self, semantics: &[SearchResult], budget: &mut TokenBudget) -> Vec<SearchResult> {
        let mut episodes = Vec::new();
        for parent in semantics.iter().filter(|r| r.level == MemoryLevel::L2) {
            let node_id = make_node_id(MemoryLevel::L2, &parent.id);
            for episode in self.graph.descendants_at_level(&node_id, MemoryLevel::L1) {
                if budget.exhausted() {
                    break;
                }
                if !budget.try_spend(&episode.text) {
                    continue;
                }
                let episode_title = episode
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get(EPISODE_TITLE_KEY))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                episodes.push(SearchResult {
                    level: MemoryLevel::L1,
                    id: episode.raw_id.clone(),
                    content: episode.text.clone(),
                    score: parent.score * EPISODE_SCORE_DISCOUNT,
                    metadata: Some(SearchResultMetadata {
                        theme_id: parent.metadata.as_ref().and_then(|m| m.theme_id.clone()),
                        episode_title,
                        ..Default::default()
                    }),
                });
            }
        }
        episodes
    }

    fn log_done(&self, results: &[SearchResult], options: &AdaptiveSearchOptions, budget: &TokenBudget) {
        info!(
            "[xmemory::search] {} results ({} of {} tokens used)",
            results.len(),
            options.max_token_budget - budget.remaining,
            options.max_token_budget
        );
    }
}

/// Score memories by cosine to the query, best first. Ties keep input order.
fn rerank(memories: Vec<SemanticMemory>, query_embedding: &[f32]) -> Vec<(SemanticMemory, f64)> {
    let mut scored: Vec<(SemanticMemory, f64)> = memories
        .into_iter()
        .map(|m| {
            let score = cosine_sim(query_embedding, &m.embedding);
            (m, score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

fn emit_themes(ranked: &[ThemeMatch], budget: &mut TokenBudget) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for m in ranked {
        if budget.exhausted() {
            break;
        }
        if !budget.try_spend(&m.theme.summary) {
            continue;
        }
        results.push(SearchResult {
            level: MemoryLevel::L3,
            id: m.theme.theme_id.clone(),
            content: m.theme.summary.clone(),
            score: m.score,
            metadata: Some(SearchResultMetadata {
                theme_id: Some(m.theme.theme_id.clone()),
                theme_summary: Some(m.theme.summary.clone()),
                scope: m.theme.scope,
                agent_id: m.theme.agent_id.clone(),
                ..Default::default()
            }),
        });
    }
    results
}

/// `owner` maps member id → theme id for memories the store does not tag.
fn emit_semantics(
    candidates: Vec<(SemanticMemory, f64)>,
    owner: &HashMap<String, String>,
    budget: &mut TokenBudget,
) -> Vec<SearchResult> {
    let mut results = Vec::new();
    for (memory, score) in candidates {
        if budget.exhausted() {
            break;
        }
        if !budget.try_spend(&memory.content) {
            continue;
        }
        let theme_id = memory
            .theme_id
            .clone()
            .or_else(|| owner.get(&memory.memory_id).cloned());
        results.push(SearchResult {
            level: MemoryLevel::L2,
            metadata: Some(SearchResultMetadata {
                theme_id,
                scope: memory.scope,
                agent_id: memory.agent_id,
                actor: memory.actor,
                ..Default::default()
            }),
            id: memory.memory_id,
            content: memory.content,
            score,
        });
    }
    results
}

fn truncate_for_log(query: &str) -> String {
    query.chars().take(60).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::error::{MemoryError, MemoryResult};
    use crate::atoms::xmemory_types::{EdgeKind, Metadata, ThemeConfig};
    use crate::engine::xmemory::semantic_store::InMemorySemanticStore;
    use crate::engine::xmemory::storage::MemoryFs;
    use crate::engine::xmemory::tokenizer::estimate_tokens;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        themes: ThemeManager,
        graph: HierarchicalMemoryGraph,
        store: InMemorySemanticStore,
    }

    fn fixture(memories: Vec<SemanticMemory>) -> Fixture {
        let fs = Arc::new(MemoryFs::new());
        let mut themes = ThemeManager::new(fs.clone(), ThemeConfig::default());
        if !memories.is_empty() {
            themes.assimilate(&memories).unwrap();
        }
        let store = InMemorySemanticStore::new();
        store.insert_many(memories);
        Fixture { themes, graph: HierarchicalMemoryGraph::new(fs), store }
    }

    fn total_tokens(results: &[SearchResult]) -> usize {
        results.iter().map(|r| estimate_tokens(&r.content)).sum()
    }

    struct FailingStore;

    #[async_trait]
    impl SemanticStore for FailingStore {
        async fn search(&self, _: &[f32], _: usize) -> MemoryResult<Vec<SemanticMemory>> {
            Err(MemoryError::store("failing", "offline"))
        }
        async fn get_by_id(&self, _: &str) -> MemoryResult<Option<SemanticMemory>> {
            Err(MemoryError::store("failing", "offline"))
        }
        async fn get_by_ids(&self, _: &[String]) -> MemoryResult<Vec<SemanticMemory>> {
            Err(MemoryError::store("failing", "offline"))
        }
    }

    #[tokio::test]
    async fn no_themes_falls_back_to_ranked_semantics() {
        let mut f = fixture(Vec::new());
        f.store.insert_many(vec![
            SemanticMemory::new("far", "far away", vec![0.0, 1.0]),
            SemanticMemory::new("near", "close by", vec![1.0, 0.1]),
        ]);
        let mut search = AdaptiveSearch::new(&mut f.themes, &f.graph, &f.store);
        let results = search.search("q", &[1.0, 0.0], &AdaptiveSearchOptions::default()).await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.level == MemoryLevel::L2));
        assert_eq!(results[0].id, "near");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn confident_top_theme_returns_theme_level_only() {
        let mut f = fixture(vec![
            SemanticMemory::new("x1", "Rust ownership rules", vec![1.0, 0.0, 0.0]),
            SemanticMemory::new("y1", "Sourdough starter care", vec![0.0, 1.0, 0.0]),
        ]);
        let mut search = AdaptiveSearch::new(&mut f.themes, &f.graph, &f.store);
        let results = search.search("rust", &[1.0, 0.0, 0.0], &AdaptiveSearchOptions::default()).await;

        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.level == MemoryLevel::L3));
        assert_eq!(results[0].content, "Rust ownership rules");
        let meta = results[0].metadata.as_ref().unwrap();
        assert_eq!(meta.theme_summary.as_deref(), Some("Rust ownership rules"));
    }

    #[tokio::test]
    async fn weak_top_theme_expands_to_reranked_semantics() {
        let mut f = fixture(vec![
            SemanticMemory::new("x1", "x one", vec![1.0, 0.0, 0.0]),
            SemanticMemory::new("x2", "x two", vec![0.9, 0.2, 0.0]),
            SemanticMemory::new("y1", "y one", vec![0.0, 1.0, 0.0]),
        ]);
        let mut search = AdaptiveSearch::new(&mut f.themes, &f.graph, &f.store);
        // cos to the x theme is about 0.64, under the 0.75 bar.
        let results = search.search("q", &[1.0, 1.0, 1.0], &AdaptiveSearchOptions::default()).await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.level == MemoryLevel::L2));
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(results[0].metadata.as_ref().unwrap().theme_id.is_some());
    }

    #[tokio::test]
    async fn top_k_semantics_caps_expansion() {
        let mut f = fixture(vec![
            SemanticMemory::new("x1", "x one", vec![1.0, 0.0, 0.0]),
            SemanticMemory::new("x2", "x two", vec![0.9, 0.2, 0.0]),
            SemanticMemory::new("y1", "y one", vec![0.0, 1.0, 0.0]),
        ]);
        let options = AdaptiveSearchOptions { top_k_semantics: 1, ..Default::default() };
        let mut search = AdaptiveSearch::new(&mut f.themes, &f.graph, &f.store);
        let results = search.search("q", &[1.0, 1.0, 1.0], &options).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn disabled_expansion_always_answers_with_themes() {
        let mut f = fixture(vec![
            SemanticMemory::new("x1", "x one", vec![1.0, 0.0, 0.0]),
            SemanticMemory::new("y1", "y one", vec![0.0, 1.0, 0.0]),
        ]);
        let options = AdaptiveSearchOptions { expand_to_semantics: false, ..Default::default() };
        let mut search = AdaptiveSearch::new(&mut f.themes, &f.graph, &f.store);
        let results = search.search("q", &[1.0, 1.0, 1.0], &options).await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.level == MemoryLevel::L3));
    }

    #[tokio::test]
    async fn episodes_follow_semantics_with_discounted_score() {
        let mut f = fixture(vec![
            SemanticMemory::new("x1", "x one", vec![1.0, 0.0, 0.0]),
            SemanticMemory::new("y1", "y one", vec![0.0, 1.0, 0.0]),
        ]);
        let mut meta = Metadata::new();
        meta.insert(EPISODE_TITLE_KEY.into(), json!("Planning call"));
        f.graph.add_node(MemoryLevel::L2, "x1", "x one", None, None);
        f.graph.add_node(MemoryLevel::L1, "ep1", "we discussed x", None, Some(meta));
        f.graph.add_edge("E_ep1", "S_x1", EdgeKind::Parent, None);

        let options = AdaptiveSearchOptions { expand_to_episodes: true, ..Default::default() };
        let mut search = AdaptiveSearch::new(&mut f.themes, &f.graph, &f.store);
        let results = search.search("q", &[1.0, 1.0, 1.0], &options).await;

        let semantic = results.iter().find(|r| r.id == "x1").unwrap();
        let episode = results.iter().find(|r| r.level == MemoryLevel::L1).unwrap();
        assert_eq!(episode.id, "ep1");
        assert!((episode.score - semantic.score * 0.9).abs() < 1e-9);
        let meta = episode.metadata.as_ref().unwrap();
        assert_eq!(meta.episode_title.as_deref(), Some("Planning call"));
        assert_eq!(meta.theme_id, semantic.metadata.as_ref().unwrap().theme_id);
        // Episodes come after every semantic result.
        let last_l2 = results.iter().rposition(|r| r.level == MemoryLevel::L2).unwrap();
        let first_l1 = results.iter().position(|r| r.level == MemoryLevel::L1).unwrap();
        assert!(last_l2 < first_l1);
    }

    #[tokio::test]
    async fn oversized_candidates_are_skipped_not_truncated() {
        let mut f = fixture(Vec::new());
        f.store.insert_many(vec![
            SemanticMemory::new("long", "x".repeat(40), vec![1.0, 0.0]),
            SemanticMemory::new("short", "tiny", vec![0.9, 0.1]),
        ]);
        let options = AdaptiveSearchOptions { max_token_budget: 5, ..Default::default() };
        let mut search = AdaptiveSearch::new(&mut f.themes, &f.graph, &f.store);
        let results = search.search("q", &[1.0, 0.0], &options).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "short");
        assert_eq!(results[0].content, "tiny");
    }

    #[tokio::test]
    async fn exhausted_budget_stops_the_tier() {
        let mut f = fixture(Vec::new());
        f.store.insert_many(vec![
            SemanticMemory::new("first", "abcd", vec![1.0, 0.0]),
            SemanticMemory::new("empty", "", vec![0.9, 0.1]),
        ]);
        let options = AdaptiveSearchOptions { max_token_budget: 1, ..Default::default() };
        let mut search = AdaptiveSearch::new(&mut f.themes, &f.graph, &f.store);
        let results = search.search("q", &[1.0, 0.0], &options).await;

        // The empty memory costs nothing but comes after the budget hit zero.
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "first");
    }

    #[tokio::test]
    async fn very_long_content_is_costed_exactly() {
        let mut f = fixture(Vec::new());
        f.store.insert(SemanticMemory::new("huge", "x".repeat(16_777_217), vec![1.0, 0.0]));
        let options = AdaptiveSearchOptions { max_token_budget: 4_194_304, ..Default::default() };
        let mut search = AdaptiveSearch::new(&mut f.themes, &f.graph, &f.store);
        assert!(search.search("q", &[1.0, 0.0], &options).await.is_empty());

        let options = AdaptiveSearchOptions { max_token_budget: 4_194_305, ..Default::default() };
        assert_eq!(search.search("q", &[1.0, 0.0], &options).await.len(), 1);
    }

    #[tokio::test]
    async fn budget_is_never_exceeded() {
        let memories: Vec<SemanticMemory> = (0..20)
            .map(|i| {
                SemanticMemory::new(
                    format!("m{}", i),
                    "word ".repeat(i + 1),
                    vec![1.0, (i as f32) * 0.05, 0.3],
                )
            })
            .collect();
        for budget in [0usize, 1, 3, 7, 15, 40, 100] {
            let mut f = fixture(memories.clone());
            for (i, m) in memories.iter().enumerate() {
                f.graph.add_node(MemoryLevel::L2, &m.memory_id, &m.content, None, None);
                f.graph.add_node(MemoryLevel::L1, &format!("e{}", i), &"episode text ".repeat(3), None, None);
                f.graph.add_edge(&format!("E_e{}", i), &format!("S_{}", m.memory_id), EdgeKind::Parent, None);
            }
            let options = AdaptiveSearchOptions {
                max_token_budget: budget,
                expand_to_episodes: true,
                ..Default::default()
            };
            let mut search = AdaptiveSearch::new(&mut f.themes, &f.graph, &f.store);
            for query in [[1.0f32, 0.0, 0.3], [0.2, 1.0, 0.0], [0.0, 0.0, 1.0]] {
                let results = search.search("q", &query, &options).await;
                assert!(total_tokens(&results) <= budget, "budget {} exceeded", budget);
            }
        }
    }

    #[tokio::test]
    async fn store_failure_yields_empty_results() {
        let fs = Arc::new(MemoryFs::new());
        let mut themes = ThemeManager::new(fs.clone(), ThemeConfig::default());
        let graph = HierarchicalMemoryGraph::new(fs);
        let store = FailingStore;

        let mut search = AdaptiveSearch::new(&mut themes, &graph, &store);
        assert!(search.search("q", &[1.0], &AdaptiveSearchOptions::default()).await.is_empty());
    }
}
