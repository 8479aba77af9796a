// ── xmemory: Bridge ─────────────────────────────────────────────────────────
//
// `MemoryHierarchy` wires the Theme Manager and the hierarchy graph to one
// storage root and exposes the three things a caller actually does:
//
//   - record_episode  – add an L1 node (title kept in node metadata)
//   - ingest          – add L2 nodes, link them to their source episodes and
//                       to the themes they landed in, assimilate, persist
//   - recall          – embed a query and run adaptive search
//
// The semantic store and the embedding provider stay owned by the caller and
// are passed per call.
//
// Graph edges are only ever added. Theme nodes and S → T edges mirror theme
// membership at ingest time; later splits and merges are not reflected back
// into earlier edges.

use crate::atoms::constants::{EPISODE_AGENT_KEY, EPISODE_TITLE_KEY};
use crate::atoms::error::MemoryResult;
use crate::atoms::traits::{EmbeddingProvider, SemanticStore, StorageBackend};
use crate::atoms::xmemory_types::{
    AdaptiveSearchOptions, AssimilationReport, EdgeKind, EpisodeMemory, MemoryLevel,
    SearchResult, SemanticMemory, XMemoryConfig,
};
use crate::engine::xmemory::adaptive_search::AdaptiveSearch;
use crate::engine::xmemory::hierarchy_graph::{make_node_id, HierarchicalMemoryGraph};
use crate::engine::xmemory::storage::NativeFs;
use crate::engine::xmemory::theme_manager::ThemeManager;
use log::{info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

pub struct MemoryHierarchy {
    config: XMemoryConfig,
    themes: ThemeManager,
    graph: HierarchicalMemoryGraph,
}

impl MemoryHierarchy {
    /// Open (or create) a hierarchy on the given backend and load its state.
    pub fn open(config: XMemoryConfig, backend: Arc<dyn StorageBackend>) -> MemoryResult<Self> {
        config.validate()?;

        let mut themes = ThemeManager::new(backend.clone(), config.themes.clone())
            .with_load_policy(config.load_policy);
        themes.load_themes()?;

        let mut graph = HierarchicalMemoryGraph::new(backend).with_load_policy(config.load_policy);
        graph.load()?;

        info!(
            "[xmemory::bridge] Opened hierarchy: {} themes, {} graph nodes",
            themes.theme_count(),
            graph.node_count()
        );
        Ok(Self { config, themes, graph })
    }

    /// Open on the native filesystem at `config.storage_root`.
    pub fn open_native(config: XMemoryConfig) -> MemoryResult<Self> {
        let backend = Arc::new(NativeFs::new(config.storage_root.clone()));
        Self::open(config, backend)
    }

    /// Add an episode as an L1 node and persist the graph.
    pub fn record_episode(&mut self, episode: &EpisodeMemory) -> MemoryResult<()> {
        let mut metadata = episode.metadata.clone().unwrap_or_default();
        metadata.insert(EPISODE_TITLE_KEY.to_string(), Value::String(episode.title.clone()));
        if let Some(agent_id) = &episode.agent_id {
            metadata.insert(EPISODE_AGENT_KEY.to_string(), Value::String(agent_id.clone()));
        }

        self.graph.add_node(
            MemoryLevel::L1,
            &episode.episode_id,
            &episode.content,
            episode.embedding.clone(),
            Some(metadata),
        );
        self.graph.save()
    }

    /// Index a batch of semantic memories and fold them into themes.
    ///
    /// Source episodes that were never recorded still get an edge; traversal
    /// simply ends at the missing node.
    pub fn ingest(&mut self, memories: &[SemanticMemory]) -> MemoryResult<AssimilationReport> {
        if memories.is_empty() {
            return Ok(AssimilationReport {
                total_themes: self.themes.theme_count(),
                ..Default::default()
            });
        }

        for mem in memories {
            self.graph.add_node(
                MemoryLevel::L2,
                &mem.memory_id,
                &mem.content,
                Some(mem.embedding.clone()),
                None,
            );
            let semantic_id = make_node_id(MemoryLevel::L2, &mem.memory_id);
            for episode_id in &mem.source_episodes {
                let episode_node = make_node_id(MemoryLevel::L1, episode_id);
                if self.graph.get_node(&episode_node).is_none() {
                    warn!(
                        "[xmemory::bridge] {} references unknown episode {}",
                        mem.memory_id, episode_id
                    );
                }
                self.graph.add_edge(&episode_node, &semantic_id, EdgeKind::Parent, None);
            }
        }

        let report = match self.themes.assimilate(memories) {
            Ok(report) => report,
            Err(e) => {
                // Keep the L2 nodes and episode edges on disk even if the
                // theme documents could not be written.
                if let Err(save_err) = self.graph.save() {
                    warn!("[xmemory::bridge] Graph save after failed assimilation failed: {}", save_err);
                }
                return Err(e);
            }
        };
        self.link_to_themes(memories);
        self.graph.save()?;
        Ok(report)
    }

    /// Mirror current themes as L3 nodes and add an S → T edge for every
    /// memory of this batch.
    fn link_to_themes(&mut self, memories: &[SemanticMemory]) {
        let batch: HashSet<&str> = memories.iter().map(|m| m.memory_id.as_str()).collect();
        let mut links: Vec<(String, String)> = Vec::new();
        for theme in self.themes.all_themes() {
            for id in theme.semantic_ids.iter().filter(|id| batch.contains(id.as_str())) {
                links.push((make_node_id(MemoryLevel::L2, id), make_node_id(MemoryLevel::L3, &theme.theme_id)));
            }
        }

        for theme in self.themes.all_themes() {
            let node_id = make_node_id(MemoryLevel::L3, &theme.theme_id);
            let unchanged = self
                .graph
                .get_node(&node_id)
                .is_some_and(|n| n.text == theme.summary);
            if !unchanged {
                self.graph
                    .add_node(MemoryLevel::L3, &theme.theme_id, &theme.summary, None, None);
            }
        }
        for (semantic_node, theme_node) in links {
            self.graph.add_edge(&semantic_node, &theme_node, EdgeKind::Parent, None);
        }
    }

    /// Embed `query` and run adaptive search with the configured options.
    pub async fn recall(
        &mut self,
        query: &str,
        embedder: &dyn EmbeddingProvider,
        store: &dyn SemanticStore,
    ) -> MemoryResult<Vec<SearchResult>> {
        let options = self.config.search.clone();
        self.recall_with(query, embedder, store, &options).await
    }

    /// Embed `query` and run adaptive search with explicit options.
    pub async fn recall_with(
        &mut self,
        query: &str,
        embedder: &dyn EmbeddingProvider,
        store: &dyn SemanticStore,
        options: &AdaptiveSearchOptions,
    ) -> MemoryResult<Vec<SearchResult>> {
        let embedding = embedder.embed(query).await?;
        Ok(self.search_embedding(query, &embedding, store, options).await)
    }

    /// Adaptive search for a caller that already holds the query embedding.
    pub async fn search_embedding(
        &mut self,
        query: &str,
        query_embedding: &[f32],
        store: &dyn SemanticStore,
        options: &AdaptiveSearchOptions,
    ) -> Vec<SearchResult> {
        AdaptiveSearch::new(&mut self.themes, &self.graph, store)
            .search(query, query_embedding, options)
            .await
    }

    pub fn themes(&self) -> &ThemeManager {
        &self.themes
    }

    pub fn graph(&self) -> &HierarchicalMemoryGraph {
        &self.graph
    }

    pub fn config(&self) -> &XMemoryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::error::MemoryError;
    use crate::engine::xmemory::semantic_store::InMemorySemanticStore;
    use crate::engine::xmemory::storage::MemoryFs;
    use async_trait::async_trait;
    use std::path::Path;

    /// Memory backend that refuses writes under `themes/`.
    struct ThemesUnwritable(Arc<MemoryFs>);

    impl StorageBackend for ThemesUnwritable {
        fn exists(&self, path: &Path) -> bool {
            self.0.exists(path)
        }
        fn read_to_string(&self, path: &Path) -> MemoryResult<String> {
            self.0.read_to_string(path)
        }
        fn write(&self, path: &Path, contents: &str) -> MemoryResult<()> {
            if path.starts_with("themes") {
                return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into());
            }
            self.0.write(path, contents)
        }
        fn create_dir_all(&self, path: &Path) -> MemoryResult<()> {
            self.0.create_dir_all(path)
        }
    }

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> MemoryResult<Vec<f32>> {
            Ok(self.0.clone())
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> MemoryResult<Vec<f32>> {
            Err(MemoryError::embedding(self.model_name(), "unavailable"))
        }
        fn model_name(&self) -> &str {
            "broken"
        }
    }

    fn episode(id: &str, title: &str) -> EpisodeMemory {
        EpisodeMemory {
            episode_id: id.to_string(),
            title: title.to_string(),
            content: format!("transcript of {}", title),
            embedding: None,
            message_ids: vec![],
            timestamp: chrono::Utc::now(),
            duration: None,
            metadata: None,
            agent_id: None,
            actor: None,
        }
    }

    fn semantic(id: &str, embedding: Vec<f32>, episodes: &[&str]) -> SemanticMemory {
        let mut m = SemanticMemory::new(id, format!("fact {}", id), embedding);
        m.source_episodes = episodes.iter().map(|e| e.to_string()).collect();
        m
    }

    #[test]
    fn ingest_builds_full_chain() {
        let fs = Arc::new(MemoryFs::new());
        let mut h = MemoryHierarchy::open(XMemoryConfig::default(), fs.clone()).unwrap();
        h.record_episode(&episode("ep1", "Kickoff")).unwrap();
        let report = h.ingest(&[semantic("s1", vec![1.0, 0.0, 0.0], &["ep1"])]).unwrap();
        assert_eq!(report.created, 1);

        let chain: Vec<MemoryLevel> = h.graph().ancestor_chain("E_ep1").iter().map(|n| n.level).collect();
        assert_eq!(chain, vec![MemoryLevel::L2, MemoryLevel::L3]);

        let theme_id = &h.themes().all_themes()[0].theme_id;
        let episodes = h.graph().descendants_at_level(&make_node_id(MemoryLevel::L3, theme_id), MemoryLevel::L1);
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].metadata.as_ref().unwrap()["title"], "Kickoff");
    }

    #[test]
    fn reopen_restores_themes_and_graph() {
        let fs = Arc::new(MemoryFs::new());
        {
            let mut h = MemoryHierarchy::open(XMemoryConfig::default(), fs.clone()).unwrap();
            h.record_episode(&episode("ep1", "Kickoff")).unwrap();
            h.ingest(&[semantic("s1", vec![1.0, 0.0], &["ep1"]), semantic("s2", vec![0.0, 1.0], &[])])
                .unwrap();
        }
        let h = MemoryHierarchy::open(XMemoryConfig::default(), fs).unwrap();
        assert_eq!(h.themes().theme_count(), 2);
        assert_eq!(h.graph().stats().by_level[&MemoryLevel::L2], 2);
        assert_eq!(h.graph().stats().by_level[&MemoryLevel::L3], 2);
    }

    #[test]
    fn failed_assimilation_still_persists_graph() {
        let fs = Arc::new(MemoryFs::new());
        let backend = Arc::new(ThemesUnwritable(fs.clone()));
        let mut h = MemoryHierarchy::open(XMemoryConfig::default(), backend).unwrap();
        h.record_episode(&episode("ep1", "Kickoff")).unwrap();

        let err = h.ingest(&[semantic("s1", vec![1.0, 0.0], &["ep1"])]).unwrap_err();
        assert!(matches!(err, MemoryError::Io(_)));

        let reopened = MemoryHierarchy::open(XMemoryConfig::default(), fs).unwrap();
        assert!(reopened.graph().get_node("S_s1").is_some());
        assert_eq!(reopened.graph().edges_to("S_s1").len(), 1);
        assert_eq!(reopened.themes().theme_count(), 0);
    }

    #[test]
    fn episode_metadata_uses_constant_keys() {
        let fs = Arc::new(MemoryFs::new());
        let mut h = MemoryHierarchy::open(XMemoryConfig::default(), fs).unwrap();
        let mut ep = episode("ep1", "Kickoff");
        ep.agent_id = Some("agent-7".into());
        h.record_episode(&ep).unwrap();

        let meta = h.graph().get_node("E_ep1").unwrap().metadata.as_ref().unwrap();
        assert_eq!(meta[EPISODE_TITLE_KEY], "Kickoff");
        assert_eq!(meta[EPISODE_AGENT_KEY], "agent-7");
    }

    #[test]
    fn empty_ingest_is_a_no_op() {
        let fs = Arc::new(MemoryFs::new());
        let mut h = MemoryHierarchy::open(XMemoryConfig::default(), fs.clone()).unwrap();
        let report = h.ingest(&[]).unwrap();
        assert_eq!(report, AssimilationReport::default());
        assert!(fs.files().is_empty());
    }

    #[tokio::test]
    async fn recall_uses_the_embedder() {
        let fs = Arc::new(MemoryFs::new());
        let store = InMemorySemanticStore::new();
        let memories = vec![semantic("s1", vec![1.0, 0.0], &[]), semantic("s2", vec![0.0, 1.0], &[])];
        store.insert_many(memories.clone());

        let mut h = MemoryHierarchy::open(XMemoryConfig::default(), fs).unwrap();
        h.ingest(&memories).unwrap();

        let results = h.recall("first", &FixedEmbedder(vec![1.0, 0.0]), &store).await.unwrap();
        assert_eq!(results[0].level, MemoryLevel::L3);
        assert_eq!(results[0].content, "fact s1");

        let err = h.recall("first", &BrokenEmbedder, &store).await.unwrap_err();
        assert!(matches!(err, MemoryError::Embedding { .. }));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let fs = Arc::new(MemoryFs::new());
        let mut config = XMemoryConfig::default();
        config.themes.max_theme_size = 0;
        assert!(matches!(
            MemoryHierarchy::open(config, fs),
            Err(MemoryError::Config(_))
        ));
    }
}
