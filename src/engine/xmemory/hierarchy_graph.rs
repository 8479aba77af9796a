// ── xmemory: Hierarchical Memory Graph ──────────────────────────────────────
//
// Explicit node/edge index across all four levels (L0 messages through L3
// themes), persisted as one JSON document.
//
// Node ids carry a level prefix (M_, E_, S_, T_) so raw ids from different
// levels never collide. `parent` edges point child → parent:
//   E_ep1 ──parent──▶ S_mem1 ──parent──▶ T_theme1
//
// Storage is an arena: nodes and edges live in Vecs in insertion order, with
// HashMap indexes for id lookup, per-level listing, and source/target
// adjacency. Nothing is ever deleted, so arena indexes stay valid.
//
// The graph is maintained independently of the Theme Manager's membership
// lists. The two are not reconciled.

use crate::atoms::constants::{DOCUMENT_VERSION, HIERARCHY_GRAPH_FILE};
use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::traits::StorageBackend;
use crate::atoms::xmemory_types::{
    EdgeKind, GraphStats, HierarchyEdge, HierarchyGraphData, HierarchyNode, LoadPolicy,
    MemoryLevel, Metadata,
};
use crate::engine::xmemory::storage::{apply_load_policy, read_json, write_json};
use chrono::Utc;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Level-prefixed node id.
pub fn make_node_id(level: MemoryLevel, raw_id: &str) -> String {
    format!("{}{}", level.prefix(), raw_id)
}

/// Split a node id back into level and raw id. `None` if no prefix matches.
pub fn parse_node_id(id: &str) -> Option<(MemoryLevel, String)> {
    MemoryLevel::ALL
        .iter()
        .find_map(|level| id.strip_prefix(level.prefix()).map(|raw| (*level, raw.to_string())))
}

/// Every node id must agree with its level and raw id, otherwise lookups by
/// raw id silently miss.
fn validate_document(data: &HierarchyGraphData, path: &Path) -> MemoryResult<()> {
    for node in &data.nodes {
        if node.id != make_node_id(node.level, &node.raw_id) {
            return Err(MemoryError::corrupt(
                path.display().to_string(),
                format!("node id {} does not match {} node {}", node.id, node.level, node.raw_id),
            ));
        }
    }
    Ok(())
}

pub struct HierarchicalMemoryGraph {
    backend: Arc<dyn StorageBackend>,
    load_policy: LoadPolicy,
    nodes: Vec<HierarchyNode>,
    edges: Vec<HierarchyEdge>,
    node_index: HashMap<String, usize>,
    nodes_by_level: HashMap<MemoryLevel, Vec<usize>>,
    edges_by_source: HashMap<String, Vec<usize>>,
    edges_by_target: HashMap<String, Vec<usize>>,
}

impl HierarchicalMemoryGraph {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            load_policy: LoadPolicy::default(),
            nodes: Vec::new(),
            edges: Vec::new(),
            node_index: HashMap::new(),
            nodes_by_level: HashMap::new(),
            edges_by_source: HashMap::new(),
            edges_by_target: HashMap::new(),
        }
    }

    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    // ═════════════════════════════════════════════════════════════════════════
    // Nodes
    // ═════════════════════════════════════════════════════════════════════════

    /// Insert a node, or replace the node with the same level and raw id.
    pub fn add_node(
        &mut self,
        level: MemoryLevel,
        raw_id: &str,
        text: &str,
        embedding: Option<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> &HierarchyNode {
        let node = HierarchyNode {
            id: make_node_id(level, raw_id),
            level,
            raw_id: raw_id.to_string(),
            text: text.to_string(),
            embedding,
            metadata,
            created_at: Utc::now(),
        };
        let idx = self.insert_node(node);
        &self.nodes[idx]
    }

    fn insert_node(&mut self, node: HierarchyNode) -> usize {
        if let Some(&idx) = self.node_index.get(&node.id) {
            self.nodes[idx] = node;
            return idx;
        }
        let idx = self.nodes.len();
        self.node_index.insert(node.id.clone(), idx);
        self.nodes_by_level.entry(node.level).or_default().push(idx);
        self.nodes.push(node);
        idx
    }

    pub fn get_node(&self, id: &str) -> Option<&HierarchyNode> {
        self.node_index.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn get_node_by_raw_id(&self, level: MemoryLevel, raw_id: &str) -> Option<&HierarchyNode> {
        self.get_node(&make_node_id(level, raw_id))
    }

    /// Nodes of one level, in insertion order.
    pub fn nodes_by_level(&self, level: MemoryLevel) -> Vec<&HierarchyNode> {
        self.nodes_by_level
            .get(&level)
            .map(|ids| ids.iter().map(|&idx| &self.nodes[idx]).collect())
            .unwrap_or_default()
    }

    // ═════════════════════════════════════════════════════════════════════════
    // Edges
    // ═════════════════════════════════════════════════════════════════════════

    /// Add a directed edge with a fresh UUID. Endpoints are not validated.
    pub fn add_edge(
        &mut self,
        source_id: &str,
        target_id: &str,
        kind: EdgeKind,
        weight: Option<f32>,
    ) -> &HierarchyEdge {
        let edge = HierarchyEdge {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            kind,
            weight,
            created_at: Utc::now(),
        };
        let idx = self.insert_edge(edge);
        &self.edges[idx]
    }

    fn insert_edge(&mut self, edge: HierarchyEdge) -> usize {
        let idx = self.edges.len();
        self.edges_by_source
            .entry(edge.source_id.clone())
            .or_default()
            .push(idx);
        self.edges_by_target
            .entry(edge.target_id.clone())
            .or_default()
            .push(idx);
        self.edges.push(edge);
        idx
    }

    /// Outgoing edges of a node, in insertion order.
    pub fn edges_from(&self, node_id: &str) -> Vec<&HierarchyEdge> {
        self.edges_by_source
            .get(node_id)
            .map(|ids| ids.iter().map(|&idx| &self.edges[idx]).collect())
            .unwrap_or_default()
    }

    /// Incoming edges of a node, in insertion order.
    pub fn edges_to(&self, node_id: &str) -> Vec<&HierarchyEdge> {
        self.edges_by_target
            .get(node_id)
            .map(|ids| ids.iter().map(|&idx| &self.edges[idx]).collect())
            .unwrap_or_default()
    }

    // ═════════════════════════════════════════════════════════════════════════
    // Traversal
    // ═════════════════════════════════════════════════════════════════════════

    /// Nodes at `target_level` reachable downward from `node_id`.
    ///
    /// Walks incoming `parent` edges depth-first. Each branch stops at the
    /// first node of the target level, so nodes below it are not visited
    /// through that branch. Unknown nodes end their branch. Each node is
    /// visited at most once, which also makes cycles terminate.
    pub fn descendants_at_level(&self, node_id: &str, target_level: MemoryLevel) -> Vec<&HierarchyNode> {
        let mut result = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![node_id];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.get_node(current) else {
                continue;
            };
            if node.level == target_level {
                result.push(node);
                continue;
            }

            // Reverse so children are explored in edge insertion order.
            let children: Vec<&str> = self
                .edges_to(current)
                .into_iter()
                .filter(|e| e.kind == EdgeKind::Parent)
                .map(|e| e.source_id.as_str())
                .collect();
            stack.extend(children.into_iter().rev());
        }
        result
    }

    /// Ancestors of `node_id`, nearest first.
    ///
    /// Follows the first outgoing `parent` edge at each step. Stops when a node
    /// has no parent edge, the parent is not in the graph, or a node repeats.
    pub fn ancestor_chain(&self, node_id: &str) -> Vec<&HierarchyNode> {
        let mut chain = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current: &str = node_id;

        while visited.insert(current) {
            let Some(edge) = self
                .edges_from(current)
                .into_iter()
                .find(|e| e.kind == EdgeKind::Parent)
            else {
                break;
            };
            let Some(parent) = self.get_node(&edge.target_id) else {
                break;
            };
            chain.push(parent);
            current = parent.id.as_str();
        }
        chain
    }

    // ═════════════════════════════════════════════════════════════════════════
    // Persistence
    // ═════════════════════════════════════════════════════════════════════════

    fn graph_path() -> PathBuf {
        PathBuf::from(HIERARCHY_GRAPH_FILE)
    }

    /// Write every node and edge to `hierarchy-graph.json`.
    pub fn save(&self) -> MemoryResult<()> {
        let data = HierarchyGraphData {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            version: DOCUMENT_VERSION.to_string(),
            updated_at: Utc::now(),
        };
        write_json(self.backend.as_ref(), &Self::graph_path(), &data)?;
        debug!(
            "[xmemory::graph] Saved {} nodes, {} edges",
            self.nodes.len(),
            self.edges.len()
        );
        Ok(())
    }

    /// Replace all in-memory state with the persisted document.
    ///
    /// A missing document yields an empty graph. An unreadable one yields an
    /// empty graph under `ResetOnCorrupt`, or an error under `Propagate`
    /// (in which case the current state is left untouched).
    pub fn load(&mut self) -> MemoryResult<()> {
        self.load_with(self.load_policy)
    }

    /// Like `load`, but always surfaces parse errors.
    pub fn try_load(&mut self) -> MemoryResult<()> {
        self.load_with(LoadPolicy::Propagate)
    }

    fn load_with(&mut self, policy: LoadPolicy) -> MemoryResult<()> {
        let path = Self::graph_path();
        let outcome = read_json::<HierarchyGraphData>(self.backend.as_ref(), &path).and_then(|doc| {
            if let Some(data) = &doc {
                validate_document(data, &path)?;
            }
            Ok(doc)
        });
        let data = apply_load_policy(outcome, policy, &path)?;

        self.clear();
        if let Some(data) = data {
            for node in data.nodes {
                self.insert_node(node);
            }
            for edge in data.edges {
                self.insert_edge(edge);
            }
        }
        info!(
            "[xmemory::graph] Loaded {} nodes, {} edges",
            self.nodes.len(),
            self.edges.len()
        );
        Ok(())
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.node_index.clear();
        self.nodes_by_level.clear();
        self.edges_by_source.clear();
        self.edges_by_target.clear();
    }

    // ═════════════════════════════════════════════════════════════════════════
    // Statistics
    // ═════════════════════════════════════════════════════════════════════════

    /// Node and edge totals, with a count for every level (zero included).
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            by_level: MemoryLevel::ALL
                .iter()
                .map(|level| (*level, self.nodes_by_level.get(level).map_or(0, Vec::len)))
                .collect(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
