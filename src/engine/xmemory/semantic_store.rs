// ── xmemory: In-Memory Semantic Store ───────────────────────────────────────
//
// Reference SemanticStore for callers without a durable L2 store, and the
// store used throughout the tests. Search is a brute-force cosine scan.

use crate::atoms::error::MemoryResult;
use crate::atoms::traits::SemanticStore;
use crate::atoms::xmemory_types::SemanticMemory;
use crate::engine::xmemory::vector::cosine_sim;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct InMemorySemanticStore {
    /// Memories in insertion order, with an id → position index.
    memories: RwLock<(Vec<SemanticMemory>, HashMap<String, usize>)>,
}

impl InMemorySemanticStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a memory, replacing any memory with the same id.
    pub fn insert(&self, memory: SemanticMemory) {
        let mut guard = self.memories.write();
        let (list, index) = &mut *guard;
        match index.get(&memory.memory_id) {
            Some(&pos) => list[pos] = memory,
            None => {
                index.insert(memory.memory_id.clone(), list.len());
                list.push(memory);
            }
        }
    }

    pub fn insert_many(&self, memories: impl IntoIterator<Item = SemanticMemory>) {
        for memory in memories {
            self.insert(memory);
        }
    }

    pub fn len(&self) -> usize {
        self.memories.read().0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SemanticStore for InMemorySemanticStore {
    async fn search(&self, query_embedding: &[f32], top_k: usize) -> MemoryResult<Vec<SemanticMemory>> {
        let guard = self.memories.read();
        let mut scored: Vec<(f64, &SemanticMemory)> = guard
            .0
            .iter()
            .map(|m| (cosine_sim(query_embedding, &m.embedding), m))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(top_k).map(|(_, m)| m.clone()).collect())
    }

    async fn get_by_id(&self, memory_id: &str) -> MemoryResult<Option<SemanticMemory>> {
        let guard = self.memories.read();
        Ok(guard.1.get(memory_id).map(|&pos| guard.0[pos].clone()))
    }

    async fn get_by_ids(&self, memory_ids: &[String]) -> MemoryResult<Vec<SemanticMemory>> {
        let guard = self.memories.read();
        Ok(memory_ids
            .iter()
            .filter_map(|id| guard.1.get(id).map(|&pos| guard.0[pos].clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemorySemanticStore {
        let s = InMemorySemanticStore::new();
        s.insert_many(vec![
            SemanticMemory::new("a", "alpha", vec![1.0, 0.0]),
            SemanticMemory::new("b", "beta", vec![0.0, 1.0]),
            SemanticMemory::new("c", "gamma", vec![0.7, 0.7]),
        ]);
        s
    }

    #[tokio::test]
    async fn search_ranks_by_cosine() {
        let s = store();
        let hits = s.search(&[1.0, 0.1], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|m| m.memory_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn get_by_ids_keeps_request_order_and_drops_unknown() {
        let s = store();
        let ids = vec!["c".to_string(), "missing".to_string(), "a".to_string()];
        let hits = s.get_by_ids(&ids).await.unwrap();
        let got: Vec<&str> = hits.iter().map(|m| m.memory_id.as_str()).collect();
        assert_eq!(got, vec!["c", "a"]);
        assert!(s.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_replaces_same_id() {
        let s = store();
        s.insert(SemanticMemory::new("a", "alpha v2", vec![1.0, 0.0]));
        assert_eq!(s.len(), 3);
        assert_eq!(s.get_by_id("a").await.unwrap().unwrap().content, "alpha v2");
    }
}
