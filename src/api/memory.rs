use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::api::client::SUGGESTION_LIMIT;
use crate::api::store::GraphStore;
use crate::api::types::{
    ContainingPage, NestedNode, NodeId, Position, TitleMatch, TitleQuery, ValueMatch,
};
use crate::error::{OutlineError, Result};

#[derive(Debug, Clone)]
struct StoredNode {
    title: Option<String>,
    value: String,
    position: Position,
    parent_id: Option<NodeId>,
    references: BTreeSet<NodeId>,
}

#[derive(Debug, Default)]
struct Graph {
    nodes: HashMap<NodeId, StoredNode>,
    /// Creation order, used as the traversal order for scans.
    order: Vec<NodeId>,
    titles: HashMap<String, NodeId>,
    next_id: u64,
}

impl Graph {
    fn allocate_id(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId::new(format!("0x{:x}", self.next_id))
    }

    fn insert(&mut self, node: StoredNode) -> NodeId {
        let id = self.allocate_id();
        if let Some(title) = &node.title {
            self.titles.insert(title.clone(), id.clone());
        }
        self.nodes.insert(id.clone(), node);
        self.order.push(id.clone());
        id
    }

    fn get(&self, id: &NodeId) -> Result<&StoredNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| OutlineError::NotFound(id.clone()))
    }

    fn get_mut(&mut self, id: &NodeId) -> Result<&mut StoredNode> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| OutlineError::NotFound(id.clone()))
    }

    fn children_of(&self, id: &NodeId) -> Vec<NodeId> {
        let mut children: Vec<(&NodeId, Position)> = self
            .order
            .iter()
            .filter_map(|child_id| {
                let node = &self.nodes[child_id];
                (node.parent_id.as_ref() == Some(id)).then_some((child_id, node.position))
            })
            .collect();
        children.sort_by(|a, b| a.1.total_cmp(&b.1));
        children.into_iter().map(|(id, _)| id.clone()).collect()
    }

    fn referencing(&self, id: &NodeId) -> Vec<NodeId> {
        self.order
            .iter()
            .filter(|other| self.nodes[*other].references.contains(id))
            .cloned()
            .collect()
    }

    fn nest(&self, id: &NodeId) -> Result<NestedNode> {
        let node = self.get(id)?;
        let children = self
            .children_of(id)
            .iter()
            .map(|child| self.nest(child))
            .collect::<Result<Vec<_>>>()?;
        Ok(NestedNode {
            id: id.clone(),
            title: node.title.clone(),
            value: node.value.clone(),
            position: node.position,
            references: node.references.iter().cloned().collect(),
            referenced_by: self.referencing(id),
            children,
        })
    }
}

/// In-process graph store. Nodes live in an arena keyed by id with parent
/// links; children and inverse references are derived on read.
#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: Mutex<Graph>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Graph>> {
        self.graph
            .lock()
            .map_err(|_| OutlineError::StoreUnavailable("memory store lock poisoned".into()))
    }

    /// Inserts a block with content, bypassing the edit path. Handy for
    /// seeding a graph.
    pub fn insert_block(
        &self,
        parent_id: &NodeId,
        value: &str,
        position: Position,
        references: &[NodeId],
    ) -> Result<NodeId> {
        let mut graph = self.lock()?;
        graph.get(parent_id)?;
        Ok(graph.insert(StoredNode {
            title: None,
            value: value.to_string(),
            position,
            parent_id: Some(parent_id.clone()),
            references: references.iter().cloned().collect(),
        }))
    }

    pub fn value_of(&self, id: &NodeId) -> Option<String> {
        let graph = self.lock().ok()?;
        graph.nodes.get(id).map(|n| n.value.clone())
    }

    pub fn parent_of(&self, id: &NodeId) -> Option<NodeId> {
        let graph = self.lock().ok()?;
        graph.nodes.get(id).and_then(|n| n.parent_id.clone())
    }

    pub fn position_of(&self, id: &NodeId) -> Option<Position> {
        let graph = self.lock().ok()?;
        graph.nodes.get(id).map(|n| n.position)
    }

    pub fn references_of(&self, id: &NodeId) -> BTreeSet<NodeId> {
        self.lock()
            .ok()
            .and_then(|graph| graph.nodes.get(id).map(|n| n.references.clone()))
            .unwrap_or_default()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.lock()
            .map(|graph| graph.nodes.contains_key(id))
            .unwrap_or(false)
    }

    pub fn node_count(&self) -> usize {
        self.lock().map(|graph| graph.nodes.len()).unwrap_or(0)
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn fetch_subtree(&self, node_id: &NodeId) -> Result<NestedNode> {
        self.lock()?.nest(node_id)
    }

    async fn create_node(&self, parent_id: &NodeId, position: Position) -> Result<NodeId> {
        self.insert_block(parent_id, "", position, &[])
    }

    async fn delete_node(&self, node_id: &NodeId) -> Result<()> {
        let mut graph = self.lock()?;
        let node = graph
            .nodes
            .remove(node_id)
            .ok_or_else(|| OutlineError::NotFound(node_id.clone()))?;
        graph.order.retain(|id| id != node_id);
        if let Some(title) = node.title {
            graph.titles.remove(&title);
        }
        Ok(())
    }

    async fn set_value(&self, node_id: &NodeId, value: &str) -> Result<()> {
        self.lock()?.get_mut(node_id)?.value = value.to_string();
        Ok(())
    }

    async fn set_references(&self, node_id: &NodeId, added: &BTreeSet<NodeId>) -> Result<()> {
        let mut graph = self.lock()?;
        graph
            .get_mut(node_id)?
            .references
            .extend(added.iter().cloned());
        Ok(())
    }

    async fn remove_references(
        &self,
        node_id: &NodeId,
        removed: &BTreeSet<NodeId>,
    ) -> Result<()> {
        let mut graph = self.lock()?;
        graph
            .get_mut(node_id)?
            .references
            .retain(|r| !removed.contains(r));
        Ok(())
    }

    async fn set_parent(&self, node_id: &NodeId, parent_id: &NodeId) -> Result<()> {
        let mut graph = self.lock()?;
        graph.get(parent_id)?;
        graph.get_mut(node_id)?.parent_id = Some(parent_id.clone());
        Ok(())
    }

    async fn set_position(&self, node_id: &NodeId, position: Position) -> Result<()> {
        self.lock()?.get_mut(node_id)?.position = position;
        Ok(())
    }

    async fn find_by_title(&self, query: &TitleQuery) -> Result<Vec<TitleMatch>> {
        let graph = self.lock()?;
        let matches = match query {
            TitleQuery::Exact(title) => graph
                .titles
                .get(title)
                .map(|id| TitleMatch {
                    id: id.clone(),
                    title: title.clone(),
                })
                .into_iter()
                .collect(),
            TitleQuery::Pattern(pattern) => {
                let needle = pattern.to_lowercase();
                graph
                    .order
                    .iter()
                    .filter_map(|id| {
                        let title = graph.nodes[id].title.as_ref()?;
                        (title != pattern && title.to_lowercase().contains(&needle)).then(|| {
                            TitleMatch {
                                id: id.clone(),
                                title: title.clone(),
                            }
                        })
                    })
                    .take(SUGGESTION_LIMIT)
                    .collect()
            }
        };
        Ok(matches)
    }

    async fn find_by_value_pattern(&self, pattern: &str) -> Result<Vec<ValueMatch>> {
        let graph = self.lock()?;
        let needle = pattern.to_lowercase();
        Ok(graph
            .order
            .iter()
            .filter_map(|id| {
                let node = &graph.nodes[id];
                (node.title.is_none() && node.value.to_lowercase().contains(&needle)).then(|| {
                    ValueMatch {
                        id: id.clone(),
                        value: node.value.clone(),
                    }
                })
            })
            .take(SUGGESTION_LIMIT)
            .collect())
    }

    async fn create_page(&self, title: &str) -> Result<NodeId> {
        let mut graph = self.lock()?;
        if let Some(existing) = graph.titles.get(title) {
            return Ok(existing.clone());
        }
        Ok(graph.insert(StoredNode {
            title: Some(title.to_string()),
            value: String::new(),
            position: 0.0,
            parent_id: None,
            references: BTreeSet::new(),
        }))
    }

    async fn get_referencing_nodes(&self, node_id: &NodeId) -> Result<Vec<NodeId>> {
        Ok(self.lock()?.referencing(node_id))
    }

    async fn resolve_containing_page(&self, node_id: &NodeId) -> Result<ContainingPage> {
        let graph = self.lock()?;
        let value = graph.get(node_id)?.value.clone();

        let mut current = node_id.clone();
        let mut seen = BTreeSet::new();
        while let Some(parent) = graph.get(&current)?.parent_id.clone() {
            if !seen.insert(current.clone()) {
                return Err(OutlineError::StoreUnavailable(format!(
                    "parent cycle at {}",
                    current
                )));
            }
            current = parent;
        }

        let root = graph.get(&current)?;
        Ok(ContainingPage {
            page_id: current,
            title: root.title.clone().unwrap_or_default(),
            value,
        })
    }
}
