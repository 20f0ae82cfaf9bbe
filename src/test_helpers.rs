use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::memory::MemoryStore;
use crate::api::store::GraphStore;
use crate::api::types::{
    ContainingPage, NestedNode, NodeId, Position, TitleMatch, TitleQuery, ValueMatch,
};
use crate::error::{OutlineError, Result};
use crate::outline::{Block, Outline};

pub const PAGE: &str = "page";

/// Builds a well-formed outline under [`PAGE`] from `(id, depth)` pairs. Every
/// block gets a distinct increasing position and the last one is active.
pub fn outline(shape: &[(&str, usize)]) -> Outline {
    let mut ancestors: Vec<NodeId> = Vec::new();
    let mut blocks = Vec::with_capacity(shape.len());
    for (i, (id, depth)) in shape.iter().enumerate() {
        ancestors.truncate(*depth);
        let parent_id = ancestors.last().cloned().unwrap_or_else(|| PAGE.into());
        let mut block = Block::empty((*id).into(), parent_id, *depth, (i + 1) as f64 * 100.0);
        block.is_active = i + 1 == shape.len();
        ancestors.push((*id).into());
        blocks.push(block);
    }
    Outline::with_blocks(PAGE.into(), blocks)
}

pub fn depths(outline: &Outline) -> Vec<usize> {
    outline.blocks().iter().map(|b| b.depth).collect()
}

/// A [`MemoryStore`] that records every write and can be told to fail them.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    calls: Mutex<Vec<String>>,
    fail_writes: AtomicBool,
    fail_next: Mutex<Option<String>>,
    create_delay: Mutex<Duration>,
    value_delays: Mutex<HashMap<String, Duration>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_named(&self, name: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split(' ').next() == Some(name))
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fails the next call named `name`, once.
    pub fn fail_next(&self, name: &str) {
        *self.fail_next.lock().unwrap() = Some(name.to_string());
    }

    /// Holds `set_value` calls writing exactly `value` for `delay`.
    pub fn delay_value(&self, value: &str, delay: Duration) {
        self.value_delays
            .lock()
            .unwrap()
            .insert(value.to_string(), delay);
    }

    /// Holds every `create_node` call for `delay` before it reaches the store.
    pub fn delay_creates(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = delay;
    }

    fn record(&self, call: String) -> Result<()> {
        let name = call.split(' ').next().unwrap_or_default().to_string();
        self.calls.lock().unwrap().push(call);
        let mut fail_next = self.fail_next.lock().unwrap();
        if fail_next.as_deref() == Some(name.as_str()) {
            *fail_next = None;
            return Err(OutlineError::StoreUnavailable("connection reset".into()));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OutlineError::StoreUnavailable("connection refused".into()));
        }
        Ok(())
    }
}

fn ids(set: &BTreeSet<NodeId>) -> String {
    set.iter().map(NodeId::as_str).collect::<Vec<_>>().join(",")
}

#[async_trait]
impl GraphStore for RecordingStore {
    async fn fetch_subtree(&self, node_id: &NodeId) -> Result<NestedNode> {
        self.inner.fetch_subtree(node_id).await
    }

    async fn create_node(&self, parent_id: &NodeId, position: Position) -> Result<NodeId> {
        self.record(format!("create_node {}", parent_id))?;
        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.create_node(parent_id, position).await
    }

    async fn delete_node(&self, node_id: &NodeId) -> Result<()> {
        self.record(format!("delete_node {}", node_id))?;
        self.inner.delete_node(node_id).await
    }

    async fn set_value(&self, node_id: &NodeId, value: &str) -> Result<()> {
        self.record(format!("set_value {} {}", node_id, value))?;
        let delay = self.value_delays.lock().unwrap().get(value).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.set_value(node_id, value).await
    }

    async fn set_references(&self, node_id: &NodeId, added: &BTreeSet<NodeId>) -> Result<()> {
        self.record(format!("set_references {} {}", node_id, ids(added)))?;
        self.inner.set_references(node_id, added).await
    }

    async fn remove_references(
        &self,
        node_id: &NodeId,
        removed: &BTreeSet<NodeId>,
    ) -> Result<()> {
        self.record(format!("remove_references {} {}", node_id, ids(removed)))?;
        self.inner.remove_references(node_id, removed).await
    }

    async fn set_parent(&self, node_id: &NodeId, parent_id: &NodeId) -> Result<()> {
        self.record(format!("set_parent {} {}", node_id, parent_id))?;
        self.inner.set_parent(node_id, parent_id).await
    }

    async fn set_position(&self, node_id: &NodeId, position: Position) -> Result<()> {
        self.record(format!("set_position {}", node_id))?;
        self.inner.set_position(node_id, position).await
    }

    async fn find_by_title(&self, query: &TitleQuery) -> Result<Vec<TitleMatch>> {
        self.inner.find_by_title(query).await
    }

    async fn find_by_value_pattern(&self, pattern: &str) -> Result<Vec<ValueMatch>> {
        self.inner.find_by_value_pattern(pattern).await
    }

    async fn create_page(&self, title: &str) -> Result<NodeId> {
        self.record(format!("create_page {}", title))?;
        self.inner.create_page(title).await
    }

    async fn get_referencing_nodes(&self, node_id: &NodeId) -> Result<Vec<NodeId>> {
        self.inner.get_referencing_nodes(node_id).await
    }

    async fn resolve_containing_page(&self, node_id: &NodeId) -> Result<ContainingPage> {
        self.inner.resolve_containing_page(node_id).await
    }
}
