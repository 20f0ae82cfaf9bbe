use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::api::types::{
    ContainingPage, NestedNode, NodeId, Position, TitleMatch, TitleQuery, ValueMatch,
};
use crate::error::Result;

/// The persistent graph store the outline synchronizes with.
///
/// Writes are not assumed to be visible to a subsequent read. Callers keep their
/// own optimistic view and treat the store as eventually consistent.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Full recursive descendant fetch. Children are ordered by position and
    /// carry their inverse reference edges.
    async fn fetch_subtree(&self, node_id: &NodeId) -> Result<NestedNode>;

    async fn create_node(&self, parent_id: &NodeId, position: Position) -> Result<NodeId>;

    /// Removes the node and all of its outgoing edges.
    async fn delete_node(&self, node_id: &NodeId) -> Result<()>;

    async fn set_value(&self, node_id: &NodeId, value: &str) -> Result<()>;

    async fn set_references(&self, node_id: &NodeId, added: &BTreeSet<NodeId>) -> Result<()>;

    async fn remove_references(&self, node_id: &NodeId, removed: &BTreeSet<NodeId>)
        -> Result<()>;

    async fn set_parent(&self, node_id: &NodeId, parent_id: &NodeId) -> Result<()>;

    async fn set_position(&self, node_id: &NodeId, position: Position) -> Result<()>;

    async fn find_by_title(&self, query: &TitleQuery) -> Result<Vec<TitleMatch>>;

    async fn find_by_value_pattern(&self, pattern: &str) -> Result<Vec<ValueMatch>>;

    /// Creates a page with `title` unless one already exists, returning the id
    /// of whichever page holds the title afterwards. Implementations must make
    /// the check and the insert atomic.
    async fn create_page(&self, title: &str) -> Result<NodeId>;

    async fn get_referencing_nodes(&self, node_id: &NodeId) -> Result<Vec<NodeId>>;

    async fn resolve_containing_page(&self, node_id: &NodeId) -> Result<ContainingPage>;
}
