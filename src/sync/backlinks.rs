use std::collections::{BTreeMap, BTreeSet};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::api::store::GraphStore;
use crate::api::types::NodeId;
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BacklinkScope {
    /// Only blocks that mention the node themselves.
    #[default]
    Direct,
    /// Also blocks that mention a referencing block, and so on.
    Transitive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklinkRef {
    pub id: NodeId,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklinkGroup {
    pub page_id: NodeId,
    pub page_title: String,
    pub references: Vec<BacklinkRef>,
}

pub type Backlinks = BTreeMap<NodeId, BacklinkGroup>;

/// Blocks referencing `node_id`, grouped by containing page. Within a group
/// references keep the store's traversal order.
pub async fn find_backlinks(
    store: &dyn GraphStore,
    node_id: &NodeId,
    scope: BacklinkScope,
) -> Result<Backlinks> {
    let sources = referencing_nodes(store, node_id, scope).await?;
    let pages = try_join_all(sources.iter().map(|id| store.resolve_containing_page(id))).await?;

    let mut groups = Backlinks::new();
    for (id, page) in sources.into_iter().zip(pages) {
        groups
            .entry(page.page_id.clone())
            .or_insert_with(|| BacklinkGroup {
                page_id: page.page_id,
                page_title: page.title,
                references: Vec::new(),
            })
            .references
            .push(BacklinkRef {
                id,
                value: page.value,
            });
    }
    tracing::debug!(node = %node_id, pages = groups.len(), "backlinks resolved");
    Ok(groups)
}

/// Breadth-first over reverse edges. Each node is reported once, and the
/// target itself never is, so reference cycles terminate.
async fn referencing_nodes(
    store: &dyn GraphStore,
    node_id: &NodeId,
    scope: BacklinkScope,
) -> Result<Vec<NodeId>> {
    let mut seen: BTreeSet<NodeId> = BTreeSet::from([node_id.clone()]);
    let mut found = Vec::new();
    let mut frontier = vec![node_id.clone()];

    while !frontier.is_empty() {
        let levels =
            try_join_all(frontier.iter().map(|id| store.get_referencing_nodes(id))).await?;
        frontier = levels
            .into_iter()
            .flatten()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        found.extend(frontier.iter().cloned());
        if scope == BacklinkScope::Direct {
            break;
        }
    }
    Ok(found)
}
