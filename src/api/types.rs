use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Sibling ordering key. Only the relative order among siblings matters.
pub type Position = f64;

const PLACEHOLDER_PREFIX: &str = "tmp-";

static PLACEHOLDER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Opaque, store-assigned node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Local id for an optimistic block whose store id has not arrived yet.
    pub fn placeholder() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seq = PLACEHOLDER_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}{:x}-{}", PLACEHOLDER_PREFIX, nanos, seq))
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A node as returned by a recursive subtree fetch. Children arrive ordered
/// ascending by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedNode {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub references: Vec<NodeId>,
    #[serde(default)]
    pub referenced_by: Vec<NodeId>,
    #[serde(default)]
    pub children: Vec<NestedNode>,
}

impl NestedNode {
    pub fn is_page(&self) -> bool {
        self.title.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleMatch {
    pub id: NodeId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueMatch {
    pub id: NodeId,
    pub value: String,
}

/// Page that (transitively) contains a node, plus the node's own value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainingPage {
    pub page_id: NodeId,
    pub title: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TitleQuery {
    Exact(String),
    /// Case-insensitive substring match, excluding the exact title.
    Pattern(String),
}

// --- Wire format of the HTTP store ---

#[derive(Debug, Serialize)]
pub struct PullRequest {
    #[serde(rename = "node-id")]
    pub node_id: NodeId,
}

#[derive(Debug, Deserialize)]
pub struct PullResponse {
    pub result: NestedNode,
}

#[derive(Debug, Serialize)]
#[serde(tag = "query", rename_all = "kebab-case")]
pub enum ReadQuery {
    FindByTitle {
        title: String,
        exact: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    FindByValue {
        pattern: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    ReferencingNodes {
        #[serde(rename = "node-id")]
        node_id: NodeId,
    },
    ContainingPage {
        #[serde(rename = "node-id")]
        node_id: NodeId,
    },
}

#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    pub result: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum WriteAction {
    CreateNode { location: NodeLocation },
    CreatePage { page: NewPage },
    DeleteNode { node: NodeRef },
    UpdateValue { node: ValueUpdate },
    AddReferences { node: NodeRef, references: Vec<NodeId> },
    RemoveReferences { node: NodeRef, references: Vec<NodeId> },
    MoveNode {
        node: NodeRef,
        #[serde(rename = "parent-id")]
        parent_id: NodeId,
    },
    SetPosition { node: NodeRef, position: Position },
}

#[derive(Debug, Serialize)]
pub struct NodeLocation {
    #[serde(rename = "parent-id")]
    pub parent_id: NodeId,
    pub position: Position,
}

#[derive(Debug, Serialize)]
pub struct NewPage {
    pub title: String,
    #[serde(rename = "if-absent")]
    pub if_absent: bool,
}

#[derive(Debug, Serialize)]
pub struct NodeRef {
    pub id: NodeId,
}

#[derive(Debug, Serialize)]
pub struct ValueUpdate {
    pub id: NodeId,
    pub value: String,
}

/// Body of a successful write. Only creations carry an id.
#[derive(Debug, Default, Deserialize)]
pub struct WriteResponse {
    #[serde(default)]
    pub id: Option<NodeId>,
}
