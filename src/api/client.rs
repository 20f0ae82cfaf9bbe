use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::store::GraphStore;
use crate::api::types::{
    ContainingPage, NestedNode, NewPage, NodeId, NodeLocation, NodeRef, Position, PullRequest,
    PullResponse, QueryResponse, ReadQuery, TitleMatch, TitleQuery, ValueMatch, ValueUpdate,
    WriteAction, WriteResponse,
};
use crate::error::{OutlineError, Result};

pub const SUGGESTION_LIMIT: usize = 5;

/// Graph store reached over a JSON HTTP endpoint with `/pull`, `/q` and
/// `/write` routes.
#[derive(Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpStore {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub async fn pull(&self, node_id: &NodeId) -> Result<PullResponse> {
        let req = PullRequest {
            node_id: node_id.clone(),
        };
        let resp = self.post("pull", &req).await?;
        Ok(resp.json::<PullResponse>().await?)
    }

    pub async fn query<T: DeserializeOwned>(&self, query: ReadQuery) -> Result<T> {
        let resp = self.post("q", &query).await?;
        let body = resp.json::<QueryResponse>().await?;
        Ok(serde_json::from_value(body.result)?)
    }

    pub async fn write(&self, action: WriteAction) -> Result<WriteResponse> {
        let resp = self.post("write", &action).await?;
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(WriteResponse::default());
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn post<B: Serialize>(&self, route: &str, body: &B) -> Result<Response> {
        let resp = self
            .client
            .post(format!("{}/{}", self.base_url, route))
            .header("X-Authorization", format!("Bearer {}", self.token))
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(OutlineError::Api { status, message });
        }
        Ok(resp)
    }

    async fn write_created(&self, action: WriteAction) -> Result<NodeId> {
        self.write(action).await?.id.ok_or_else(|| {
            OutlineError::StoreUnavailable("store did not return an id for the new node".into())
        })
    }
}

#[async_trait]
impl GraphStore for HttpStore {
    async fn fetch_subtree(&self, node_id: &NodeId) -> Result<NestedNode> {
        Ok(self.pull(node_id).await?.result)
    }

    async fn create_node(&self, parent_id: &NodeId, position: Position) -> Result<NodeId> {
        self.write_created(WriteAction::CreateNode {
            location: NodeLocation {
                parent_id: parent_id.clone(),
                position,
            },
        })
        .await
    }

    async fn delete_node(&self, node_id: &NodeId) -> Result<()> {
        self.write(WriteAction::DeleteNode {
            node: NodeRef {
                id: node_id.clone(),
            },
        })
        .await?;
        Ok(())
    }

    async fn set_value(&self, node_id: &NodeId, value: &str) -> Result<()> {
        self.write(WriteAction::UpdateValue {
            node: ValueUpdate {
                id: node_id.clone(),
                value: value.to_string(),
            },
        })
        .await?;
        Ok(())
    }

    async fn set_references(&self, node_id: &NodeId, added: &BTreeSet<NodeId>) -> Result<()> {
        self.write(WriteAction::AddReferences {
            node: NodeRef {
                id: node_id.clone(),
            },
            references: added.iter().cloned().collect(),
        })
        .await?;
        Ok(())
    }

    async fn remove_references(
        &self,
        node_id: &NodeId,
        removed: &BTreeSet<NodeId>,
    ) -> Result<()> {
        self.write(WriteAction::RemoveReferences {
            node: NodeRef {
                id: node_id.clone(),
            },
            references: removed.iter().cloned().collect(),
        })
        .await?;
        Ok(())
    }

    async fn set_parent(&self, node_id: &NodeId, parent_id: &NodeId) -> Result<()> {
        self.write(WriteAction::MoveNode {
            node: NodeRef {
                id: node_id.clone(),
            },
            parent_id: parent_id.clone(),
        })
        .await?;
        Ok(())
    }

    async fn set_position(&self, node_id: &NodeId, position: Position) -> Result<()> {
        self.write(WriteAction::SetPosition {
            node: NodeRef {
                id: node_id.clone(),
            },
            position,
        })
        .await?;
        Ok(())
    }

    async fn find_by_title(&self, query: &TitleQuery) -> Result<Vec<TitleMatch>> {
        let query = match query {
            TitleQuery::Exact(title) => ReadQuery::FindByTitle {
                title: title.clone(),
                exact: true,
                limit: None,
            },
            TitleQuery::Pattern(pattern) => ReadQuery::FindByTitle {
                title: pattern.clone(),
                exact: false,
                limit: Some(SUGGESTION_LIMIT),
            },
        };
        self.query(query).await
    }

    async fn find_by_value_pattern(&self, pattern: &str) -> Result<Vec<ValueMatch>> {
        self.query(ReadQuery::FindByValue {
            pattern: pattern.to_string(),
            limit: Some(SUGGESTION_LIMIT),
        })
        .await
    }

    async fn create_page(&self, title: &str) -> Result<NodeId> {
        self.write_created(WriteAction::CreatePage {
            page: NewPage {
                title: title.to_string(),
                if_absent: true,
            },
        })
        .await
    }

    async fn get_referencing_nodes(&self, node_id: &NodeId) -> Result<Vec<NodeId>> {
        let rows: Vec<NodeRow> = self
            .query(ReadQuery::ReferencingNodes {
                node_id: node_id.clone(),
            })
            .await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    async fn resolve_containing_page(&self, node_id: &NodeId) -> Result<ContainingPage> {
        let page: Option<ContainingPage> = self
            .query(ReadQuery::ContainingPage {
                node_id: node_id.clone(),
            })
            .await?;
        page.ok_or_else(|| OutlineError::NotFound(node_id.clone()))
    }
}

#[derive(serde::Deserialize)]
struct NodeRow {
    id: NodeId,
}
