use serde::{Deserialize, Serialize};

use crate::api::types::{NodeId, Position};
use crate::error::{OutlineError, Result};

use super::block::{Block, Outline};

/// Outline transitions. Each one applies completely or fails with
/// [`OutlineError::Invariant`] and leaves the list untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Action {
    SetList { list: Vec<Block> },
    AddBlock { node_id: NodeId, position: Position },
    SetValue { index: usize, value: String },
    SetParent { index: usize, parent_id: NodeId },
    SetPosition { index: usize, position: Position },
    IncreaseDepth { index: usize },
    DecreaseDepth { index: usize },
    SetActive { index: usize },
    DeleteBlock { index: usize },
    ResolveId { placeholder: NodeId, node_id: NodeId },
}

/// Pure form of [`Outline::apply`].
pub fn reduce(outline: &Outline, action: Action) -> Result<Outline> {
    let mut next = outline.clone();
    next.apply(action)?;
    Ok(next)
}

impl Outline {
    pub fn apply(&mut self, action: Action) -> Result<()> {
        match action {
            Action::SetList { list } => {
                self.blocks = list;
            }
            Action::AddBlock { node_id, position } => self.add_block(node_id, position),
            Action::SetValue { index, value } => {
                self.check_index(index)?;
                self.blocks[index].value = value;
            }
            Action::SetParent { index, parent_id } => {
                self.check_index(index)?;
                self.blocks[index].parent_id = parent_id;
            }
            Action::SetPosition { index, position } => {
                self.check_index(index)?;
                self.blocks[index].position = position;
            }
            Action::IncreaseDepth { index } => {
                self.check_index(index)?;
                if index == 0 {
                    return Err(OutlineError::invariant("cannot indent the first block"));
                }
                if self.blocks[index - 1].depth < self.blocks[index].depth {
                    return Err(OutlineError::invariant(format!(
                        "block {} cannot indent past its predecessor",
                        index
                    )));
                }
                self.shift_subtree(index, |depth| depth + 1);
            }
            Action::DecreaseDepth { index } => {
                self.check_index(index)?;
                if self.blocks[index].depth == 0 {
                    return Err(OutlineError::invariant(format!(
                        "block {} is already at depth 0",
                        index
                    )));
                }
                self.shift_subtree(index, |depth| depth - 1);
            }
            Action::SetActive { index } => {
                self.check_index(index)?;
                for block in &mut self.blocks {
                    block.is_active = false;
                }
                self.blocks[index].is_active = true;
            }
            Action::DeleteBlock { index } => {
                if self.blocks.len() <= 1 {
                    return Err(OutlineError::invariant("cannot delete the only block"));
                }
                self.check_index(index)?;
                let removed = self.blocks.remove(index);
                if removed.is_active {
                    let next = index.saturating_sub(1).min(self.blocks.len() - 1);
                    self.blocks[next].is_active = true;
                }
            }
            Action::ResolveId {
                placeholder,
                node_id,
            } => {
                for block in &mut self.blocks {
                    if block.node_id == placeholder {
                        block.node_id = node_id.clone();
                    }
                    if block.parent_id == placeholder {
                        block.parent_id = node_id.clone();
                    }
                }
            }
        }
        Ok(())
    }

    /// New block after the active block's subtree, as its next sibling. With
    /// nothing active it becomes the first top-level block.
    fn add_block(&mut self, node_id: NodeId, position: Position) {
        let (insert_at, parent_id, depth) = match self.active_index() {
            Some(i) => {
                self.blocks[i].is_active = false;
                (
                    self.subtree_end(i),
                    self.blocks[i].parent_id.clone(),
                    self.blocks[i].depth,
                )
            }
            None => (0, self.page_id().clone(), 0),
        };
        let mut block = Block::empty(node_id, parent_id, depth, position);
        block.is_active = true;
        self.blocks.insert(insert_at, block);
    }

    /// Descendants first, then the block itself.
    fn shift_subtree(&mut self, index: usize, shift: impl Fn(usize) -> usize) {
        let end = self.subtree_end(index);
        for block in &mut self.blocks[index + 1..end] {
            block.depth = shift(block.depth);
        }
        self.blocks[index].depth = shift(self.blocks[index].depth);
    }
}
