use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::api::types::{NodeId, Position};
use crate::error::{OutlineError, Result};

/// One editable line of the outline, in flattened pre-order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub node_id: NodeId,
    pub value: String,
    pub position: Position,
    pub parent_id: NodeId,
    #[serde(default)]
    pub references: BTreeSet<NodeId>,
    pub depth: usize,
    #[serde(default)]
    pub is_active: bool,
}

impl Block {
    pub fn empty(node_id: NodeId, parent_id: NodeId, depth: usize, position: Position) -> Self {
        Self {
            node_id,
            value: String::new(),
            position,
            parent_id,
            references: BTreeSet::new(),
            depth,
            is_active: false,
        }
    }
}

/// What the UI shell needs to draw a block.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    pub id: NodeId,
    pub value: String,
    pub depth: usize,
    pub is_active: bool,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        Self {
            id: block.node_id.clone(),
            value: block.value.clone(),
            depth: block.depth,
            is_active: block.is_active,
        }
    }
}

/// The flat list of one page's blocks. A cached projection of the stored
/// tree, owned by the page session.
#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    page_id: NodeId,
    pub(crate) blocks: Vec<Block>,
}

impl Outline {
    pub fn new(page_id: NodeId) -> Self {
        Self {
            page_id,
            blocks: Vec::new(),
        }
    }

    pub fn with_blocks(page_id: NodeId, blocks: Vec<Block>) -> Self {
        Self { page_id, blocks }
    }

    pub fn page_id(&self) -> &NodeId {
        &self.page_id
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn active_index(&self) -> Option<usize> {
        self.blocks.iter().position(|b| b.is_active)
    }

    pub fn active(&self) -> Option<&Block> {
        self.active_index().map(|i| &self.blocks[i])
    }

    pub fn index_of(&self, node_id: &NodeId) -> Option<usize> {
        self.blocks.iter().position(|b| &b.node_id == node_id)
    }

    pub fn views(&self) -> Vec<BlockView> {
        self.blocks.iter().map(BlockView::from).collect()
    }

    /// End (exclusive) of the contiguous run of descendants following `index`.
    pub(crate) fn subtree_end(&self, index: usize) -> usize {
        let depth = self.blocks[index].depth;
        let mut end = index + 1;
        while end < self.blocks.len() && self.blocks[end].depth > depth {
            end += 1;
        }
        end
    }

    /// Index of the next block at the same depth under the same parent, if the
    /// sibling run continues past `index`'s subtree.
    pub(crate) fn next_sibling(&self, index: usize) -> Option<usize> {
        let end = self.subtree_end(index);
        self.blocks
            .get(end)
            .filter(|b| b.depth == self.blocks[index].depth)
            .map(|_| end)
    }

    /// Parent a block at `index` would have if it sat at `depth`: the nearest
    /// preceding block one level up, or the page itself at depth 0.
    pub(crate) fn parent_for_depth(&self, index: usize, depth: usize) -> NodeId {
        if depth == 0 {
            return self.page_id.clone();
        }
        self.blocks[..index]
            .iter()
            .rev()
            .find(|b| b.depth == depth - 1)
            .map(|b| b.node_id.clone())
            .unwrap_or_else(|| self.page_id.clone())
    }

    pub(crate) fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.blocks.len() {
            return Err(OutlineError::invariant(format!(
                "index {} out of range (len {})",
                index,
                self.blocks.len()
            )));
        }
        Ok(())
    }

    /// Verifies single focus, depth contiguity, parent links and sibling
    /// ordering over the whole list.
    pub fn check_invariants(&self) -> Result<()> {
        let active = self.blocks.iter().filter(|b| b.is_active).count();
        if active > 1 || (active == 0 && !self.blocks.is_empty()) {
            return Err(OutlineError::invariant(format!(
                "{} active blocks in a list of {}",
                active,
                self.blocks.len()
            )));
        }

        let mut last_position: HashMap<&NodeId, Position> = HashMap::new();
        let mut ancestors: Vec<&NodeId> = Vec::new();
        for (i, block) in self.blocks.iter().enumerate() {
            let max_depth = if i == 0 { 0 } else { self.blocks[i - 1].depth + 1 };
            if block.depth > max_depth {
                return Err(OutlineError::invariant(format!(
                    "block {} jumps to depth {} (max {})",
                    i, block.depth, max_depth
                )));
            }

            ancestors.truncate(block.depth);
            let expected = ancestors.last().copied().unwrap_or(&self.page_id);
            if &block.parent_id != expected {
                return Err(OutlineError::invariant(format!(
                    "block {} has parent {} but sits under {}",
                    i, block.parent_id, expected
                )));
            }
            ancestors.push(&block.node_id);

            if let Some(prev) = last_position.insert(&block.parent_id, block.position) {
                if block.position <= prev {
                    return Err(OutlineError::invariant(format!(
                        "block {} position {} does not follow sibling position {}",
                        i, block.position, prev
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{outline, PAGE};

    #[test]
    fn subtree_end_covers_deeper_run() {
        let o = outline(&[("a", 0), ("b", 1), ("c", 2), ("d", 1), ("e", 0)]);
        assert_eq!(o.subtree_end(0), 4);
        assert_eq!(o.subtree_end(1), 3);
        assert_eq!(o.subtree_end(4), 5);
    }

    #[test]
    fn next_sibling_skips_descendants() {
        let o = outline(&[("a", 0), ("b", 1), ("c", 0)]);
        assert_eq!(o.next_sibling(0), Some(2));
        assert_eq!(o.next_sibling(1), None);
        assert_eq!(o.next_sibling(2), None);
    }

    #[test]
    fn parent_for_depth_walks_back() {
        let o = outline(&[("a", 0), ("b", 1), ("c", 2), ("d", 1)]);
        assert_eq!(o.parent_for_depth(3, 1), NodeId::from("a"));
        assert_eq!(o.parent_for_depth(3, 2), NodeId::from("b"));
        assert_eq!(o.parent_for_depth(3, 0), NodeId::from(PAGE));
    }

    #[test]
    fn built_outline_satisfies_invariants() {
        let o = outline(&[("a", 0), ("b", 1), ("c", 2), ("d", 0)]);
        assert!(o.check_invariants().is_ok());
    }

    #[test]
    fn detects_depth_jump() {
        let mut o = outline(&[("a", 0), ("b", 1)]);
        o.blocks[1].depth = 2;
        let err = o.check_invariants().unwrap_err();
        assert!(err.to_string().contains("jumps to depth"));
    }

    #[test]
    fn detects_two_active_blocks() {
        let mut o = outline(&[("a", 0), ("b", 0)]);
        o.blocks[0].is_active = true;
        o.blocks[1].is_active = true;
        assert!(o.check_invariants().is_err());
    }

    #[test]
    fn detects_wrong_parent() {
        let mut o = outline(&[("a", 0), ("b", 1)]);
        o.blocks[1].parent_id = NodeId::from(PAGE);
        assert!(o.check_invariants().is_err());
    }

    #[test]
    fn detects_unordered_siblings() {
        let mut o = outline(&[("a", 0), ("b", 0)]);
        o.blocks[1].position = o.blocks[0].position;
        assert!(o.check_invariants().is_err());
    }

    #[test]
    fn views_expose_render_fields() {
        let o = outline(&[("a", 0), ("b", 1)]);
        let views = o.views();
        assert_eq!(views[1].id, NodeId::from("b"));
        assert_eq!(views[1].depth, 1);
        assert!(views[1].is_active);
    }
}
