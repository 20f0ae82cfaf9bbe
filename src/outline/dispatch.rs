use crate::api::types::{NodeId, Position};
use crate::error::{OutlineError, Result};

use super::block::Outline;
use super::position::PositionAllocator;
use super::reducer::Action;

/// Structural edit gestures the shell forwards from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    Split,
    MergeDelete,
    NavigateUp,
    NavigateDown,
    Indent,
    Outdent,
}

impl Gesture {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "split" => Some(Self::Split),
            "merge_delete" => Some(Self::MergeDelete),
            "navigate_up" | "move_up" => Some(Self::NavigateUp),
            "navigate_down" | "move_down" => Some(Self::NavigateDown),
            "indent" => Some(Self::Indent),
            "outdent" | "unindent" => Some(Self::Outdent),
            _ => None,
        }
    }

    pub fn hint_text(&self) -> &'static str {
        match self {
            Self::Split => "new block",
            Self::MergeDelete => "delete empty block",
            Self::NavigateUp => "up",
            Self::NavigateDown => "down",
            Self::Indent => "indent",
            Self::Outdent => "outdent",
        }
    }
}

/// Store work requested by an edit. The outline has already changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CreateNode {
        placeholder: NodeId,
        parent_id: NodeId,
        position: Position,
    },
    DeleteNode {
        node_id: NodeId,
    },
    /// Debounced write of the block's current value and references.
    PersistValue {
        node_id: NodeId,
    },
    /// Debounced write of the block's current parent and position.
    PersistStructure {
        node_id: NodeId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied(Vec<Effect>),
    /// The gesture does not apply here; the shell should treat the key as
    /// ordinary text input.
    Ignored,
}

/// Turns gestures into reducer actions plus store effects. All outline
/// changes happen synchronously inside these calls.
#[derive(Debug)]
pub struct Editor {
    outline: Outline,
    positions: PositionAllocator,
}

impl Editor {
    pub fn new(outline: Outline) -> Self {
        Self {
            outline,
            positions: PositionAllocator::new(),
        }
    }

    pub fn outline(&self) -> &Outline {
        &self.outline
    }

    /// A fresh key for a block with no siblings yet.
    pub fn first_position(&mut self) -> Position {
        self.positions.append(None)
    }

    pub fn dispatch(&mut self, action: Action) -> Result<()> {
        tracing::debug!(?action, "dispatch");
        self.outline.apply(action)
    }

    pub fn handle(&mut self, gesture: Gesture) -> Result<Outcome> {
        match gesture {
            Gesture::Split => self.split(),
            Gesture::MergeDelete => self.merge_delete(),
            Gesture::NavigateUp => self.navigate(false),
            Gesture::NavigateDown => self.navigate(true),
            Gesture::Indent => self.indent(),
            Gesture::Outdent => self.outdent(),
        }
    }

    pub fn edit_value(&mut self, index: usize, value: String) -> Result<Vec<Effect>> {
        self.dispatch(Action::SetValue { index, value })?;
        let node_id = self.outline.blocks()[index].node_id.clone();
        Ok(vec![Effect::PersistValue { node_id }])
    }

    pub fn focus(&mut self, index: usize) -> Result<()> {
        self.dispatch(Action::SetActive { index })
    }

    /// Key for a block slotted after `prev` and before the sibling at `next`.
    /// When no float fits between them, the sibling run from `next` onwards
    /// is re-keyed after the new slot and returned for persisting.
    fn slot(
        &mut self,
        prev: Option<Position>,
        next: Option<usize>,
    ) -> (Position, Vec<(NodeId, Position)>) {
        let next_position = next.map(|j| self.outline.blocks()[j].position);
        if let Some(position) = self.positions.allocate(prev, next_position) {
            return (position, Vec::new());
        }

        let position = self.positions.append(prev);
        let mut last = position;
        let mut rekeyed = Vec::new();
        let mut cursor = next;
        while let Some(j) = cursor {
            last = self.positions.append(Some(last));
            rekeyed.push((self.outline.blocks()[j].node_id.clone(), last));
            cursor = self.outline.next_sibling(j);
        }
        tracing::debug!(count = rekeyed.len(), "re-keyed siblings");
        (position, rekeyed)
    }

    fn apply_rekeys(
        &mut self,
        rekeyed: Vec<(NodeId, Position)>,
        effects: &mut Vec<Effect>,
    ) -> Result<()> {
        for (node_id, position) in rekeyed {
            let index = self.outline.index_of(&node_id).ok_or_else(|| {
                OutlineError::invariant(format!("re-keyed block {} is gone", node_id))
            })?;
            self.dispatch(Action::SetPosition { index, position })?;
            effects.push(Effect::PersistStructure { node_id });
        }
        Ok(())
    }

    fn split(&mut self) -> Result<Outcome> {
        let (parent_id, (position, rekeyed)) = match self.outline.active_index() {
            Some(i) => {
                let active = &self.outline.blocks()[i];
                let (parent_id, prev) = (active.parent_id.clone(), active.position);
                let next = self.outline.next_sibling(i);
                (parent_id, self.slot(Some(prev), next))
            }
            None => {
                let first = (!self.outline.is_empty()).then_some(0);
                let page_id = self.outline.page_id().clone();
                (page_id, self.slot(None, first))
            }
        };

        let placeholder = NodeId::placeholder();
        self.dispatch(Action::AddBlock {
            node_id: placeholder.clone(),
            position,
        })?;
        let mut effects = vec![Effect::CreateNode {
            placeholder,
            parent_id,
            position,
        }];
        self.apply_rekeys(rekeyed, &mut effects)?;
        Ok(Outcome::Applied(effects))
    }

    fn merge_delete(&mut self) -> Result<Outcome> {
        let Some(i) = self.outline.active_index() else {
            return Ok(Outcome::Ignored);
        };
        let block = &self.outline.blocks()[i];
        let has_children = self.outline.subtree_end(i) > i + 1;
        if self.outline.len() <= 1 || !block.value.is_empty() || has_children {
            return Ok(Outcome::Ignored);
        }

        let node_id = block.node_id.clone();
        self.dispatch(Action::DeleteBlock { index: i })?;
        self.dispatch(Action::SetActive {
            index: i.saturating_sub(1),
        })?;
        Ok(Outcome::Applied(vec![Effect::DeleteNode { node_id }]))
    }

    fn navigate(&mut self, down: bool) -> Result<Outcome> {
        let count = self.outline.len();
        if count <= 1 {
            return Ok(Outcome::Applied(Vec::new()));
        }
        let index = match self.outline.active_index() {
            Some(i) if down => (i + 1) % count,
            Some(i) => (count + i - 1) % count,
            None => 0,
        };
        self.dispatch(Action::SetActive { index })?;
        Ok(Outcome::Applied(Vec::new()))
    }

    fn indent(&mut self) -> Result<Outcome> {
        let Some(i) = self.outline.active_index() else {
            return Ok(Outcome::Ignored);
        };
        if i == 0 {
            return Ok(Outcome::Ignored);
        }
        let blocks = self.outline.blocks();
        let depth = blocks[i].depth;
        if blocks[i - 1].depth < depth {
            return Ok(Outcome::Ignored);
        }

        // Against the pre-edit list: the new parent is the previous sibling and
        // the block lands after that sibling's existing children.
        let new_parent = self.outline.parent_for_depth(i, depth + 1);
        let last_child = blocks[..i]
            .iter()
            .rev()
            .take_while(|b| b.node_id != new_parent)
            .find(|b| b.depth == depth + 1)
            .map(|b| b.position);
        let node_id = blocks[i].node_id.clone();
        let position = self.positions.append(last_child);

        self.dispatch(Action::IncreaseDepth { index: i })?;
        self.dispatch(Action::SetParent {
            index: i,
            parent_id: new_parent,
        })?;
        self.dispatch(Action::SetPosition { index: i, position })?;
        Ok(Outcome::Applied(vec![Effect::PersistStructure { node_id }]))
    }

    fn outdent(&mut self) -> Result<Outcome> {
        let Some(i) = self.outline.active_index() else {
            return Ok(Outcome::Ignored);
        };
        let blocks = self.outline.blocks();
        let depth = blocks[i].depth;
        if depth == 0 {
            return Ok(Outcome::Ignored);
        }

        let node_id = blocks[i].node_id.clone();
        let new_parent = self.outline.parent_for_depth(i, depth - 1);
        let old_parent_position = blocks[..i]
            .iter()
            .rev()
            .find(|b| b.depth == depth - 1)
            .map(|b| b.position);

        // Later siblings inside the old parent are adopted by the block so the
        // list order stays a valid pre-order walk.
        let end = self.outline.subtree_end(i);
        let mut after = end;
        let mut adopted = Vec::new();
        while after < blocks.len() && blocks[after].depth >= depth {
            if blocks[after].depth == depth {
                adopted.push(after);
            }
            after += 1;
        }
        let old_parent_next = blocks
            .get(after)
            .filter(|b| b.depth == depth - 1)
            .map(|_| after);
        let last_own_child = blocks[i + 1..end]
            .iter()
            .rev()
            .find(|b| b.depth == depth + 1)
            .map(|b| b.position);
        let rekey_adopted = match (last_own_child, adopted.first()) {
            (Some(last), Some(&first)) => blocks[first].position <= last,
            _ => false,
        };

        let (position, rekeyed) = self.slot(old_parent_position, old_parent_next);

        self.dispatch(Action::DecreaseDepth { index: i })?;
        self.dispatch(Action::SetParent {
            index: i,
            parent_id: new_parent,
        })?;
        self.dispatch(Action::SetPosition { index: i, position })?;

        let mut effects = vec![Effect::PersistStructure { node_id: node_id.clone() }];
        let mut prev = last_own_child;
        for index in adopted {
            self.dispatch(Action::SetParent {
                index,
                parent_id: node_id.clone(),
            })?;
            if rekey_adopted {
                let position = self.positions.append(prev);
                self.dispatch(Action::SetPosition { index, position })?;
                prev = Some(position);
            }
            effects.push(Effect::PersistStructure {
                node_id: self.outline.blocks()[index].node_id.clone(),
            });
        }
        self.apply_rekeys(rekeyed, &mut effects)?;
        Ok(Outcome::Applied(effects))
    }
}
