use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::try_join_all;

use crate::api::store::GraphStore;
use crate::api::types::NodeId;
use crate::error::Result;
use crate::outline::Block;

use super::pages::get_or_create_by_title;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReferenceTarget {
    Node(NodeId),
    Page(String),
}

/// Targets named in `text`, deduplicated, in order of first appearance:
/// `((id))` and `{{embed: ((id))}}` name nodes; `[[Title]]`, `#[[Title]]`
/// and `#tag` name pages.
pub fn extract_references(text: &str) -> Vec<ReferenceTarget> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut out: Vec<ReferenceTarget> = Vec::new();

    let mut i = 0;
    while i < len {
        if let Some((inner, end)) = delimited(&chars, i, "{{", "}}") {
            if let Some(id) = extract_embed_id(&inner) {
                push_unique(&mut out, ReferenceTarget::Node(id.into()));
            }
            i = end;
            continue;
        }
        if let Some((inner, end)) = delimited(&chars, i, "((", "))") {
            if !inner.trim().is_empty() {
                push_unique(&mut out, ReferenceTarget::Node(inner.trim().into()));
            }
            i = end;
            continue;
        }
        let link_start = if starts_with(&chars, i, "#[[") { i + 1 } else { i };
        if let Some((inner, end)) = delimited(&chars, link_start, "[[", "]]") {
            if !inner.trim().is_empty() {
                push_unique(&mut out, ReferenceTarget::Page(inner.trim().to_string()));
            }
            i = end;
            continue;
        }
        if chars[i] == '#' && (i == 0 || !chars[i - 1].is_alphanumeric()) {
            let tag: String = chars[i + 1..]
                .iter()
                .take_while(|c| is_tag_char(**c))
                .collect();
            if !tag.is_empty() {
                i += 1 + tag.chars().count();
                push_unique(&mut out, ReferenceTarget::Page(tag));
                continue;
            }
        }
        i += 1;
    }
    out
}

fn push_unique(out: &mut Vec<ReferenceTarget>, target: ReferenceTarget) {
    if !out.contains(&target) {
        out.push(target);
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '/')
}

fn starts_with(chars: &[char], at: usize, pattern: &str) -> bool {
    let mut i = at;
    for p in pattern.chars() {
        if chars.get(i) != Some(&p) {
            return false;
        }
        i += 1;
    }
    true
}

/// Text between `open` at `at` and the next `close`, plus the index just past
/// the closing delimiter.
fn delimited(chars: &[char], at: usize, open: &str, close: &str) -> Option<(String, usize)> {
    if !starts_with(chars, at, open) {
        return None;
    }
    let start = at + open.chars().count();
    let close_len = close.chars().count();
    (start..chars.len())
        .find(|&j| starts_with(chars, j, close))
        .map(|j| (chars[start..j].iter().collect(), j + close_len))
}

fn extract_embed_id(inner: &str) -> Option<String> {
    let rest = inner
        .strip_prefix("[[embed]]:")
        .or_else(|| inner.strip_prefix("embed:"))?
        .trim();
    rest.strip_prefix("((")
        .and_then(|s| s.strip_suffix("))"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolves extracted targets to node ids, creating pages that do not exist
/// yet.
pub async fn resolve_targets(
    store: &dyn GraphStore,
    targets: &[ReferenceTarget],
) -> Result<BTreeSet<NodeId>> {
    let lookups = targets.iter().map(|target| async move {
        match target {
            ReferenceTarget::Node(id) => Ok(id.clone()),
            ReferenceTarget::Page(title) => get_or_create_by_title(store, title).await,
        }
    });
    Ok(try_join_all(lookups).await?.into_iter().collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceDiff {
    pub added: BTreeSet<NodeId>,
    pub removed: BTreeSet<NodeId>,
}

impl ReferenceDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub fn diff_references(previous: &BTreeSet<NodeId>, current: &BTreeSet<NodeId>) -> ReferenceDiff {
    ReferenceDiff {
        added: current.difference(previous).cloned().collect(),
        removed: previous.difference(current).cloned().collect(),
    }
}

/// At most one addition call and one removal call. Nothing is sent for an
/// empty side.
pub async fn apply_diff(store: &dyn GraphStore, node_id: &NodeId, diff: &ReferenceDiff) -> Result<()> {
    if !diff.added.is_empty() {
        store.set_references(node_id, &diff.added).await?;
    }
    if !diff.removed.is_empty() {
        store.remove_references(node_id, &diff.removed).await?;
    }
    Ok(())
}

/// Last reference set the store acknowledged for each block. Shared with
/// spawned write tasks.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTracker {
    sets: Arc<Mutex<HashMap<NodeId, BTreeSet<NodeId>>>>,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NodeId, BTreeSet<NodeId>>> {
        self.sets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn seed(&self, blocks: &[Block]) {
        let mut sets = self.lock();
        for block in blocks {
            sets.insert(block.node_id.clone(), block.references.clone());
        }
    }

    pub fn record(&self, node_id: &NodeId, current: BTreeSet<NodeId>) -> ReferenceDiff {
        let previous = self
            .lock()
            .insert(node_id.clone(), current.clone())
            .unwrap_or_default();
        diff_references(&previous, &current)
    }

    pub fn get(&self, node_id: &NodeId) -> BTreeSet<NodeId> {
        self.lock().get(node_id).cloned().unwrap_or_default()
    }

    /// Moves a placeholder's entry to the id the store assigned.
    pub fn rename(&self, placeholder: &NodeId, node_id: &NodeId) {
        let mut sets = self.lock();
        if let Some(set) = sets.remove(placeholder) {
            sets.insert(node_id.clone(), set);
        }
    }

    pub fn forget(&self, node_id: &NodeId) {
        self.lock().remove(node_id);
    }
}

/// One coalesced value write: the text itself, then the reference edge diff.
pub async fn write_value(
    store: &dyn GraphStore,
    tracker: &ReferenceTracker,
    node_id: &NodeId,
    value: &str,
) -> Result<()> {
    store.set_value(node_id, value).await?;
    let current = resolve_targets(store, &extract_references(value)).await?;
    let diff = diff_references(&tracker.get(node_id), &current);
    if !diff.is_empty() {
        tracing::debug!(
            node = %node_id,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "reference diff"
        );
    }
    // A failed edge write leaves the old set in place so the next write
    // diffs against what the store actually holds.
    apply_diff(store, node_id, &diff).await?;
    tracker.record(node_id, current);
    Ok(())
}
