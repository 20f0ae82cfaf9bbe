use crate::api::types::{NestedNode, NodeId};

use super::block::Block;

/// Depth-first pre-order walk of a fetched subtree.
///
/// The root is the container and is never listed: its children become depth
/// 0 blocks parented to it. That covers both pages and a zoomed-in block.
/// Children are expected in position order, as the store returns them.
pub fn flatten(root: &NestedNode) -> Vec<Block> {
    let mut out = Vec::new();
    for child in &root.children {
        flatten_into(child, &root.id, 0, &mut out);
    }
    out
}

fn flatten_into(node: &NestedNode, parent_id: &NodeId, depth: usize, out: &mut Vec<Block>) {
    out.push(Block {
        node_id: node.id.clone(),
        value: node.value.clone(),
        position: node.position,
        parent_id: parent_id.clone(),
        references: node.references.iter().cloned().collect(),
        depth,
        is_active: false,
    });
    for child in &node.children {
        flatten_into(child, &node.id, depth + 1, out);
    }
}

/// Inverse of [`flatten`]: nests a pre-order block list back under `root`.
/// `root`'s own children are replaced; its other fields are kept.
pub fn rebuild(root: &NestedNode, blocks: &[Block]) -> NestedNode {
    let mut container = NestedNode {
        children: Vec::new(),
        ..root.clone()
    };
    let mut index = 0;
    container.children = collect_level(blocks, &mut index, 0);
    container
}

fn collect_level(blocks: &[Block], index: &mut usize, depth: usize) -> Vec<NestedNode> {
    let mut level = Vec::new();
    while let Some(block) = blocks.get(*index) {
        if block.depth < depth {
            break;
        }
        *index += 1;
        let children = collect_level(blocks, index, depth + 1);
        level.push(NestedNode {
            id: block.node_id.clone(),
            title: None,
            value: block.value.clone(),
            position: block.position,
            references: block.references.iter().cloned().collect(),
            referenced_by: Vec::new(),
            children,
        });
    }
    level
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, value: &str, position: f64, children: Vec<NestedNode>) -> NestedNode {
        NestedNode {
            id: id.into(),
            title: None,
            value: value.into(),
            position,
            references: vec![],
            referenced_by: vec![],
            children,
        }
    }

    fn page(children: Vec<NestedNode>) -> NestedNode {
        NestedNode {
            title: Some("Inbox".into()),
            ..node("page", "", 0.0, children)
        }
    }

    #[test]
    fn page_root_is_excluded() {
        let tree = page(vec![node("a", "A", 1.0, vec![]), node("b", "B", 2.0, vec![])]);
        let blocks = flatten(&tree);
        let ids: Vec<&str> = blocks.iter().map(|b| b.node_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(blocks.iter().all(|b| b.depth == 0));
        assert!(blocks.iter().all(|b| b.parent_id == NodeId::from("page")));
    }

    #[test]
    fn nested_children_are_pre_order_with_parents() {
        let tree = page(vec![
            node(
                "a",
                "A",
                1.0,
                vec![node("a1", "A1", 1.0, vec![node("a1x", "A1x", 1.0, vec![])])],
            ),
            node("b", "B", 2.0, vec![]),
        ]);
        let blocks = flatten(&tree);
        let shape: Vec<(&str, usize, &str)> = blocks
            .iter()
            .map(|b| (b.node_id.as_str(), b.depth, b.parent_id.as_str()))
            .collect();
        assert_eq!(
            shape,
            vec![
                ("a", 0, "page"),
                ("a1", 1, "a"),
                ("a1x", 2, "a1"),
                ("b", 0, "page"),
            ]
        );
        assert!(blocks.iter().all(|b| !b.is_active));
    }

    #[test]
    fn empty_page_flattens_to_empty_list() {
        assert!(flatten(&page(vec![])).is_empty());
    }

    #[test]
    fn zoomed_block_root_lists_only_descendants() {
        let tree = node("a", "A", 1.0, vec![node("a1", "A1", 1.0, vec![])]);
        let blocks = flatten(&tree);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].parent_id, NodeId::from("a"));
        assert_eq!(blocks[0].depth, 0);
    }

    #[test]
    fn references_carry_over() {
        let mut child = node("a", "see [[X]]", 1.0, vec![]);
        child.references = vec!["x".into()];
        let blocks = flatten(&page(vec![child]));
        assert!(blocks[0].references.contains(&NodeId::from("x")));
    }

    #[test]
    fn rebuild_restores_nesting() {
        let tree = page(vec![
            node("a", "A", 1.0, vec![node("a1", "A1", 5.0, vec![])]),
            node("b", "B", 2.0, vec![node("b1", "B1", 1.0, vec![])]),
        ]);
        let rebuilt = rebuild(&tree, &flatten(&tree));
        assert_eq!(rebuilt, tree);
    }
}
