use std::hash::Hash;

use hashbrown::HashSet;

use super::{BvhTree, NodeId, NodeKind};

impl<K: Copy + Eq + Hash + std::fmt::Debug> BvhTree<K> {
    /// Panics if the tree isn't well-formed.
    ///
    /// Checks the node kinds and parent links, that every node's bounds contain its
    /// children's, that each tree object owns exactly one reachable leaf, and that
    /// no arena slot is leaked.
    pub fn assert_well_formed(&self) {
        let Some(root) = self.root else {
            assert!(self.objects.is_empty());
            assert!(self.leaves.is_empty());
            return;
        };

        let root_node = &self.nodes[root.index()];
        assert_eq!(root_node.kind, NodeKind::Root);
        assert!(root_node.parent.is_none());
        assert!(root_node.object.is_none());
        assert!(
            root_node.left.is_some() || root_node.right.is_none(),
            "root has a right child but no left child"
        );

        let mut visited = HashSet::new();
        let mut leaf_count = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            assert!(visited.insert(id), "Detected loop. Node {id:?} visited twice.");
            let node = &self.nodes[id.index()];

            match node.kind {
                NodeKind::Leaf => {
                    assert!(node.left.is_none() && node.right.is_none());
                    let object = node.object.expect("leaf without object");
                    assert_eq!(node.aabb, object.bounds);
                    assert_eq!(self.leaves.get(&object.user_data), Some(&id));
                    leaf_count += 1;
                }
                NodeKind::Internal => {
                    assert!(node.object.is_none());
                    assert!(
                        node.left.is_some() && node.right.is_some(),
                        "internal node {id:?} with a missing child"
                    );
                }
                NodeKind::Root => assert_eq!(id, root, "second root {id:?}"),
            }

            for child in node.children() {
                let child_node = &self.nodes[child.index()];
                assert_eq!(child_node.parent, Some(id));
                assert!(
                    node.aabb.contains_aabb(&child_node.aabb),
                    "{id:?} {:?} does not contain child {child:?} {:?}",
                    node.aabb,
                    child_node.aabb
                );
                stack.push(child);
            }
        }

        assert_eq!(leaf_count, self.objects.len());
        assert_eq!(self.leaves.len(), self.objects.len());
        for object in &self.objects {
            let leaf: NodeId = self.leaves[&object.user_data];
            assert!(visited.contains(&leaf));
        }
        assert_eq!(visited.len() + self.free_nodes.len(), self.nodes.len());
    }
}
