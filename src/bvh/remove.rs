use std::hash::Hash;

use super::{BvhTree, NodeKind};
use crate::error::SpatialIndexError;
use crate::morton::morton_mean;

impl<K: Copy + Eq + Hash> BvhTree<K> {
    /// Removes the object keyed by `key`, whether it is in the tree or only staged.
    ///
    /// The leaf and its parent are spliced out; the sibling takes the parent's place.
    /// Returns [`SpatialIndexError::NotFound`] without touching the tree if the key
    /// is unknown, and [`SpatialIndexError::BrokenLink`] if the links around its
    /// leaf are corrupt.
    pub fn remove(&mut self, key: K) -> Result<(), SpatialIndexError> {
        let Some(leaf) = self.leaf_of(key) else {
            let Some(position) = self.staged.iter().position(|o| o.user_data == key) else {
                return Err(SpatialIndexError::NotFound);
            };
            self.staged.remove(position);
            return Ok(());
        };
        let Some(parent) = self.nodes[leaf.index()].parent else {
            log::error!("leaf {leaf:?} has no parent");
            return Err(SpatialIndexError::BrokenLink);
        };

        if self.nodes[parent.index()].kind == NodeKind::Root {
            let root = &mut self.nodes[parent.index()];
            if root.left == Some(leaf) {
                root.left = root.right.take();
            } else {
                root.right = None;
            }
            let survivor = root.left;
            let morton = survivor
                .map(|s| self.nodes[s.index()].morton)
                .unwrap_or_default();
            self.nodes[parent.index()].morton = morton;
            self.free_node(leaf);
            self.fit_bounds(parent);
        } else {
            let parent_node = &self.nodes[parent.index()];
            let sibling = if parent_node.left == Some(leaf) {
                parent_node.right
            } else {
                parent_node.left
            };
            let (Some(sibling), Some(grandparent)) = (sibling, parent_node.parent) else {
                log::error!("internal node {parent:?} has a missing link");
                return Err(SpatialIndexError::BrokenLink);
            };

            let grandparent_node = &mut self.nodes[grandparent.index()];
            if grandparent_node.left == Some(parent) {
                grandparent_node.left = Some(sibling);
            } else {
                grandparent_node.right = Some(sibling);
            }
            let morton = match (grandparent_node.left, grandparent_node.right) {
                (Some(left), Some(right)) => morton_mean(
                    self.nodes[left.index()].morton,
                    self.nodes[right.index()].morton,
                ),
                (Some(child), None) | (None, Some(child)) => self.nodes[child.index()].morton,
                (None, None) => 0,
            };
            self.nodes[grandparent.index()].morton = morton;
            self.nodes[sibling.index()].parent = Some(grandparent);

            self.free_node(parent);
            self.free_node(leaf);
            self.fit_ancestors(grandparent);
        }

        self.leaves.remove(&key);
        if let Some(position) = self.objects.iter().position(|o| o.user_data == key) {
            self.objects.swap_remove(position);
        }
        self.staged.retain(|o| o.user_data != key);
        log::trace!("removed leaf {leaf:?}");
        Ok(())
    }
}
