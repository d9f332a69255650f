use std::hash::Hash;

use super::{BvhNode, BvhTree, NodeId, NodeKind};
use crate::morton::{morton_mean, MortonSpace};
use crate::SceneObject;

impl<K: Copy + Eq + Hash + Send + Sync> BvhTree<K> {
    /// Inserts the staged objects one by one next to their nearest Morton neighbour,
    /// then refits the bounds of the whole tree once.
    ///
    /// Cheaper than [`BvhTree::build`] for a few new objects, but the tree quality
    /// degrades over time and the normalization is not recomputed: objects outside
    /// the extent seen by the last build get clamped codes.
    #[cfg_attr(feature = "profile", profiling::function)]
    pub fn refit(&mut self) {
        crate::scope_print_major!("bvh refit");
        let root = match self.root {
            Some(root) => root,
            None => {
                let root = self.alloc_node(BvhNode::root());
                self.root = Some(root);
                root
            }
        };

        let first_new = self.objects.len();
        self.objects.append(&mut self.staged);

        if self.space.is_none() && !self.objects.is_empty() {
            self.space = Some(MortonSpace::from_objects(
                &self.objects,
                self.config.scheduler,
            ));
        }

        if let Some(space) = self.space {
            for i in first_new..self.objects.len() {
                let object = self.objects[i];
                self.insert_leaf(object, &space);
            }
        }

        self.fit_bounds(root);
        log::debug!(
            "refit bvh: {} inserted, {} objects total",
            self.objects.len() - first_new,
            self.objects.len()
        );
    }

    fn insert_leaf(&mut self, object: SceneObject<K>, space: &MortonSpace) {
        let Some(root) = self.root else {
            return;
        };
        let center = object.bounds.center();
        if !space.covers(center) {
            log::debug!(
                "inserted object center {center} lies outside the morton normalization extent"
            );
        }
        let code = space.encode(center);
        let leaf = self.alloc_node(BvhNode::leaf(object, code, root));
        self.leaves.insert(object.user_data, leaf);

        let root_node = &self.nodes[root.index()];
        match (root_node.left, root_node.right) {
            (None, _) => {
                let node = &mut self.nodes[root.index()];
                node.left = Some(leaf);
                node.morton = code;
            }
            (Some(left), None) => {
                let left_code = self.nodes[left.index()].morton;
                let node = &mut self.nodes[root.index()];
                if code < left_code {
                    node.left = Some(leaf);
                    node.right = Some(left);
                } else {
                    node.right = Some(leaf);
                }
                node.morton = morton_mean(code, left_code);
            }
            (Some(_), Some(_)) => self.insert_below(root, leaf, code),
        }
        log::trace!("inserted leaf {leaf:?} with code {code:#x}");
    }

    /// Descends from `root` towards `code` and splices `leaf` in beside the
    /// larger-coded child of the node where the descent stops.
    fn insert_below(&mut self, root: NodeId, leaf: NodeId, code: u64) {
        let mut parent = root;
        loop {
            let node = &self.nodes[parent.index()];
            let next = if code < node.morton {
                node.left
            } else {
                node.right
            };
            match next {
                Some(child) if self.nodes[child.index()].kind == NodeKind::Internal => {
                    parent = child;
                }
                _ => break,
            }
        }

        let node = &self.nodes[parent.index()];
        let (Some(left), Some(right)) = (node.left, node.right) else {
            debug_assert!(false, "descent stopped at a node with a missing child");
            return;
        };
        let displaced = if self.nodes[left.index()].morton > self.nodes[right.index()].morton {
            left
        } else {
            right
        };
        let displaced_code = self.nodes[displaced.index()].morton;
        let (first, second) = if code < displaced_code {
            (leaf, displaced)
        } else {
            (displaced, leaf)
        };

        let internal = self.alloc_node(BvhNode::internal(
            parent,
            first,
            second,
            morton_mean(code, displaced_code),
        ));
        self.nodes[internal.index()].aabb = self.nodes[first.index()]
            .aabb
            .union(&self.nodes[second.index()].aabb);
        self.nodes[first.index()].parent = Some(internal);
        self.nodes[second.index()].parent = Some(internal);

        let parent_node = &mut self.nodes[parent.index()];
        if parent_node.left == Some(displaced) {
            parent_node.left = Some(internal);
        } else {
            parent_node.right = Some(internal);
        }
        let (Some(left), Some(right)) = (parent_node.left, parent_node.right) else {
            return;
        };
        let morton = morton_mean(
            self.nodes[left.index()].morton,
            self.nodes[right.index()].morton,
        );
        self.nodes[parent.index()].morton = morton;
    }
}
