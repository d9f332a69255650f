use std::hash::Hash;

use super::{BvhNode, BvhTree, NodeId};
use crate::morton::{find_split, morton_mean, sort_objects_m64, Morton64, MortonSpace};

impl<K: Copy + Eq + Hash + Send + Sync> BvhTree<K> {
    /// Moves staged objects into the tree and rebuilds it from scratch.
    ///
    /// The Morton normalization is recomputed from the centers of every object, the
    /// codes are radix sorted and the sorted run is split top-down on the highest
    /// differing bit. Bounds are then fit bottom-up.
    #[cfg_attr(feature = "profile", profiling::function)]
    pub fn build(&mut self) {
        crate::scope_print_major!("bvh build");
        self.objects.append(&mut self.staged);

        self.nodes.clear();
        self.free_nodes.clear();
        self.leaves.clear();
        self.nodes.reserve((2 * self.objects.len()).max(1));
        let root = self.alloc_node(BvhNode::root());
        self.root = Some(root);

        if self.objects.is_empty() {
            self.space = None;
            log::debug!("built empty bvh");
            return;
        }

        let space = MortonSpace::from_objects(&self.objects, self.config.scheduler);
        self.space = Some(space);
        let mortons = sort_objects_m64(&self.objects, &space, self.config.scheduler);

        {
            crate::scope_print!("bvh split");
            if let [single] = mortons.as_slice() {
                let leaf = self.build_leaf(root, *single);
                self.nodes[root.index()].left = Some(leaf);
            } else {
                let split = find_split(&mortons);
                let left = self.build_recursive(root, &mortons[..=split]);
                let right = self.build_recursive(root, &mortons[split + 1..]);
                let morton = morton_mean(
                    self.nodes[left.index()].morton,
                    self.nodes[right.index()].morton,
                );
                let node = &mut self.nodes[root.index()];
                node.left = Some(left);
                node.right = Some(right);
                node.morton = morton;
            }
        }

        self.fit_bounds(root);
        log::debug!(
            "built bvh: {} objects, {} nodes, depth {}",
            self.objects.len(),
            self.nodes.len(),
            self.depth()
        );
    }

    fn build_leaf(&mut self, parent: NodeId, morton: Morton64) -> NodeId {
        let object = self.objects[morton.index];
        let leaf = self.alloc_node(BvhNode::leaf(object, morton.code, parent));
        self.leaves.insert(object.user_data, leaf);
        leaf
    }

    /// Builds the subtree for a sorted, non-empty run of codes. Recursion depth is
    /// bounded by the code width plus the midpoint splits of duplicate codes.
    fn build_recursive(&mut self, parent: NodeId, mortons: &[Morton64]) -> NodeId {
        if let [single] = mortons {
            return self.build_leaf(parent, *single);
        }

        // Reserve the slot first so the children can point back at it.
        let id = self.alloc_node(BvhNode::internal(parent, parent, parent, 0));
        let split = find_split(mortons);
        let left = self.build_recursive(id, &mortons[..=split]);
        let right = self.build_recursive(id, &mortons[split + 1..]);
        let morton = morton_mean(
            self.nodes[left.index()].morton,
            self.nodes[right.index()].morton,
        );

        let node = &mut self.nodes[id.index()];
        node.left = Some(left);
        node.right = Some(right);
        node.morton = morton;
        id
    }
}
