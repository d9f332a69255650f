use std::hash::Hash;

use super::{BvhTree, NodeId};
use crate::{
    frustum::Frustum,
    ray::{Ray, RayHit},
};

/// Reusable state of a ray traversal.
pub struct Traversal {
    pub stack: Vec<NodeId>,
    pub ray: Ray,
}

impl Traversal {
    #[inline(always)]
    /// Reinitialize traversal state with new ray.
    pub fn reinit(&mut self, ray: Ray, root: Option<NodeId>) {
        self.stack.clear();
        self.stack.extend(root);
        self.ray = ray;
    }
}

impl<K: Copy + Eq + Hash> BvhTree<K> {
    #[inline(always)]
    pub fn new_traversal(&self, ray: Ray) -> Traversal {
        let mut stack = Vec::with_capacity(96);
        stack.extend(self.root);
        Traversal { stack, ray }
    }

    /// Advances `state` to the next leaf whose bounds the ray enters, writing it to `hit`.
    /// Leaves are produced in traversal order, not sorted by distance.
    /// Returns false when there are no more leaves to visit.
    #[inline(always)]
    pub fn traverse(&self, state: &mut Traversal, hit: &mut Option<RayHit<K>>) -> bool {
        while let Some(current) = state.stack.pop() {
            let node = &self.nodes[current.index()];
            let t = node.aabb.intersect_ray(&state.ray);
            if t == f32::INFINITY {
                continue;
            }
            if let Some(object) = node.object {
                *hit = Some(RayHit {
                    object: object.user_data,
                    t,
                });
                return true; // Yield when we hit a leaf
            }
            state.stack.extend(node.right);
            state.stack.extend(node.left);
        }
        false
    }

    /// Collects every object whose bounds the ray enters, nearest entry first.
    ///
    /// This is a broad-phase query: `t` is the distance at which the ray enters the
    /// object's box, exact hits against the object's geometry are up to the caller.
    /// `results` is cleared first. Returns false if nothing was hit.
    #[cfg_attr(feature = "profile", profiling::function)]
    pub fn intersect(&self, ray: &Ray, results: &mut Vec<RayHit<K>>) -> bool {
        results.clear();
        let mut state = self.new_traversal(*ray);
        let mut hit = None;
        while self.traverse(&mut state, &mut hit) {
            results.extend(hit.take());
        }
        results.sort_by(|a, b| a.t.total_cmp(&b.t));
        !results.is_empty()
    }

    /// Objects whose bounds intersect `frustum`, in tree order.
    pub fn find_visible_nodes(&self, frustum: &Frustum) -> Vec<K> {
        let mut results = Vec::new();
        self.find_visible_nodes_into(frustum, &mut results);
        results
    }

    /// Appends the objects whose bounds intersect `frustum` to `results`. Subtrees
    /// whose box lies entirely outside one of the planes are skipped.
    #[cfg_attr(feature = "profile", profiling::function)]
    pub fn find_visible_nodes_into(&self, frustum: &Frustum, results: &mut Vec<K>) {
        let mut stack = Vec::with_capacity(96);
        stack.extend(self.root);
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current.index()];
            if node.left.is_none() && node.object.is_none() {
                // Empty root.
                continue;
            }
            if !frustum.intersects_aabb(&node.aabb) {
                continue;
            }
            if let Some(object) = node.object {
                results.push(object.user_data);
            } else {
                stack.extend(node.right);
                stack.extend(node.left);
            }
        }
    }
}
