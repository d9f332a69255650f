//! Linear BVH over [`SceneObject`]s.
//!
//! Nodes live in an arena and reference each other through [`NodeId`]s. A tree is
//! either rebuilt from scratch ([`BvhTree::build`], Morton sort + top-down
//! longest-common-prefix splits) or maintained incrementally ([`BvhTree::refit`],
//! [`BvhTree::remove`], [`BvhTree::update`]).

mod build;
mod insert;
mod remove;
mod traverse;
mod validation;


use std::hash::Hash;

use hashbrown::HashMap;

pub use traverse::Traversal;

use crate::{
    aabb::Aabb, error::SpatialIndexError, morton::MortonSpace, par::Scheduler, SceneObject,
};

/// Index of a node in the tree's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Internal,
    Leaf,
}

#[derive(Clone, Debug)]
pub struct BvhNode<K> {
    pub aabb: Aabb,
    /// Leaves: code of the object's center. Others: an ordering hint for insertion.
    pub morton: u64,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    /// Set for leaves only.
    pub object: Option<SceneObject<K>>,
}

impl<K> BvhNode<K> {
    fn root() -> Self {
        Self {
            aabb: Aabb::default(),
            morton: 0,
            kind: NodeKind::Root,
            parent: None,
            left: None,
            right: None,
            object: None,
        }
    }

    fn internal(parent: NodeId, left: NodeId, right: NodeId, morton: u64) -> Self {
        Self {
            aabb: Aabb::default(),
            morton,
            kind: NodeKind::Internal,
            parent: Some(parent),
            left: Some(left),
            right: Some(right),
            object: None,
        }
    }

    fn leaf(object: SceneObject<K>, morton: u64, parent: NodeId) -> Self {
        Self {
            aabb: object.bounds,
            morton,
            kind: NodeKind::Leaf,
            parent: Some(parent),
            left: None,
            right: None,
            object: Some(object),
        }
    }

    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    /// Children in left, right order; absent slots are skipped.
    #[inline(always)]
    pub fn children(&self) -> impl Iterator<Item = NodeId> {
        self.left.into_iter().chain(self.right)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BvhConfig {
    /// Distributes Morton code computation and the normalization scan during builds.
    pub scheduler: Scheduler,
}

/// A bounding volume hierarchy over caller-owned objects keyed by `K`.
///
/// `add` only stages objects; they become part of the tree on the next
/// [`BvhTree::build`] or [`BvhTree::refit`].
#[derive(Clone)]
pub struct BvhTree<K> {
    config: BvhConfig,
    nodes: Vec<BvhNode<K>>,
    free_nodes: Vec<NodeId>,
    root: Option<NodeId>,
    /// Objects in the tree, one leaf each.
    objects: Vec<SceneObject<K>>,
    staged: Vec<SceneObject<K>>,
    leaves: HashMap<K, NodeId>,
    space: Option<MortonSpace>,
}

impl<K: Copy + Eq + Hash> Default for BvhTree<K> {
    fn default() -> Self {
        Self::with_config(BvhConfig::default())
    }
}

impl<K: Copy + Eq + Hash> BvhTree<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BvhConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            root: None,
            objects: Vec::new(),
            staged: Vec::new(),
            leaves: HashMap::new(),
            space: None,
        }
    }

    pub fn config(&self) -> &BvhConfig {
        &self.config
    }

    /// Queues `object` for the next `build`/`refit`.
    pub fn add(&mut self, object: SceneObject<K>) -> Result<(), SpatialIndexError> {
        if self.contains(object.user_data, true) {
            return Err(SpatialIndexError::AlreadyPresent);
        }
        self.staged.push(object);
        Ok(())
    }

    /// True if `key` is in the tree, or staged when `check_staged` is set.
    pub fn contains(&self, key: K, check_staged: bool) -> bool {
        self.leaves.contains_key(&key)
            || (check_staged && self.staged.iter().any(|o| o.user_data == key))
    }

    /// Number of objects in the tree, not counting staged ones.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub fn objects(&self) -> &[SceneObject<K>] {
        &self.objects
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &BvhNode<K> {
        &self.nodes[id.index()]
    }

    /// Bounds of the whole tree; a zero box at the origin when the tree is empty.
    pub fn root_aabb(&self) -> Aabb {
        self.root
            .map(|root| self.nodes[root.index()].aabb)
            .unwrap_or_default()
    }

    /// The normalization used for Morton codes, set by the last `build` (or first `refit`).
    pub fn morton_space(&self) -> Option<&MortonSpace> {
        self.space.as_ref()
    }

    /// Leaf holding `key`, if the object is in the tree.
    pub fn leaf_of(&self, key: K) -> Option<NodeId> {
        self.leaves.get(&key).copied()
    }

    /// Longest root-to-leaf path, counted in nodes.
    pub fn depth(&self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut max_depth = 0;
        let mut stack = vec![(root, 1)];
        while let Some((id, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            stack.extend(self.nodes[id.index()].children().map(|c| (c, depth + 1)));
        }
        max_depth
    }

    /// Drops every object, staged or not, and all nodes.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_nodes.clear();
        self.root = None;
        self.objects.clear();
        self.staged.clear();
        self.leaves.clear();
        self.space = None;
    }

    /// Replaces the bounds of a tracked object.
    ///
    /// For objects in the tree the leaf is re-encoded and the bounds of its ancestors
    /// are refit; staged objects are simply overwritten.
    pub fn update(&mut self, object: SceneObject<K>) -> Result<(), SpatialIndexError> {
        let key = object.user_data;
        if let Some(leaf) = self.leaf_of(key) {
            let morton = self.encode(object.bounds);
            let node = &mut self.nodes[leaf.index()];
            node.aabb = object.bounds;
            node.morton = morton;
            node.object = Some(object);
            if let Some(stored) = self.objects.iter_mut().find(|o| o.user_data == key) {
                *stored = object;
            }
            if let Some(parent) = self.nodes[leaf.index()].parent {
                self.fit_ancestors(parent);
            }
            Ok(())
        } else if let Some(staged) = self.staged.iter_mut().find(|o| o.user_data == key) {
            *staged = object;
            Ok(())
        } else {
            Err(SpatialIndexError::NotFound)
        }
    }

    fn alloc_node(&mut self, node: BvhNode<K>) -> NodeId {
        if let Some(id) = self.free_nodes.pop() {
            self.nodes[id.index()] = node;
            id
        } else {
            let id = NodeId(self.nodes.len() as u32);
            self.nodes.push(node);
            id
        }
    }

    fn free_node(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.index()];
        node.parent = None;
        node.left = None;
        node.right = None;
        node.object = None;
        self.free_nodes.push(id);
    }

    /// Morton code of the center of `aabb` under the current normalization.
    #[inline(always)]
    fn encode(&self, aabb: Aabb) -> u64 {
        self.space
            .map(|space| space.encode(aabb.center()))
            .unwrap_or_default()
    }

    /// Recomputes bounds and codes of the subtree rooted at `id`, children before parents.
    pub fn fit_bounds(&mut self, id: NodeId) {
        crate::scope!("fit_bounds");
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            order.push(current);
            stack.extend(self.nodes[current.index()].children());
        }

        for current in order.into_iter().rev() {
            let node = &self.nodes[current.index()];
            if node.is_leaf() {
                continue;
            }
            let aabb = self.children_aabb(current);
            let morton = match node.left {
                Some(_) => self.encode(aabb),
                None => 0,
            };
            let node = &mut self.nodes[current.index()];
            node.aabb = aabb;
            node.morton = morton;
        }
    }

    /// Restores the bounds of `id` and every ancestor after a change below `id`.
    fn fit_ancestors(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(id) = current {
            self.nodes[id.index()].aabb = self.children_aabb(id);
            current = self.nodes[id.index()].parent;
        }
    }

    /// Union of the children's bounds, a zero box for a childless root.
    fn children_aabb(&self, id: NodeId) -> Aabb {
        let node = &self.nodes[id.index()];
        match (node.left, node.right) {
            (Some(left), Some(right)) => self.nodes[left.index()]
                .aabb
                .union(&self.nodes[right.index()].aabb),
            (Some(child), None) | (None, Some(child)) => self.nodes[child.index()].aabb,
            (None, None) => Aabb::default(),
        }
    }
}
