//! Loose octree over [`SceneObject`]s.
//!
//! Each octant has up to eight children, indexed by `x << 2 | y << 1 | z` where each
//! bit says whether an object's center lies in the upper half of that axis. Child
//! octants are loose: their bounds are the cell grown by half the cell size on every
//! side, so an object no larger than the cell can descend even when it straddles the
//! cell boundary. Objects that are too big (or would poke out of the loose bounds)
//! stay in the current octant.
//!
//! Every octant counts the objects in its subtree (`occupancy`) so culling can skip
//! empty branches without visiting them.

use std::hash::Hash;

use glam::Vec3A;
use hashbrown::HashMap;

use crate::{
    aabb::Aabb,
    error::SpatialIndexError,
    frustum::{Frustum, FrustumTest},
    ray::{Ray, RayHit},
    SceneObject,
};

const ROOT: OctantId = OctantId(0);

#[derive(Clone, Copy, Debug)]
pub struct OctreeConfig {
    /// Deepest level objects can descend to (root = 0).
    pub max_depth: u32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self { max_depth: 8 }
    }
}

/// Index of an octant in the octree's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OctantId(pub u32);

impl OctantId {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub struct Octant<K> {
    /// Tight cell of this octant.
    pub cell: Aabb,
    /// Loose bounds; every object stored in this subtree lies inside them.
    pub bounds: Aabb,
    pub depth: u32,
    pub parent: Option<OctantId>,
    pub children: [Option<OctantId>; 8],
    pub objects: Vec<SceneObject<K>>,
    /// Objects stored in this octant and all its descendants.
    pub occupancy: usize,
}

impl<K> Octant<K> {
    fn new(cell: Aabb, bounds: Aabb, depth: u32, parent: Option<OctantId>) -> Self {
        Self {
            cell,
            bounds,
            depth,
            parent,
            children: [None; 8],
            objects: Vec::new(),
            occupancy: 0,
        }
    }

    /// Which child an object centered at `point` belongs to.
    #[inline(always)]
    pub fn child_index(&self, point: Vec3A) -> usize {
        let center = self.cell.center();
        ((point.x >= center.x) as usize) << 2
            | ((point.y >= center.y) as usize) << 1
            | (point.z >= center.z) as usize
    }

    /// Cell of child `index`.
    pub fn child_cell(&self, index: usize) -> Aabb {
        let center = self.cell.center();
        let pick = |bit: usize, axis: usize| {
            if index & bit == 0 {
                (self.cell.min[axis], center[axis])
            } else {
                (center[axis], self.cell.max[axis])
            }
        };
        let (min_x, max_x) = pick(4, 0);
        let (min_y, max_y) = pick(2, 1);
        let (min_z, max_z) = pick(1, 2);
        Aabb::new(
            Vec3A::new(min_x, min_y, min_z),
            Vec3A::new(max_x, max_y, max_z),
        )
    }

    /// An object fits a child when it is no larger than half of this octant on every axis.
    #[inline(always)]
    pub fn check_fit(&self, bounds: &Aabb) -> bool {
        bounds.size().cmple(self.cell.size() * 0.5).all()
    }
}

#[inline(always)]
fn loose_bounds(cell: &Aabb) -> Aabb {
    cell.expanded(cell.size() * 0.5)
}

/// A loose octree covering a fixed root volume.
#[derive(Clone)]
pub struct Octree<K> {
    config: OctreeConfig,
    octants: Vec<Octant<K>>,
    locations: HashMap<K, OctantId>,
}

impl<K: Copy + Eq + Hash> Octree<K> {
    /// Creates an octree whose root octant is exactly `bounds`.
    pub fn new(bounds: Aabb, config: OctreeConfig) -> Self {
        Self {
            config,
            octants: vec![Octant::new(bounds, bounds, 0, None)],
            locations: HashMap::new(),
        }
    }

    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    pub fn bounds(&self) -> Aabb {
        self.octants[ROOT.index()].bounds
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn contains(&self, key: K) -> bool {
        self.locations.contains_key(&key)
    }

    pub fn octant(&self, id: OctantId) -> &Octant<K> {
        &self.octants[id.index()]
    }

    /// Octant currently storing `key`.
    pub fn location(&self, key: K) -> Option<OctantId> {
        self.locations.get(&key).copied()
    }

    /// Inserts `object` in the deepest octant it fits.
    ///
    /// Fails with [`SpatialIndexError::OutOfBounds`] when the root volume does not
    /// contain the object's bounds and [`SpatialIndexError::AlreadyPresent`] for a
    /// key that is already tracked.
    pub fn create(&mut self, object: SceneObject<K>) -> Result<(), SpatialIndexError> {
        if self.locations.contains_key(&object.user_data) {
            return Err(SpatialIndexError::AlreadyPresent);
        }
        if !self.bounds().contains_aabb(&object.bounds) {
            return Err(SpatialIndexError::OutOfBounds);
        }
        self.insert_unchecked(object);
        Ok(())
    }

    /// Replaces the bounds of a tracked object, moving it to the octant that fits them.
    pub fn update(&mut self, object: SceneObject<K>) -> Result<(), SpatialIndexError> {
        if !self.locations.contains_key(&object.user_data) {
            return Err(SpatialIndexError::NotFound);
        }
        if !self.bounds().contains_aabb(&object.bounds) {
            return Err(SpatialIndexError::OutOfBounds);
        }
        self.remove(object.user_data)?;
        self.insert_unchecked(object);
        Ok(())
    }

    /// Removes the object keyed by `key`.
    ///
    /// Octants emptied by a removal are kept for reuse, so the arena never holds more
    /// than the full tree of `8^d` octants per level `d <= max_depth`. [`Octree::clear`]
    /// releases them.
    pub fn remove(&mut self, key: K) -> Result<(), SpatialIndexError> {
        let Some(id) = self.locations.remove(&key) else {
            return Err(SpatialIndexError::NotFound);
        };
        let objects = &mut self.octants[id.index()].objects;
        if let Some(position) = objects.iter().position(|o| o.user_data == key) {
            objects.swap_remove(position);
        }
        self.propagate_occupancy(id, false);
        Ok(())
    }

    /// Drops every object and every octant below the root.
    pub fn clear(&mut self) {
        self.octants.truncate(1);
        let root = &mut self.octants[ROOT.index()];
        root.children = [None; 8];
        root.objects.clear();
        root.occupancy = 0;
        self.locations.clear();
    }

    fn insert_unchecked(&mut self, object: SceneObject<K>) {
        let mut id = ROOT;
        loop {
            let octant = &self.octants[id.index()];
            if octant.depth >= self.config.max_depth || !octant.check_fit(&object.bounds) {
                break;
            }
            let index = octant.child_index(object.bounds.center());
            let existing = octant.children[index];
            let child = match existing {
                Some(child) => child,
                None => {
                    let cell = octant.child_cell(index);
                    let bounds = loose_bounds(&cell);
                    if !bounds.contains_aabb(&object.bounds) {
                        break;
                    }
                    let child = OctantId(self.octants.len() as u32);
                    let depth = octant.depth + 1;
                    self.octants.push(Octant::new(cell, bounds, depth, Some(id)));
                    self.octants[id.index()].children[index] = Some(child);
                    child
                }
            };
            if !self.octants[child.index()]
                .bounds
                .contains_aabb(&object.bounds)
            {
                break;
            }
            id = child;
        }

        self.octants[id.index()].objects.push(object);
        self.locations.insert(object.user_data, id);
        self.propagate_occupancy(id, true);
        log::trace!("octree: stored object in octant {id:?}");
    }

    fn propagate_occupancy(&mut self, from: OctantId, increase: bool) {
        let mut current = Some(from);
        while let Some(id) = current {
            let octant = &mut self.octants[id.index()];
            if increase {
                octant.occupancy += 1;
            } else {
                debug_assert!(octant.occupancy > 0);
                octant.occupancy = octant.occupancy.saturating_sub(1);
            }
            current = octant.parent;
        }
    }

    /// Appends every object whose bounds intersect `frustum` to `results`.
    ///
    /// Empty subtrees are skipped. Once an octant is entirely inside the frustum
    /// its whole subtree is collected without further plane tests.
    #[cfg_attr(feature = "profile", profiling::function)]
    pub fn cull(&self, frustum: &Frustum, results: &mut Vec<K>) {
        self.cull_octant(ROOT, frustum, false, results);
    }

    fn cull_octant(
        &self,
        id: OctantId,
        frustum: &Frustum,
        fully_visible: bool,
        results: &mut Vec<K>,
    ) {
        let octant = &self.octants[id.index()];
        if octant.occupancy == 0 {
            return;
        }

        let fully_visible = fully_visible
            || match frustum.classify_aabb(&octant.bounds) {
                FrustumTest::Outside => return,
                FrustumTest::Inside => true,
                FrustumTest::Partial => false,
            };

        for object in &octant.objects {
            if fully_visible || frustum.intersects_aabb(&object.bounds) {
                results.push(object.user_data);
            }
        }
        for child in octant.children.iter().flatten() {
            self.cull_octant(*child, frustum, fully_visible, results);
        }
    }

    /// Broad-phase ray query with the same contract as
    /// [`BvhTree::intersect`](crate::bvh::BvhTree::intersect).
    pub fn intersect(&self, ray: &Ray, results: &mut Vec<RayHit<K>>) -> bool {
        results.clear();
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            let octant = &self.octants[id.index()];
            if octant.occupancy == 0 || octant.bounds.intersect_ray(ray) == f32::INFINITY {
                continue;
            }
            for object in &octant.objects {
                let t = object.bounds.intersect_ray(ray);
                if t < f32::INFINITY {
                    results.push(RayHit {
                        object: object.user_data,
                        t,
                    });
                }
            }
            stack.extend(octant.children.iter().flatten());
        }
        results.sort_by(|a, b| a.t.total_cmp(&b.t));
        !results.is_empty()
    }

    /// Panics if occupancy counts, parent links, containment or the location map are
    /// inconsistent.
    pub fn assert_well_formed(&self)
    where
        K: std::fmt::Debug,
    {
        let total = self.assert_octant(ROOT);
        assert_eq!(total, self.locations.len());
        for (key, id) in &self.locations {
            assert!(
                self.octants[id.index()]
                    .objects
                    .iter()
                    .any(|o| o.user_data == *key),
                "{key:?} missing from octant {id:?}"
            );
        }
    }

    fn assert_octant(&self, id: OctantId) -> usize
    where
        K: std::fmt::Debug,
    {
        let octant = &self.octants[id.index()];
        for object in &octant.objects {
            assert!(octant.bounds.contains_aabb(&object.bounds));
        }
        let mut count = octant.objects.len();
        for (index, child) in octant.children.iter().enumerate() {
            let Some(child) = child else {
                continue;
            };
            let child_octant = &self.octants[child.index()];
            assert_eq!(child_octant.parent, Some(id));
            assert_eq!(child_octant.depth, octant.depth + 1);
            assert_eq!(child_octant.cell, octant.child_cell(index));
            count += self.assert_octant(*child);
        }
        assert_eq!(octant.occupancy, count, "occupancy of {id:?}");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{vec3a, Mat4, Vec3};

    fn world() -> Aabb {
        Aabb::new(Vec3A::splat(-100.0), Vec3A::splat(100.0))
    }

    fn object(min: Vec3A, max: Vec3A, key: u32) -> SceneObject<u32> {
        SceneObject::new(Aabb::new(min, max), key)
    }

    fn forward_frustum() -> Frustum {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 50.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::Y);
        Frustum::from_view_projection(&(proj * view))
    }

    fn all_visible() -> Frustum {
        Frustum::from_aabb(&world())
    }

    #[test]
    fn child_index_bits() {
        let octant: Octant<u32> = Octant::new(world(), world(), 0, None);
        assert_eq!(octant.child_index(vec3a(-1.0, -1.0, -1.0)), 0);
        assert_eq!(octant.child_index(vec3a(1.0, -1.0, -1.0)), 4);
        assert_eq!(octant.child_index(vec3a(-1.0, 1.0, -1.0)), 2);
        assert_eq!(octant.child_index(vec3a(-1.0, -1.0, 1.0)), 1);
        assert_eq!(octant.child_index(vec3a(1.0, 1.0, 1.0)), 7);
        assert_eq!(
            octant.child_cell(7),
            Aabb::new(Vec3A::ZERO, Vec3A::splat(100.0))
        );
    }

    #[test]
    fn small_objects_descend() {
        let mut octree = Octree::new(world(), OctreeConfig { max_depth: 4 });
        octree
            .create(object(vec3a(60.0, 60.0, 60.0), vec3a(61.0, 61.0, 61.0), 1))
            .unwrap();
        let id = octree.location(1).unwrap();
        assert_eq!(octree.octant(id).depth, 4);
        octree.assert_well_formed();
    }

    #[test]
    fn large_objects_stay_near_root() {
        let mut octree = Octree::new(world(), OctreeConfig::default());
        octree
            .create(object(vec3a(-90.0, -90.0, -90.0), vec3a(90.0, 90.0, 90.0), 1))
            .unwrap();
        assert_eq!(octree.location(1), Some(ROOT));

        // Straddles the root center but is small enough for a loose child.
        octree
            .create(object(vec3a(-1.0, -1.0, -1.0), vec3a(1.0, 1.0, 1.0), 2))
            .unwrap();
        assert_ne!(octree.location(2), Some(ROOT));
        octree.assert_well_formed();
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let mut octree = Octree::new(world(), OctreeConfig::default());
        assert_eq!(
            octree.create(object(Vec3A::splat(-200.0), Vec3A::splat(-150.0), 1)),
            Err(SpatialIndexError::OutOfBounds)
        );
        assert_eq!(
            octree.create(object(Vec3A::splat(90.0), Vec3A::splat(110.0), 2)),
            Err(SpatialIndexError::OutOfBounds)
        );
        assert!(octree.is_empty());
        octree.assert_well_formed();
    }

    #[test]
    fn duplicate_and_missing_keys() {
        let mut octree = Octree::new(world(), OctreeConfig::default());
        let a = object(Vec3A::ZERO, Vec3A::ONE, 1);
        octree.create(a).unwrap();
        assert_eq!(octree.create(a), Err(SpatialIndexError::AlreadyPresent));
        assert_eq!(octree.remove(2), Err(SpatialIndexError::NotFound));
        assert_eq!(
            octree.update(object(Vec3A::ZERO, Vec3A::ONE, 2)),
            Err(SpatialIndexError::NotFound)
        );
        // A failed update leaves the object where it was.
        let before = octree.location(1);
        assert_eq!(
            octree.update(object(Vec3A::splat(150.0), Vec3A::splat(160.0), 1)),
            Err(SpatialIndexError::OutOfBounds)
        );
        assert_eq!(octree.location(1), before);
        octree.assert_well_formed();
    }

    #[test]
    fn occupancy_follows_insert_and_remove() {
        let mut octree = Octree::new(world(), OctreeConfig { max_depth: 3 });
        for i in 0..10 {
            let p = i as f32 * 8.0 - 40.0;
            octree
                .create(object(Vec3A::splat(p), Vec3A::splat(p + 1.0), i))
                .unwrap();
        }
        assert_eq!(octree.octant(ROOT).occupancy, 10);
        octree.assert_well_formed();

        for i in (0..10).step_by(2) {
            octree.remove(i).unwrap();
            octree.assert_well_formed();
        }
        assert_eq!(octree.octant(ROOT).occupancy, 5);
        assert_eq!(octree.len(), 5);
    }

    #[test]
    fn clear_releases_octants() {
        let mut octree = Octree::new(world(), OctreeConfig { max_depth: 4 });
        for i in 0..8 {
            let p = i as f32 * 20.0 - 80.0;
            octree
                .create(object(Vec3A::splat(p), Vec3A::splat(p + 1.0), i))
                .unwrap();
        }
        assert!(octree.octants.len() > 1);

        octree.clear();
        assert!(octree.is_empty());
        assert_eq!(octree.octants.len(), 1);
        assert_eq!(octree.octant(ROOT).children, [None; 8]);
        octree.assert_well_formed();

        octree
            .create(object(vec3a(60.0, 60.0, 60.0), vec3a(61.0, 61.0, 61.0), 3))
            .unwrap();
        assert_eq!(octree.octant(octree.location(3).unwrap()).depth, 4);
        octree.assert_well_formed();
    }

    #[test]
    fn cull_with_perspective_frustum() {
        let mut octree = Octree::new(world(), OctreeConfig::default());
        octree
            .create(object(vec3a(-1.0, -1.0, -10.0), vec3a(1.0, 1.0, -8.0), 1))
            .unwrap();
        octree
            .create(object(vec3a(-1.0, -1.0, 10.0), vec3a(1.0, 1.0, 12.0), 2))
            .unwrap();

        let mut results = Vec::new();
        octree.cull(&forward_frustum(), &mut results);
        assert_eq!(results, vec![1]);
    }

    #[test]
    fn fully_visible_subtree_is_collected() {
        let mut octree = Octree::new(world(), OctreeConfig::default());
        for i in 0..20 {
            let p = i as f32 * 4.0 - 40.0;
            octree
                .create(object(vec3a(p, 0.0, 0.0), vec3a(p + 1.0, 1.0, 1.0), i))
                .unwrap();
        }
        let mut results = Vec::new();
        octree.cull(&all_visible(), &mut results);
        results.sort_unstable();
        assert_eq!(results, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn update_moves_object() {
        let mut octree = Octree::new(world(), OctreeConfig { max_depth: 3 });
        octree
            .create(object(Vec3A::splat(50.0), Vec3A::splat(60.0), 1))
            .unwrap();
        let before = octree.location(1).unwrap();
        octree
            .update(object(Vec3A::splat(-60.0), Vec3A::splat(-50.0), 1))
            .unwrap();
        assert_ne!(octree.location(1).unwrap(), before);
        octree.assert_well_formed();

        let mut results = Vec::new();
        octree.cull(
            &Frustum::from_aabb(&Aabb::new(Vec3A::splat(40.0), Vec3A::splat(70.0))),
            &mut results,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn ray_query_sorted() {
        let mut octree = Octree::new(world(), OctreeConfig::default());
        octree
            .create(object(vec3a(10.0, 0.0, 0.0), vec3a(11.0, 1.0, 1.0), 1))
            .unwrap();
        octree
            .create(object(vec3a(2.0, 0.0, 0.0), vec3a(3.0, 1.0, 1.0), 2))
            .unwrap();
        octree
            .create(object(vec3a(2.0, 5.0, 0.0), vec3a(3.0, 6.0, 1.0), 3))
            .unwrap();

        let mut hits = Vec::new();
        let ray = Ray::new_inf(vec3a(0.0, 0.5, 0.5), vec3a(1.0, 0.0, 0.0));
        assert!(octree.intersect(&ray, &mut hits));
        let order: Vec<_> = hits.iter().map(|h| h.object).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn clear_removes_all() {
        let mut octree = Octree::new(world(), OctreeConfig::default());
        for i in 0..10 {
            let p = i as f32 * 5.0 - 25.0;
            octree
                .create(object(Vec3A::splat(p), Vec3A::splat(p + 2.0), i))
                .unwrap();
        }
        octree.clear();
        assert!(octree.is_empty());
        let mut results = Vec::new();
        octree.cull(&all_visible(), &mut results);
        assert!(results.is_empty());
        octree.assert_well_formed();
    }
}
