//! Cross-checks the BVH and the octree against brute force on random scenes.

use glam::{vec3a, Mat4, Vec3, Vec3A};
use polymer_spatial::{
    aabb::Aabb,
    frustum::Frustum,
    ray::Ray,
    BvhConfig, BvhTree, Octree, OctreeConfig, Scheduler, SceneObject,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

const WORLD: f32 = 100.0;

fn random_scene(rng: &mut StdRng, count: u32) -> Vec<SceneObject<u32>> {
    (0..count)
        .map(|i| {
            let half = Vec3A::splat(rng.random_range(0.05..4.0));
            let center = vec3a(
                rng.random_range(-90.0..90.0),
                rng.random_range(-90.0..90.0),
                rng.random_range(-90.0..90.0),
            );
            SceneObject::new(Aabb::from_center_half_extents(center, half), i)
        })
        .collect()
}

fn random_frustum(rng: &mut StdRng) -> Frustum {
    let eye = Vec3::new(
        rng.random_range(-80.0..80.0),
        rng.random_range(-80.0..80.0),
        rng.random_range(-80.0..80.0),
    );
    let target = Vec3::new(
        rng.random_range(-80.0..80.0),
        rng.random_range(-80.0..80.0),
        rng.random_range(-80.0..80.0),
    );
    let fov = rng.random_range(0.3..1.5);
    let proj = Mat4::perspective_rh(fov, 1.0, 0.1, rng.random_range(20.0..200.0));
    let view = Mat4::look_at_rh(eye, target + Vec3::X * 0.01, Vec3::Y);
    Frustum::from_view_projection(&(proj * view))
}

fn random_ray(rng: &mut StdRng) -> Ray {
    let origin = vec3a(
        rng.random_range(-WORLD..WORLD),
        rng.random_range(-WORLD..WORLD),
        rng.random_range(-WORLD..WORLD),
    );
    let target = vec3a(
        rng.random_range(-50.0..50.0),
        rng.random_range(-50.0..50.0),
        rng.random_range(-50.0..50.0),
    );
    Ray::new_inf(origin, (target - origin + Vec3A::splat(1e-3)).normalize())
}

fn sorted(mut keys: Vec<u32>) -> Vec<u32> {
    keys.sort_unstable();
    keys
}

fn brute_force_visible(objects: &[SceneObject<u32>], frustum: &Frustum) -> Vec<u32> {
    sorted(
        objects
            .iter()
            .filter(|o| frustum.intersects_aabb(&o.bounds))
            .map(|o| o.user_data)
            .collect(),
    )
}

#[test]
fn bvh_and_octree_agree_with_brute_force() {
    let mut rng = StdRng::seed_from_u64(0xB0B);
    let objects = random_scene(&mut rng, 2000);

    let mut built = BvhTree::with_config(BvhConfig {
        scheduler: Scheduler::Rayon,
    });
    let mut refitted = BvhTree::new();
    let mut octree = Octree::new(
        Aabb::new(Vec3A::splat(-WORLD), Vec3A::splat(WORLD)),
        OctreeConfig { max_depth: 6 },
    );
    for object in &objects {
        built.add(*object).unwrap();
        refitted.add(*object).unwrap();
        octree.create(*object).unwrap();
    }
    built.build();
    refitted.refit();
    built.assert_well_formed();
    refitted.assert_well_formed();
    octree.assert_well_formed();

    for _ in 0..50 {
        let frustum = random_frustum(&mut rng);
        let expected = brute_force_visible(&objects, &frustum);
        assert_eq!(sorted(built.find_visible_nodes(&frustum)), expected);
        assert_eq!(sorted(refitted.find_visible_nodes(&frustum)), expected);
        let mut culled = Vec::new();
        octree.cull(&frustum, &mut culled);
        assert_eq!(sorted(culled), expected);
    }

    let mut bvh_hits = Vec::new();
    let mut octree_hits = Vec::new();
    for _ in 0..200 {
        let ray = random_ray(&mut rng);
        let expected: Vec<u32> = sorted(
            objects
                .iter()
                .filter(|o| o.bounds.intersect_ray(&ray) < f32::INFINITY)
                .map(|o| o.user_data)
                .collect(),
        );
        built.intersect(&ray, &mut bvh_hits);
        octree.intersect(&ray, &mut octree_hits);
        assert!(bvh_hits.windows(2).all(|w| w[0].t <= w[1].t));
        assert_eq!(sorted(bvh_hits.iter().map(|h| h.object).collect()), expected);
        assert_eq!(
            sorted(octree_hits.iter().map(|h| h.object).collect()),
            expected
        );
    }
}

#[test]
fn mixed_edits_keep_indices_consistent() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let mut objects = random_scene(&mut rng, 300);

    let mut bvh = BvhTree::new();
    let mut octree = Octree::new(
        Aabb::new(Vec3A::splat(-WORLD), Vec3A::splat(WORLD)),
        OctreeConfig::default(),
    );
    for object in &objects {
        bvh.add(*object).unwrap();
        octree.create(*object).unwrap();
    }
    bvh.build();

    // Move a third, remove a third, keep the rest.
    let moved = random_scene(&mut rng, 100);
    for (object, new) in objects.iter_mut().take(100).zip(moved) {
        object.bounds = new.bounds;
        bvh.update(*object).unwrap();
        octree.update(*object).unwrap();
    }
    for object in objects.drain(100..200) {
        bvh.remove(object.user_data).unwrap();
        octree.remove(object.user_data).unwrap();
    }
    bvh.assert_well_formed();
    octree.assert_well_formed();

    let everything = Frustum::from_aabb(&Aabb::new(Vec3A::splat(-WORLD), Vec3A::splat(WORLD)));
    let expected = sorted(objects.iter().map(|o| o.user_data).collect());
    assert_eq!(sorted(bvh.find_visible_nodes(&everything)), expected);
    let mut culled = Vec::new();
    octree.cull(&everything, &mut culled);
    assert_eq!(sorted(culled), expected);

    for _ in 0..20 {
        let frustum = random_frustum(&mut rng);
        let expected = brute_force_visible(&objects, &frustum);
        assert_eq!(sorted(bvh.find_visible_nodes(&frustum)), expected);
    }
}
