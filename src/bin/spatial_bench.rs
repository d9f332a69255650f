use std::time::Instant;

use argh::FromArgs;
use glam::*;
use polymer_spatial::{
    aabb::Aabb, frustum::Frustum, ray::Ray, BvhConfig, BvhTree, Octree, OctreeConfig,
    PrettyDuration, Scheduler, SceneObject,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[derive(FromArgs)]
/// Builds a random scene and times the spatial index operations on it.
struct Args {
    /// number of objects in the scene
    #[argh(option, default = "100_000")]
    objects: u32,
    /// how builds distribute work: 'seq' or 'rayon'
    #[argh(option, default = "Scheduler::Sequential")]
    scheduler: Scheduler,
    /// seed of the scene generator
    #[argh(option, default = "0")]
    seed: u64,
    /// number of ray and frustum queries to run
    #[argh(option, default = "1000")]
    queries: u32,
    /// deepest octree level
    #[argh(option, default = "8")]
    max_depth: u32,
}

const WORLD: f32 = 1000.0;

fn main() {
    env_logger::init();
    let args: Args = argh::from_env();
    let mut rng = StdRng::seed_from_u64(args.seed);

    let objects: Vec<SceneObject<u32>> = (0..args.objects)
        .map(|i| {
            let center = vec3a(
                rng.random_range(-0.9 * WORLD..0.9 * WORLD),
                rng.random_range(-0.9 * WORLD..0.9 * WORLD),
                rng.random_range(-0.9 * WORLD..0.9 * WORLD),
            );
            let half = vec3a(
                rng.random_range(0.1..5.0),
                rng.random_range(0.1..5.0),
                rng.random_range(0.1..5.0),
            );
            SceneObject::new(Aabb::from_center_half_extents(center, half), i)
        })
        .collect();

    let mut bvh = BvhTree::with_config(BvhConfig {
        scheduler: args.scheduler,
    });
    for object in &objects {
        if let Err(err) = bvh.add(*object) {
            log::warn!("skipping object {}: {err}", object.user_data);
        }
    }
    let start = Instant::now();
    bvh.build();
    println!(
        "bvh build:   {} ({} objects, depth {})",
        PrettyDuration(start.elapsed()),
        bvh.len(),
        bvh.depth()
    );

    let mut incremental = BvhTree::new();
    for object in &objects {
        if let Err(err) = incremental.add(*object) {
            log::warn!("skipping object {}: {err}", object.user_data);
        }
    }
    let start = Instant::now();
    incremental.refit();
    println!(
        "bvh refit:   {} (depth {})",
        PrettyDuration(start.elapsed()),
        incremental.depth()
    );

    let mut octree = Octree::new(
        Aabb::new(Vec3A::splat(-WORLD), Vec3A::splat(WORLD)),
        OctreeConfig {
            max_depth: args.max_depth,
        },
    );
    let start = Instant::now();
    for object in &objects {
        if let Err(err) = octree.create(*object) {
            log::warn!("octree rejected object {}: {err}", object.user_data);
        }
    }
    println!("octree fill: {}", PrettyDuration(start.elapsed()));

    let frustums: Vec<Frustum> = (0..args.queries)
        .map(|_| {
            let eye = Vec3::new(
                rng.random_range(-WORLD..WORLD),
                rng.random_range(-WORLD..WORLD),
                rng.random_range(-WORLD..WORLD),
            );
            let proj = Mat4::perspective_rh(1.0, 16.0 / 9.0, 0.1, WORLD * 0.5);
            let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
            Frustum::from_view_projection(&(proj * view))
        })
        .collect();

    let mut visible = Vec::new();
    let mut bvh_total = 0;
    let start = Instant::now();
    for frustum in &frustums {
        visible.clear();
        bvh.find_visible_nodes_into(frustum, &mut visible);
        bvh_total += visible.len();
    }
    println!(
        "bvh cull:    {} ({} visible)",
        PrettyDuration(start.elapsed()),
        bvh_total
    );

    let mut octree_total = 0;
    let start = Instant::now();
    for frustum in &frustums {
        visible.clear();
        octree.cull(frustum, &mut visible);
        octree_total += visible.len();
    }
    println!(
        "octree cull: {} ({} visible)",
        PrettyDuration(start.elapsed()),
        octree_total
    );
    if bvh_total != octree_total {
        log::error!("bvh and octree disagree: {bvh_total} vs {octree_total} visible");
    }

    let direction = vec3a(0.0, 0.0, 1.0);
    let mut traversal = bvh.new_traversal(Ray::new_inf(Vec3A::ZERO, direction));
    let mut hit = None;
    let mut hit_count = 0;
    let start = Instant::now();
    for _ in 0..args.queries {
        let origin = vec3a(
            rng.random_range(-WORLD..WORLD),
            rng.random_range(-WORLD..WORLD),
            -WORLD,
        );
        traversal.reinit(Ray::new_inf(origin, direction), bvh.root());
        while bvh.traverse(&mut traversal, &mut hit) {
            hit_count += 1;
        }
    }
    println!(
        "bvh rays:    {} ({} hits)",
        PrettyDuration(start.elapsed()),
        hit_count
    );
}
