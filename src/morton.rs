//---------------------------------------------------
// --- 21 bit resolution per channel morton curve ---
//---------------------------------------------------

use std::cell::RefCell;

use glam::{DVec3, Vec3A};
use rdst::{RadixKey, RadixSort};
use thread_local::ThreadLocal;

use crate::{aabb::Aabb, par::Scheduler, SceneObject};

/// Smallest per-axis extent used when deriving the normalization, so coincident
/// centers never divide by zero.
pub const NORMALIZATION_EPSILON: f64 = 1e-6;

const MORTON_MAX: f64 = ((1u32 << 21) - 1) as f64;

#[inline(always)]
pub fn split_by_3_u64(a: u32) -> u64 {
    let mut x = a as u64 & 0x1fffff; // we only look at the first 21 bits
    x = (x | x << 32) & 0x1f00000000ffff;
    x = (x | x << 16) & 0x1f0000ff0000ff;
    x = (x | x << 8) & 0x100f00f00f00f00f;
    x = (x | x << 4) & 0x10c30c30c30c30c3;
    x = (x | x << 2) & 0x1249249249249249;
    x
}

#[inline(always)]
pub fn morton_encode_u64(x: u32, y: u32, z: u32) -> u64 {
    split_by_3_u64(x) | split_by_3_u64(y) << 1 | split_by_3_u64(z) << 2
}

/// Encodes a point in `[0, 1]^3`. Inputs outside that range wrap into the 21 bit
/// lattice; callers clamp first.
#[inline(always)]
pub fn morton_encode_u64_unorm(p: DVec3) -> u64 {
    let p = p * MORTON_MAX;
    morton_encode_u64(p.x as u32, p.y as u32, p.z as u32)
}

/// Number of leading bits two codes have in common.
#[inline(always)]
pub fn common_prefix_len(a: u64, b: u64) -> u32 {
    (a ^ b).leading_zeros()
}

/// Mean of two codes without overflowing.
#[inline(always)]
pub fn morton_mean(a: u64, b: u64) -> u64 {
    (a >> 1) + (b >> 1) + (a & b & 1)
}

/// Maps box centers into the unit cube before encoding: `p * scale + offset`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MortonSpace {
    pub scale: DVec3,
    pub offset: DVec3,
}

impl MortonSpace {
    /// Normalization for centers spanning `centers` (a box around the centers, not the objects).
    pub fn from_center_bounds(centers: &Aabb) -> Self {
        let extent = centers
            .size()
            .as_dvec3()
            .max(DVec3::splat(NORMALIZATION_EPSILON));
        let scale = 1.0 / extent;
        let offset = -centers.min.as_dvec3() * scale;
        Self { scale, offset }
    }

    /// Scans the centers of `objects`, distributing the scan with `scheduler`.
    #[cfg_attr(feature = "profile", profiling::function)]
    pub fn from_objects<K>(objects: &[SceneObject<K>], scheduler: Scheduler) -> Self
    where
        K: Send + Sync,
    {
        crate::scope_print!("morton space");
        let mut center_bounds = Aabb::empty();
        match scheduler {
            Scheduler::Sequential => {
                for object in objects {
                    center_bounds.extend(object.bounds.center());
                }
            }
            _ => {
                let local_bounds: ThreadLocal<RefCell<Aabb>> = ThreadLocal::new();
                let chunk_size = objects.len().div_ceil(scheduler.current_num_threads()).max(1);
                scheduler.par_chunks(
                    objects,
                    &|_, chunk: &[SceneObject<K>]| {
                        let mut bounds = local_bounds
                            .get_or(|| RefCell::new(Aabb::empty()))
                            .borrow_mut();
                        for object in chunk {
                            bounds.extend(object.bounds.center());
                        }
                    },
                    chunk_size,
                );
                for bounds in local_bounds.into_iter() {
                    center_bounds = center_bounds.union(&bounds.into_inner());
                }
            }
        }
        Self::from_center_bounds(&center_bounds)
    }

    #[inline(always)]
    pub fn normalize(&self, point: Vec3A) -> DVec3 {
        point.as_dvec3() * self.scale + self.offset
    }

    /// False when `point` lies outside the extent this normalization was derived from.
    #[inline(always)]
    pub fn covers(&self, point: Vec3A) -> bool {
        let p = self.normalize(point);
        p.cmpge(DVec3::ZERO).all() && p.cmple(DVec3::ONE).all()
    }

    /// Morton code of `point`, clamped into the normalized unit cube.
    #[inline(always)]
    pub fn encode(&self, point: Vec3A) -> u64 {
        morton_encode_u64_unorm(self.normalize(point).clamp(DVec3::ZERO, DVec3::ONE))
    }
}

/// An object index paired with its code, sorted by code.
#[derive(Clone, Copy, Debug, Default)]
pub struct Morton64 {
    pub index: usize,
    pub code: u64,
}

impl RadixKey for Morton64 {
    const LEVELS: usize = 8;
    #[inline(always)]
    fn get_level(&self, level: usize) -> u8 {
        self.code.get_level(level)
    }
}

/// Computes and sorts the codes of `objects`. The radix sort is unstable: objects
/// sharing a code end up in an unspecified relative order.
#[inline(always)]
#[cfg_attr(feature = "profile", profiling::function)]
pub fn sort_objects_m64<K>(
    objects: &[SceneObject<K>],
    space: &MortonSpace,
    scheduler: Scheduler,
) -> Vec<Morton64>
where
    K: Send + Sync,
{
    crate::scope_print_major!("sort_objects_m64");
    let mut mortons = vec![Morton64::default(); objects.len()];
    scheduler.par_map(&mut mortons, &|index: usize, m: &mut Morton64| {
        *m = Morton64 {
            index,
            code: space.encode(objects[index].bounds.center()),
        };
    });

    {
        crate::scope_print!("radix sort");
        mortons.radix_sort_unstable();
    }
    mortons
}

/// Finds where to split a sorted, non-empty run of codes: the returned index is the
/// last element of the left half. Uses the highest differing bit between the first
/// and last code, falling back to the midpoint when they are identical.
pub fn find_split(mortons: &[Morton64]) -> usize {
    debug_assert!(!mortons.is_empty());
    let last = mortons.len() - 1;
    let first_code = mortons[0].code;
    let last_code = mortons[last].code;

    if first_code == last_code {
        return last / 2;
    }

    let common_prefix = common_prefix_len(first_code, last_code);

    // Binary search for the furthest element that still shares more than
    // `common_prefix` bits with the first one.
    let mut split = 0;
    let mut step = last;
    loop {
        step = (step + 1) >> 1;
        let new_split = split + step;
        if new_split < last
            && common_prefix_len(first_code, mortons[new_split].code) > common_prefix
        {
            split = new_split;
        }
        if step <= 1 {
            break;
        }
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3a;

    fn run(codes: &[u64]) -> Vec<Morton64> {
        codes
            .iter()
            .enumerate()
            .map(|(index, &code)| Morton64 { index, code })
            .collect()
    }

    #[test]
    fn interleaves_axes() {
        assert_eq!(morton_encode_u64(1, 0, 0), 0b001);
        assert_eq!(morton_encode_u64(0, 1, 0), 0b010);
        assert_eq!(morton_encode_u64(0, 0, 1), 0b100);
        assert_eq!(morton_encode_u64(3, 0, 0), 0b001_001);
        let max = (1 << 21) - 1;
        assert_eq!(morton_encode_u64(max, max, max), (1u64 << 63) - 1);
    }

    #[test]
    fn unit_corners() {
        assert_eq!(morton_encode_u64_unorm(DVec3::ZERO), 0);
        assert_eq!(morton_encode_u64_unorm(DVec3::ONE), (1u64 << 63) - 1);
        assert!(
            morton_encode_u64_unorm(DVec3::splat(0.25))
                < morton_encode_u64_unorm(DVec3::splat(0.75))
        );
    }

    #[test]
    fn degenerate_space_does_not_divide_by_zero() {
        let space = MortonSpace::from_center_bounds(&Aabb::from_point(vec3a(3.0, 3.0, 3.0)));
        assert!(space.scale.is_finite());
        assert_eq!(space.encode(vec3a(3.0, 3.0, 3.0)), 0);
        // Points outside the extent clamp instead of wrapping.
        assert_eq!(space.encode(vec3a(100.0, 100.0, 100.0)), (1u64 << 63) - 1);
        assert!(!space.covers(vec3a(100.0, 3.0, 3.0)));
    }

    #[test]
    fn split_on_highest_differing_bit() {
        assert_eq!(find_split(&run(&[0b0001, 0b0010, 0b0100, 0b0101, 0b1000])), 3);
        assert_eq!(find_split(&run(&[0b000, 0b001, 0b100])), 1);
        assert_eq!(find_split(&run(&[1, 2])), 0);
    }

    #[test]
    fn split_identical_codes_at_midpoint() {
        assert_eq!(find_split(&run(&[7, 7, 7, 7])), 1);
        assert_eq!(find_split(&run(&[7, 7, 7, 7, 7])), 2);
    }

    #[test]
    fn sorts_by_code() {
        let objects: Vec<_> = [5.0, 1.0, 3.0, 0.0]
            .iter()
            .enumerate()
            .map(|(i, &x)| SceneObject::new(Aabb::from_point(vec3a(x, 0.0, 0.0)), i))
            .collect();
        let space = MortonSpace::from_objects(&objects, Scheduler::Sequential);
        let sorted = sort_objects_m64(&objects, &space, Scheduler::Sequential);
        let order: Vec<_> = sorted.iter().map(|m| m.index).collect();
        assert_eq!(order, vec![3, 1, 2, 0]);
        assert!(sorted.windows(2).all(|w| w[0].code <= w[1].code));
    }
}
