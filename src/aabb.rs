//! An Axis-Aligned Bounding Box (AABB) represented by its minimum and maximum points.

use glam::Vec3A;

use crate::ray::Ray;

/// An Axis-Aligned Bounding Box (AABB) represented by its minimum and maximum points.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct Aabb {
    pub min: Vec3A,
    pub max: Vec3A,
}

impl Aabb {
    /// Creates a new AABB from its minimum and maximum points.
    #[inline(always)]
    pub fn new(min: Vec3A, max: Vec3A) -> Self {
        Self { min, max }
    }

    /// Creates a new AABB with both min and max set to the given point.
    #[inline(always)]
    pub fn from_point(point: Vec3A) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Creates a new AABB centered on `center` extending `half_extents` along each axis.
    #[inline(always)]
    pub fn from_center_half_extents(center: Vec3A, half_extents: Vec3A) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Extends the AABB to include the given point.
    #[inline(always)]
    pub fn extend(&mut self, point: Vec3A) -> &mut Self {
        *self = self.union(&Self::from_point(point));
        self
    }

    /// Returns the union of this AABB and another AABB.
    #[inline(always)]
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Returns the size (extent along each axis) of the AABB.
    #[inline(always)]
    pub fn size(&self) -> Vec3A {
        self.max - self.min
    }

    /// Returns the center point of the AABB.
    #[inline(always)]
    pub fn center(&self) -> Vec3A {
        (self.max + self.min) * 0.5
    }

    /// Returns an empty AABB, the identity for [`Aabb::union`].
    #[inline(always)]
    pub fn empty() -> Self {
        Self {
            min: Vec3A::splat(f32::MAX),
            max: Vec3A::splat(f32::MIN),
        }
    }

    /// True if `min <= max` on every axis.
    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Returns a copy grown by `amount` on every side.
    #[inline(always)]
    #[must_use]
    pub fn expanded(&self, amount: Vec3A) -> Self {
        Self {
            min: self.min - amount,
            max: self.max + amount,
        }
    }

    #[inline(always)]
    pub fn contains_point(&self, point: Vec3A) -> bool {
        (point.cmplt(self.min) | point.cmpgt(self.max)).bitmask() == 0
    }

    /// Checks if `other` lies entirely inside this AABB (touching faces count as inside).
    #[inline(always)]
    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        (other.min.cmplt(self.min) | other.max.cmpgt(self.max)).bitmask() == 0
    }

    /// Checks if this AABB intersects with another AABB.
    #[inline(always)]
    pub fn intersect_aabb(&self, other: &Aabb) -> bool {
        (self.min.cmpgt(other.max) | self.max.cmplt(other.min)).bitmask() == 0
    }

    /// Checks if this AABB intersects with a ray and returns the distance to the entry point.
    /// The distance is clamped to `ray.tmin` when the ray starts inside the box.
    /// Returns `f32::INFINITY` if there is no intersection inside `[ray.tmin, ray.tmax]`.
    #[inline(always)]
    pub fn intersect_ray(&self, ray: &Ray) -> f32 {
        let t1 = (self.min - ray.origin) * ray.inv_direction;
        let t2 = (self.max - ray.origin) * ray.inv_direction;

        let tmin = t1.min(t2);
        let tmax = t1.max(t2);

        let tmin_n = tmin.x.max(tmin.y.max(tmin.z)).max(ray.tmin);
        let tmax_n = tmax.x.min(tmax.y.min(tmax.z)).min(ray.tmax);

        if tmax_n >= tmin_n {
            tmin_n
        } else {
            f32::INFINITY
        }
    }
}
