//! A view frustum described by six inward-facing planes.

use glam::{Mat4, Vec3A, Vec4};

use crate::aabb::Aabb;

/// Result of classifying a box against a frustum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrustumTest {
    Outside,
    Partial,
    Inside,
}

/// Six half-spaces `dot(plane.xyz, p) + plane.w >= 0`, normals pointing inwards.
/// Plane order: left, right, bottom, top, near, far.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Builds the frustum from planes, normalizing each so distances are in world units.
    pub fn from_planes(planes: [Vec4; 6]) -> Self {
        Self {
            planes: planes.map(|p| {
                let len = p.truncate().length();
                if len > 0.0 {
                    p / len
                } else {
                    p
                }
            }),
        }
    }

    /// Extracts the planes of a view-projection matrix (Gribb & Hartmann).
    /// Assumes glam's `[0, 1]` clip-space depth range.
    pub fn from_view_projection(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);
        Self::from_planes([r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2])
    }

    /// A box-shaped frustum, handy for region queries and tests.
    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self::from_planes([
            Vec4::new(1.0, 0.0, 0.0, -aabb.min.x),
            Vec4::new(-1.0, 0.0, 0.0, aabb.max.x),
            Vec4::new(0.0, 1.0, 0.0, -aabb.min.y),
            Vec4::new(0.0, -1.0, 0.0, aabb.max.y),
            Vec4::new(0.0, 0.0, 1.0, -aabb.min.z),
            Vec4::new(0.0, 0.0, -1.0, aabb.max.z),
        ])
    }

    #[inline(always)]
    fn signed_distance(plane: &Vec4, point: Vec3A) -> f32 {
        Vec3A::from(plane.truncate()).dot(point) + plane.w
    }

    /// Positive-vertex test: false only if the box is entirely behind one of the planes.
    /// Conservative, may report boxes near frustum corners as intersecting.
    #[inline(always)]
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let normal = Vec3A::from(plane.truncate());
            let positive = Vec3A::select(normal.cmpge(Vec3A::ZERO), aabb.max, aabb.min);
            Self::signed_distance(plane, positive) >= 0.0
        })
    }

    /// Classifies the box as outside, straddling, or entirely inside the frustum.
    #[inline(always)]
    pub fn classify_aabb(&self, aabb: &Aabb) -> FrustumTest {
        let mut result = FrustumTest::Inside;
        for plane in &self.planes {
            let normal = Vec3A::from(plane.truncate());
            let select = normal.cmpge(Vec3A::ZERO);
            let positive = Vec3A::select(select, aabb.max, aabb.min);
            if Self::signed_distance(plane, positive) < 0.0 {
                return FrustumTest::Outside;
            }
            let negative = Vec3A::select(select, aabb.min, aabb.max);
            if Self::signed_distance(plane, negative) < 0.0 {
                result = FrustumTest::Partial;
            }
        }
        result
    }
}
