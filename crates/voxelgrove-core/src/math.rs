//! Boxes, rays and view frustums.

use glam::{Mat4, Vec3, Vec4};

/// Half-line `origin + t * direction`, `t >= 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length when built through [`Ray::new`].
    pub direction: Vec3,
}

impl Ray {
    /// Ray with a normalized direction.
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Point at parameter `t`
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Axis-aligned box, `min <= max` on every axis.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point. Returns `None` for no points.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |mut aabb, p| {
            aabb.expand_to_include(p);
            aabb
        }))
    }

    /// Box of edge 1 with its minimum corner at `min`.
    #[inline]
    pub fn unit_cube(min: Vec3) -> Self {
        Self::new(min, min + Vec3::ONE)
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Edge lengths
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Total area of the six faces.
    #[inline]
    pub fn surface_area(&self) -> f32 {
        let s = self.size().max(Vec3::ZERO);
        2.0 * (s.x * s.y + s.y * s.z + s.z * s.x)
    }

    /// Boundary points count as inside.
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    /// Returns true if `other` lies entirely inside this box
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    /// Overlap test; touching faces count.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// Slab test. Returns the entry and exit parameters along `ray`, with the
    /// entry clamped to zero when the origin is inside.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f32, f32)> {
        let inv = ray.direction.recip();
        let a = (self.min - ray.origin) * inv;
        let b = (self.max - ray.origin) * inv;
        let enter = a.min(b).max_element();
        let exit = a.max(b).min_element();
        (enter <= exit && exit >= 0.0).then(|| (enter.max(0.0), exit))
    }

    #[inline]
    pub fn expand_to_include(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Smallest box holding both.
    #[inline]
    pub fn merge(&self, other: &Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// The eight corners, `x` varying fastest.
    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| {
            Vec3::select(
                glam::BVec3::new(i & 1 != 0, i & 2 != 0, i & 4 != 0),
                self.max,
                self.min,
            )
        })
    }

    /// Box enclosing this box after transforming all eight corners.
    pub fn transformed(&self, matrix: Mat4) -> Self {
        let corners = self.corners().map(|c| matrix.transform_point3(c));
        let mut out = Self::new(corners[0], corners[0]);
        for c in &corners[1..] {
            out.expand_to_include(*c);
        }
        out
    }

    /// Squared distance from `point` to the nearest point of the box.
    #[inline]
    pub fn distance_squared(&self, point: Vec3) -> f32 {
        point.clamp(self.min, self.max).distance_squared(point)
    }
}

/// Six inward-facing planes `(normal, d)` in left, right, bottom, top, near,
/// far order. A point `p` is inside a plane when `normal · p + d >= 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Gribb-Hartmann plane extraction from a combined view-projection matrix.
    pub fn from_view_projection(vp: Mat4) -> Self {
        let [r0, r1, r2, r3] = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2]
            .map(|p| p / p.truncate().length());
        Self { planes }
    }

    /// Conservative box test: false only when the box is fully outside one
    /// plane.
    pub fn test_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            let farthest = Vec3::select(normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            plane.dot(farthest.extend(1.0)) >= 0.0
        })
    }
}
