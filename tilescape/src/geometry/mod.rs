//! Geometry primitives for visibility and level-of-detail decisions.
//!
//! Provides the bounding-volume shapes used by tileset manifests (oriented
//! box, geographic region, sphere), plane classification against a camera's
//! culling volume, and the screen-space-error formula.
//!
//! All routines are conservative: a volume that partially intersects the
//! frustum is never classified as fully outside.

mod camera;
mod ellipsoid;
mod volume;

pub use camera::Camera;
pub use ellipsoid::Ellipsoid;
pub use volume::{BoundingRegion, BoundingSphere, BoundingVolume, OrientedBox};

use glam::DVec3;

/// Result of classifying a volume against a single plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullingResult {
    /// The volume is entirely on the negative side of the plane.
    Outside,
    /// The volume is entirely on the positive side of the plane.
    Inside,
    /// The volume straddles the plane.
    Intersecting,
}

/// A plane in Hessian normal form: `dot(normal, x) + distance == 0`.
///
/// The normal is expected to be unit length; points on the positive side
/// (in the direction of the normal) are considered inside a culling volume.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    /// Unit normal of the plane.
    pub normal: DVec3,
    /// Signed distance of the plane from the origin along the normal.
    pub distance: f64,
}

impl Plane {
    /// Creates a plane from a unit normal and a point the plane passes through.
    pub fn from_normal_and_point(normal: DVec3, point: DVec3) -> Self {
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    /// Signed distance from `point` to the plane.
    pub fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }
}
