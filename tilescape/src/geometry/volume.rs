//! Bounding-volume shapes and the polymorphic visibility/distance contract.
//!
//! A tile's bounding volume is one of three shapes: an oriented box (center
//! plus three half-axis vectors), a geographic region (latitude/longitude/
//! height bounds), or a sphere. All three answer the same two questions:
//! how they classify against a plane, and how far a point is from them.
//!
//! Regions are converted to an oriented box on the reference ellipsoid at
//! construction time; plane and distance queries delegate to that box.

use glam::{DMat3, DMat4, DVec2, DVec3};

use super::{CullingResult, Ellipsoid, Plane};

/// An oriented bounding box: a center and three half-axis vectors whose
/// directions and lengths define the box.
#[derive(Debug, Clone, Copy)]
pub struct OrientedBox {
    /// Center of the box.
    pub center: DVec3,
    /// Half-axes as matrix columns; each column points from the center to a
    /// face of the box.
    pub half_axes: DMat3,
}

impl OrientedBox {
    /// Creates a box from its center and half-axes.
    pub fn new(center: DVec3, half_axes: DMat3) -> Self {
        Self { center, half_axes }
    }

    /// Classifies the box against a plane using its effective radius: the
    /// sum of the absolute projections of the half-axes onto the normal.
    pub fn intersect_plane(&self, plane: &Plane) -> CullingResult {
        let n = plane.normal;
        let rad_effective = n.dot(self.half_axes.x_axis).abs()
            + n.dot(self.half_axes.y_axis).abs()
            + n.dot(self.half_axes.z_axis).abs();

        let distance_to_plane = plane.signed_distance(self.center);
        if distance_to_plane <= -rad_effective {
            CullingResult::Outside
        } else if distance_to_plane >= rad_effective {
            CullingResult::Inside
        } else {
            CullingResult::Intersecting
        }
    }

    /// Squared distance from `position` to the nearest point of the box.
    ///
    /// Zero when the position is inside the box.
    pub fn distance_squared_to(&self, position: DVec3) -> f64 {
        let offset = position - self.center;

        let mut distance_squared = 0.0;
        for axis in [
            self.half_axes.x_axis,
            self.half_axes.y_axis,
            self.half_axes.z_axis,
        ] {
            let half_length = axis.length();
            if half_length == 0.0 {
                continue;
            }
            let along = offset.dot(axis / half_length);
            let d = along.abs() - half_length;
            if d > 0.0 {
                distance_squared += d * d;
            }
        }

        distance_squared
    }

    /// Builds a box that fully encloses a geographic region between its two
    /// height limits.
    ///
    /// Rectangles no wider than half a revolution are framed by the tangent
    /// plane at the region's center; wider rectangles wrap too far around the
    /// ellipsoid for a tangent frame and use a plane rotating around the polar
    /// axis instead.
    pub fn from_region(region: &BoundingRegion, ellipsoid: &Ellipsoid) -> Self {
        if region.east - region.west <= std::f64::consts::PI {
            Self::from_narrow_region(region, ellipsoid)
        } else {
            Self::from_wide_region(region, ellipsoid)
        }
    }

    /// Tangent-plane frame for rectangles spanning at most half a revolution:
    /// east/north/up at the region's center, extents from the rectangle's
    /// perimeter at maximum height.
    fn from_narrow_region(region: &BoundingRegion, ellipsoid: &Ellipsoid) -> Self {
        let lon_center = (region.west + region.east) * 0.5;
        let lat_center = (region.south + region.north) * 0.5;

        let origin = ellipsoid.cartographic_to_cartesian(lon_center, lat_center, 0.0);
        let z_axis = ellipsoid.geodetic_surface_normal(lon_center, lat_center);
        let x_axis = DVec3::new(-lon_center.sin(), lon_center.cos(), 0.0);
        let y_axis = z_axis.cross(x_axis);

        // The west edge reaches farthest from the tangent plane at the
        // equator, not at the center latitude, when the region spans it.
        let lat_west = if region.south < 0.0 && region.north > 0.0 {
            0.0
        } else {
            lat_center
        };

        let project = |lon: f64, lat: f64, height: f64| {
            let offset = ellipsoid.cartographic_to_cartesian(lon, lat, height) - origin;
            let in_plane = offset - offset.dot(z_axis) * z_axis;
            DVec2::new(in_plane.dot(x_axis), in_plane.dot(y_axis))
        };

        let max_h = region.maximum_height;
        let north_center = project(lon_center, region.north, max_h);
        let north_west = project(region.west, region.north, max_h);
        let center_west = project(region.west, lat_west, max_h);
        let south_west = project(region.west, region.south, max_h);
        let south_center = project(lon_center, region.south, max_h);

        let min_x = north_west.x.min(center_west.x).min(south_west.x);
        let max_x = -min_x; // symmetrical about the center longitude
        let max_y = north_west.y.max(north_center.y);
        let min_y = south_west.y.min(south_center.y);

        // The minimum-height corners dip deepest below the tangent plane; the
        // plane touches the surface at height zero, so maximum_height bounds
        // the top.
        let plane_distance = |lon: f64, lat: f64, height: f64| {
            (ellipsoid.cartographic_to_cartesian(lon, lat, height) - origin).dot(z_axis)
        };
        let min_h = region.minimum_height;
        let min_z = plane_distance(region.west, region.north, min_h)
            .min(plane_distance(region.west, region.south, min_h));
        let max_z = region.maximum_height;

        Self::from_plane_extents(
            origin, x_axis, y_axis, z_axis, min_x, max_x, min_y, max_y, min_z, max_z,
        )
    }

    /// Frame for rectangles wider than half a revolution: a plane at the
    /// rectangle's latitude nearest the equator, rotating around the polar
    /// axis at the center longitude.
    fn from_wide_region(region: &BoundingRegion, ellipsoid: &Ellipsoid) -> Self {
        let fully_above_equator = region.south > 0.0;
        let fully_below_equator = region.north < 0.0;
        let lat_nearest_equator = if fully_above_equator {
            region.south
        } else if fully_below_equator {
            region.north
        } else {
            0.0
        };
        let lon_center = (region.west + region.east) * 0.5;
        let max_h = region.maximum_height;

        let mut origin =
            ellipsoid.cartographic_to_cartesian(lon_center, lat_nearest_equator, max_h);
        origin.z = 0.0;
        let at_pole = origin.x.abs() < 1e-10 && origin.y.abs() < 1e-10;
        let z_axis = if at_pole { DVec3::X } else { origin.normalize() };
        let y_axis = DVec3::Z;
        let x_axis = z_axis.cross(y_axis);

        // The horizon point a quarter revolution away marks the widest
        // lateral extent.
        let horizon = ellipsoid.cartographic_to_cartesian(
            lon_center + std::f64::consts::FRAC_PI_2,
            lat_nearest_equator,
            max_h,
        );
        let horizon_offset = horizon - origin;
        let horizon_in_plane = horizon_offset - horizon_offset.dot(z_axis) * z_axis;
        let max_x = horizon_in_plane.dot(x_axis).abs();
        let min_x = -max_x;

        // Extent along the polar axis, using whichever height reaches
        // farthest for each edge.
        let max_y = ellipsoid
            .cartographic_to_cartesian(
                0.0,
                region.north,
                if fully_below_equator {
                    region.minimum_height
                } else {
                    max_h
                },
            )
            .z;
        let min_y = ellipsoid
            .cartographic_to_cartesian(
                0.0,
                region.south,
                if fully_above_equator {
                    region.minimum_height
                } else {
                    max_h
                },
            )
            .z;

        // Depth reaches back to the far edge of the rectangle.
        let far = ellipsoid.cartographic_to_cartesian(region.east, lat_nearest_equator, max_h);
        let min_z = (far - origin).dot(z_axis);
        let max_z = 0.0;

        Self::from_plane_extents(
            origin, x_axis, y_axis, z_axis, min_x, max_x, min_y, max_y, min_z, max_z,
        )
    }

    /// Builds a box from an orthonormal frame and per-axis extents measured
    /// in it.
    #[allow(clippy::too_many_arguments)]
    fn from_plane_extents(
        origin: DVec3,
        x_axis: DVec3,
        y_axis: DVec3,
        z_axis: DVec3,
        min_x: f64,
        max_x: f64,
        min_y: f64,
        max_y: f64,
        min_z: f64,
        max_z: f64,
    ) -> Self {
        let center_offset = DVec3::new(
            (min_x + max_x) * 0.5,
            (min_y + max_y) * 0.5,
            (min_z + max_z) * 0.5,
        );
        let scale = DVec3::new(
            (max_x - min_x) * 0.5,
            (max_y - min_y) * 0.5,
            (max_z - min_z) * 0.5,
        );
        Self {
            center: origin
                + x_axis * center_offset.x
                + y_axis * center_offset.y
                + z_axis * center_offset.z,
            half_axes: DMat3::from_cols(x_axis * scale.x, y_axis * scale.y, z_axis * scale.z),
        }
    }
}

/// A bounding sphere.
#[derive(Debug, Clone, Copy)]
pub struct BoundingSphere {
    /// Center of the sphere.
    pub center: DVec3,
    /// Radius of the sphere.
    pub radius: f64,
}

impl BoundingSphere {
    /// Creates a sphere from its center and radius.
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Classifies the sphere against a plane.
    pub fn intersect_plane(&self, plane: &Plane) -> CullingResult {
        let distance_to_plane = plane.signed_distance(self.center);
        if distance_to_plane < -self.radius {
            CullingResult::Outside
        } else if distance_to_plane > self.radius {
            CullingResult::Inside
        } else {
            CullingResult::Intersecting
        }
    }

    /// Squared distance from `position` to the nearest point of the sphere.
    pub fn distance_squared_to(&self, position: DVec3) -> f64 {
        let d = (position - self.center).length() - self.radius;
        if d <= 0.0 {
            0.0
        } else {
            d * d
        }
    }
}

/// Geographic bounds of a tile: longitude/latitude extents in radians and a
/// height range in meters above the ellipsoid surface.
#[derive(Debug, Clone, Copy)]
pub struct BoundingRegion {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub minimum_height: f64,
    pub maximum_height: f64,
}

/// One of the three bounding-volume shapes a manifest can author.
///
/// Regions carry the oriented box derived from them so plane and distance
/// queries stay cheap after construction.
#[derive(Debug, Clone, Copy)]
pub enum BoundingVolume {
    Box(OrientedBox),
    Region {
        region: BoundingRegion,
        bounding_box: OrientedBox,
    },
    Sphere(BoundingSphere),
}

impl BoundingVolume {
    /// Wraps an oriented box.
    pub fn from_box(b: OrientedBox) -> Self {
        BoundingVolume::Box(b)
    }

    /// Wraps a sphere.
    pub fn from_sphere(s: BoundingSphere) -> Self {
        BoundingVolume::Sphere(s)
    }

    /// Builds a region volume, deriving its Cartesian bounding box on the
    /// WGS84 ellipsoid.
    pub fn from_region(region: BoundingRegion) -> Self {
        let bounding_box = OrientedBox::from_region(&region, &Ellipsoid::WGS84);
        BoundingVolume::Region {
            region,
            bounding_box,
        }
    }

    /// Classifies the volume against a plane.
    pub fn intersect_plane(&self, plane: &Plane) -> CullingResult {
        match self {
            BoundingVolume::Box(b) => b.intersect_plane(plane),
            BoundingVolume::Region { bounding_box, .. } => bounding_box.intersect_plane(plane),
            BoundingVolume::Sphere(s) => s.intersect_plane(plane),
        }
    }

    /// Squared distance from `position` to the nearest point of the volume.
    pub fn distance_squared_to(&self, position: DVec3) -> f64 {
        match self {
            BoundingVolume::Box(b) => b.distance_squared_to(position),
            BoundingVolume::Region { bounding_box, .. } => {
                bounding_box.distance_squared_to(position)
            }
            BoundingVolume::Sphere(s) => s.distance_squared_to(position),
        }
    }

    /// Applies a transform to the volume.
    ///
    /// Boxes transform their center and half-axes; spheres transform their
    /// center and scale their radius by the largest column length of the
    /// transform. Regions are authored in geographic coordinates and are
    /// not transformed.
    pub fn transform(&self, transform: &DMat4) -> Self {
        match self {
            BoundingVolume::Box(b) => {
                let center = transform.transform_point3(b.center);
                let linear = DMat3::from_mat4(*transform);
                BoundingVolume::Box(OrientedBox::new(center, linear * b.half_axes))
            }
            BoundingVolume::Region { .. } => *self,
            BoundingVolume::Sphere(s) => {
                let center = transform.transform_point3(s.center);
                let uniform_scale = transform
                    .x_axis
                    .truncate()
                    .length()
                    .max(transform.y_axis.truncate().length())
                    .max(transform.z_axis.truncate().length());
                BoundingVolume::Sphere(BoundingSphere::new(center, s.radius * uniform_scale))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> OrientedBox {
        OrientedBox::new(DVec3::ZERO, DMat3::IDENTITY)
    }

    #[test]
    fn test_box_intersect_plane() {
        let b = unit_box();

        let far = Plane::from_normal_and_point(DVec3::X, DVec3::new(-5.0, 0.0, 0.0));
        assert_eq!(b.intersect_plane(&far), CullingResult::Inside);

        let behind = Plane::from_normal_and_point(DVec3::X, DVec3::new(5.0, 0.0, 0.0));
        assert_eq!(b.intersect_plane(&behind), CullingResult::Outside);

        let through = Plane::from_normal_and_point(DVec3::X, DVec3::ZERO);
        assert_eq!(b.intersect_plane(&through), CullingResult::Intersecting);
    }

    #[test]
    fn test_box_distance_inside_is_zero() {
        let b = unit_box();
        assert_eq!(b.distance_squared_to(DVec3::new(0.5, -0.5, 0.2)), 0.0);
    }

    #[test]
    fn test_box_distance_outside() {
        let b = unit_box();
        let d2 = b.distance_squared_to(DVec3::new(3.0, 0.0, 0.0));
        assert!((d2 - 4.0).abs() < 1e-12);

        let corner = b.distance_squared_to(DVec3::new(2.0, 2.0, 0.0));
        assert!((corner - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_rotated_box_distance() {
        // Box rotated 45 degrees around Z; faces now along the diagonals.
        let rot = DMat3::from_rotation_z(std::f64::consts::FRAC_PI_4);
        let b = OrientedBox::new(DVec3::ZERO, rot);
        let sqrt2 = std::f64::consts::SQRT_2;
        let d2 = b.distance_squared_to(DVec3::new(sqrt2, sqrt2, 0.0));
        // Position is 2 along the rotated x axis, 1 past the face.
        assert!((d2 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sphere_intersect_plane() {
        let s = BoundingSphere::new(DVec3::new(0.0, 0.0, 10.0), 2.0);

        let below = Plane::from_normal_and_point(DVec3::Z, DVec3::ZERO);
        assert_eq!(s.intersect_plane(&below), CullingResult::Inside);

        let above = Plane::from_normal_and_point(DVec3::Z, DVec3::new(0.0, 0.0, 20.0));
        assert_eq!(s.intersect_plane(&above), CullingResult::Outside);

        let touching = Plane::from_normal_and_point(DVec3::Z, DVec3::new(0.0, 0.0, 11.0));
        assert_eq!(s.intersect_plane(&touching), CullingResult::Intersecting);
    }

    #[test]
    fn test_sphere_distance() {
        let s = BoundingSphere::new(DVec3::ZERO, 10.0);
        assert_eq!(s.distance_squared_to(DVec3::new(5.0, 0.0, 0.0)), 0.0);
        let d2 = s.distance_squared_to(DVec3::new(0.0, 0.0, 1000.0));
        assert!((d2 - 990.0 * 990.0).abs() < 1e-6);
    }

    #[test]
    fn test_transform_box() {
        let b = BoundingVolume::from_box(unit_box());
        let t = DMat4::from_translation(DVec3::new(10.0, 0.0, 0.0));
        let moved = b.transform(&t);
        match moved {
            BoundingVolume::Box(moved) => {
                assert!((moved.center.x - 10.0).abs() < 1e-12);
            }
            _ => panic!("expected a box"),
        }
    }

    #[test]
    fn test_transform_sphere_scales_radius() {
        let s = BoundingVolume::from_sphere(BoundingSphere::new(DVec3::ZERO, 2.0));
        let t = DMat4::from_scale(DVec3::new(3.0, 1.0, 1.0));
        match s.transform(&t) {
            BoundingVolume::Sphere(s) => assert!((s.radius - 6.0).abs() < 1e-12),
            _ => panic!("expected a sphere"),
        }
    }

    #[test]
    fn test_transform_region_is_identity() {
        let region = BoundingRegion {
            west: -0.01,
            south: -0.01,
            east: 0.01,
            north: 0.01,
            minimum_height: 0.0,
            maximum_height: 100.0,
        };
        let v = BoundingVolume::from_region(region);
        let t = DMat4::from_translation(DVec3::new(1e6, 0.0, 0.0));
        let before = v.distance_squared_to(DVec3::ZERO);
        let after = v.transform(&t).distance_squared_to(DVec3::ZERO);
        assert_eq!(before, after);
    }

    #[test]
    fn test_region_box_contains_corners() {
        let region = BoundingRegion {
            west: 0.1,
            south: 0.2,
            east: 0.15,
            north: 0.25,
            minimum_height: -50.0,
            maximum_height: 500.0,
        };
        let v = BoundingVolume::from_region(region);

        // Every sampled corner must be inside (distance zero) the derived box.
        for &lon in &[region.west, region.east] {
            for &lat in &[region.south, region.north] {
                for &h in &[region.minimum_height, region.maximum_height] {
                    let p = Ellipsoid::WGS84.cartographic_to_cartesian(lon, lat, h);
                    assert!(v.distance_squared_to(p) < 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_full_globe_region_contains_surface_points() {
        use std::f64::consts::{FRAC_PI_2, PI};
        let region = BoundingRegion {
            west: -PI,
            south: -FRAC_PI_2,
            east: PI,
            north: FRAC_PI_2,
            minimum_height: 0.0,
            maximum_height: 100.0,
        };
        let v = BoundingVolume::from_region(region);

        // Surface points all around the globe, including both poles and the
        // meridian opposite the region's center longitude.
        for &(lon, lat) in &[
            (0.0, 0.0),
            (FRAC_PI_2, 0.0),
            (-FRAC_PI_2, 0.0),
            (PI, 0.0),
            (0.0, FRAC_PI_2),
            (0.0, -FRAC_PI_2),
            (2.0, -0.7),
        ] {
            let p = Ellipsoid::WGS84.cartographic_to_cartesian(lon, lat, 0.0);
            assert!(
                v.distance_squared_to(p) < 1e-6,
                "surface point at lon {lon}, lat {lat} must be inside the box"
            );
        }
    }

    #[test]
    fn test_wide_southern_region_contains_interior_points() {
        // Wider than half a revolution and entirely below the equator.
        let region = BoundingRegion {
            west: -3.0,
            south: -1.2,
            east: 1.0,
            north: -0.3,
            minimum_height: 0.0,
            maximum_height: 0.0,
        };
        let v = BoundingVolume::from_region(region);

        for &(lon, lat) in &[(-1.0, -0.3), (0.0, -0.8), (-2.5, -1.1), (1.0, -0.75)] {
            let p = Ellipsoid::WGS84.cartographic_to_cartesian(lon, lat, 0.0);
            assert!(
                v.distance_squared_to(p) < 1e-6,
                "surface point at lon {lon}, lat {lat} must be inside the box"
            );
        }
    }

    #[test]
    fn test_equator_spanning_region_contains_equator_bulge() {
        // Center latitude is north of the equator, but the ellipsoid sticks
        // out farthest where the region crosses it.
        let region = BoundingRegion {
            west: -0.3,
            south: -0.1,
            east: 0.3,
            north: 0.5,
            minimum_height: 0.0,
            maximum_height: 0.0,
        };
        let v = BoundingVolume::from_region(region);

        for &lon in &[region.west, 0.0, region.east] {
            let p = Ellipsoid::WGS84.cartographic_to_cartesian(lon, 0.0, 0.0);
            assert!(
                v.distance_squared_to(p) < 1e-6,
                "equator point at lon {lon} must be inside the box"
            );
        }
    }
}
