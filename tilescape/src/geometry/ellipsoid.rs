//! Reference ellipsoid and geodetic conversions.
//!
//! Geographic bounding regions are authored as latitude/longitude/height
//! bounds; converting them into Cartesian culling shapes requires mapping
//! cartographic coordinates onto the surface of a reference ellipsoid.

use glam::DVec3;

/// An ellipsoid centered at the origin, aligned with the coordinate axes.
#[derive(Debug, Clone, Copy)]
pub struct Ellipsoid {
    radii: DVec3,
    radii_squared: DVec3,
}

impl Ellipsoid {
    /// The WGS84 reference ellipsoid.
    pub const WGS84: Ellipsoid = Ellipsoid::new(6_378_137.0, 6_378_137.0, 6_356_752.314_245_179_3);

    /// Creates an ellipsoid with the given semi-axis lengths.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            radii: DVec3::new(x, y, z),
            radii_squared: DVec3::new(x * x, y * y, z * z),
        }
    }

    /// Semi-axis lengths of the ellipsoid.
    pub fn radii(&self) -> DVec3 {
        self.radii
    }

    /// Unit normal of the ellipsoid surface below the given cartographic
    /// position.
    ///
    /// Longitude and latitude are in radians.
    pub fn geodetic_surface_normal(&self, longitude: f64, latitude: f64) -> DVec3 {
        let cos_lat = latitude.cos();
        DVec3::new(
            cos_lat * longitude.cos(),
            cos_lat * longitude.sin(),
            latitude.sin(),
        )
        .normalize()
    }

    /// Converts a cartographic position (radians, meters above the surface)
    /// to Cartesian coordinates.
    pub fn cartographic_to_cartesian(&self, longitude: f64, latitude: f64, height: f64) -> DVec3 {
        let n = self.geodetic_surface_normal(longitude, latitude);
        let k = self.radii_squared * n;
        let gamma = n.dot(k).sqrt();
        k / gamma + n * height
    }
}
