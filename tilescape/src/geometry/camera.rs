//! Camera state, frustum construction, and the screen-space-error metric.

use glam::{DVec2, DVec3};

use super::{BoundingVolume, CullingResult, Plane};

/// A viewer: position, orientation, viewport, and field of view.
///
/// The camera owns the four lateral culling planes derived from its state
/// and the precomputed denominator of the screen-space-error formula. Both
/// are refreshed whenever position/orientation or view parameters change.
///
/// Culling uses only the left/right/bottom/top planes; there is no near or
/// far clip, so culling stays conservative for volumes at any distance.
pub struct Camera {
    position: DVec3,
    direction: DVec3,
    up: DVec3,
    viewport_size: DVec2,
    horizontal_fov: f64,
    vertical_fov: f64,
    sse_denominator: f64,
    culling_planes: [Plane; 4],
}

impl Camera {
    /// Creates a camera.
    ///
    /// # Arguments
    ///
    /// * `position` - eye position in world coordinates
    /// * `direction` - unit view direction
    /// * `up` - unit up vector, perpendicular to `direction`
    /// * `viewport_size` - viewport width and height in pixels
    /// * `horizontal_fov` - horizontal field of view in radians
    /// * `vertical_fov` - vertical field of view in radians
    pub fn new(
        position: DVec3,
        direction: DVec3,
        up: DVec3,
        viewport_size: DVec2,
        horizontal_fov: f64,
        vertical_fov: f64,
    ) -> Self {
        let mut camera = Self {
            position,
            direction,
            up,
            viewport_size,
            horizontal_fov,
            vertical_fov,
            sse_denominator: 1.0,
            culling_planes: [Plane::from_normal_and_point(DVec3::Z, DVec3::ZERO); 4],
        };
        camera.update_view_parameters(viewport_size, horizontal_fov, vertical_fov);
        camera
    }

    /// Eye position in world coordinates.
    pub fn position(&self) -> DVec3 {
        self.position
    }

    /// Viewport width and height in pixels.
    pub fn viewport_size(&self) -> DVec2 {
        self.viewport_size
    }

    /// Moves and reorients the camera.
    pub fn update_position_and_orientation(
        &mut self,
        position: DVec3,
        direction: DVec3,
        up: DVec3,
    ) {
        self.position = position;
        self.direction = direction;
        self.up = up;
        self.update_culling_volume();
    }

    /// Updates viewport size and fields of view.
    pub fn update_view_parameters(
        &mut self,
        viewport_size: DVec2,
        horizontal_fov: f64,
        vertical_fov: f64,
    ) {
        self.viewport_size = viewport_size;
        self.horizontal_fov = horizontal_fov;
        self.vertical_fov = vertical_fov;
        self.sse_denominator = 2.0 * (0.5 * vertical_fov).tan();
        self.update_culling_volume();
    }

    fn update_culling_volume(&mut self) {
        let aspect_ratio = self.viewport_size.x / self.viewport_size.y;

        let t = (0.5 * self.vertical_fov).tan();
        let b = -t;
        let r = aspect_ratio * t;
        let l = -r;

        let right = self.direction.cross(self.up).normalize();
        // Plane points are taken on a canonical near plane one unit out.
        let near_center = self.position + self.direction;

        let left_edge = (near_center + right * l - self.position).normalize();
        let left_normal = left_edge.cross(self.up).normalize();
        let left = Plane::from_normal_and_point(left_normal, self.position);

        let right_edge = (near_center + right * r - self.position).normalize();
        let right_normal = self.up.cross(right_edge).normalize();
        let right_plane = Plane::from_normal_and_point(right_normal, self.position);

        let bottom_edge = (near_center + self.up * b - self.position).normalize();
        let bottom_normal = right.cross(bottom_edge).normalize();
        let bottom = Plane::from_normal_and_point(bottom_normal, self.position);

        let top_edge = (near_center + self.up * t - self.position).normalize();
        let top_normal = top_edge.cross(right).normalize();
        let top = Plane::from_normal_and_point(top_normal, self.position);

        self.culling_planes = [left, right_plane, bottom, top];
    }

    /// Returns true unless the volume is entirely outside some culling
    /// plane. Partial intersections always count as visible.
    pub fn is_bounding_volume_visible(&self, volume: &BoundingVolume) -> bool {
        for plane in &self.culling_planes {
            if volume.intersect_plane(plane) == CullingResult::Outside {
                return false;
            }
        }
        true
    }

    /// Squared distance from the camera to the nearest point of the volume.
    pub fn distance_squared_to_bounding_volume(&self, volume: &BoundingVolume) -> f64 {
        volume.distance_squared_to(self.position)
    }

    /// Projects a world-space error at the given distance into pixels:
    /// `(geometric_error / distance) * (viewport_height / (2 tan(fovy/2)))`.
    ///
    /// A distance of zero means the viewer is inside the volume, which is
    /// treated as an infinitely large error (always refine) rather than a
    /// division fault.
    pub fn screen_space_error(&self, geometric_error: f64, distance: f64) -> f64 {
        if distance <= 0.0 {
            return f64::INFINITY;
        }
        (geometric_error * self.viewport_size.y) / (distance * self.sse_denominator)
    }
}
