//! Camera-relative bounds of the cloud layer

use glam::Vec3;

/// Axis-aligned cloud box with the camera at the origin
///
/// Working relative to the camera keeps the raymarch precise even when the
/// camera is far from the world origin.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CloudBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl CloudBounds {
    /// Bounds of a box centred at `volume_position` whose full size is
    /// `volume_scale`, seen from `camera_position`
    pub fn camera_relative(volume_position: Vec3, volume_scale: Vec3, camera_position: Vec3) -> Self {
        let relative = volume_position - camera_position;
        let half_extents = volume_scale * 0.5;
        Self {
            min: relative - half_extents,
            max: relative + half_extents,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Slab intersection of a ray starting at the camera (the origin).
    ///
    /// Returns `(distance_to_box, distance_inside_box)`, both measured in units of
    /// `direction`'s length; `None` when the ray misses.
    pub fn ray_intersection(&self, direction: Vec3) -> Option<(f32, f32)> {
        let inv = direction.recip();
        let t0 = self.min * inv;
        let t1 = self.max * inv;
        let t_near = t0.min(t1).max_element();
        let t_far = t0.max(t1).min_element();

        let to_box = t_near.max(0.0);
        let inside = t_far - to_box;
        (inside > 0.0 && t_far > 0.0).then_some((to_box, inside))
    }
}
