//! Camera utilities

use crate::{Error, Result};
use glam::{Mat4, Vec3, Vec4};

/// Depth range of the clip space produced by a projection matrix
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ClipDepth {
    /// OpenGL convention, near plane at z = -1
    #[default]
    NegativeOneToOne,
    /// wgpu / D3D / Metal convention, near plane at z = 0
    ZeroToOne,
}

impl ClipDepth {
    /// Clip-space z of the near plane
    pub fn near_plane_z(self) -> f32 {
        match self {
            ClipDepth::NegativeOneToOne => -1.0,
            ClipDepth::ZeroToOne => 0.0,
        }
    }
}

/// Camera data for one frame
#[derive(Copy, Clone, Debug)]
pub struct CameraData {
    /// World-to-view matrix
    pub view: Mat4,
    /// View-to-clip matrix
    pub projection: Mat4,
    /// Camera position in world space
    pub position: Vec3,
    /// Distance to the near clip plane
    pub near_clip: f32,
    pub clip_depth: ClipDepth,
}

impl CameraData {
    pub fn new(view: Mat4, projection: Mat4, position: Vec3, near_clip: f32, clip_depth: ClipDepth) -> Self {
        Self {
            view,
            projection,
            position,
            near_clip,
            clip_depth,
        }
    }

    /// Create a perspective camera with an OpenGL-style clip space
    pub fn perspective(
        position: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let view = Mat4::look_at_rh(position, target, up);
        let projection = Mat4::perspective_rh_gl(fov_y, aspect, near, far);

        Self {
            view,
            projection,
            position,
            near_clip: near,
            clip_depth: ClipDepth::NegativeOneToOne,
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }

    /// View-projection with the view translation removed, so that unprojected
    /// points are offsets from the camera rather than world positions
    pub fn centered_view_proj(&self) -> Mat4 {
        let mut view = self.view;
        view.w_axis = Vec4::W;
        self.projection * view
    }
}

/// World-space view-ray basis on the near plane
///
/// A pixel at normalised screen coordinates `(u, v)` (origin top-left) looks along
/// `top_left + x_extent * u + y_extent * v`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraRays {
    pub top_left: Vec3,
    pub top_right: Vec3,
    pub bottom_left: Vec3,
    pub bottom_right: Vec3,
    /// `top_right - top_left`
    pub x_extent: Vec3,
    /// `bottom_left - top_left`
    pub y_extent: Vec3,
    /// `(1 / near, camera position)`
    pub projection_params: Vec4,
}

impl CameraRays {
    pub fn from_camera(camera: &CameraData) -> Result<Self> {
        let centered = camera.centered_view_proj();
        if !centered.is_finite() || centered.determinant().abs() <= f32::EPSILON * f32::EPSILON {
            return Err(Error::DegenerateCamera);
        }
        if camera.near_clip <= 0.0 {
            return Err(Error::DegenerateCamera);
        }
        let inverse = centered.inverse();

        let z = camera.clip_depth.near_plane_z();
        let corner = |x: f32, y: f32| inverse.project_point3(Vec3::new(x, y, z));

        let top_left = corner(-1.0, 1.0);
        let top_right = corner(1.0, 1.0);
        let bottom_left = corner(-1.0, -1.0);
        let bottom_right = corner(1.0, -1.0);

        let p = camera.position;
        Ok(Self {
            top_left,
            top_right,
            bottom_left,
            bottom_right,
            x_extent: top_right - top_left,
            y_extent: bottom_left - top_left,
            projection_params: Vec4::new(1.0 / camera.near_clip, p.x, p.y, p.z),
        })
    }

    /// Ray direction (not normalised) through normalised screen coordinates
    pub fn direction_at(&self, u: f32, v: f32) -> Vec3 {
        self.top_left + self.x_extent * u + self.y_extent * v
    }
}
