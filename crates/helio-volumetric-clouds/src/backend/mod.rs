//! GPU resource contract between the effect and the host renderer
//!
//! The effect never talks to a graphics API directly. It asks a [`GraphicsBackend`]
//! for shaders, materials and render targets, and records blits into the backend's
//! [`CommandRecorder`]. Resources are released by dropping them, so every owner
//! frees what it holds on every exit path.

pub mod software;
pub mod wgpu_backend;

use crate::params::{ColorSpace, ShaderParam, ShaderValue};
use crate::settings::Color;
use crate::{Error, Result};
use glam::Vec4;
use std::ops::{Deref, DerefMut};

/// Size and layout of a render target
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenderTargetDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub sample_count: u32,
    /// Bits of an attached depth buffer, 0 for none
    pub depth_bits: u32,
}

impl RenderTargetDescriptor {
    /// Single-sample colour target without depth
    pub fn new(width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            sample_count: 1,
            depth_bits: 0,
        }
    }

    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count.max(1);
        self
    }

    pub fn with_depth_bits(mut self, depth_bits: u32) -> Self {
        self.depth_bits = depth_bits;
        self
    }

    /// Same size and format, forced to single-sample and no depth
    pub fn scratch_compatible(&self) -> Self {
        Self {
            sample_count: 1,
            depth_bits: 0,
            ..*self
        }
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    /// Reject descriptors no backend can allocate, e.g. a minimised window
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Resource(format!(
                "render target has a zero extent ({}x{})",
                self.width, self.height
            )));
        }
        Ok(())
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// How a render target is sampled when read by a later blit
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SamplerSettings {
    pub filter: wgpu::FilterMode,
    pub address_mode: wgpu::AddressMode,
}

impl SamplerSettings {
    pub const BILINEAR_CLAMP: SamplerSettings = SamplerSettings {
        filter: wgpu::FilterMode::Linear,
        address_mode: wgpu::AddressMode::ClampToEdge,
    };
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self::BILINEAR_CLAMP
    }
}

/// A GPU parameter block built from a shader
///
/// Setters take `&self`: a material is shared between its owner and the pass
/// that renders with it during a frame.
pub trait Material: Send + Sync {
    fn set(&self, param: ShaderParam, value: ShaderValue);

    fn set_float(&self, param: ShaderParam, value: f32) {
        self.set(param, ShaderValue::Float(value));
    }

    fn set_vector(&self, param: ShaderParam, value: Vec4) {
        self.set(param, ShaderValue::Vector(value));
    }

    /// Colours are converted into the backend's working colour space on upload
    fn set_color(&self, param: ShaderParam, value: Color) {
        self.set(param, ShaderValue::Color(value));
    }

    fn set_texture(&self, param: ShaderParam, texture: Option<&str>) {
        self.set(param, ShaderValue::Texture(texture.map(str::to_string)));
    }

    /// Number of shader passes a blit may select
    fn pass_count(&self) -> u32 {
        1
    }
}

/// A colour image that can be blitted from and to
pub trait RenderTarget: Send + Sync {
    fn descriptor(&self) -> RenderTargetDescriptor;
    fn label(&self) -> &str;
}

/// Records GPU work for later submission
pub trait CommandRecorder {
    type RenderTarget: RenderTarget;
    type Material: Material;

    /// Draw `source` into `destination`, through `material`'s shader pass when
    /// given, otherwise through a plain copy shader
    fn blit(
        &mut self,
        source: &Self::RenderTarget,
        destination: &Self::RenderTarget,
        material: Option<(&Self::Material, u32)>,
    ) -> Result<()>;

    fn push_debug_group(&mut self, label: &str);
    fn pop_debug_group(&mut self);
}

/// Shader lookup, material creation, render-target allocation and submission
pub trait GraphicsBackend: 'static {
    type Shader: Clone + Send + Sync;
    type Material: Material;
    type RenderTarget: RenderTarget;
    type CommandRecorder: CommandRecorder<RenderTarget = Self::RenderTarget, Material = Self::Material>;

    /// Colour space materials compute in
    fn color_space(&self) -> ColorSpace;

    fn find_shader(&self, name: &str) -> Option<Self::Shader>;

    fn create_material(&self, shader: &Self::Shader) -> Option<Self::Material>;

    /// Fails instead of panicking when the descriptor cannot be allocated
    fn allocate_render_target(
        &self,
        descriptor: &RenderTargetDescriptor,
        sampler: SamplerSettings,
        label: &str,
    ) -> Result<Self::RenderTarget>;

    fn begin_commands(&self, label: &str) -> Self::CommandRecorder;

    fn submit(&self, recorder: Self::CommandRecorder);
}

/// Debug-group guard: pushes on creation, pops when dropped
pub struct ProfilingScope<'a, R: CommandRecorder> {
    recorder: &'a mut R,
}

impl<'a, R: CommandRecorder> ProfilingScope<'a, R> {
    pub fn new(recorder: &'a mut R, label: &str) -> Self {
        recorder.push_debug_group(label);
        Self { recorder }
    }
}

impl<R: CommandRecorder> Deref for ProfilingScope<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        &*self.recorder
    }
}

impl<R: CommandRecorder> DerefMut for ProfilingScope<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut *self.recorder
    }
}

impl<R: CommandRecorder> Drop for ProfilingScope<'_, R> {
    fn drop(&mut self) {
        self.recorder.pop_debug_group();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_compatible_drops_msaa_and_depth_only() {
        let camera = RenderTargetDescriptor::new(1920, 1080, wgpu::TextureFormat::Rgba16Float)
            .with_sample_count(4)
            .with_depth_bits(32);
        let scratch = camera.scratch_compatible();

        assert_eq!(scratch.width, 1920);
        assert_eq!(scratch.height, 1080);
        assert_eq!(scratch.format, wgpu::TextureFormat::Rgba16Float);
        assert_eq!(scratch.sample_count, 1);
        assert_eq!(scratch.depth_bits, 0);
        assert_eq!(scratch.scratch_compatible(), scratch);
    }
}
