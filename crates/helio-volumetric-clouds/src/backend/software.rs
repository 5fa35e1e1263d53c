//! CPU backend
//!
//! Render targets are plain `Vec4` images and blits run immediately on the CPU as
//! they are recorded. The cloud shader pass is evaluated with the same uniform
//! block the GPU shader receives, with every noise texture reading as 1.0, so a
//! frame can be checked pixel by pixel without a GPU. Allocation, release and
//! blit counters make resource lifetimes observable.

use super::{CommandRecorder, GraphicsBackend, Material, RenderTarget, RenderTargetDescriptor, SamplerSettings};
use crate::bounds::CloudBounds;
use crate::params::{CloudUniforms, ColorSpace, ParameterBlock, ShaderParam, ShaderValue};
use crate::settings::CLOUDS_SHADER_NAME;
use crate::{Error, Result};
use glam::{Vec2, Vec3, Vec4};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters shared by a backend and everything it created
#[derive(Debug, Default)]
pub struct SoftwareStats {
    materials_created: AtomicU64,
    materials_destroyed: AtomicU64,
    targets_allocated: AtomicU64,
    targets_released: AtomicU64,
    blits: AtomicU64,
    submissions: AtomicU64,
}

impl SoftwareStats {
    pub fn materials_created(&self) -> u64 {
        self.materials_created.load(Ordering::Relaxed)
    }

    pub fn materials_destroyed(&self) -> u64 {
        self.materials_destroyed.load(Ordering::Relaxed)
    }

    /// Materials created and not yet dropped
    pub fn live_materials(&self) -> u64 {
        self.materials_created() - self.materials_destroyed()
    }

    pub fn targets_allocated(&self) -> u64 {
        self.targets_allocated.load(Ordering::Relaxed)
    }

    pub fn targets_released(&self) -> u64 {
        self.targets_released.load(Ordering::Relaxed)
    }

    /// Backend-allocated targets not yet dropped
    pub fn live_targets(&self) -> u64 {
        self.targets_allocated() - self.targets_released()
    }

    pub fn blits(&self) -> u64 {
        self.blits.load(Ordering::Relaxed)
    }

    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }
}

/// A command as it was recorded
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedCommand {
    PushDebugGroup(String),
    PopDebugGroup,
    Blit {
        source: u64,
        destination: u64,
        /// Material pass, `None` for the plain copy
        pass: Option<u32>,
    },
}

/// CPU implementation of [`GraphicsBackend`]
pub struct SoftwareBackend {
    shaders: HashSet<String>,
    color_space: ColorSpace,
    stats: Arc<SoftwareStats>,
    next_id: AtomicU64,
    submitted: Mutex<Vec<RecordedCommand>>,
}

impl SoftwareBackend {
    /// Backend with the cloud shader available
    pub fn new() -> Self {
        let mut backend = Self::without_shaders();
        backend.register_shader(CLOUDS_SHADER_NAME);
        backend
    }

    /// Backend on which every shader lookup fails
    pub fn without_shaders() -> Self {
        Self {
            shaders: HashSet::new(),
            color_space: ColorSpace::Linear,
            stats: Arc::new(SoftwareStats::default()),
            next_id: AtomicU64::new(1),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    pub fn register_shader(&mut self, name: impl Into<String>) {
        self.shaders.insert(name.into());
    }

    pub fn stats(&self) -> &SoftwareStats {
        &self.stats
    }

    /// Every command submitted so far, in submission order
    pub fn submitted_commands(&self) -> Vec<RecordedCommand> {
        self.submitted.lock().clone()
    }

    /// Host-owned target (e.g. the camera colour target), filled with `clear`.
    /// Not counted in the allocation statistics.
    pub fn create_host_target(&self, descriptor: RenderTargetDescriptor, label: &str, clear: Vec4) -> SoftwareTarget {
        SoftwareTarget::new(self.next_id(), label, descriptor, SamplerSettings::default(), clear, None)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Shader handle; only the name is tracked
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoftwareShader {
    name: String,
}

impl SoftwareShader {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Material storing its parameters in a [`ParameterBlock`]
pub struct SoftwareMaterial {
    shader: String,
    params: Mutex<ParameterBlock>,
    color_space: ColorSpace,
    stats: Arc<SoftwareStats>,
}

impl SoftwareMaterial {
    pub fn shader_name(&self) -> &str {
        &self.shader
    }

    /// Snapshot of the current parameter values
    pub fn parameters(&self) -> ParameterBlock {
        self.params.lock().clone()
    }

    pub fn uniforms(&self) -> CloudUniforms {
        CloudUniforms::from_block(&self.params.lock(), self.color_space)
    }
}

impl Material for SoftwareMaterial {
    fn set(&self, param: ShaderParam, value: ShaderValue) {
        self.params.lock().set(param, value);
    }
}

impl Drop for SoftwareMaterial {
    fn drop(&mut self) {
        self.stats.materials_destroyed.fetch_add(1, Ordering::Relaxed);
        log::trace!("Destroyed software material ({})", self.shader);
    }
}

/// CPU image
pub struct SoftwareTarget {
    id: u64,
    label: String,
    descriptor: RenderTargetDescriptor,
    sampler: SamplerSettings,
    pixels: Mutex<Vec<Vec4>>,
    /// Present for backend-allocated targets
    stats: Option<Arc<SoftwareStats>>,
}

impl SoftwareTarget {
    fn new(
        id: u64,
        label: &str,
        descriptor: RenderTargetDescriptor,
        sampler: SamplerSettings,
        clear: Vec4,
        stats: Option<Arc<SoftwareStats>>,
    ) -> Self {
        Self {
            id,
            label: label.to_string(),
            descriptor,
            sampler,
            pixels: Mutex::new(vec![clear; descriptor.pixel_count()]),
            stats,
        }
    }

    /// Identity of this allocation; a reallocated target gets a new id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sampler(&self) -> SamplerSettings {
        self.sampler
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec4 {
        self.pixels.lock()[(y * self.descriptor.width + x) as usize]
    }

    pub fn set_pixel(&self, x: u32, y: u32, value: Vec4) {
        self.pixels.lock()[(y * self.descriptor.width + x) as usize] = value;
    }

    pub fn pixels(&self) -> Vec<Vec4> {
        self.pixels.lock().clone()
    }

    pub fn fill(&self, value: Vec4) {
        self.pixels.lock().fill(value);
    }
}

impl RenderTarget for SoftwareTarget {
    fn descriptor(&self) -> RenderTargetDescriptor {
        self.descriptor
    }

    fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for SoftwareTarget {
    fn drop(&mut self) {
        if let Some(stats) = &self.stats {
            stats.targets_released.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Records commands and runs blits immediately
pub struct SoftwareCommandRecorder {
    label: String,
    commands: Vec<RecordedCommand>,
    depth: usize,
    stats: Arc<SoftwareStats>,
}

impl SoftwareCommandRecorder {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }
}

impl CommandRecorder for SoftwareCommandRecorder {
    type RenderTarget = SoftwareTarget;
    type Material = SoftwareMaterial;

    fn blit(
        &mut self,
        source: &SoftwareTarget,
        destination: &SoftwareTarget,
        material: Option<(&SoftwareMaterial, u32)>,
    ) -> Result<()> {
        if let Some((material, pass)) = material {
            if pass >= material.pass_count() {
                return Err(Error::InvalidPassIndex(pass));
            }
        }

        // Copy first: source and destination may be the same target.
        let src_pixels = source.pixels();
        let src_desc = source.descriptor;
        let dst_desc = destination.descriptor;
        let uniforms = material.map(|(m, _)| m.uniforms());

        {
            let mut dst = destination.pixels.lock();
            for y in 0..dst_desc.height {
                for x in 0..dst_desc.width {
                    let uv = Vec2::new(
                        (x as f32 + 0.5) / dst_desc.width as f32,
                        (y as f32 + 0.5) / dst_desc.height as f32,
                    );
                    let background = sample_nearest(&src_pixels, &src_desc, uv);
                    dst[(y * dst_desc.width + x) as usize] = match &uniforms {
                        Some(u) => shade_clouds(u, uv, background),
                        None => background,
                    };
                }
            }
        }

        self.commands.push(RecordedCommand::Blit {
            source: source.id,
            destination: destination.id,
            pass: material.map(|(_, pass)| pass),
        });
        self.stats.blits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn push_debug_group(&mut self, label: &str) {
        self.depth += 1;
        self.commands.push(RecordedCommand::PushDebugGroup(label.to_string()));
    }

    fn pop_debug_group(&mut self) {
        if self.depth == 0 {
            log::warn!("pop_debug_group without a matching push in '{}'", self.label);
            return;
        }
        self.depth -= 1;
        self.commands.push(RecordedCommand::PopDebugGroup);
    }
}

impl GraphicsBackend for SoftwareBackend {
    type Shader = SoftwareShader;
    type Material = SoftwareMaterial;
    type RenderTarget = SoftwareTarget;
    type CommandRecorder = SoftwareCommandRecorder;

    fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    fn find_shader(&self, name: &str) -> Option<SoftwareShader> {
        self.shaders.contains(name).then(|| SoftwareShader {
            name: name.to_string(),
        })
    }

    fn create_material(&self, shader: &SoftwareShader) -> Option<SoftwareMaterial> {
        self.stats.materials_created.fetch_add(1, Ordering::Relaxed);
        log::trace!("Created software material ({})", shader.name);
        Some(SoftwareMaterial {
            shader: shader.name.clone(),
            params: Mutex::new(ParameterBlock::new()),
            color_space: self.color_space,
            stats: self.stats.clone(),
        })
    }

    fn allocate_render_target(
        &self,
        descriptor: &RenderTargetDescriptor,
        sampler: SamplerSettings,
        label: &str,
    ) -> Result<SoftwareTarget> {
        descriptor.validate()?;
        self.stats.targets_allocated.fetch_add(1, Ordering::Relaxed);
        Ok(SoftwareTarget::new(
            self.next_id(),
            label,
            *descriptor,
            sampler,
            Vec4::ZERO,
            Some(self.stats.clone()),
        ))
    }

    fn begin_commands(&self, label: &str) -> SoftwareCommandRecorder {
        SoftwareCommandRecorder {
            label: label.to_string(),
            commands: Vec::new(),
            depth: 0,
            stats: self.stats.clone(),
        }
    }

    fn submit(&self, recorder: SoftwareCommandRecorder) {
        if recorder.depth != 0 {
            log::warn!("'{}' submitted with {} open debug group(s)", recorder.label, recorder.depth);
        }
        self.stats.submissions.fetch_add(1, Ordering::Relaxed);
        self.submitted.lock().extend(recorder.commands);
    }
}

fn sample_nearest(pixels: &[Vec4], desc: &RenderTargetDescriptor, uv: Vec2) -> Vec4 {
    if pixels.is_empty() {
        return Vec4::ZERO;
    }
    let x = ((uv.x * desc.width as f32) as u32).min(desc.width - 1);
    let y = ((uv.y * desc.height as f32) as u32).min(desc.height - 1);
    pixels[(y * desc.width + x) as usize]
}

fn henyey_greenstein(cos_theta: f32, g: f32) -> f32 {
    let g2 = g * g;
    (1.0 - g2) / (4.0 * std::f32::consts::PI * (1.0 + g2 - 2.0 * g * cos_theta).powf(1.5))
}

/// CPU rendition of the cloud shader pass with constant noise.
///
/// Marches up to `step count` steps of `stride` world units through the box,
/// accumulating in-scattered sun light with Beer-Lambert extinction, then
/// composites over `background`.
fn shade_clouds(u: &CloudUniforms, uv: Vec2, background: Vec4) -> Vec4 {
    let v = |a: [f32; 4]| Vec4::from_array(a);
    let direction = v(u.camera_view_top_left_corner).truncate()
        + v(u.camera_view_x_extent).truncate() * uv.x
        + v(u.camera_view_y_extent).truncate() * uv.y;

    let bounds = CloudBounds {
        min: v(u.bounds_min).truncate(),
        max: v(u.bounds_max).truncate(),
    };
    let Some((to_box, inside)) = bounds.ray_intersection(direction) else {
        return background;
    };

    let length = direction.length();
    let ray = direction / length;
    let entry = to_box * length;
    let exit = entry + inside * length;

    let [absorption_to_sun, absorption_through, darkness, sun_intensity] = u.lighting;
    let density = (1.0 + u.density_params[0] * 0.1).max(0.0) * u.density_params[1];
    let stride = u.step_params[1].max(1.0e-3);
    let steps = u.step_params[0].max(1.0) as u32;

    let sun_dir = v(u.main_light_direction).truncate().normalize_or_zero();
    let cos_theta = ray.dot(sun_dir);
    let [forward_g, back_g, blend, _] = u.phase_params;
    let phase = henyey_greenstein(cos_theta, forward_g) * (1.0 - blend)
        + henyey_greenstein(cos_theta, -back_g) * blend;

    let color_a = v(u.color_a).truncate();
    let color_b = v(u.color_b).truncate();
    let sun = v(u.sun_light_color).truncate() * sun_intensity;
    let albedo = v(u.albedo).truncate();

    let mut transmittance = 1.0f32;
    let mut energy = Vec3::ZERO;
    let mut travelled = entry;
    for _ in 0..steps {
        if travelled >= exit || transmittance < 0.01 {
            break;
        }
        let step = stride.min(exit - travelled);
        let sample = ray * (travelled + step * 0.5);

        let to_light = if sun_dir == Vec3::ZERO {
            0.0
        } else {
            let local = CloudBounds {
                min: bounds.min - sample,
                max: bounds.max - sample,
            };
            local.ray_intersection(sun_dir).map_or(0.0, |(_, d)| d)
        };
        let light = darkness + (1.0 - darkness) * (-density * to_light * absorption_to_sun).exp();

        let gradient = color_b.lerp(color_a, (light * u.color_offsets[0]).clamp(0.0, 1.0));
        energy += gradient * sun * albedo * phase * light * density * step * transmittance;
        transmittance *= (-density * step * absorption_through).exp();
        travelled += step;
    }

    (background.truncate() * transmittance + energy).extend(background.w)
}
