//! wgpu backend
//!
//! Shaders are WGSL modules registered by name. A material owns a uniform buffer
//! holding the packed [`CloudUniforms`] and builds its bind group at blit time,
//! resolving noise textures by name against the backend's texture registry.
//! Every blit is one fullscreen triangle. A multisampled source is first
//! resolved into a cached single-sample target; pipelines are built per
//! destination format and sample count.
//!
//! Recording runs inside a validation error scope, so a rejected blit comes
//! back as [`Error::Wgpu`] instead of reaching the device's error handler.
//!
//! Materials created from a registered shader share one bind group layout:
//!
//! | binding | resource |
//! |---------|----------|
//! | 0 | `CloudUniforms` |
//! | 1 | source texture (2D) |
//! | 2 | source sampler |
//! | 3 | shape noise (3D) |
//! | 4 | detail noise (3D) |
//! | 5 | weather map (2D) |
//! | 6 | mask noise (2D) |
//! | 7 | repeating noise sampler |

use super::{CommandRecorder, GraphicsBackend, Material, RenderTarget, RenderTargetDescriptor, SamplerSettings};
use crate::params::{CloudUniforms, ColorSpace, ParameterBlock, ShaderParam, ShaderValue};
use crate::settings::CLOUDS_SHADER_NAME;
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const CLOUDS_SHADER_SOURCE: &str = include_str!("../../shaders/passes/volumetric_clouds.wgsl");
const BLIT_SHADER_SOURCE: &str = include_str!("../../shaders/passes/blit.wgsl");

/// Usage of every target the backend allocates
const TARGET_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

struct NamedTexture {
    view: Arc<wgpu::TextureView>,
    dimension: wgpu::TextureViewDimension,
}

/// Pipelines are keyed by destination format and sample count
type PipelineKey = (wgpu::TextureFormat, u32);

struct BlitPipelines {
    module: wgpu::ShaderModule,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: Mutex<HashMap<PipelineKey, Arc<wgpu::RenderPipeline>>>,
}

/// Single-sample copy of a multisampled target
struct ResolveTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// State shared by the backend and everything it hands out
struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    textures: RwLock<HashMap<String, NamedTexture>>,
    reported_missing: Mutex<HashSet<String>>,
    fallback_2d: Arc<wgpu::TextureView>,
    fallback_3d: Arc<wgpu::TextureView>,
    noise_sampler: wgpu::Sampler,
    samplers: Mutex<HashMap<SamplerSettings, Arc<wgpu::Sampler>>>,
    material_layout: wgpu::BindGroupLayout,
    material_pipeline_layout: wgpu::PipelineLayout,
    blit: BlitPipelines,
    resolve_targets: Mutex<HashMap<RenderTargetDescriptor, Arc<ResolveTarget>>>,
}

impl GpuContext {
    fn sampler(&self, settings: SamplerSettings) -> Arc<wgpu::Sampler> {
        self.samplers
            .lock()
            .entry(settings)
            .or_insert_with(|| {
                Arc::new(self.device.create_sampler(&wgpu::SamplerDescriptor {
                    label: Some("Target Sampler"),
                    address_mode_u: settings.address_mode,
                    address_mode_v: settings.address_mode,
                    address_mode_w: settings.address_mode,
                    mag_filter: settings.filter,
                    min_filter: settings.filter,
                    ..Default::default()
                }))
            })
            .clone()
    }

    /// Resolve a texture name, falling back to white when it is unset, unknown
    /// or has the wrong dimension
    fn texture_view(&self, name: Option<&str>, dimension: wgpu::TextureViewDimension) -> Arc<wgpu::TextureView> {
        let fallback = match dimension {
            wgpu::TextureViewDimension::D3 => &self.fallback_3d,
            _ => &self.fallback_2d,
        };
        let Some(name) = name else {
            return fallback.clone();
        };

        if let Some(texture) = self.textures.read().get(name) {
            if texture.dimension == dimension {
                return texture.view.clone();
            }
        }
        if self.reported_missing.lock().insert(name.to_string()) {
            log::warn!("Texture '{}' ({:?}) not registered; using white fallback", name, dimension);
        }
        fallback.clone()
    }

    fn blit_pipeline(&self, format: wgpu::TextureFormat, sample_count: u32) -> Arc<wgpu::RenderPipeline> {
        self.blit
            .pipelines
            .lock()
            .entry((format, sample_count))
            .or_insert_with(|| {
                log::debug!("Creating blit pipeline for {:?} x{}", format, sample_count);
                Arc::new(fullscreen_pipeline(
                    &self.device,
                    "Blit Pipeline",
                    &self.blit.pipeline_layout,
                    &self.blit.module,
                    (format, sample_count),
                ))
            })
            .clone()
    }

    /// Single-sample target matching a multisampled `descriptor`
    fn resolve_target(&self, descriptor: &RenderTargetDescriptor) -> Arc<ResolveTarget> {
        let key = descriptor.scratch_compatible();
        self.resolve_targets
            .lock()
            .entry(key)
            .or_insert_with(|| {
                log::debug!("Allocating MSAA resolve target {}x{} {:?}", key.width, key.height, key.format);
                let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("MSAA Resolve Target"),
                    size: key.extent(),
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: key.format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                });
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                Arc::new(ResolveTarget { _texture: texture, view })
            })
            .clone()
    }
}

/// Run `record` inside a validation error scope and report what wgpu rejected
fn validated<T>(device: &wgpu::Device, record: impl FnOnce() -> Result<T>) -> Result<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let result = record();
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(Error::Wgpu(error.to_string())),
        None => result,
    }
}

fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    (format, sample_count): PipelineKey,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        cache: None,
        vertex: wgpu::VertexState {
            module,
            entry_point: "vs_main",
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: sample_count,
            ..Default::default()
        },
        multiview: None,
    })
}

fn texture_entry(binding: u32, view_dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn white_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    dimension: wgpu::TextureDimension,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[255u8, 255, 255, 255],
        wgpu::ImageDataLayout { offset: 0, bytes_per_row: Some(4), rows_per_image: Some(1) },
        wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
    );
    texture.create_view(&wgpu::TextureViewDescriptor {
        dimension: Some(view_dimension),
        ..Default::default()
    })
}

/// Shader handle
#[derive(Clone)]
pub struct WgpuShader {
    name: String,
    module: Arc<wgpu::ShaderModule>,
}

impl WgpuShader {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Material backed by a uniform buffer
pub struct WgpuMaterial {
    context: Arc<GpuContext>,
    shader: WgpuShader,
    params: Mutex<ParameterBlock>,
    color_space: ColorSpace,
    uniform_buffer: wgpu::Buffer,
    pipelines: Mutex<HashMap<PipelineKey, Arc<wgpu::RenderPipeline>>>,
}

impl WgpuMaterial {
    fn pipeline(&self, format: wgpu::TextureFormat, sample_count: u32) -> Arc<wgpu::RenderPipeline> {
        self.pipelines
            .lock()
            .entry((format, sample_count))
            .or_insert_with(|| {
                log::debug!("Creating '{}' pipeline for {:?} x{}", self.shader.name, format, sample_count);
                Arc::new(fullscreen_pipeline(
                    &self.context.device,
                    &self.shader.name,
                    &self.context.material_pipeline_layout,
                    &self.shader.module,
                    (format, sample_count),
                ))
            })
            .clone()
    }

    /// Pack the current parameters and upload them
    fn flush(&self) {
        let params = self.params.lock();
        let uniforms = CloudUniforms::from_block(&params, self.color_space);
        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    fn bind_group(&self, source: &wgpu::TextureView, sampler: SamplerSettings) -> wgpu::BindGroup {
        use wgpu::TextureViewDimension::{D2, D3};

        let ctx = &self.context;
        let (fbm, detail, weather, mask) = {
            let params = self.params.lock();
            (
                ctx.texture_view(params.texture(ShaderParam::CloudsFbmTexture), D3),
                ctx.texture_view(params.texture(ShaderParam::CloudsDetailNoiseTexture), D3),
                ctx.texture_view(params.texture(ShaderParam::WeatherTexture), D2),
                ctx.texture_view(params.texture(ShaderParam::MaskNoiseTexture), D2),
            )
        };
        let source_sampler = ctx.sampler(sampler);

        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cloud Material Bind Group"),
            layout: &ctx.material_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.uniform_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(source) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::Sampler(&source_sampler) },
                wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::TextureView(&fbm) },
                wgpu::BindGroupEntry { binding: 4, resource: wgpu::BindingResource::TextureView(&detail) },
                wgpu::BindGroupEntry { binding: 5, resource: wgpu::BindingResource::TextureView(&weather) },
                wgpu::BindGroupEntry { binding: 6, resource: wgpu::BindingResource::TextureView(&mask) },
                wgpu::BindGroupEntry { binding: 7, resource: wgpu::BindingResource::Sampler(&ctx.noise_sampler) },
            ],
        })
    }
}

impl Material for WgpuMaterial {
    fn set(&self, param: ShaderParam, value: ShaderValue) {
        self.params.lock().set(param, value);
    }
}

/// GPU colour target
pub struct WgpuRenderTarget {
    texture: Arc<wgpu::Texture>,
    view: wgpu::TextureView,
    descriptor: RenderTargetDescriptor,
    sampler: SamplerSettings,
    label: String,
}

impl WgpuRenderTarget {
    /// Wrap a host-owned texture, e.g. the camera colour target
    pub fn from_texture(texture: Arc<wgpu::Texture>, label: &str) -> Self {
        let descriptor = RenderTargetDescriptor::new(texture.width(), texture.height(), texture.format())
            .with_sample_count(texture.sample_count());
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            descriptor,
            sampler: SamplerSettings::default(),
            label: label.to_string(),
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl RenderTarget for WgpuRenderTarget {
    fn descriptor(&self) -> RenderTargetDescriptor {
        self.descriptor
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Wraps a `wgpu::CommandEncoder`
pub struct WgpuCommandRecorder {
    context: Arc<GpuContext>,
    encoder: wgpu::CommandEncoder,
    label: String,
    depth: usize,
}

impl WgpuCommandRecorder {
    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        &mut self.encoder
    }

    fn draw_fullscreen(
        &mut self,
        label: &str,
        destination: &WgpuRenderTarget,
        pipeline: &wgpu::RenderPipeline,
        bind_group: &wgpu::BindGroup,
    ) {
        let mut pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &destination.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    /// Resolve a multisampled target into its single-sample twin
    fn resolve(&mut self, source: &WgpuRenderTarget) -> Arc<ResolveTarget> {
        let resolved = self.context.resolve_target(&source.descriptor);
        let _pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("MSAA Resolve"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &source.view,
                resolve_target: Some(&resolved.view),
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        resolved
    }

    fn record_blit(
        &mut self,
        source: &WgpuRenderTarget,
        destination: &WgpuRenderTarget,
        material: Option<(&WgpuMaterial, u32)>,
    ) {
        let resolved = (source.descriptor.sample_count > 1).then(|| self.resolve(source));
        let source_view = resolved.as_ref().map_or(&source.view, |r| &r.view);
        let target = (destination.descriptor.format, destination.descriptor.sample_count);

        match material {
            Some((material, _)) => {
                material.flush();
                let bind_group = material.bind_group(source_view, source.sampler);
                let pipeline = material.pipeline(target.0, target.1);
                self.draw_fullscreen(&material.shader.name, destination, &pipeline, &bind_group);
            }
            None => {
                let ctx = self.context.clone();
                let sampler = ctx.sampler(source.sampler);
                let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Blit Bind Group"),
                    layout: &ctx.blit.layout,
                    entries: &[
                        wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(source_view) },
                        wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&sampler) },
                    ],
                });
                let pipeline = ctx.blit_pipeline(target.0, target.1);
                self.draw_fullscreen("Blit", destination, &pipeline, &bind_group);
            }
        }
    }
}

impl CommandRecorder for WgpuCommandRecorder {
    type RenderTarget = WgpuRenderTarget;
    type Material = WgpuMaterial;

    /// Uniform uploads are staged on the queue, so a material blitted twice in
    /// one recorder renders both times with its latest parameters.
    fn blit(
        &mut self,
        source: &WgpuRenderTarget,
        destination: &WgpuRenderTarget,
        material: Option<(&WgpuMaterial, u32)>,
    ) -> Result<()> {
        if Arc::ptr_eq(&source.texture, &destination.texture) {
            return Err(Error::AliasedBlit(source.label.clone()));
        }
        if let Some((material, pass)) = material {
            if pass >= material.pass_count() {
                return Err(Error::InvalidPassIndex(pass));
            }
        }

        let device = self.context.device.clone();
        validated(&device, || {
            self.record_blit(source, destination, material);
            Ok(())
        })
    }

    fn push_debug_group(&mut self, label: &str) {
        self.depth += 1;
        self.encoder.push_debug_group(label);
    }

    fn pop_debug_group(&mut self) {
        if self.depth == 0 {
            log::warn!("pop_debug_group without a matching push in '{}'", self.label);
            return;
        }
        self.depth -= 1;
        self.encoder.pop_debug_group();
    }
}

/// [`GraphicsBackend`] on top of a wgpu device
pub struct WgpuBackend {
    context: Arc<GpuContext>,
    shaders: HashMap<String, WgpuShader>,
    color_space: ColorSpace,
}

impl WgpuBackend {
    /// Create the backend with the cloud shader registered
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        use wgpu::TextureViewDimension::{D2, D3};

        log::info!("Creating wgpu volumetric clouds backend");

        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cloud Material Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<CloudUniforms>() as u64),
                    },
                    count: None,
                },
                texture_entry(1, D2),
                sampler_entry(2),
                texture_entry(3, D3),
                texture_entry(4, D3),
                texture_entry(5, D2),
                texture_entry(6, D2),
                sampler_entry(7),
            ],
        });
        let material_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cloud Material Pipeline Layout"),
            bind_group_layouts: &[&material_layout],
            push_constant_ranges: &[],
        });

        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit Bind Group Layout"),
            entries: &[texture_entry(0, D2), sampler_entry(1)],
        });
        let blit = BlitPipelines {
            module: device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Blit Shader"),
                source: wgpu::ShaderSource::Wgsl(BLIT_SHADER_SOURCE.into()),
            }),
            pipeline_layout: device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Blit Pipeline Layout"),
                bind_group_layouts: &[&blit_layout],
                push_constant_ranges: &[],
            }),
            layout: blit_layout,
            pipelines: Mutex::new(HashMap::new()),
        };

        let fallback_2d = white_texture(&device, &queue, "Default White 2D", wgpu::TextureDimension::D2, D2);
        let fallback_3d = white_texture(&device, &queue, "Default White 3D", wgpu::TextureDimension::D3, D3);
        let noise_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Noise Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let context = Arc::new(GpuContext {
            device,
            queue,
            textures: RwLock::new(HashMap::new()),
            reported_missing: Mutex::new(HashSet::new()),
            fallback_2d: Arc::new(fallback_2d),
            fallback_3d: Arc::new(fallback_3d),
            noise_sampler,
            samplers: Mutex::new(HashMap::new()),
            material_layout,
            material_pipeline_layout,
            blit,
            resolve_targets: Mutex::new(HashMap::new()),
        });

        let mut backend = Self {
            context,
            shaders: HashMap::new(),
            color_space: ColorSpace::Linear,
        };
        backend.register_shader(CLOUDS_SHADER_NAME, CLOUDS_SHADER_SOURCE);
        backend
    }

    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.context.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.context.queue
    }

    /// Compile a WGSL shader and make it findable by name. The shader must use
    /// the material bind group layout described in the module docs.
    pub fn register_shader(&mut self, name: &str, source: &str) {
        log::debug!("Registering shader '{}'", name);
        let module = self.context.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        self.shaders.insert(
            name.to_string(),
            WgpuShader {
                name: name.to_string(),
                module: Arc::new(module),
            },
        );
    }

    /// Make a texture available to materials under `name`
    pub fn register_texture(&self, name: &str, view: wgpu::TextureView, dimension: wgpu::TextureViewDimension) {
        log::debug!("Registering texture '{}' ({:?})", name, dimension);
        self.context.reported_missing.lock().remove(name);
        self.context.textures.write().insert(
            name.to_string(),
            NamedTexture {
                view: Arc::new(view),
                dimension,
            },
        );
    }

    /// Upload tightly packed RGBA8 texels and register the texture as `name`.
    ///
    /// `size.depth_or_array_layers > 1` creates a 3D texture.
    pub fn upload_texture(&self, name: &str, size: wgpu::Extent3d, rgba8: &[u8]) -> Result<()> {
        let expected = size.width as usize * size.height as usize * size.depth_or_array_layers as usize * 4;
        if rgba8.len() != expected {
            return Err(Error::Resource(format!(
                "Texture '{}' expects {} bytes of RGBA8 data, got {}",
                name,
                expected,
                rgba8.len()
            )));
        }

        let (dimension, view_dimension) = if size.depth_or_array_layers > 1 {
            (wgpu::TextureDimension::D3, wgpu::TextureViewDimension::D3)
        } else {
            (wgpu::TextureDimension::D2, wgpu::TextureViewDimension::D2)
        };
        let texture = validated(&self.context.device, || {
            Ok(self.context.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(name),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            }))
        })?;
        self.context.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba8,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: Some(size.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(view_dimension),
            ..Default::default()
        });
        self.register_texture(name, view, view_dimension);
        Ok(())
    }

    /// Host-owned colour target usable as a blit source and destination
    pub fn create_host_target(&self, descriptor: &RenderTargetDescriptor, label: &str) -> Result<WgpuRenderTarget> {
        self.allocate_render_target(descriptor, SamplerSettings::default(), label)
    }
}

impl GraphicsBackend for WgpuBackend {
    type Shader = WgpuShader;
    type Material = WgpuMaterial;
    type RenderTarget = WgpuRenderTarget;
    type CommandRecorder = WgpuCommandRecorder;

    fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    fn find_shader(&self, name: &str) -> Option<WgpuShader> {
        self.shaders.get(name).cloned()
    }

    fn create_material(&self, shader: &WgpuShader) -> Option<WgpuMaterial> {
        let uniform_buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cloud Uniforms"),
            size: std::mem::size_of::<CloudUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Some(WgpuMaterial {
            context: self.context.clone(),
            shader: shader.clone(),
            params: Mutex::new(ParameterBlock::new()),
            color_space: self.color_space,
            uniform_buffer,
            pipelines: Mutex::new(HashMap::new()),
        })
    }

    fn allocate_render_target(
        &self,
        descriptor: &RenderTargetDescriptor,
        sampler: SamplerSettings,
        label: &str,
    ) -> Result<WgpuRenderTarget> {
        descriptor.validate()?;
        // Multisampled textures only take part in render passes
        let usage = if descriptor.sample_count > 1 {
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
        } else {
            TARGET_USAGE
        };
        let texture = validated(&self.context.device, || {
            Ok(self.context.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: descriptor.extent(),
                mip_level_count: 1,
                sample_count: descriptor.sample_count,
                dimension: wgpu::TextureDimension::D2,
                format: descriptor.format,
                usage,
                view_formats: &[],
            }))
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuRenderTarget {
            texture: Arc::new(texture),
            view,
            descriptor: *descriptor,
            sampler,
            label: label.to_string(),
        })
    }

    fn begin_commands(&self, label: &str) -> WgpuCommandRecorder {
        let encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        WgpuCommandRecorder {
            context: self.context.clone(),
            encoder,
            label: label.to_string(),
            depth: 0,
        }
    }

    fn submit(&self, recorder: WgpuCommandRecorder) {
        if recorder.depth != 0 {
            log::warn!("'{}' submitted with {} open debug group(s)", recorder.label, recorder.depth);
        }
        let label = recorder.label;
        let result = validated(&self.context.device, || {
            self.context.queue.submit(Some(recorder.encoder.finish()));
            Ok(())
        });
        if let Err(e) = result {
            log::error!("Submitting '{}' failed: {}", label, e);
        }
    }
}
