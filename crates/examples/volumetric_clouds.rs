//! Offscreen volumetric clouds demo
//!
//! Renders one frame of the cloud layer over a sky gradient on a headless wgpu
//! device and writes it to `volumetric_clouds.png`.
//!
//! Usage:
//!   cargo run --bin volumetric_clouds [settings.json] [output.png]

use glam::{Mat4, Vec3};
use helio_volumetric_clouds::backend::wgpu_backend::{WgpuBackend, WgpuRenderTarget};
use helio_volumetric_clouds::backend::RenderTargetDescriptor;
use helio_volumetric_clouds::{
    CameraData, ClipDepth, FeatureRegistry, FrameContext, PassQueue, Scene, VolumetricCloudsFeature,
    VolumetricCloudsSettings,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const FBM_TEXTURE: &str = "CloudsFbm";
const DETAIL_TEXTURE: &str = "CloudsDetail";
const WEATHER_TEXTURE: &str = "Weather";
const MASK_TEXTURE: &str = "BlueNoiseMask";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    log::info!("Starting volumetric clouds demo");

    let mut args = std::env::args().skip(1);
    let settings_path = args.next();
    let output = args.next().unwrap_or_else(|| "volumetric_clouds.png".to_string());

    let mut settings = match &settings_path {
        Some(path) => {
            log::info!("Loading settings from {}", path);
            VolumetricCloudsSettings::load(path)?
        }
        None => {
            let mut settings = VolumetricCloudsSettings::default()
                .with_step_count(64)
                .with_density(0.0, 0.08);
            settings.step_stride = 1.5;
            settings.noise_strength = 1.2;
            settings.clouds_fbm_weights = glam::Vec4::new(0.55, 0.25, 0.15, 0.05);
            settings
        }
    };
    settings.clouds_fbm_texture.get_or_insert_with(|| FBM_TEXTURE.to_string());
    settings.clouds_detail_noise_texture.get_or_insert_with(|| DETAIL_TEXTURE.to_string());
    settings.weather_map.get_or_insert_with(|| WEATHER_TEXTURE.to_string());
    settings.mask_noise_texture.get_or_insert_with(|| MASK_TEXTURE.to_string());

    let (device, queue) = pollster::block_on(create_device())?;
    let backend = WgpuBackend::new(device.clone(), queue.clone());
    upload_noise(&backend)?;

    // A 400 x 20 x 400 slab hanging 30 units above the camera
    let mut scene = Scene::new();
    scene.spawn(
        settings.clouds_box_object_name.clone(),
        Vec3::new(0.0, 40.0, -150.0),
        Vec3::new(400.0, 20.0, 400.0),
    );

    let position = Vec3::new(0.0, 5.0, 0.0);
    let near = 0.3;
    let camera = CameraData::new(
        Mat4::look_at_rh(position, Vec3::new(0.0, 30.0, -120.0), Vec3::Y),
        Mat4::perspective_rh(60f32.to_radians(), WIDTH as f32 / HEIGHT as f32, near, 2000.0),
        position,
        near,
        ClipDepth::ZeroToOne,
    );

    let descriptor = RenderTargetDescriptor::new(WIDTH, HEIGHT, FORMAT);
    let color = backend.create_host_target(&descriptor, "Camera Color")?;
    paint_sky(&queue, &color);

    let mut features = FeatureRegistry::builder()
        .with_feature(VolumetricCloudsFeature::<WgpuBackend>::new(settings))
        .build()?;
    features.create_all();

    let executed = {
        let frame = FrameContext {
            backend: &backend,
            scene: &scene,
            camera: &camera,
            target_descriptor: descriptor,
            camera_color: &color,
            post_processing_enabled: true,
            time: 0.0,
            main_light_direction: Vec3::new(0.3, 0.8, -0.5).normalize(),
            frame: 0,
        };
        let mut passes = PassQueue::new();
        features.add_render_passes(&mut passes, &frame);
        passes.execute(&frame)
    };
    log::info!("Executed {} pass(es)", executed);

    let pixels = read_back(&device, &queue, &color)?;
    image::save_buffer(&output, &pixels, WIDTH, HEIGHT, image::ColorType::Rgba8)?;
    log::info!("Wrote {}", output);

    features.dispose_all();
    Ok(())
}

async fn create_device() -> Result<(Arc<wgpu::Device>, Arc<wgpu::Queue>), Box<dyn std::error::Error>> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or("no suitable GPU adapter")?;
    log::info!("Using adapter: {}", adapter.get_info().name);

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Clouds Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        )
        .await?;
    Ok((Arc::new(device), Arc::new(queue)))
}

/// Tileable value noise on an integer lattice of `period` cells
struct ValueNoise {
    period: u32,
    lattice: Vec<f32>,
}

impl ValueNoise {
    fn new(rng: &mut StdRng, period: u32) -> Self {
        let lattice = (0..period * period * period).map(|_| rng.gen::<f32>()).collect();
        Self { period, lattice }
    }

    fn at(&self, x: u32, y: u32, z: u32) -> f32 {
        let p = self.period;
        self.lattice[((z % p) * p * p + (y % p) * p + (x % p)) as usize]
    }

    /// Sample at `p` in lattice units with smoothstep interpolation
    fn sample(&self, p: Vec3) -> f32 {
        let cell = p.floor();
        let f = p - cell;
        let f = f * f * (Vec3::splat(3.0) - 2.0 * f);
        let (x, y, z) = (cell.x as u32, cell.y as u32, cell.z as u32);

        let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
        let x00 = lerp(self.at(x, y, z), self.at(x + 1, y, z), f.x);
        let x10 = lerp(self.at(x, y + 1, z), self.at(x + 1, y + 1, z), f.x);
        let x01 = lerp(self.at(x, y, z + 1), self.at(x + 1, y, z + 1), f.x);
        let x11 = lerp(self.at(x, y + 1, z + 1), self.at(x + 1, y + 1, z + 1), f.x);
        lerp(lerp(x00, x10, f.y), lerp(x01, x11, f.y), f.z)
    }
}

/// One octave per channel, each doubling the frequency of the previous
fn fbm_volume(rng: &mut StdRng, size: u32, base_period: u32) -> Vec<u8> {
    let octaves: Vec<ValueNoise> = (0..4).map(|i| ValueNoise::new(rng, base_period << i)).collect();
    let mut texels = Vec::with_capacity((size * size * size * 4) as usize);
    for z in 0..size {
        for y in 0..size {
            for x in 0..size {
                let uvw = Vec3::new(x as f32, y as f32, z as f32) / size as f32;
                for noise in &octaves {
                    let value = noise.sample(uvw * noise.period as f32);
                    texels.push((value * 255.0) as u8);
                }
            }
        }
    }
    texels
}

fn upload_noise(backend: &WgpuBackend) -> helio_volumetric_clouds::Result<()> {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    let volume = |size| wgpu::Extent3d {
        width: size,
        height: size,
        depth_or_array_layers: size,
    };
    backend.upload_texture(FBM_TEXTURE, volume(64), &fbm_volume(&mut rng, 64, 4))?;
    backend.upload_texture(DETAIL_TEXTURE, volume(32), &fbm_volume(&mut rng, 32, 8))?;

    let plane = wgpu::Extent3d {
        width: 256,
        height: 256,
        depth_or_array_layers: 1,
    };
    let coverage = ValueNoise::new(&mut rng, 8);
    let mut weather = Vec::with_capacity(256 * 256 * 4);
    let mut mask = Vec::with_capacity(256 * 256 * 4);
    for y in 0..256u32 {
        for x in 0..256u32 {
            let p = Vec3::new(x as f32, y as f32, 0.0) / 256.0 * 8.0;
            let c = (coverage.sample(p) * 1.6 - 0.3).clamp(0.0, 1.0);
            weather.extend_from_slice(&[(c * 255.0) as u8, 0, 0, 255]);
            let jitter = rng.gen::<u8>();
            mask.extend_from_slice(&[jitter, jitter, jitter, 255]);
        }
    }
    backend.upload_texture(WEATHER_TEXTURE, plane, &weather)?;
    backend.upload_texture(MASK_TEXTURE, plane, &mask)?;
    Ok(())
}

/// Fill the camera target with a vertical sky gradient
fn paint_sky(queue: &wgpu::Queue, target: &WgpuRenderTarget) {
    let zenith = Vec3::new(0.18, 0.36, 0.72);
    let horizon = Vec3::new(0.62, 0.76, 0.92);
    let mut texels = Vec::with_capacity((WIDTH * HEIGHT * 4) as usize);
    for y in 0..HEIGHT {
        let rgb = zenith.lerp(horizon, y as f32 / (HEIGHT - 1) as f32) * 255.0;
        for _ in 0..WIDTH {
            texels.extend_from_slice(&[rgb.x as u8, rgb.y as u8, rgb.z as u8, 255]);
        }
    }
    queue.write_texture(
        target.texture().as_image_copy(),
        &texels,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(WIDTH * 4),
            rows_per_image: Some(HEIGHT),
        },
        target.texture().size(),
    );
}

/// Copy the target into a mappable buffer and return tightly packed RGBA8 rows
fn read_back(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    target: &WgpuRenderTarget,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let unpadded = WIDTH * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: (padded * HEIGHT) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        target.texture().as_image_copy(),
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(HEIGHT),
            },
        },
        target.texture().size(),
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()??;

    let mapped = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity((unpadded * HEIGHT) as usize);
    for row in mapped.chunks_exact(padded as usize) {
        pixels.extend_from_slice(&row[..unpadded as usize]);
    }
    drop(mapped);
    buffer.unmap();
    Ok(pixels)
}
