#![allow(dead_code)]

use glam::{Vec3, Vec4};
use helio_volumetric_clouds::backend::software::{SoftwareBackend, SoftwareTarget};
use helio_volumetric_clouds::backend::RenderTargetDescriptor;
use helio_volumetric_clouds::{CameraData, FrameContext, PassQueue, RendererFeature, Scene};

pub const BACKGROUND: Vec4 = Vec4::new(0.2, 0.4, 0.8, 1.0);

/// Minimal host: one camera rendering into one colour target
pub struct Host {
    pub backend: SoftwareBackend,
    pub scene: Scene,
    pub camera: CameraData,
    pub descriptor: RenderTargetDescriptor,
    pub color: SoftwareTarget,
    pub post_processing: bool,
    pub frame: u64,
}

impl Host {
    pub fn new(backend: SoftwareBackend, width: u32, height: u32) -> Self {
        let descriptor = RenderTargetDescriptor::new(width, height, wgpu::TextureFormat::Rgba16Float);
        let color = backend.create_host_target(descriptor, "camera color", BACKGROUND);
        let camera = CameraData::perspective(
            Vec3::new(0.0, 0.0, 60.0),
            Vec3::ZERO,
            Vec3::Y,
            60f32.to_radians(),
            width as f32 / height as f32,
            0.3,
            1000.0,
        );
        Self {
            backend,
            scene: Scene::new(),
            camera,
            descriptor,
            color,
            post_processing: true,
            frame: 0,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.descriptor = RenderTargetDescriptor { width, height, ..self.descriptor };
        self.color = self.backend.create_host_target(self.descriptor, "camera color", BACKGROUND);
    }

    pub fn frame_context(&self) -> FrameContext<'_, SoftwareBackend> {
        FrameContext {
            backend: &self.backend,
            scene: &self.scene,
            camera: &self.camera,
            target_descriptor: self.descriptor,
            camera_color: &self.color,
            post_processing_enabled: self.post_processing,
            time: self.frame as f32 / 60.0,
            main_light_direction: Vec3::new(0.3, 1.0, 0.2),
            frame: self.frame,
        }
    }

    /// One camera frame: let the feature enqueue, then run the queue.
    /// Returns `(enqueued, executed)`.
    pub fn render(&mut self, feature: &mut dyn RendererFeature<SoftwareBackend>) -> (usize, usize) {
        let counts = {
            let frame = self.frame_context();
            let mut queue = PassQueue::new();
            feature.add_render_passes(&mut queue, &frame);
            let enqueued = queue.len();
            (enqueued, queue.execute(&frame))
        };
        self.frame += 1;
        counts
    }
}
