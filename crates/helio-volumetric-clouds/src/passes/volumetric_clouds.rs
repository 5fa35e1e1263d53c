//! Volumetric clouds compositing pass
//!
//! On camera setup the pass uploads the view-ray basis, the camera-relative cloud
//! box, the authored settings and the frame globals, then makes sure its scratch
//! target matches the camera target. On execute it blits the camera colour
//! through the cloud shader into the scratch target and copies the result back.

use crate::backend::{CommandRecorder, GraphicsBackend, ProfilingScope, SamplerSettings};
use crate::bounds::CloudBounds;
use crate::camera::CameraRays;
use crate::graph::{FrameContext, PassInputs, RenderPassEvent, ScriptableRenderPass};
use crate::params::{upload_bounds, upload_camera_rays, upload_frame_globals, upload_settings};
use crate::resources::ScratchTarget;
use crate::scene::SceneTransform;
use crate::settings::{Color, VolumetricCloudsSettings, CLOUDS_SHADER_NAME};
use crate::{Error, Result};
use std::sync::Arc;

/// Name of the scratch target
pub const CLOUDS_TEXTURE_NAME: &str = "_VolumetricCloudsTexture";
/// Debug group wrapping the two blits
pub const PROFILING_LABEL: &str = "Volumetric Clouds";
/// Shader pass that raymarches and composites the clouds
pub const CLOUDS_SHADER_PASS: u32 = 0;

/// Where the pass is in its per-frame protocol
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PassState {
    /// No frame in flight
    Idle,
    /// Settings and material handed over by the feature
    Armed,
    /// Camera setup done, ready to execute
    Configured,
    /// Blits recorded and submitted
    Executed,
}

/// Per-frame target handle, resolved against the frame when executing
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttachmentRef {
    CameraColor,
    Scratch,
}

/// Colour attachment configured for the pass
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TargetConfig {
    pub color: AttachmentRef,
    /// `false`: the pass composites over existing content
    pub clear: bool,
    pub clear_color: Color,
}

/// Raymarched cloud layer composited onto the camera colour target
pub struct VolumetricCloudsPass<B: GraphicsBackend> {
    event: RenderPassEvent,
    inputs: PassInputs,
    state: PassState,
    settings: Option<Arc<VolumetricCloudsSettings>>,
    material: Option<Arc<B::Material>>,
    clouds_box: Option<Arc<dyn SceneTransform>>,
    scratch: ScratchTarget<B>,
    source: Option<AttachmentRef>,
    destination: Option<AttachmentRef>,
    target_config: Option<TargetConfig>,
}

impl<B: GraphicsBackend> VolumetricCloudsPass<B> {
    pub fn new(event: RenderPassEvent) -> Self {
        Self {
            event,
            inputs: PassInputs::empty(),
            state: PassState::Idle,
            settings: None,
            material: None,
            clouds_box: None,
            scratch: ScratchTarget::new(CLOUDS_TEXTURE_NAME),
            source: None,
            destination: None,
            target_config: None,
        }
    }

    /// Hand over this frame's settings, material and clouds box.
    ///
    /// Declares the dependency on the host's normals. Returns whether a material
    /// is bound, i.e. whether the pass is worth enqueuing.
    pub fn setup(
        &mut self,
        settings: Arc<VolumetricCloudsSettings>,
        material: Option<Arc<B::Material>>,
        clouds_box: Option<Arc<dyn SceneTransform>>,
    ) -> bool {
        self.inputs |= PassInputs::NORMAL;
        self.settings = Some(settings);
        self.material = material;
        self.clouds_box = clouds_box;
        self.state = PassState::Armed;
        self.material.is_some()
    }

    /// Release the scratch target. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        self.scratch.release();
        self.material = None;
        self.clouds_box = None;
        self.settings = None;
        self.clear_frame_refs();
        self.state = PassState::Idle;
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn scratch(&self) -> &ScratchTarget<B> {
        &self.scratch
    }

    pub fn source(&self) -> Option<AttachmentRef> {
        self.source
    }

    pub fn destination(&self) -> Option<AttachmentRef> {
        self.destination
    }

    pub fn target_config(&self) -> Option<TargetConfig> {
        self.target_config
    }

    fn clear_frame_refs(&mut self) {
        self.source = None;
        self.destination = None;
        self.target_config = None;
    }

    fn resolve<'a>(&'a self, attachment: AttachmentRef, frame: &FrameContext<'a, B>) -> Option<&'a B::RenderTarget> {
        match attachment {
            AttachmentRef::CameraColor => Some(frame.camera_color),
            AttachmentRef::Scratch => self.scratch.get(),
        }
    }
}

impl<B: GraphicsBackend> ScriptableRenderPass<B> for VolumetricCloudsPass<B> {
    fn name(&self) -> &str {
        "volumetric_clouds"
    }

    fn render_pass_event(&self) -> RenderPassEvent {
        self.event
    }

    fn required_inputs(&self) -> PassInputs {
        self.inputs
    }

    fn on_camera_setup(&mut self, _cmd: &mut B::CommandRecorder, frame: &FrameContext<'_, B>) -> Result<()> {
        let (Some(material), Some(settings)) = (self.material.clone(), self.settings.clone()) else {
            return Err(Error::ResourceUnavailable {
                shader: CLOUDS_SHADER_NAME.to_string(),
            });
        };
        let Some(clouds_box) = self.clouds_box.clone() else {
            return Err(Error::BoundsUnresolved {
                name: settings.clouds_box_object_name.clone(),
            });
        };

        let rays = CameraRays::from_camera(frame.camera)?;
        upload_camera_rays(&*material, &rays);

        let bounds = CloudBounds::camera_relative(clouds_box.position(), clouds_box.local_scale(), frame.camera.position);
        upload_bounds(&*material, &bounds);

        upload_settings(&*material, &settings);
        upload_frame_globals(&*material, frame.time, frame.main_light_direction);

        let descriptor = frame.target_descriptor.scratch_compatible();
        self.scratch
            .reallocate_if_needed(frame.backend, &descriptor, SamplerSettings::BILINEAR_CLAMP)?;

        self.target_config = Some(TargetConfig {
            color: AttachmentRef::CameraColor,
            clear: false,
            clear_color: Color::WHITE,
        });
        self.source = Some(AttachmentRef::CameraColor);
        self.destination = Some(AttachmentRef::CameraColor);
        self.state = PassState::Configured;
        Ok(())
    }

    fn execute(&mut self, frame: &FrameContext<'_, B>) -> Result<()> {
        let Some(material) = self.material.clone() else {
            log::error!("VolumetricCloudsPass.execute(): Missing material. {} will not execute.", self.name());
            return Ok(());
        };
        if self.state != PassState::Configured {
            log::warn!("VolumetricCloudsPass.execute() called in state {:?}; skipping", self.state);
            return Err(Error::PassNotConfigured(self.name().to_string()));
        }

        let (Some(source), Some(destination)) = (self.source, self.destination) else {
            return Ok(());
        };
        let (Some(source), Some(destination), Some(scratch)) = (
            self.resolve(source, frame),
            self.resolve(destination, frame),
            self.scratch.get(),
        ) else {
            log::warn!("VolumetricCloudsPass.execute(): targets not allocated; skipping");
            return Ok(());
        };

        let mut cmd = frame.backend.begin_commands(PROFILING_LABEL);
        {
            let mut scope = ProfilingScope::new(&mut cmd, PROFILING_LABEL);
            scope.blit(source, scratch, Some((&*material, CLOUDS_SHADER_PASS)))?;
            scope.blit(scratch, destination, None)?;
        }
        frame.backend.submit(cmd);

        self.state = PassState::Executed;
        Ok(())
    }

    fn on_camera_cleanup(&mut self, _cmd: &mut B::CommandRecorder) {
        self.clear_frame_refs();
        self.material = None;
        self.state = PassState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::{RecordedCommand, SoftwareBackend};
    use crate::backend::{RenderTarget, RenderTargetDescriptor};
    use crate::camera::CameraData;
    use crate::params::ShaderParam;
    use crate::scene::{Scene, Transform};
    use glam::{Vec3, Vec4};

    fn armed_pass(backend: &SoftwareBackend) -> VolumetricCloudsPass<SoftwareBackend> {
        let shader = backend.find_shader(CLOUDS_SHADER_NAME).unwrap();
        let material = Arc::new(backend.create_material(&shader).unwrap());
        let clouds_box: Arc<dyn SceneTransform> =
            Arc::new(Transform::new(Vec3::new(0.0, 0.0, -10.0), Vec3::new(4.0, 2.0, 4.0)));

        let mut pass = VolumetricCloudsPass::new(RenderPassEvent::BeforeRenderingPostProcessing);
        assert!(pass.setup(Arc::new(VolumetricCloudsSettings::default()), Some(material), Some(clouds_box)));
        pass
    }

    #[test]
    fn setup_without_material_reports_not_ready() {
        let mut pass = VolumetricCloudsPass::<SoftwareBackend>::new(RenderPassEvent::BeforeRenderingPostProcessing);
        assert!(!pass.setup(Arc::new(VolumetricCloudsSettings::default()), None, None));
        assert!(pass.required_inputs().contains(PassInputs::NORMAL));
    }

    #[test]
    fn full_frame_walks_the_state_machine() {
        let backend = SoftwareBackend::new();
        let scene = Scene::new();
        let camera = CameraData::perspective(Vec3::ZERO, -Vec3::Z, Vec3::Y, 1.0, 1.0, 0.1, 100.0);
        let descriptor = RenderTargetDescriptor::new(8, 8, wgpu::TextureFormat::Rgba16Float).with_sample_count(4);
        let color = backend.create_host_target(descriptor, "camera", Vec4::new(0.1, 0.2, 0.3, 1.0));
        let frame = FrameContext {
            backend: &backend,
            scene: &scene,
            camera: &camera,
            target_descriptor: descriptor,
            camera_color: &color,
            post_processing_enabled: true,
            time: 2.0,
            main_light_direction: Vec3::Y,
            frame: 0,
        };

        let mut pass = armed_pass(&backend);
        assert_eq!(pass.state(), PassState::Armed);

        let mut cmd = backend.begin_commands("setup");
        pass.on_camera_setup(&mut cmd, &frame).unwrap();
        assert_eq!(pass.state(), PassState::Configured);
        assert_eq!(pass.source(), Some(AttachmentRef::CameraColor));
        assert_eq!(pass.destination(), Some(AttachmentRef::CameraColor));
        let config = pass.target_config().unwrap();
        assert!(!config.clear);
        assert_eq!(config.color, AttachmentRef::CameraColor);

        let scratch = pass.scratch().get().unwrap().descriptor();
        assert_eq!(scratch.sample_count, 1);
        assert_eq!(scratch.depth_bits, 0);

        let material = pass.material.clone().unwrap();
        let params = material.parameters();
        assert!(params.is_complete(), "missing {:?}", params.missing());
        assert_eq!(params.vector(ShaderParam::Time).x, 2.0);

        pass.execute(&frame).unwrap();
        assert_eq!(pass.state(), PassState::Executed);
        let blits = backend
            .submitted_commands()
            .into_iter()
            .filter(|c| matches!(c, RecordedCommand::Blit { .. }))
            .count();
        assert_eq!(blits, 2);

        pass.on_camera_cleanup(&mut cmd);
        assert_eq!(pass.state(), PassState::Idle);
        assert!(pass.source().is_none());
        assert!(pass.destination().is_none());
        assert!(pass.target_config().is_none());
        assert!(pass.scratch().is_allocated());
    }

    #[test]
    fn execute_without_material_is_a_no_op() {
        let backend = SoftwareBackend::new();
        let scene = Scene::new();
        let camera = CameraData::perspective(Vec3::ZERO, -Vec3::Z, Vec3::Y, 1.0, 1.0, 0.1, 100.0);
        let descriptor = RenderTargetDescriptor::new(4, 4, wgpu::TextureFormat::Rgba16Float);
        let color = backend.create_host_target(descriptor, "camera", Vec4::ONE);
        let frame = FrameContext {
            backend: &backend,
            scene: &scene,
            camera: &camera,
            target_descriptor: descriptor,
            camera_color: &color,
            post_processing_enabled: true,
            time: 0.0,
            main_light_direction: Vec3::Y,
            frame: 0,
        };

        let mut pass = VolumetricCloudsPass::<SoftwareBackend>::new(RenderPassEvent::BeforeRenderingPostProcessing);
        pass.execute(&frame).unwrap();
        assert_eq!(backend.stats().blits(), 0);
        assert_eq!(backend.stats().submissions(), 0);
    }

    #[test]
    fn execute_before_camera_setup_is_an_error() {
        let backend = SoftwareBackend::new();
        let scene = Scene::new();
        let camera = CameraData::perspective(Vec3::ZERO, -Vec3::Z, Vec3::Y, 1.0, 1.0, 0.1, 100.0);
        let descriptor = RenderTargetDescriptor::new(4, 4, wgpu::TextureFormat::Rgba16Float);
        let color = backend.create_host_target(descriptor, "camera", Vec4::ONE);
        let frame = FrameContext {
            backend: &backend,
            scene: &scene,
            camera: &camera,
            target_descriptor: descriptor,
            camera_color: &color,
            post_processing_enabled: true,
            time: 0.0,
            main_light_direction: Vec3::Y,
            frame: 0,
        };

        let mut pass = armed_pass(&backend);
        let result = pass.execute(&frame);
        assert!(matches!(result, Err(Error::PassNotConfigured(_))));
        assert_eq!(pass.state(), PassState::Armed);
        assert_eq!(backend.stats().blits(), 0);
    }

    #[test]
    fn zero_sized_camera_target_fails_camera_setup() {
        let backend = SoftwareBackend::new();
        let scene = Scene::new();
        let camera = CameraData::perspective(Vec3::ZERO, -Vec3::Z, Vec3::Y, 1.0, 1.0, 0.1, 100.0);
        let color = backend.create_host_target(
            RenderTargetDescriptor::new(4, 4, wgpu::TextureFormat::Rgba16Float),
            "camera",
            Vec4::ONE,
        );
        let frame = FrameContext {
            backend: &backend,
            scene: &scene,
            camera: &camera,
            target_descriptor: RenderTargetDescriptor::new(0, 0, wgpu::TextureFormat::Rgba16Float),
            camera_color: &color,
            post_processing_enabled: true,
            time: 0.0,
            main_light_direction: Vec3::Y,
            frame: 0,
        };

        let mut pass = armed_pass(&backend);
        let mut cmd = backend.begin_commands("setup");
        assert!(matches!(pass.on_camera_setup(&mut cmd, &frame), Err(Error::Resource(_))));
        assert_ne!(pass.state(), PassState::Configured);
        assert!(!pass.scratch().is_allocated());
        assert_eq!(backend.stats().targets_allocated(), 0);
    }

    #[test]
    fn dispose_is_idempotent() {
        let backend = SoftwareBackend::new();
        let mut pass = armed_pass(&backend);
        pass.scratch
            .reallocate_if_needed(&backend, &RenderTargetDescriptor::new(4, 4, wgpu::TextureFormat::Rgba8Unorm), SamplerSettings::BILINEAR_CLAMP)
            .unwrap();

        pass.dispose();
        pass.dispose();
        assert!(!pass.scratch().is_allocated());
        assert_eq!(backend.stats().live_targets(), 0);
        assert_eq!(backend.stats().live_materials(), 0);
    }
}
