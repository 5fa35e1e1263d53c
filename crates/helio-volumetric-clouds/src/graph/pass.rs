//! Render pass trait and per-frame context

use super::{PassInputs, RenderPassEvent};
use crate::backend::{GraphicsBackend, RenderTargetDescriptor};
use crate::camera::CameraData;
use crate::scene::SceneLookup;
use crate::Result;
use glam::Vec3;

/// Everything the host knows about the camera being rendered this frame
///
/// Passed explicitly to every callback; passes never keep it past the frame.
pub struct FrameContext<'a, B: GraphicsBackend> {
    /// GPU resource collaborator
    pub backend: &'a B,

    /// Scene the clouds box is looked up in
    pub scene: &'a dyn SceneLookup,

    pub camera: &'a CameraData,

    /// Descriptor of the camera colour target
    pub target_descriptor: RenderTargetDescriptor,

    /// Current camera colour target
    pub camera_color: &'a B::RenderTarget,

    /// Whether post-processing is enabled for this camera
    pub post_processing_enabled: bool,

    /// Elapsed time in seconds
    pub time: f32,

    /// Direction towards the main light
    pub main_light_direction: Vec3,

    pub frame: u64,
}

/// Render pass trait - implemented by every pass the host can enqueue
///
/// **Lifecycle (per camera, per frame):**
/// 1. `on_camera_setup()` - for every enqueued pass, before any executes
/// 2. `execute()` - in [`RenderPassEvent`] order
/// 3. `on_camera_cleanup()` - for every enqueued pass, after all executed
pub trait ScriptableRenderPass<B: GraphicsBackend>: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Where in the frame the pass runs
    fn render_pass_event(&self) -> RenderPassEvent;

    /// Inputs the host must produce before this pass runs
    fn required_inputs(&self) -> PassInputs {
        PassInputs::empty()
    }

    /// Upload per-camera state and configure targets
    fn on_camera_setup(&mut self, cmd: &mut B::CommandRecorder, frame: &FrameContext<'_, B>) -> Result<()> {
        let _ = (cmd, frame);
        Ok(())
    }

    /// Record and submit the pass's GPU work
    fn execute(&mut self, frame: &FrameContext<'_, B>) -> Result<()>;

    /// Drop per-frame state. Must not fail.
    fn on_camera_cleanup(&mut self, cmd: &mut B::CommandRecorder) {
        let _ = cmd;
    }
}
