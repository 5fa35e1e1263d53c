//! Per-camera pass queue
//!
//! Features enqueue passes every frame; the queue orders them by injection point
//! and drives the setup / execute / cleanup protocol. A failing pass is logged and
//! skipped so one broken effect never takes the frame down.

mod pass;

pub use pass::{FrameContext, ScriptableRenderPass};

use crate::backend::GraphicsBackend;
use bitflags::bitflags;
use parking_lot::Mutex;
use std::sync::Arc;

/// Injection points in the host's frame, in execution order
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenderPassEvent {
    BeforeRendering,
    BeforeRenderingShadows,
    AfterRenderingShadows,
    BeforeRenderingPrePasses,
    AfterRenderingPrePasses,
    BeforeRenderingOpaques,
    AfterRenderingOpaques,
    BeforeRenderingSkybox,
    AfterRenderingSkybox,
    BeforeRenderingTransparents,
    AfterRenderingTransparents,
    BeforeRenderingPostProcessing,
    AfterRenderingPostProcessing,
    AfterRendering,
}

bitflags! {
    /// Host-produced inputs a pass depends on
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PassInputs: u32 {
        const DEPTH = 1 << 0;
        const NORMAL = 1 << 1;
        const COLOR = 1 << 2;
        const MOTION = 1 << 3;
    }
}

/// A pass shared between the feature that owns it and the queue
pub type SharedPass<B> = Arc<Mutex<dyn ScriptableRenderPass<B>>>;

/// Passes enqueued for the current camera
pub struct PassQueue<B: GraphicsBackend> {
    passes: Vec<SharedPass<B>>,
}

impl<B: GraphicsBackend> PassQueue<B> {
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    pub fn enqueue(&mut self, pass: SharedPass<B>) {
        log::trace!("Enqueued pass '{}'", pass.lock().name());
        self.passes.push(pass);
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Union of the inputs required by every enqueued pass
    pub fn required_inputs(&self) -> PassInputs {
        self.passes
            .iter()
            .fold(PassInputs::empty(), |acc, p| acc | p.lock().required_inputs())
    }

    /// Pass names in execution order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .passes
            .iter()
            .map(|p| {
                let p = p.lock();
                (p.render_pass_event(), p.name().to_string())
            })
            .collect();
        names.sort_by_key(|(event, _)| *event);
        names.into_iter().map(|(_, name)| name).collect()
    }

    /// Run every enqueued pass for this camera and empty the queue.
    ///
    /// Returns the number of passes that executed successfully.
    pub fn execute(&mut self, frame: &FrameContext<'_, B>) -> usize {
        // Stable: passes at the same event keep their enqueue order.
        self.passes.sort_by_key(|p| p.lock().render_pass_event());
        log::trace!("Executing {} pass(es) (frame {})", self.passes.len(), frame.frame);

        let mut cmd = frame.backend.begin_commands("Camera Setup");
        let ready: Vec<bool> = self
            .passes
            .iter()
            .map(|pass| {
                let mut pass = pass.lock();
                match pass.on_camera_setup(&mut cmd, frame) {
                    Ok(()) => true,
                    Err(e) => {
                        log::error!("Pass '{}' camera setup failed: {}", pass.name(), e);
                        false
                    }
                }
            })
            .collect();
        frame.backend.submit(cmd);

        let mut executed = 0;
        for (pass, ready) in self.passes.iter().zip(ready) {
            if !ready {
                continue;
            }
            let mut pass = pass.lock();
            log::trace!("  Executing pass: {}", pass.name());
            match pass.execute(frame) {
                Ok(()) => executed += 1,
                Err(e) => log::error!("Pass '{}' failed: {}", pass.name(), e),
            }
        }

        let mut cmd = frame.backend.begin_commands("Camera Cleanup");
        for pass in self.passes.drain(..) {
            pass.lock().on_camera_cleanup(&mut cmd);
        }
        frame.backend.submit(cmd);

        executed
    }
}

impl<B: GraphicsBackend> Default for PassQueue<B> {
    fn default() -> Self {
        Self::new()
    }
}
