//! Volumetric clouds feature
//!
//! Owns the cloud settings and material and decides, per camera, whether the
//! compositing pass runs. Shader, material and clouds box are resolved lazily and
//! cached; an unmet precondition skips the frame and is retried on the next one.

use super::RendererFeature;
use crate::backend::GraphicsBackend;
use crate::graph::{FrameContext, PassQueue, RenderPassEvent, SharedPass};
use crate::passes::VolumetricCloudsPass;
use crate::scene::{SceneLookup, SceneTransform};
use crate::settings::{VolumetricCloudsSettings, CLOUDS_SHADER_NAME};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Return the cached value, resolving and caching it first if the cache is empty.
///
/// Once something is cached it is reused as-is; `resolve` is not called again.
pub fn resolve_or_reuse<T>(cached: &mut Option<T>, resolve: impl FnOnce() -> Option<T>) -> Option<&T> {
    if cached.is_none() {
        *cached = resolve();
    }
    cached.as_ref()
}

/// Raymarched cloud layer, injected before post-processing
pub struct VolumetricCloudsFeature<B: GraphicsBackend> {
    enabled: bool,
    settings: Arc<VolumetricCloudsSettings>,
    shader: Option<B::Shader>,
    material: Option<Arc<B::Material>>,
    /// Resolved once by name, then kept even if the scene object goes away
    clouds_box: Option<Arc<dyn SceneTransform>>,
    pass: Option<Arc<Mutex<VolumetricCloudsPass<B>>>>,
}

impl<B: GraphicsBackend> VolumetricCloudsFeature<B> {
    pub const NAME: &'static str = "volumetric_clouds";

    pub fn new(settings: VolumetricCloudsSettings) -> Self {
        Self {
            enabled: true,
            settings: Arc::new(settings.clamped()),
            shader: None,
            material: None,
            clouds_box: None,
            pass: None,
        }
    }

    pub fn settings(&self) -> &VolumetricCloudsSettings {
        &self.settings
    }

    /// Replace the settings; picked up by the next frame's camera setup
    pub fn set_settings(&mut self, settings: VolumetricCloudsSettings) {
        self.settings = Arc::new(settings.clamped());
    }

    /// Bind the clouds box directly instead of looking it up by name
    pub fn set_clouds_box(&mut self, clouds_box: Arc<dyn SceneTransform>) {
        self.clouds_box = Some(clouds_box);
    }

    pub fn material(&self) -> Option<&Arc<B::Material>> {
        self.material.as_ref()
    }

    pub fn pass(&self) -> Option<&Arc<Mutex<VolumetricCloudsPass<B>>>> {
        self.pass.as_ref()
    }

    pub fn has_clouds_box(&self) -> bool {
        self.clouds_box.is_some()
    }

    /// Find the shader and create the material, once each.
    ///
    /// Returns whether a usable material exists. Cheap after the first success.
    pub fn resolve_resources(&mut self, backend: &B) -> bool {
        let Some(shader) = resolve_or_reuse(&mut self.shader, || {
            log::debug!("Looking up shader '{}'", CLOUDS_SHADER_NAME);
            backend.find_shader(CLOUDS_SHADER_NAME)
        }) else {
            return false;
        };

        resolve_or_reuse(&mut self.material, || {
            let material = backend.create_material(shader).map(Arc::new);
            if material.is_some() {
                log::info!("Created volumetric clouds material");
            }
            material
        })
        .is_some()
    }

    /// Look the clouds box up by name unless one is already cached.
    ///
    /// A cached box is never re-validated: renaming or removing the scene object
    /// afterwards does not affect the feature.
    pub fn resolve_bounding_volume(&mut self, scene: &dyn SceneLookup) -> bool {
        let name = &self.settings.clouds_box_object_name;
        resolve_or_reuse(&mut self.clouds_box, || {
            let found = scene.find(name);
            if found.is_some() {
                log::debug!("Resolved clouds box '{}'", name);
            }
            found
        })
        .is_some()
    }

    fn shared_pass(&mut self) -> Arc<Mutex<VolumetricCloudsPass<B>>> {
        self.pass
            .get_or_insert_with(|| {
                log::info!("Volumetric clouds pass created");
                Arc::new(Mutex::new(VolumetricCloudsPass::new(
                    RenderPassEvent::BeforeRenderingPostProcessing,
                )))
            })
            .clone()
    }

    /// Check every precondition and arm the pass for this frame
    fn prepare_pass(&mut self, frame: &FrameContext<'_, B>) -> Result<Option<SharedPass<B>>> {
        if !frame.post_processing_enabled {
            return Err(Error::PostProcessingDisabled);
        }
        if !self.resolve_resources(frame.backend) {
            return Err(Error::ResourceUnavailable {
                shader: CLOUDS_SHADER_NAME.to_string(),
            });
        }
        if !self.resolve_bounding_volume(frame.scene) {
            return Err(Error::BoundsUnresolved {
                name: self.settings.clouds_box_object_name.clone(),
            });
        }

        let pass = self.shared_pass();
        let ready = pass
            .lock()
            .setup(self.settings.clone(), self.material.clone(), self.clouds_box.clone());
        Ok(ready.then_some(pass as SharedPass<B>))
    }
}

impl<B: GraphicsBackend> RendererFeature<B> for VolumetricCloudsFeature<B> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn create(&mut self) {
        self.shared_pass();
    }

    fn add_render_passes(&mut self, queue: &mut PassQueue<B>, frame: &FrameContext<'_, B>) {
        match self.prepare_pass(frame) {
            Ok(Some(pass)) => queue.enqueue(pass),
            Ok(None) => log::trace!("{} pass has no material; not enqueued", Self::NAME),
            Err(Error::PostProcessingDisabled) => {
                log::trace!("Post-processing disabled; skipping {}", Self::NAME)
            }
            Err(e) => log::error!(
                "VolumetricCloudsFeature.add_render_passes(): {}. {} render pass will not be added.",
                e,
                Self::NAME
            ),
        }
    }

    fn dispose(&mut self) {
        if self.material.take().is_some() {
            log::debug!("Destroyed volumetric clouds material");
        }
        if let Some(pass) = self.pass.take() {
            pass.lock().dispose();
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn allow_multiple(&self) -> bool {
        false
    }
}
