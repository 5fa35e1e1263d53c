//! Feature registry for managing features

use super::RendererFeature;
use crate::backend::GraphicsBackend;
use crate::graph::{FrameContext, PassQueue};
use crate::{Error, Result};
use std::any::TypeId;

/// Ordered registry of renderer features
///
/// Features are driven in registration order.
pub struct FeatureRegistry<B: GraphicsBackend> {
    features: Vec<Box<dyn RendererFeature<B>>>,
}

impl<B: GraphicsBackend> FeatureRegistry<B> {
    pub fn new() -> Self {
        Self { features: Vec::new() }
    }

    /// Create a builder for fluent API
    pub fn builder() -> FeatureRegistryBuilder<B> {
        FeatureRegistryBuilder::new()
    }

    /// Register a feature
    ///
    /// Fails when a feature of the same type is already registered and either
    /// instance disallows multiples.
    pub fn register<F: RendererFeature<B> + 'static>(&mut self, feature: F) -> Result<()> {
        let type_id = TypeId::of::<F>();
        if let Some(existing) = self
            .features
            .iter()
            .map(|f| &**f)
            .find(|f| (**f).as_any().type_id() == type_id)
        {
            if !feature.allow_multiple() || !existing.allow_multiple() {
                return Err(Error::Feature(format!(
                    "Feature '{}' does not allow multiple instances",
                    feature.name()
                )));
            }
        }

        log::info!("Registered feature '{}'", feature.name());
        self.features.push(Box::new(feature));
        Ok(())
    }

    /// Enable a feature
    pub fn enable(&mut self, name: &str) -> Result<()> {
        self.find_mut(name)?.set_enabled(true);
        Ok(())
    }

    /// Disable a feature
    pub fn disable(&mut self, name: &str) -> Result<()> {
        self.find_mut(name)?.set_enabled(false);
        Ok(())
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut Box<dyn RendererFeature<B>>> {
        self.features
            .iter_mut()
            .find(|f| f.name() == name)
            .ok_or_else(|| Error::Feature(format!("Feature '{}' not found", name)))
    }

    /// Call `create()` on every feature
    pub fn create_all(&mut self) {
        for feature in &mut self.features {
            feature.create();
        }
    }

    /// Let every enabled feature enqueue its passes for this camera
    pub fn add_render_passes(&mut self, queue: &mut PassQueue<B>, frame: &FrameContext<'_, B>) {
        for feature in &mut self.features {
            if feature.is_enabled() {
                feature.add_render_passes(queue, frame);
            }
        }
    }

    /// Call `dispose()` on every feature
    pub fn dispose_all(&mut self) {
        for feature in &mut self.features {
            feature.dispose();
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Get a feature by name
    pub fn get(&self, name: &str) -> Option<&dyn RendererFeature<B>> {
        self.features.iter().find(|f| f.name() == name).map(|f| &**f)
    }

    /// Get a mutable reference to a specific feature by type
    pub fn get_typed_mut<T: RendererFeature<B> + 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.features
            .iter_mut()
            .find(|f| f.name() == name)
            .and_then(|f| (**f).as_any_mut().downcast_mut::<T>())
    }
}

/// Builder for FeatureRegistry
pub struct FeatureRegistryBuilder<B: GraphicsBackend> {
    registry: FeatureRegistry<B>,
    error: Option<Error>,
}

impl<B: GraphicsBackend> FeatureRegistryBuilder<B> {
    pub fn new() -> Self {
        Self {
            registry: FeatureRegistry::new(),
            error: None,
        }
    }

    /// Add a feature to the registry
    pub fn with_feature(mut self, feature: impl RendererFeature<B> + 'static) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.registry.register(feature) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Build the registry, failing with the first registration error
    pub fn build(self) -> Result<FeatureRegistry<B>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.registry),
        }
    }
}

impl<B: GraphicsBackend> Default for FeatureRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GraphicsBackend> Default for FeatureRegistryBuilder<B> {
    fn default() -> Self {
        Self::new()
    }
}
