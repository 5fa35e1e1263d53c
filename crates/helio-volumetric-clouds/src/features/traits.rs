//! Feature trait definition
//!
//! This is the interface the host drives for every effect plugged into its
//! pipeline.

use crate::backend::GraphicsBackend;
use crate::graph::{FrameContext, PassQueue};

/// Renderer feature trait - implemented by every pluggable effect
///
/// **Lifecycle:**
/// 1. `create()` - Called once when the feature is added (and again after `dispose()`)
/// 2. `add_render_passes()` - Called every frame per camera; enqueues passes or skips
/// 3. `dispose()` - Called at teardown; releases every GPU resource the feature owns
pub trait RendererFeature<B: GraphicsBackend>: AsAny {
    /// Unique name for this feature (lowercase snake_case)
    fn name(&self) -> &str;

    /// Build the feature's passes. Must be idempotent.
    fn create(&mut self);

    /// Decide whether to run this frame and enqueue passes.
    ///
    /// Never fails from the host's point of view: unmet preconditions are
    /// logged and the frame is skipped.
    fn add_render_passes(&mut self, queue: &mut PassQueue<B>, frame: &FrameContext<'_, B>);

    /// Release GPU resources. Safe to call more than once.
    fn dispose(&mut self);

    /// Check if feature is currently enabled
    fn is_enabled(&self) -> bool {
        true
    }

    /// Enable or disable this feature
    fn set_enabled(&mut self, enabled: bool) {
        let _ = enabled;
    }

    /// Whether a registry may hold more than one instance of this feature
    fn allow_multiple(&self) -> bool {
        true
    }
}

/// Helper trait for downcasting feature trait objects
pub trait AsAny {
    fn as_any(&self) -> &dyn std::any::Any;
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

impl<T: std::any::Any> AsAny for T {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
