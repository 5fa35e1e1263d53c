//! Renderer features
//!
//! Features are the host-facing half of an effect. The host registers them once,
//! asks each one per camera whether it wants to enqueue passes, and disposes them
//! at teardown. Passes do the per-frame GPU work.

mod registry;
mod traits;
pub mod volumetric_clouds;

pub use registry::{FeatureRegistry, FeatureRegistryBuilder};
pub use traits::{AsAny, RendererFeature};
pub use volumetric_clouds::{resolve_or_reuse, VolumetricCloudsFeature};
