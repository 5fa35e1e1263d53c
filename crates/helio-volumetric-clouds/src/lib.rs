//! Helio Volumetric Clouds - raymarched cloud layer composited before post-processing
//!
//! The crate is the CPU-side half of the effect. Every frame it:
//!
//! - Rebuilds the camera's world-space view-ray basis from the view/projection matrices
//! - Maps the clouds box into camera-relative space
//! - Uploads the cloud shading parameters through a declarative parameter table
//! - Blits the camera colour through the cloud shader into a scratch target and back
//!
//! The host renderer is reached through the traits in [`backend`] and [`graph`].
//! Two backends ship with the crate: [`backend::wgpu_backend`] for real GPU work and
//! [`backend::software`] which evaluates the cloud pass on the CPU.

pub mod backend;
pub mod bounds;
pub mod features;
pub mod graph;
pub mod params;
pub mod passes;
pub mod resources;
pub mod scene;
pub mod settings;

mod camera;

pub use bounds::CloudBounds;
pub use camera::{CameraData, CameraRays, ClipDepth};
pub use features::{FeatureRegistry, RendererFeature, VolumetricCloudsFeature};
pub use graph::{FrameContext, PassInputs, PassQueue, RenderPassEvent, ScriptableRenderPass};
pub use passes::VolumetricCloudsPass;
pub use scene::{Scene, SceneLookup, SceneTransform, Transform};
pub use settings::{Color, VolumetricCloudsSettings};

/// Result type for cloud effect operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing or running the effect
///
/// None of these are fatal to the host: the feature and the pass queue log them
/// and skip the affected work for the current frame.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Shader '{shader}' could not be resolved or no material could be created from it")]
    ResourceUnavailable { shader: String },

    #[error("Clouds box object '{name}' was not found in the scene")]
    BoundsUnresolved { name: String },

    #[error("Post-processing is disabled for this camera")]
    PostProcessingDisabled,

    #[error("Camera view-projection matrix is not invertible")]
    DegenerateCamera,

    #[error("Feature error: {0}")]
    Feature(String),

    #[error("Material has no shader pass {0}")]
    InvalidPassIndex(u32),

    #[error("Blit source and destination are the same target '{0}'")]
    AliasedBlit(String),

    #[error("Pass '{0}' was not configured for this frame")]
    PassNotConfigured(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("WGPU error: {0}")]
    Wgpu(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
