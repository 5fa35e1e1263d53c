//! Built-in render passes

pub mod volumetric_clouds;

pub use volumetric_clouds::{AttachmentRef, PassState, TargetConfig, VolumetricCloudsPass};
