//! Render-target lifecycle
//!
//! The clouds pass owns one scratch colour target that lives across frames and is
//! only reallocated when the camera target changes shape.

use crate::backend::{GraphicsBackend, RenderTargetDescriptor, SamplerSettings};
use crate::Result;

/// Everything that forces a reallocation when it changes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub descriptor: RenderTargetDescriptor,
    pub sampler: SamplerSettings,
}

/// A render target reallocated only when its key changes
pub struct ScratchTarget<B: GraphicsBackend> {
    name: &'static str,
    target: Option<B::RenderTarget>,
    key: Option<TargetKey>,
    allocations: u64,
}

impl<B: GraphicsBackend> ScratchTarget<B> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            target: None,
            key: None,
            allocations: 0,
        }
    }

    /// Make sure the target matches `descriptor` and `sampler`.
    ///
    /// Returns `true` when a new target was allocated. The previous target, if
    /// any, is dropped (and so released) before the new one is created. A failed
    /// allocation leaves nothing allocated.
    pub fn reallocate_if_needed(
        &mut self,
        backend: &B,
        descriptor: &RenderTargetDescriptor,
        sampler: SamplerSettings,
    ) -> Result<bool> {
        let key = TargetKey {
            descriptor: *descriptor,
            sampler,
        };
        if self.target.is_some() && self.key == Some(key) {
            return Ok(false);
        }

        self.release();
        log::debug!(
            "Allocating {} {}x{} {:?} (samples={})",
            self.name,
            descriptor.width,
            descriptor.height,
            descriptor.format,
            descriptor.sample_count
        );
        self.target = Some(backend.allocate_render_target(descriptor, sampler, self.name)?);
        self.key = Some(key);
        self.allocations += 1;
        Ok(true)
    }

    /// Drop the target. Safe to call when nothing is allocated.
    pub fn release(&mut self) {
        if self.target.take().is_some() {
            log::debug!("Released {}", self.name);
        }
        self.key = None;
    }

    pub fn get(&self) -> Option<&B::RenderTarget> {
        self.target.as_ref()
    }

    pub fn key(&self) -> Option<&TargetKey> {
        self.key.as_ref()
    }

    pub fn is_allocated(&self) -> bool {
        self.target.is_some()
    }

    /// Number of allocations performed over this target's lifetime
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareBackend;

    fn desc(width: u32, height: u32) -> RenderTargetDescriptor {
        RenderTargetDescriptor::new(width, height, wgpu::TextureFormat::Rgba16Float)
    }

    #[test]
    fn unchanged_key_does_not_reallocate() {
        let backend = SoftwareBackend::new();
        let mut scratch = ScratchTarget::<SoftwareBackend>::new("_Scratch");

        assert!(scratch.reallocate_if_needed(&backend, &desc(64, 32), SamplerSettings::BILINEAR_CLAMP).unwrap());
        let id = scratch.get().unwrap().id();
        assert!(!scratch.reallocate_if_needed(&backend, &desc(64, 32), SamplerSettings::BILINEAR_CLAMP).unwrap());

        assert_eq!(scratch.get().unwrap().id(), id);
        assert_eq!(scratch.allocations(), 1);
        assert_eq!(backend.stats().targets_allocated(), 1);
    }

    #[test]
    fn resize_or_sampler_change_reallocates_and_releases_old() {
        let backend = SoftwareBackend::new();
        let mut scratch = ScratchTarget::<SoftwareBackend>::new("_Scratch");

        scratch.reallocate_if_needed(&backend, &desc(64, 32), SamplerSettings::BILINEAR_CLAMP).unwrap();
        assert!(scratch.reallocate_if_needed(&backend, &desc(128, 32), SamplerSettings::BILINEAR_CLAMP).unwrap());
        let nearest = SamplerSettings {
            filter: wgpu::FilterMode::Nearest,
            ..SamplerSettings::BILINEAR_CLAMP
        };
        assert!(scratch.reallocate_if_needed(&backend, &desc(128, 32), nearest).unwrap());

        assert_eq!(scratch.allocations(), 3);
        assert_eq!(backend.stats().targets_allocated(), 3);
        assert_eq!(backend.stats().targets_released(), 2);
    }

    #[test]
    fn failed_allocation_leaves_nothing_behind() {
        let backend = SoftwareBackend::new();
        let mut scratch = ScratchTarget::<SoftwareBackend>::new("_Scratch");
        scratch.reallocate_if_needed(&backend, &desc(64, 32), SamplerSettings::BILINEAR_CLAMP).unwrap();

        assert!(scratch.reallocate_if_needed(&backend, &desc(0, 0), SamplerSettings::BILINEAR_CLAMP).is_err());
        assert!(!scratch.is_allocated());
        assert!(scratch.key().is_none());
        assert_eq!(backend.stats().live_targets(), 0);

        assert!(scratch.reallocate_if_needed(&backend, &desc(64, 32), SamplerSettings::BILINEAR_CLAMP).unwrap());
    }

    #[test]
    fn release_is_idempotent() {
        let backend = SoftwareBackend::new();
        let mut scratch = ScratchTarget::<SoftwareBackend>::new("_Scratch");
        scratch.reallocate_if_needed(&backend, &desc(8, 8), SamplerSettings::BILINEAR_CLAMP).unwrap();

        scratch.release();
        scratch.release();

        assert!(!scratch.is_allocated());
        assert!(scratch.key().is_none());
        assert_eq!(backend.stats().targets_released(), 1);
    }
}
